//! Indexing progress reporting.
//!
//! Reports observable progress during `--index` so users see how many files
//! were walked and how many embedding batches remain. Progress is emitted on
//! **stderr** so stdout stays free for the chat transcript.

use std::io::Write;

/// A single progress event for an indexing run.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexProgressEvent {
    /// Walking the workspace. Total unknown.
    Scanning { files: u64, snippets: u64 },
    /// Embedding and upserting: `n` of `total` batches committed.
    Embedding { n: u64, total: u64, snippets: u64 },
}

/// Reports indexing progress. Implementations write to stderr (human or JSON).
pub trait IndexProgressReporter: Send + Sync {
    fn report(&self, event: IndexProgressEvent);
}

/// Human-friendly progress on stderr: "index  embedding  3 / 12 batches (1,200 snippets)".
pub struct StderrProgress;

impl IndexProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let line = match &event {
            IndexProgressEvent::Scanning { files, snippets } => format!(
                "index  scanning  {} files, {} snippets\n",
                format_number(*files),
                format_number(*snippets)
            ),
            IndexProgressEvent::Embedding { n, total, snippets } => format!(
                "index  embedding  {} / {} batches ({} snippets)\n",
                format_number(*n),
                format_number(*total),
                format_number(*snippets)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IndexProgressReporter for JsonProgress {
    fn report(&self, event: IndexProgressEvent) {
        let obj = match &event {
            IndexProgressEvent::Scanning { files, snippets } => serde_json::json!({
                "event": "progress",
                "phase": "scanning",
                "files": files,
                "snippets": snippets
            }),
            IndexProgressEvent::Embedding { n, total, snippets } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "n": n,
                "total": total,
                "snippets": snippets
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

pub struct NoProgress;

impl IndexProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IndexProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
