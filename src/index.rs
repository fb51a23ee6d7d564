//! Workspace indexing pipeline.
//!
//! ```text
//! walk (walkdir + globset excludes)
//!   ├─ *.go  ─────────► GoParser: one snippet per top-level func/method
//!   └─ other ─► size / binary check ─► one whole-file snippet (truncated)
//!                         │
//!                         ▼
//!        embed in fixed-size batches ─► attach by index ─► upsert batch
//! ```
//!
//! Per-file problems (unreadable, binary, too large, syntax errors) are
//! recorded in the [`IndexReport`] and the walk continues. A failed
//! embedding or upsert batch aborts the run; batches already upserted stay
//! committed.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::config::IndexingConfig;
use crate::detect;
use crate::embedding::EmbeddingProvider;
use crate::error::IndexError;
use crate::models::Snippet;
use crate::parser::{CodeParser, GoParser};
use crate::progress::{IndexProgressEvent, IndexProgressReporter, NoProgress};
use crate::vector_store::VectorStore;

pub const TRUNCATION_SUFFIX: &str = "... [content truncated]";

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Why a file produced no snippets.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Binary,
    TooLarge { bytes: u64 },
    Unreadable(String),
    ParseFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Binary => f.write_str("binary file"),
            SkipReason::TooLarge { bytes } => write!(f, "file too large ({} bytes)", bytes),
            SkipReason::Unreadable(e) => write!(f, "failed to read: {}", e),
            SkipReason::ParseFailed(e) => write!(f, "failed to parse: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFile {
    pub path: String,
    pub reason: SkipReason,
}

/// Summary of one indexing run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexReport {
    pub files_seen: usize,
    pub snippets: usize,
    pub batches: usize,
    pub skipped: Vec<SkippedFile>,
    /// File counts keyed by lowercased extension (`"(no extension)"` for none).
    pub extensions: BTreeMap<String, usize>,
}

pub struct Indexer {
    parser: Arc<dyn CodeParser>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    config: IndexingConfig,
    progress: Box<dyn IndexProgressReporter>,
}

impl Indexer {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: IndexingConfig,
    ) -> Self {
        Self {
            parser: Arc::new(GoParser::new()),
            embedder,
            store,
            config,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn IndexProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Index every file under `root`. Snippet paths are recorded relative to
    /// `root` with `/` separators.
    pub async fn index_directory(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<IndexReport, IndexError> {
        if !root.is_dir() {
            return Err(IndexError::NotADirectory {
                path: root.to_path_buf(),
            });
        }
        tracing::info!(root = %root.display(), "starting indexing");

        let mut report = IndexReport::default();
        let mut snippets = self.collect(root, cancel, &mut report)?;

        tracing::info!(files = report.files_seen, "processed files");
        for (ext, count) in &report.extensions {
            tracing::info!(extension = %ext, files = count, "file type");
        }
        if snippets.is_empty() {
            tracing::info!("no files produced snippets");
            return Ok(report);
        }

        report.snippets = snippets.len();
        self.embed_and_upsert(&mut snippets, cancel, &mut report)
            .await?;

        tracing::info!(
            snippets = report.snippets,
            batches = report.batches,
            skipped = report.skipped.len(),
            "indexing complete"
        );
        Ok(report)
    }

    fn collect(
        &self,
        root: &Path,
        cancel: &CancellationToken,
        report: &mut IndexReport,
    ) -> Result<Vec<Snippet>, IndexError> {
        let excludes = build_excludes(&self.config.exclude_globs)?;
        let walker = WalkDir::new(root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name();

        let mut snippets = Vec::new();
        for entry in walker {
            if cancel.is_cancelled() {
                tracing::info!("cancelled, stopping walk");
                return Err(IndexError::Cancelled);
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "error accessing path");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path
                .strip_prefix(root)
                .unwrap_or(path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if excludes.is_match(&relative) {
                continue;
            }

            report.files_seen += 1;
            *report.extensions.entry(extension_key(path)).or_insert(0) += 1;

            match self.extract(path, &relative) {
                Ok(found) => {
                    tracing::debug!(file = %relative, snippets = found.len(), "extracted");
                    snippets.extend(found);
                }
                Err(reason) => {
                    tracing::warn!(file = %relative, reason = %reason, "skipping file");
                    report.skipped.push(SkippedFile {
                        path: relative,
                        reason,
                    });
                }
            }

            if report.files_seen % 100 == 0 {
                self.progress.report(IndexProgressEvent::Scanning {
                    files: report.files_seen as u64,
                    snippets: snippets.len() as u64,
                });
            }
        }
        self.progress.report(IndexProgressEvent::Scanning {
            files: report.files_seen as u64,
            snippets: snippets.len() as u64,
        });
        Ok(snippets)
    }

    fn extract(&self, path: &Path, relative: &str) -> Result<Vec<Snippet>, SkipReason> {
        if self.parser.supports(path) {
            let source = std::fs::read_to_string(path)
                .map_err(|e| SkipReason::Unreadable(e.to_string()))?;
            return self
                .parser
                .parse(relative, &source)
                .map_err(|e| SkipReason::ParseFailed(e.to_string()));
        }
        self.whole_file(path, relative).map(|s| vec![s])
    }

    fn whole_file(&self, path: &Path, relative: &str) -> Result<Snippet, SkipReason> {
        let size = std::fs::metadata(path)
            .map_err(|e| SkipReason::Unreadable(e.to_string()))?
            .len();
        if size > self.config.max_file_bytes {
            return Err(SkipReason::TooLarge { bytes: size });
        }

        let binary = detect::is_binary_file(path, &self.config.binary)
            .map_err(|e| SkipReason::Unreadable(e.to_string()))?;
        if binary {
            return Err(SkipReason::Binary);
        }

        let bytes = std::fs::read(path).map_err(|e| SkipReason::Unreadable(e.to_string()))?;

        let text = String::from_utf8_lossy(&bytes);
        let (content, truncated) = truncate_chars(&text, self.config.max_snippet_chars);
        let end_line = content.split('\n').count();

        let file_type = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut snippet = Snippet::new(content, relative, 1, end_line)
            .with_metadata("file_type", file_type)
            .with_metadata("file_name", file_name);
        if truncated {
            snippet = snippet.with_metadata("truncated", "true");
        }
        Ok(snippet)
    }

    async fn embed_and_upsert(
        &self,
        snippets: &mut [Snippet],
        cancel: &CancellationToken,
        report: &mut IndexReport,
    ) -> Result<(), IndexError> {
        let batch_size = self.config.batch_size.max(1);
        let total = snippets.len().div_ceil(batch_size);
        tracing::info!(snippets = snippets.len(), batches = total, "generating embeddings");

        for (n, batch) in snippets.chunks_mut(batch_size).enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(committed = n, "cancelled between batches");
                return Err(IndexError::Cancelled);
            }
            let start = n * batch_size;
            let end = start + batch.len();
            tracing::info!(batch = n + 1, total, start = start + 1, end, "embedding batch");

            let texts: Vec<String> = batch.iter().map(Snippet::embedding_text).collect();
            let embeddings = self
                .embedder
                .embed(&texts)
                .await
                .map_err(|source| IndexError::Embedding { start, end, source })?;
            if embeddings.len() != batch.len() {
                return Err(IndexError::CountMismatch {
                    start,
                    end,
                    expected: batch.len(),
                    actual: embeddings.len(),
                });
            }
            for (snippet, embedding) in batch.iter_mut().zip(embeddings) {
                snippet.embedding = Some(embedding);
            }

            self.store
                .upsert(batch)
                .await
                .map_err(|source| IndexError::Upsert { start, end, source })?;
            // committed; release the vectors
            for snippet in batch.iter_mut() {
                snippet.embedding = None;
            }

            report.batches += 1;
            self.progress.report(IndexProgressEvent::Embedding {
                n: (n + 1) as u64,
                total: total as u64,
                snippets: end as u64,
            });
        }
        Ok(())
    }
}

fn build_excludes(extra: &[String]) -> Result<GlobSet, IndexError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in DEFAULT_EXCLUDES.iter().copied().chain(extra.iter().map(String::as_str)) {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn extension_key(path: &Path) -> String {
    match path.extension() {
        Some(ext) => format!(".{}", ext.to_string_lossy().to_lowercase()),
        None => "(no extension)".to_string(),
    }
}

/// Cut `text` to at most `max` characters, appending the truncation suffix.
fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((cut, _)) => (format!("{}{}", &text[..cut], TRUNCATION_SUFFIX), true),
        None => (text.to_string(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, TransportError};
    use crate::models::Embedding;
    use crate::vector_store::InMemoryStore;
    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    /// Encodes each text's length in the vector so attachment order is checkable.
    struct LengthEmbedder {
        calls: Mutex<Vec<usize>>,
        drop_last: bool,
    }

    impl LengthEmbedder {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                drop_last: false,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        fn model_name(&self) -> &str {
            "length"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, TransportError> {
            self.calls.lock().await.push(texts.len());
            let mut out: Vec<Embedding> = texts
                .iter()
                .map(|t| Embedding::new(vec![t.len() as f32, 1.0]).unwrap())
                .collect();
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }
    }

    /// Records each upserted batch.
    struct RecordingStore {
        batches: Mutex<Vec<Vec<Snippet>>>,
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        fn backend(&self) -> &'static str {
            "recording"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn upsert(&self, snippets: &[Snippet]) -> Result<(), StoreError> {
            self.batches.lock().await.push(snippets.to_vec());
            Ok(())
        }
        async fn query(&self, _: &Embedding, _: usize) -> Result<Vec<Snippet>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn config(batch_size: usize) -> IndexingConfig {
        IndexingConfig {
            batch_size,
            ..IndexingConfig::default()
        }
    }

    #[tokio::test]
    async fn batches_attach_embeddings_by_index() {
        let tmp = TempDir::new().unwrap();
        for (name, body) in [("a.txt", "a"), ("b.txt", "bb"), ("c.txt", "ccc"), ("d.txt", "dddd"), ("e.txt", "eeeee")] {
            std::fs::write(tmp.path().join(name), body).unwrap();
        }
        let embedder = Arc::new(LengthEmbedder::new());
        let store = Arc::new(RecordingStore {
            batches: Mutex::new(Vec::new()),
        });
        let indexer = Indexer::new(embedder.clone(), store.clone(), config(2));

        let report = indexer
            .index_directory(tmp.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.files_seen, 5);
        assert_eq!(report.snippets, 5);
        assert_eq!(report.batches, 3);
        assert_eq!(*embedder.calls.lock().await, vec![2, 2, 1]);

        let batches = store.batches.lock().await;
        let sizes: Vec<_> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        for snippet in batches.iter().flatten() {
            let expected = snippet.embedding_text().len() as f32;
            assert_eq!(snippet.embedding.as_ref().unwrap().as_slice()[0], expected);
        }
    }

    #[tokio::test]
    async fn count_mismatch_aborts() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "alpha").unwrap();
        let embedder = Arc::new(LengthEmbedder {
            calls: Mutex::new(Vec::new()),
            drop_last: true,
        });
        let indexer = Indexer::new(embedder, Arc::new(InMemoryStore::new(2)), config(100));
        let err = indexer
            .index_directory(tmp.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::CountMismatch {
                expected: 1,
                actual: 0,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn go_files_split_and_others_whole() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("main.go"),
            "package main\n\nfunc A() {}\n\ntype T struct{}\n\nfunc (t *T) B() {}\n",
        )
        .unwrap();
        std::fs::write(tmp.path().join("README.md"), "# hi\nthere\n").unwrap();
        let store = Arc::new(InMemoryStore::new(2));
        let indexer = Indexer::new(Arc::new(LengthEmbedder::new()), store.clone(), config(100));

        let report = indexer
            .index_directory(tmp.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.snippets, 3);
        assert_eq!(report.extensions[".go"], 1);
        assert_eq!(report.extensions[".md"], 1);

        let stored = store.all().await;
        let readme = stored.iter().find(|s| s.file_path == "README.md").unwrap();
        assert_eq!(readme.metadata["file_type"], "md");
        assert_eq!(readme.metadata["file_name"], "README.md");
        assert_eq!((readme.start_line, readme.end_line), (1, 3));
        let mut symbols: Vec<_> = stored.iter().flat_map(|s| s.symbols.clone()).collect();
        symbols.sort();
        assert_eq!(symbols, vec!["A", "T.B"]);
    }

    #[tokio::test]
    async fn binary_and_broken_files_are_skipped() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("blob.bin"), vec![0u8; 200]).unwrap();
        std::fs::write(tmp.path().join("bad.go"), "package main\nfunc {{{").unwrap();
        std::fs::write(tmp.path().join("ok.txt"), "fine").unwrap();
        std::fs::create_dir(tmp.path().join(".git")).unwrap();
        std::fs::write(tmp.path().join(".git/HEAD"), "ref").unwrap();

        let indexer = Indexer::new(
            Arc::new(LengthEmbedder::new()),
            Arc::new(InMemoryStore::new(2)),
            config(100),
        );
        let report = indexer
            .index_directory(tmp.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.files_seen, 3);
        assert_eq!(report.snippets, 1);
        let reasons: BTreeMap<_, _> = report
            .skipped
            .iter()
            .map(|s| (s.path.as_str(), s.reason.clone()))
            .collect();
        assert_eq!(reasons["blob.bin"], SkipReason::Binary);
        assert!(matches!(reasons["bad.go"], SkipReason::ParseFailed(_)));
    }

    #[tokio::test]
    async fn large_files_are_truncated_or_skipped() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("long.txt"), "z".repeat(50)).unwrap();
        std::fs::write(tmp.path().join("huge.txt"), "h".repeat(500)).unwrap();
        let store = Arc::new(InMemoryStore::new(2));
        let indexer = Indexer::new(
            Arc::new(LengthEmbedder::new()),
            store.clone(),
            IndexingConfig {
                max_snippet_chars: 10,
                max_file_bytes: 100,
                ..IndexingConfig::default()
            },
        );
        let report = indexer
            .index_directory(tmp.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, SkipReason::TooLarge { bytes: 500 });

        let stored = store.all().await;
        assert_eq!(stored[0].content, format!("{}{}", "z".repeat(10), TRUNCATION_SUFFIX));
        assert_eq!(stored[0].metadata["truncated"], "true");
    }

    #[tokio::test]
    async fn cancelled_run_stops() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "a").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let indexer = Indexer::new(
            Arc::new(LengthEmbedder::new()),
            Arc::new(InMemoryStore::new(2)),
            config(100),
        );
        let err = indexer.index_directory(tmp.path(), &cancel).await.unwrap_err();
        assert!(matches!(err, IndexError::Cancelled));
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let indexer = Indexer::new(
            Arc::new(LengthEmbedder::new()),
            Arc::new(InMemoryStore::new(2)),
            config(100),
        );
        let err = indexer
            .index_directory(&tmp.path().join("nope"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::NotADirectory { .. }));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let (cut, truncated) = truncate_chars("héllo", 2);
        assert!(truncated);
        assert_eq!(cut, format!("hé{}", TRUNCATION_SUFFIX));
        assert_eq!(truncate_chars("abc", 3), ("abc".to_string(), false));
    }
}
