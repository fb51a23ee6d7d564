//! Degraded-mode storage for the vector tools.
//!
//! When the embedding provider or vector store is unavailable,
//! `vector_upsert` writes its text to a timestamped flat file in the
//! workspace root and `vector_search` scans those files with a simple
//! term-frequency score.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;

use serde::Serialize;

use crate::error::ToolError;
use crate::sandbox::Sandbox;

pub const FALLBACK_PREFIX: &str = "vector_store_fallback_";
pub const FALLBACK_SUFFIX: &str = ".txt";
pub const METADATA_FOOTER: &str = "\n\n--- Metadata ---\n";

/// One matching fallback file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackHit {
    pub filename: String,
    pub content: String,
    pub relevance: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_line: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackSearch {
    NoFiles,
    NoMatches,
    Hits(Vec<FallbackHit>),
}

impl FallbackSearch {
    /// Text returned to the model.
    pub fn render(&self) -> Result<String, ToolError> {
        match self {
            Self::NoFiles => Ok("No fallback files found. No search results available.".to_string()),
            Self::NoMatches => Ok("No relevant information found in fallback files.".to_string()),
            Self::Hits(hits) => Ok(serde_json::to_string_pretty(hits)?),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FallbackStore {
    sandbox: Sandbox,
    max_results: usize,
}

impl FallbackStore {
    pub fn new(sandbox: Sandbox, max_results: usize) -> Self {
        Self {
            sandbox,
            max_results,
        }
    }

    /// Persist `text` with an optional metadata footer. Returns the file name.
    pub fn store(
        &self,
        text: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<String, ToolError> {
        let mut body = String::from(text);
        if !metadata.is_empty() {
            body.push_str(METADATA_FOOTER);
            for (key, value) in metadata {
                body.push_str(&format!("{}: {}\n", key, value));
            }
        }

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%6f").to_string();
        let mut attempt = 0u32;
        loop {
            let filename = if attempt == 0 {
                format!("{}{}{}", FALLBACK_PREFIX, stamp, FALLBACK_SUFFIX)
            } else {
                format!("{}{}_{}{}", FALLBACK_PREFIX, stamp, attempt, FALLBACK_SUFFIX)
            };
            let path = self.sandbox.root().join(&filename);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(body.as_bytes()).map_err(|e| {
                        ToolError::io(format!("failed to write fallback file '{}'", filename), e)
                    })?;
                    tracing::info!(file = %filename, bytes = body.len(), "stored content in fallback file");
                    return Ok(filename);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => {
                    return Err(ToolError::io(
                        format!("failed to create fallback file '{}'", filename),
                        e,
                    ))
                }
            }
        }
    }

    /// Rank fallback files by summed per-line term counts.
    pub fn search(&self, query: &str) -> Result<FallbackSearch, ToolError> {
        let entries = std::fs::read_dir(self.sandbox.root())
            .map_err(|e| ToolError::io("failed to list fallback files", e))?;

        let mut files: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(FALLBACK_PREFIX) && name.ends_with(FALLBACK_SUFFIX))
            .collect();
        files.sort();

        if files.is_empty() {
            return Ok(FallbackSearch::NoFiles);
        }

        let lowered = query.to_lowercase();
        let terms: Vec<&str> = lowered.split_whitespace().collect();

        let mut hits = Vec::new();
        for filename in files {
            let content = match std::fs::read_to_string(self.sandbox.root().join(&filename)) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(file = %filename, error = %e, "skipping unreadable fallback file");
                    continue;
                }
            };

            let mut score = 0u64;
            let mut best: Option<(u64, &str)> = None;
            for line in content.split('\n') {
                let line_lower = line.to_lowercase();
                let line_score: u64 = terms
                    .iter()
                    .map(|term| line_lower.matches(term).count() as u64)
                    .sum();
                score += line_score;
                if line_score > best.map(|(s, _)| s).unwrap_or(0) {
                    best = Some((line_score, line));
                }
            }

            if score > 0 {
                let matched_line = best.map(|(_, line)| line.to_string());
                hits.push(FallbackHit {
                    filename,
                    relevance: score,
                    matched_line,
                    content,
                });
            }
        }

        if hits.is_empty() {
            return Ok(FallbackSearch::NoMatches);
        }

        // stable: equal scores keep file-name order
        hits.sort_by(|a, b| b.relevance.cmp(&a.relevance));
        hits.truncate(self.max_results);
        Ok(FallbackSearch::Hits(hits))
    }
}
