//! Core data models used throughout the agent.
//!
//! These types represent the snippets that flow from the indexing pipeline
//! into the vector store and back out through retrieval.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;

/// A fixed-length embedding vector.
///
/// Only produced by an embedding provider. Construction rejects empty and
/// non-finite vectors; the vector store additionally rejects vectors whose
/// length differs from its collection's dimensionality.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Result<Self, EmbeddingError> {
        if values.is_empty() {
            return Err(EmbeddingError::Empty);
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(EmbeddingError::NonFinite { index });
        }
        Ok(Self(values))
    }

    pub fn dims(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// An indexed unit of source content.
///
/// Lines are 1-based and inclusive. Snippets written through the
/// `vector_upsert` tool have no source location, so both lines are `0` and
/// `file_path` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub id: String,
    pub content: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(skip)]
    pub embedding: Option<Embedding>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Snippet {
    /// Create a snippet with a fresh UUID and no embedding.
    pub fn new(
        content: impl Into<String>,
        file_path: impl Into<String>,
        start_line: usize,
        end_line: usize,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            file_path: file_path.into(),
            start_line,
            end_line,
            symbols: Vec::new(),
            embedding: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_symbols(mut self, symbols: Vec<String>) -> Self {
        self.symbols = symbols;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The text sent to the embedding provider: path, symbols, then content.
    pub fn embedding_text(&self) -> String {
        if self.symbols.is_empty() {
            format!("File: {}\n{}", self.file_path, self.content)
        } else {
            format!(
                "File: {}\nSymbols: {}\n{}",
                self.file_path,
                self.symbols.join(", "),
                self.content
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_rejects_empty_and_nan() {
        assert_eq!(Embedding::new(vec![]), Err(EmbeddingError::Empty));
        assert_eq!(
            Embedding::new(vec![0.1, f32::NAN]),
            Err(EmbeddingError::NonFinite { index: 1 })
        );
        assert_eq!(Embedding::new(vec![0.1, 0.2]).map(|e| e.dims()), Ok(2));
    }

    #[test]
    fn embedding_text_includes_symbols() {
        let snippet = Snippet::new("func A() {}", "pkg/a.go", 3, 3)
            .with_symbols(vec!["A".to_string(), "Server.B".to_string()]);
        assert_eq!(
            snippet.embedding_text(),
            "File: pkg/a.go\nSymbols: A, Server.B\nfunc A() {}"
        );

        let plain = Snippet::new("hello", "notes.md", 1, 1);
        assert_eq!(plain.embedding_text(), "File: notes.md\nhello");
    }

    #[test]
    fn snippet_ids_are_unique() {
        let a = Snippet::new("x", "a", 1, 1);
        let b = Snippet::new("x", "a", 1, 1);
        assert_ne!(a.id, b.id);
    }
}
