//! Prompt augmentation from the vector store.
//!
//! [`ContextRetriever::retrieve`] embeds the user's query, fetches the most
//! similar snippets, and formats them as fenced blocks under a character
//! budget. Every failure degrades to an empty string.

use std::sync::Arc;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::models::Snippet;
use crate::vector_store::VectorStore;

pub const CONTEXT_HEADER: &str = "Relevant code snippets based on your query:\n\n";
pub const OMISSION_MARKER: &str = "... (omitting further snippets due to length limit)\n";

pub struct ContextRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
    budget: usize,
}

impl ContextRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        top_k: usize,
        budget: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            top_k,
            budget,
        }
    }

    /// Formatted context for `query`, or an empty string.
    pub async fn retrieve(&self, query: &str) -> String {
        let embedding = match embed_query(self.embedder.as_ref(), query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(error = %e, "failed to embed query, continuing without context");
                return String::new();
            }
        };

        let snippets = match self.store.query(&embedding, self.top_k).await {
            Ok(snippets) => snippets,
            Err(e) => {
                tracing::warn!(error = %e, "failed to query vector store, continuing without context");
                return String::new();
            }
        };
        tracing::info!(count = snippets.len(), "retrieved snippets from vector store");

        format_snippets(&snippets, self.budget)
    }
}

/// Render snippets in rank order. The result, marker included, never
/// exceeds `budget` characters provided the budget can hold the header and
/// marker.
pub fn format_snippets(snippets: &[Snippet], budget: usize) -> String {
    if snippets.is_empty() {
        return String::new();
    }

    let mut out = String::from(CONTEXT_HEADER);
    let mut used = CONTEXT_HEADER.chars().count();
    let limit = budget.saturating_sub(OMISSION_MARKER.chars().count());

    for snippet in snippets {
        let frame = format!(
            "--- File: {} (Lines: {}-{}) ---\n```{}\n{}\n```\n\n",
            snippet.file_path,
            snippet.start_line,
            snippet.end_line,
            fence_language(&snippet.file_path),
            snippet.content
        );
        let len = frame.chars().count();
        if used + len > limit {
            out.push_str(OMISSION_MARKER);
            break;
        }
        out.push_str(&frame);
        used += len;
    }
    out
}

fn fence_language(file_path: &str) -> &str {
    std::path::Path::new(file_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
}

/// The user turn sent to the model. Empty context leaves the input untouched.
pub fn inject_context(context: &str, input: &str) -> String {
    if context.is_empty() {
        input.to_string()
    } else {
        format!("{}\n\nUser Query:\n{}", context, input)
    }
}
