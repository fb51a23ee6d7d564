//! In-memory [`VectorStore`] for tests and throwaway sessions.
//!
//! Snippets live in a `Vec` behind a tokio `RwLock`. Search is brute-force
//! cosine similarity over everything stored.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::embedding::cosine_similarity;
use crate::error::StoreError;
use crate::models::{Embedding, Snippet};

use super::{check_dims, validate_batch, VectorStore};

pub struct InMemoryStore {
    dims: usize,
    snippets: RwLock<Vec<Snippet>>,
}

impl InMemoryStore {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            snippets: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored snippets.
    pub async fn len(&self) -> usize {
        self.snippets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snippets.read().await.is_empty()
    }

    /// Copy of every stored snippet, in insertion order.
    pub async fn all(&self) -> Vec<Snippet> {
        self.snippets.read().await.clone()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, snippets: &[Snippet]) -> Result<(), StoreError> {
        validate_batch(self.dims, snippets)?;
        let mut stored = self.snippets.write().await;
        for snippet in snippets {
            match stored.iter_mut().find(|s| s.id == snippet.id) {
                Some(existing) => *existing = snippet.clone(),
                None => stored.push(snippet.clone()),
            }
        }
        Ok(())
    }

    async fn query(&self, embedding: &Embedding, k: usize) -> Result<Vec<Snippet>, StoreError> {
        check_dims(self.dims, embedding)?;
        let stored = self.snippets.read().await;

        let mut scored: Vec<(f32, &Snippet)> = stored
            .iter()
            .filter_map(|s| {
                s.embedding
                    .as_ref()
                    .map(|e| (cosine_similarity(embedding.as_slice(), e.as_slice()), s))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, s)| s.clone())
            .collect())
    }
}
