//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait is the only storage surface the indexer,
//! retriever, and vector tools see. Backends:
//! - **[`QdrantStore`]**: Qdrant over its REST API.
//! - **[`SqliteStore`]**: local SQLite file with brute-force cosine search.
//! - **[`InMemoryStore`]**: process-local, for tests and throwaway sessions.
//!
//! Every backend has a fixed dimensionality. Upserting a snippet without an
//! embedding, or with one of the wrong length, fails with a [`StoreError`]
//! before anything is written.

pub mod memory;
pub mod qdrant;
pub mod sqlite;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{Secrets, VectorStoreConfig};
use crate::error::StoreError;
use crate::models::{Embedding, Snippet};

pub use memory::InMemoryStore;
pub use qdrant::QdrantStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Dimensionality every stored embedding must have.
    fn dims(&self) -> usize;

    /// Insert or replace snippets by id. All snippets must carry embeddings.
    async fn upsert(&self, snippets: &[Snippet]) -> Result<(), StoreError>;

    /// Up to `k` snippets ranked by decreasing similarity to `embedding`.
    async fn query(&self, embedding: &Embedding, k: usize) -> Result<Vec<Snippet>, StoreError>;
}

/// Reject an embedding whose length differs from `expected`.
pub fn check_dims(expected: usize, embedding: &Embedding) -> Result<(), StoreError> {
    if embedding.dims() != expected {
        return Err(StoreError::DimensionMismatch {
            expected,
            actual: embedding.dims(),
        });
    }
    Ok(())
}

/// The snippet's embedding, validated against `expected`.
pub fn require_embedding(expected: usize, snippet: &Snippet) -> Result<&Embedding, StoreError> {
    let embedding = snippet
        .embedding
        .as_ref()
        .ok_or_else(|| StoreError::MissingEmbedding {
            id: snippet.id.clone(),
        })?;
    check_dims(expected, embedding)?;
    Ok(embedding)
}

/// Validate a whole batch up front so a bad snippet never causes a partial write.
pub fn validate_batch(expected: usize, snippets: &[Snippet]) -> Result<(), StoreError> {
    for snippet in snippets {
        require_embedding(expected, snippet)?;
    }
    Ok(())
}

/// Create the configured backend. `disabled` yields `None`.
pub async fn create_store(
    config: &VectorStoreConfig,
    dims: usize,
    secrets: &Secrets,
) -> Result<Option<Arc<dyn VectorStore>>> {
    let store: Arc<dyn VectorStore> = match config.backend.as_str() {
        "disabled" => return Ok(None),
        "memory" => Arc::new(InMemoryStore::new(dims)),
        "sqlite" => Arc::new(SqliteStore::open(&config.path, dims).await?),
        "qdrant" => {
            let store = QdrantStore::new(config, dims, secrets.qdrant_api_key.clone());
            store.ensure_collection().await?;
            Arc::new(store)
        }
        other => anyhow::bail!("Unknown vector store backend: {}", other),
    };
    tracing::info!(backend = store.backend(), dims, "vector store ready");
    Ok(Some(store))
}
