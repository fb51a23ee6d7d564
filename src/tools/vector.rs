//! `vector_search` and `vector_upsert`.
//!
//! Both tools talk to the embedding provider and vector store under
//! per-call timeouts. Any failure along the way (or an empty search result)
//! degrades to the [`FallbackStore`] so the model still gets an answer
//! instead of an error.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ToolsConfig;
use crate::embedding::embed_query;
use crate::error::{StoreError, ToolError, TransportError};
use crate::fallback::FallbackStore;
use crate::models::Snippet;

use super::{parse_input, Tool, ToolName, VectorBackend};

/// State shared by both vector tools.
pub struct VectorTools {
    backend: VectorBackend,
    fallback: FallbackStore,
    embed_timeout: Duration,
    upsert_timeout: Duration,
    query_timeout: Duration,
    default_k: usize,
}

impl VectorTools {
    pub fn new(backend: VectorBackend, fallback: FallbackStore, config: &ToolsConfig) -> Self {
        Self {
            backend,
            fallback,
            embed_timeout: Duration::from_secs(config.embed_timeout_secs),
            upsert_timeout: Duration::from_secs(config.upsert_timeout_secs),
            query_timeout: Duration::from_secs(config.query_timeout_secs),
            default_k: config.default_k,
        }
    }

    async fn search(&self, query: &str, k: usize) -> Result<String, ToolError> {
        match self.query_store(query, k).await {
            Ok(results) if !results.is_empty() => Ok(serde_json::to_string_pretty(&results)?),
            Ok(_) => {
                tracing::info!("no results in vector store, falling back to file search");
                self.fallback.search(query)?.render()
            }
            Err(e) => {
                tracing::warn!(error = %e, "vector search failed, falling back to file search");
                self.fallback.search(query)?.render()
            }
        }
    }

    async fn query_store(&self, query: &str, k: usize) -> Result<Vec<Snippet>, StoreError> {
        let embedding = with_timeout(
            "embeddings",
            self.embed_timeout,
            embed_query(self.backend.embedder.as_ref(), query),
        )
        .await?;
        match tokio::time::timeout(self.query_timeout, self.backend.store.query(&embedding, k)).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error(self.backend.store.backend(), self.query_timeout).into()),
        }
    }

    async fn upsert(
        &self,
        text: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<String, ToolError> {
        match self.upsert_store(text, metadata.clone()).await {
            Ok(id) => Ok(format!("Successfully upserted content with ID: {}", id)),
            Err(e) => {
                tracing::warn!(error = %e, "vector upsert failed, falling back to file storage");
                let filename = self.fallback.store(text, &metadata)?;
                Ok(format!(
                    "Vector store unavailable, content saved to fallback file '{}'",
                    filename
                ))
            }
        }
    }

    async fn upsert_store(
        &self,
        text: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<String, StoreError> {
        let embedding = with_timeout(
            "embeddings",
            self.embed_timeout,
            embed_query(self.backend.embedder.as_ref(), text),
        )
        .await?;
        tracing::debug!(dims = embedding.dims(), "generated embedding for upsert");

        let mut snippet = Snippet::new(text, "", 0, 0);
        snippet.metadata = metadata;
        snippet.embedding = Some(embedding);
        let id = snippet.id.clone();

        let store = &self.backend.store;
        match tokio::time::timeout(self.upsert_timeout, store.upsert(std::slice::from_ref(&snippet))).await {
            Ok(result) => result?,
            Err(_) => return Err(timeout_error(store.backend(), self.upsert_timeout).into()),
        }
        Ok(id)
    }
}

fn timeout_error(service: &'static str, limit: Duration) -> TransportError {
    TransportError::Timeout {
        service,
        secs: limit.as_secs(),
    }
}

async fn with_timeout<T>(
    service: &'static str,
    limit: Duration,
    call: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(timeout_error(service, limit)))
}

// ============ vector_search ============

pub struct VectorSearchTool {
    shared: Arc<VectorTools>,
}

impl VectorSearchTool {
    pub fn new(shared: Arc<VectorTools>) -> Self {
        Self { shared }
    }
}

#[derive(Deserialize)]
struct VectorSearchInput {
    #[serde(default)]
    query: String,
    #[serde(default)]
    k: i64,
}

#[async_trait]
impl Tool for VectorSearchTool {
    fn name(&self) -> ToolName {
        ToolName::VectorSearch
    }

    fn description(&self) -> &str {
        "Searches for relevant information in the vector store (long-term memory or indexed code) \
         using a query string."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The text to search for." },
                "k": { "type": "integer", "description": "Number of results to return (default 5)." }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String, ToolError> {
        let input: VectorSearchInput = parse_input(self.name(), params)?;
        if input.query.is_empty() {
            return Err(ToolError::validation("query is required for vector_search"));
        }
        let k = if input.k <= 0 {
            self.shared.default_k
        } else {
            input.k as usize
        };
        self.shared.search(&input.query, k).await
    }
}

// ============ vector_upsert ============

pub struct VectorUpsertTool {
    shared: Arc<VectorTools>,
}

impl VectorUpsertTool {
    pub fn new(shared: Arc<VectorTools>) -> Self {
        Self { shared }
    }
}

#[derive(Deserialize)]
struct VectorUpsertInput {
    #[serde(default)]
    text_content: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[async_trait]
impl Tool for VectorUpsertTool {
    fn name(&self) -> ToolName {
        ToolName::VectorUpsert
    }

    fn description(&self) -> &str {
        "Stores text content in the vector store for later retrieval. Attach optional string \
         metadata to describe it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text_content": { "type": "string", "description": "The text to store." },
                "metadata": {
                    "type": "object",
                    "description": "Optional string key/value pairs stored with the text.",
                    "additionalProperties": { "type": "string" }
                }
            },
            "required": ["text_content"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String, ToolError> {
        let input: VectorUpsertInput = parse_input(self.name(), params)?;
        if input.text_content.is_empty() {
            return Err(ToolError::validation(
                "text_content is required for vector_upsert",
            ));
        }
        self.shared.upsert(&input.text_content, input.metadata).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingProvider;
    use crate::models::Embedding;
    use crate::sandbox::Sandbox;
    use crate::vector_store::{InMemoryStore, VectorStore};
    use tempfile::TempDir;

    struct ConstantEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ConstantEmbedder {
        fn model_name(&self) -> &str {
            "constant"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, TransportError> {
            Ok(texts
                .iter()
                .map(|_| Embedding::new(vec![1.0, 0.0]).unwrap())
                .collect())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl VectorStore for BrokenStore {
        fn backend(&self) -> &'static str {
            "broken"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn upsert(&self, _: &[Snippet]) -> Result<(), StoreError> {
            Err(TransportError::network("broken", "connection refused").into())
        }
        async fn query(&self, _: &Embedding, _: usize) -> Result<Vec<Snippet>, StoreError> {
            Err(TransportError::network("broken", "connection refused").into())
        }
    }

    fn tools(tmp: &TempDir, store: Arc<dyn VectorStore>) -> Arc<VectorTools> {
        let sandbox = Sandbox::new(tmp.path()).unwrap();
        let backend = VectorBackend {
            embedder: Arc::new(ConstantEmbedder),
            store,
        };
        Arc::new(VectorTools::new(
            backend,
            FallbackStore::new(sandbox, 5),
            &ToolsConfig::default(),
        ))
    }

    fn fallback_files(tmp: &TempDir) -> Vec<std::path::PathBuf> {
        std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .unwrap()
                    .to_string_lossy()
                    .starts_with("vector_store_fallback_")
            })
            .collect()
    }

    #[tokio::test]
    async fn upsert_then_search_round_trips_through_store() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStore::new(2));
        let shared = tools(&tmp, store.clone());

        let out = VectorUpsertTool::new(shared.clone())
            .execute(json!({ "text_content": "retry with backoff", "metadata": { "topic": "http" } }))
            .await
            .unwrap();
        assert!(out.starts_with("Successfully upserted content with ID: "));

        let stored = store.all().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].file_path, "");
        assert_eq!((stored[0].start_line, stored[0].end_line), (0, 0));
        assert_eq!(stored[0].metadata["topic"], "http");
        assert!(out.ends_with(&stored[0].id));

        let found = VectorSearchTool::new(shared)
            .execute(json!({ "query": "backoff" }))
            .await
            .unwrap();
        assert!(found.contains("retry with backoff"));
        assert!(fallback_files(&tmp).is_empty());
    }

    #[tokio::test]
    async fn upsert_falls_back_to_file_when_store_fails() {
        let tmp = TempDir::new().unwrap();
        let shared = tools(&tmp, Arc::new(BrokenStore));

        let out = VectorUpsertTool::new(shared)
            .execute(json!({ "text_content": "remember this", "metadata": { "k": "v" } }))
            .await
            .unwrap();
        assert!(out.contains("fallback file"));

        let files = fallback_files(&tmp);
        assert_eq!(files.len(), 1);
        assert_eq!(
            std::fs::read_to_string(&files[0]).unwrap(),
            "remember this\n\n--- Metadata ---\nk: v\n"
        );
    }

    #[tokio::test]
    async fn search_falls_back_to_file_scan() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("vector_store_fallback_1.txt"),
            "the cache is warm",
        )
        .unwrap();
        let shared = tools(&tmp, Arc::new(BrokenStore));

        let out = VectorSearchTool::new(shared)
            .execute(json!({ "query": "cache", "k": 0 }))
            .await
            .unwrap();
        assert!(out.contains("vector_store_fallback_1.txt"));
        assert!(out.contains("\"relevance\": 1"));
    }

    #[tokio::test]
    async fn empty_store_result_uses_fallback() {
        let tmp = TempDir::new().unwrap();
        let shared = tools(&tmp, Arc::new(InMemoryStore::new(2)));
        let out = VectorSearchTool::new(shared)
            .execute(json!({ "query": "anything" }))
            .await
            .unwrap();
        assert_eq!(out, "No fallback files found. No search results available.");
    }

    #[tokio::test]
    async fn required_inputs_are_validated() {
        let tmp = TempDir::new().unwrap();
        let shared = tools(&tmp, Arc::new(InMemoryStore::new(2)));
        let err = VectorSearchTool::new(shared.clone())
            .execute(json!({ "k": 3 }))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "query is required for vector_search");
        let err = VectorUpsertTool::new(shared)
            .execute(json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "text_content is required for vector_upsert");
    }
}
