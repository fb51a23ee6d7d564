//! Indexing and vector-tool scenarios over real stores.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use code_agent::config::{IndexingConfig, ToolsConfig, VectorStoreConfig};
use code_agent::embedding::EmbeddingProvider;
use code_agent::error::TransportError;
use code_agent::index::Indexer;
use code_agent::models::Embedding;
use code_agent::sandbox::Sandbox;
use code_agent::tools::{ToolDeps, ToolRegistry, VectorBackend};
use code_agent::vector_store::{InMemoryStore, QdrantStore, SqliteStore, VectorStore};
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Deterministic 3-d embedding from byte statistics.
struct HashEmbedder;

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, TransportError> {
        Ok(texts
            .iter()
            .map(|t| {
                let sum: u32 = t.bytes().map(u32::from).sum();
                Embedding::new(vec![t.len() as f32, (sum % 97) as f32 + 1.0, 1.0]).unwrap()
            })
            .collect())
    }
}

const SERVER_GO: &str = r#"package server

import "net/http"

type Server struct {
	mux *http.ServeMux
}

func NewServer() *Server {
	return &Server{mux: http.NewServeMux()}
}

func (s *Server) Start(addr string) error {
	return http.ListenAndServe(addr, s.mux)
}
"#;

#[tokio::test]
async fn go_file_yields_one_snippet_per_declaration() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir(tmp.path().join("server")).unwrap();
    std::fs::write(tmp.path().join("server/server.go"), SERVER_GO).unwrap();

    let store = Arc::new(InMemoryStore::new(3));
    let indexer = Indexer::new(Arc::new(HashEmbedder), store.clone(), IndexingConfig::default());
    let report = indexer
        .index_directory(tmp.path(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.files_seen, 1);
    assert_eq!(report.snippets, 2);
    assert_eq!(report.batches, 1);
    assert!(report.skipped.is_empty());

    let mut stored = store.all().await;
    stored.sort_by_key(|s| s.start_line);
    assert_eq!(stored.len(), 2);

    assert_eq!(stored[0].file_path, "server/server.go");
    assert_eq!(stored[0].symbols, vec!["NewServer"]);
    assert_eq!((stored[0].start_line, stored[0].end_line), (9, 11));
    assert!(stored[0].content.starts_with("func NewServer() *Server {"));

    assert_eq!(stored[1].symbols, vec!["Server.Start"]);
    assert_eq!((stored[1].start_line, stored[1].end_line), (13, 15));
    assert!(stored[1].content.ends_with('}'));
    for snippet in &stored {
        let embedding = snippet.embedding.as_ref().expect("snippet was embedded");
        assert_eq!(embedding.dims(), 3);
    }
}

#[tokio::test]
async fn sqlite_store_persists_an_indexed_workspace() {
    let tmp = TempDir::new().unwrap();
    let workspace = tmp.path().join("ws");
    std::fs::create_dir(&workspace).unwrap();
    std::fs::write(workspace.join("server.go"), SERVER_GO).unwrap();
    std::fs::write(workspace.join("README.md"), "# Server\n\nRuns the HTTP mux.\n").unwrap();

    let db = tmp.path().join("data/vectors.sqlite");
    let store = Arc::new(SqliteStore::open(&db, 3).await.unwrap());
    let indexer = Indexer::new(
        Arc::new(HashEmbedder),
        store.clone(),
        IndexingConfig {
            batch_size: 1,
            ..IndexingConfig::default()
        },
    );
    let report = indexer
        .index_directory(&workspace, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.snippets, 3);
    assert_eq!(report.batches, 3);

    let reopened = SqliteStore::open(&db, 3).await.unwrap();
    let probe = HashEmbedder
        .embed(&["anything".to_string()])
        .await
        .unwrap()
        .remove(0);
    let hits = reopened.query(&probe, 10).await.unwrap();
    assert_eq!(hits.len(), 3);
    let readme = hits.iter().find(|s| s.file_path == "README.md").unwrap();
    assert_eq!(readme.metadata["file_type"], "md");
}

fn unreachable_qdrant() -> Arc<dyn VectorStore> {
    let config = VectorStoreConfig {
        url: "http://127.0.0.1:9".to_string(),
        timeout_secs: 2,
        ..VectorStoreConfig::default()
    };
    Arc::new(QdrantStore::new(&config, 3, None))
}

fn vector_tools(tmp: &TempDir, store: Arc<dyn VectorStore>) -> ToolRegistry {
    ToolRegistry::with_builtins(ToolDeps {
        sandbox: Sandbox::new(tmp.path()).unwrap(),
        web: None,
        vector: Some(VectorBackend {
            embedder: Arc::new(HashEmbedder),
            store,
        }),
        config: ToolsConfig::default(),
    })
}

#[tokio::test]
async fn upsert_to_unreachable_store_falls_back_to_a_file() {
    let tmp = TempDir::new().unwrap();
    let tools = vector_tools(&tmp, unreachable_qdrant());

    let result = tools
        .execute(
            "toolu_1",
            "vector_upsert",
            &json!({
                "text_content": "The deploy script lives in scripts/deploy.sh",
                "metadata": { "source": "chat" }
            }),
        )
        .await;
    assert!(!result.is_error, "unexpected error: {}", result.content);

    let files: Vec<_> = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("vector_store_fallback_") && name.ends_with(".txt"));
    assert!(result.content.contains(&name));
    assert_eq!(
        std::fs::read_to_string(&files[0]).unwrap(),
        "The deploy script lives in scripts/deploy.sh\n\n--- Metadata ---\nsource: chat\n"
    );

    let found = tools
        .execute("toolu_2", "vector_search", &json!({ "query": "deploy script" }))
        .await;
    assert!(!found.is_error);
    let hits: Vec<serde_json::Value> = serde_json::from_str(&found.content).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["filename"], json!(name));
    assert_eq!(
        hits[0]["matched_line"],
        json!("The deploy script lives in scripts/deploy.sh")
    );
}

#[tokio::test]
async fn upsert_succeeds_against_a_live_store() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(InMemoryStore::new(3));
    let tools = vector_tools(&tmp, store.clone());

    let mut metadata = BTreeMap::new();
    metadata.insert("topic".to_string(), "ops".to_string());
    let result = tools
        .execute(
            "toolu_1",
            "vector_upsert",
            &json!({ "text_content": "restart with systemctl", "metadata": metadata }),
        )
        .await;
    assert!(!result.is_error);
    let stored = store.all().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(
        result.content,
        format!("Successfully upserted content with ID: {}", stored[0].id)
    );
    assert_eq!(stored[0].metadata, metadata);
}
