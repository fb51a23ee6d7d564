//! Qdrant [`VectorStore`] over the REST API.
//!
//! Points are keyed by the snippet UUID. The payload carries the snippet
//! fields (`content`, `file_path`, `start_line`, `end_line`, `symbols`) with
//! metadata entries flattened alongside them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::config::VectorStoreConfig;
use crate::error::{StoreError, TransportError};
use crate::http;
use crate::models::{Embedding, Snippet};

use super::{check_dims, require_embedding, validate_batch, VectorStore};

const SERVICE: &str = "Qdrant";
const RESERVED_KEYS: &[&str] = &["content", "file_path", "start_line", "end_line", "symbols"];

pub struct QdrantStore {
    url: String,
    collection: String,
    dims: usize,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl QdrantStore {
    pub fn new(config: &VectorStoreConfig, dims: usize, api_key: Option<String>) -> Self {
        Self {
            url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            dims,
            api_key,
            client: http::client(config.timeout_secs),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/collections/{}{}", self.url, self.collection, path));
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    /// Create the collection (cosine distance) if it does not exist, and
    /// verify its vector size otherwise.
    pub async fn ensure_collection(&self) -> Result<(), StoreError> {
        match http::send_once(SERVICE, self.request(reqwest::Method::GET, "")).await {
            Ok(info) => {
                let size = info
                    .pointer("/result/config/params/vectors/size")
                    .and_then(Value::as_u64);
                match size {
                    Some(size) if size as usize != self.dims => Err(StoreError::DimensionMismatch {
                        expected: self.dims,
                        actual: size as usize,
                    }),
                    _ => {
                        tracing::debug!(collection = %self.collection, "collection exists");
                        Ok(())
                    }
                }
            }
            Err(TransportError::Status { status: 404, .. }) => {
                tracing::info!(collection = %self.collection, dims = self.dims, "creating collection");
                let body = json!({ "vectors": { "size": self.dims, "distance": "Cosine" } });
                http::send_once(SERVICE, self.request(reqwest::Method::PUT, "").json(&body)).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn to_point(snippet: &Snippet, embedding: &Embedding) -> Value {
    let mut payload = Map::new();
    for (key, value) in &snippet.metadata {
        payload.insert(key.clone(), Value::String(value.clone()));
    }
    payload.insert("content".into(), json!(snippet.content));
    payload.insert("file_path".into(), json!(snippet.file_path));
    payload.insert("start_line".into(), json!(snippet.start_line));
    payload.insert("end_line".into(), json!(snippet.end_line));
    payload.insert("symbols".into(), json!(snippet.symbols));

    json!({
        "id": snippet.id,
        "vector": embedding.as_slice(),
        "payload": payload,
    })
}

fn from_point(point: &Value) -> Snippet {
    let id = match point.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let empty = Map::new();
    let payload = point
        .get("payload")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let text = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let line = |key: &str| payload.get(key).and_then(Value::as_u64).unwrap_or(0) as usize;

    let symbols = payload
        .get("symbols")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|s| s.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let metadata: BTreeMap<String, String> = payload
        .iter()
        .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect();

    Snippet {
        id,
        content: text("content"),
        file_path: text("file_path"),
        start_line: line("start_line"),
        end_line: line("end_line"),
        symbols,
        embedding: None,
        metadata,
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn backend(&self) -> &'static str {
        "qdrant"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, snippets: &[Snippet]) -> Result<(), StoreError> {
        if snippets.is_empty() {
            return Ok(());
        }
        validate_batch(self.dims, snippets)?;

        let points = snippets
            .iter()
            .map(|s| require_embedding(self.dims, s).map(|e| to_point(s, e)))
            .collect::<Result<Vec<_>, _>>()?;

        let body = json!({ "points": points });
        http::send_once(
            SERVICE,
            self.request(reqwest::Method::PUT, "/points?wait=true")
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn query(&self, embedding: &Embedding, k: usize) -> Result<Vec<Snippet>, StoreError> {
        check_dims(self.dims, embedding)?;
        let body = json!({
            "vector": embedding.as_slice(),
            "limit": k,
            "with_payload": true,
        });
        let response = http::send_once(
            SERVICE,
            self.request(reqwest::Method::POST, "/points/search")
                .json(&body),
        )
        .await?;

        let points = response
            .get("result")
            .and_then(Value::as_array)
            .ok_or_else(|| TransportError::invalid(SERVICE, "missing result array"))?;
        Ok(points.iter().map(from_point).collect())
    }
}
