//! Web search seam and the Brave Search client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::WebSearchConfig;
use crate::error::TransportError;
use crate::http;

const SERVICE: &str = "Brave Search";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
}

#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    /// Ranked results for `query`.
    async fn search(&self, query: &str) -> Result<Vec<WebResult>, TransportError>;
}

pub struct BraveClient {
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl BraveClient {
    pub fn new(config: &WebSearchConfig, api_key: String) -> Self {
        Self {
            url: config.url.clone(),
            api_key,
            client: http::client(config.timeout_secs),
        }
    }
}

#[async_trait]
impl WebSearchProvider for BraveClient {
    async fn search(&self, query: &str) -> Result<Vec<WebResult>, TransportError> {
        let request = self
            .client
            .get(&self.url)
            .query(&[("q", query)])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key);
        let json = http::send_once(SERVICE, request).await?;
        parse_results(&json)
    }
}

fn parse_results(json: &Value) -> Result<Vec<WebResult>, TransportError> {
    let Some(results) = json.pointer("/web/results") else {
        return Ok(Vec::new());
    };
    serde_json::from_value(results.clone()).map_err(|e| TransportError::invalid(SERVICE, e.to_string()))
}
