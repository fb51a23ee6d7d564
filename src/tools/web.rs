//! `search_web`: forwards a query to the configured web search provider.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::web_search::WebSearchProvider;

use super::{parse_input, Tool, ToolName};

pub struct SearchWebTool {
    provider: Arc<dyn WebSearchProvider>,
}

impl SearchWebTool {
    pub fn new(provider: Arc<dyn WebSearchProvider>) -> Self {
        Self { provider }
    }
}

#[derive(Deserialize)]
struct SearchWebInput {
    #[serde(default)]
    query: String,
}

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> ToolName {
        ToolName::SearchWeb
    }

    fn description(&self) -> &str {
        "Search the web for current information, documentation, or anything outside the workspace."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The search query." }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String, ToolError> {
        let input: SearchWebInput = parse_input(self.name(), params)?;
        if input.query.trim().is_empty() {
            return Err(ToolError::validation("query is required for search_web"));
        }
        let results = self.provider.search(&input.query).await?;
        tracing::debug!(query = %input.query, results = results.len(), "web search finished");
        Ok(serde_json::to_string_pretty(&results)?)
    }
}
