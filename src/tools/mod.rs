//! Tool catalog and dispatch.
//!
//! Every tool implements [`Tool`] and is keyed by a closed [`ToolName`].
//! The [`ToolRegistry`] is assembled once at startup by
//! [`ToolRegistry::with_builtins`]; optional tools are registered only when
//! their collaborators exist. After that it is shared read-only.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                    ToolRegistry                       │
//! │  ┌────────────┐  ┌────────────┐  ┌──────────────────┐ │
//! │  │ Filesystem │  │    Web     │  │     Vector       │ │
//! │  │ read/list  │  │ search_web │  │ vector_search    │ │
//! │  │ edit/create│  │ (optional) │  │ vector_upsert    │ │
//! │  └────────────┘  └────────────┘  │ (optional)       │ │
//! │                                  └──────────────────┘ │
//! └──────────────────────────┬────────────────────────────┘
//!                            ▼
//!            execute(id, name, input) → ToolResult
//! ```
//!
//! Dispatch never fails: an unknown name or a tool error becomes an
//! error-flagged [`ToolResult`] that is fed back to the model.

pub mod fs;
pub mod vector;
pub mod web;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ToolsConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::ToolError;
use crate::fallback::FallbackStore;
use crate::llm::{ContentBlock, ToolSpec};
use crate::sandbox::Sandbox;
use crate::vector_store::VectorStore;
use crate::web_search::WebSearchProvider;

/// The fixed set of tools the agent can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    ReadFile,
    ListFiles,
    EditFile,
    CreateFile,
    SearchWeb,
    VectorSearch,
    VectorUpsert,
}

impl ToolName {
    pub const ALL: [ToolName; 7] = [
        ToolName::ReadFile,
        ToolName::ListFiles,
        ToolName::EditFile,
        ToolName::CreateFile,
        ToolName::SearchWeb,
        ToolName::VectorSearch,
        ToolName::VectorUpsert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::ReadFile => "read_file",
            ToolName::ListFiles => "list_files",
            ToolName::EditFile => "edit_file",
            ToolName::CreateFile => "create_file",
            ToolName::SearchWeb => "search_web",
            ToolName::VectorSearch => "vector_search",
            ToolName::VectorUpsert => "vector_upsert",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTool(pub String);

impl fmt::Display for UnknownTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tool '{}'", self.0)
    }
}

impl std::error::Error for UnknownTool {}

impl FromStr for ToolName {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownTool(s.to_string()))
    }
}

/// A tool the model can call.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    /// One-line description the model uses to decide whether to call it.
    fn description(&self) -> &str;

    /// JSON Schema for the input object.
    fn parameters_schema(&self) -> Value;

    /// Run the tool on raw JSON input and return its text output.
    async fn execute(&self, params: Value) -> Result<String, ToolError>;
}

/// Outcome of one dispatched call, ready to be sent back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

impl From<ToolResult> for ContentBlock {
    fn from(result: ToolResult) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: result.tool_use_id,
            content: result.content,
            is_error: result.is_error,
        }
    }
}

/// Collaborators for the vector tools. Both must be available.
#[derive(Clone)]
pub struct VectorBackend {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub store: Arc<dyn VectorStore>,
}

/// Everything [`ToolRegistry::with_builtins`] needs.
pub struct ToolDeps {
    pub sandbox: Sandbox,
    pub web: Option<Arc<dyn WebSearchProvider>>,
    pub vector: Option<VectorBackend>,
    pub config: ToolsConfig,
}

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty tool registry.
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// The file tools always; `search_web` and the vector tools when their
    /// collaborators are present.
    pub fn with_builtins(deps: ToolDeps) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(fs::ReadFileTool::new(deps.sandbox.clone())));
        registry.register(Box::new(fs::ListFilesTool::new(deps.sandbox.clone())));
        registry.register(Box::new(fs::EditFileTool::new(deps.sandbox.clone())));
        registry.register(Box::new(fs::CreateFileTool::new(deps.sandbox.clone())));

        match deps.web {
            Some(provider) => registry.register(Box::new(web::SearchWebTool::new(provider))),
            None => tracing::info!("web search not configured, search_web disabled"),
        }

        match deps.vector {
            Some(backend) => {
                let fallback = FallbackStore::new(deps.sandbox, deps.config.fallback_results);
                let shared = Arc::new(vector::VectorTools::new(backend, fallback, &deps.config));
                registry.register(Box::new(vector::VectorSearchTool::new(shared.clone())));
                registry.register(Box::new(vector::VectorUpsertTool::new(shared)));
            }
            None => tracing::info!("embeddings or vector store unavailable, vector tools disabled"),
        }

        registry
    }

    /// Register a tool, replacing any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            tracing::warn!(tool = %tool.name(), "replacing registered tool");
            *existing = tool;
        } else {
            self.tools.push(tool);
        }
    }

    pub fn find(&self, name: ToolName) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn names(&self) -> Vec<ToolName> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// The catalog sent with every inference call.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name().as_str().to_string(),
                description: t.description().to_string(),
                input_schema: t.parameters_schema(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Run the named tool. Never fails; problems come back error-flagged.
    pub async fn execute(&self, id: &str, name: &str, input: &Value) -> ToolResult {
        tracing::info!(tool = name, input = %input, "executing tool");

        let tool = name.parse::<ToolName>().ok().and_then(|n| self.find(n));
        let Some(tool) = tool else {
            tracing::warn!(tool = name, "model requested an unavailable tool");
            return ToolResult::error(id, "tool not found");
        };

        match tool.execute(input.clone()).await {
            Ok(output) => ToolResult::success(id, output),
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool failed");
                ToolResult::error(id, format!("Error executing tool '{}': {}", name, e))
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a tool's input object. A `null` input is treated as `{}` so
/// tools with all-optional fields accept an empty call.
pub(crate) fn parse_input<T: serde::de::DeserializeOwned>(
    tool: ToolName,
    params: Value,
) -> Result<T, ToolError> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params)
        .map_err(|e| ToolError::validation(format!("invalid input format for {}: {}", tool, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(tmp: &TempDir) -> ToolRegistry {
        ToolRegistry::with_builtins(ToolDeps {
            sandbox: Sandbox::new(tmp.path()).unwrap(),
            web: None,
            vector: None,
            config: ToolsConfig::default(),
        })
    }

    #[test]
    fn names_round_trip_through_strings() {
        for name in ToolName::ALL {
            assert_eq!(name.as_str().parse::<ToolName>(), Ok(name));
        }
        assert!("delete_everything".parse::<ToolName>().is_err());
    }

    #[test]
    fn optional_tools_absent_without_collaborators() {
        let tmp = TempDir::new().unwrap();
        let registry = registry(&tmp);
        assert_eq!(
            registry.names(),
            vec![
                ToolName::ReadFile,
                ToolName::ListFiles,
                ToolName::EditFile,
                ToolName::CreateFile
            ]
        );
        let specs = registry.specs();
        assert_eq!(specs[0].name, "read_file");
        assert_eq!(specs[0].input_schema["type"], "object");
    }

    #[tokio::test]
    async fn unknown_tool_is_error_flagged() {
        let tmp = TempDir::new().unwrap();
        let result = registry(&tmp)
            .execute("toolu_1", "rm_rf", &serde_json::json!({}))
            .await;
        assert!(result.is_error);
        assert_eq!(result.content, "tool not found");
        assert_eq!(result.tool_use_id, "toolu_1");
    }

    #[tokio::test]
    async fn registered_but_unavailable_tool_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let result = registry(&tmp)
            .execute("toolu_2", "vector_search", &serde_json::json!({ "query": "x" }))
            .await;
        assert!(result.is_error);
        assert_eq!(result.content, "tool not found");
    }

    #[tokio::test]
    async fn tool_errors_are_wrapped_with_the_tool_name() {
        let tmp = TempDir::new().unwrap();
        let result = registry(&tmp)
            .execute("toolu_3", "read_file", &serde_json::json!({ "path": "../secret" }))
            .await;
        assert!(result.is_error);
        assert!(result.content.starts_with("Error executing tool 'read_file': "));
        assert!(result.content.contains("outside the workspace"));
    }

    #[test]
    fn tool_result_becomes_content_block() {
        let block: ContentBlock = ToolResult::error("t1", "boom").into();
        assert_eq!(
            block,
            ContentBlock::ToolResult {
                tool_use_id: "t1".into(),
                content: "boom".into(),
                is_error: true
            }
        );
    }
}
