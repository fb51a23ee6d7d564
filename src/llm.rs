//! Conversation types and the LLM provider seam.
//!
//! [`ContentBlock`] is a closed enum that doubles as the Anthropic Messages
//! wire format, so the orchestrator never switches on raw type strings.
//! [`AnthropicClient`] is the production [`LlmProvider`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::LlmConfig;
use crate::error::TransportError;
use crate::http;

const SERVICE: &str = "Anthropic";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Tool calls in the order the model emitted them.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Text blocks, in order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Append-only message history for one session.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// What the model sees of a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Produce the next assistant turn for `messages`, offering `tools`.
    async fn infer(&self, messages: &[Message], tools: &[ToolSpec])
        -> Result<Message, TransportError>;
}

/// Anthropic Messages API client (`POST /v1/messages`).
pub struct AnthropicClient {
    model: String,
    max_tokens: u32,
    base_url: String,
    system_prompt: Option<String>,
    max_retries: u32,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(config: &LlmConfig, api_key: String) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            system_prompt: config.system_prompt.clone(),
            max_retries: config.max_retries,
            api_key,
            client: http::client(config.timeout_secs),
        }
    }

    fn request_body(&self, messages: &[Message], tools: &[ToolSpec]) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::json!(tools);
        }
        if let Some(system) = &self.system_prompt {
            body["system"] = Value::String(system.clone());
        }
        body
    }
}

#[async_trait]
impl LlmProvider for AnthropicClient {
    async fn infer(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Message, TransportError> {
        let body = self.request_body(messages, tools);
        let url = format!("{}/v1/messages", self.base_url);
        let json = http::send_with_retry(SERVICE, self.max_retries, || {
            self.client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&body)
        })
        .await?;
        parse_response(&json)
    }
}

/// Convert a Messages API response into an assistant [`Message`]. Block
/// types this client does not model (e.g. `thinking`) are skipped.
fn parse_response(json: &Value) -> Result<Message, TransportError> {
    let blocks = json
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| TransportError::invalid(SERVICE, "missing content array"))?;

    let mut content = Vec::with_capacity(blocks.len());
    for block in blocks {
        match serde_json::from_value::<ContentBlock>(block.clone()) {
            Ok(parsed) => content.push(parsed),
            Err(e) => {
                let kind = block.get("type").and_then(Value::as_str).unwrap_or("?");
                tracing::debug!(kind, error = %e, "skipping unsupported content block");
            }
        }
    }

    Ok(Message {
        role: Role::Assistant,
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_blocks_use_tagged_wire_format() {
        let message = Message {
            role: Role::User,
            content: vec![ContentBlock::ToolResult {
                tool_use_id: "toolu_1".into(),
                content: "ok".into(),
                is_error: false,
            }],
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "role": "user",
                "content": [{ "type": "tool_result", "tool_use_id": "toolu_1", "content": "ok" }]
            })
        );
    }

    #[test]
    fn parses_text_and_tool_use() {
        let response = json!({
            "role": "assistant",
            "content": [
                { "type": "thinking", "thinking": "hmm" },
                { "type": "text", "text": "Let me look." },
                { "type": "tool_use", "id": "toolu_1", "name": "read_file", "input": { "path": "main.go" } }
            ],
            "stop_reason": "tool_use"
        });
        let message = parse_response(&response).unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.texts().collect::<Vec<_>>(), vec!["Let me look."]);
        let calls = message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
        assert_eq!(calls[0].input["path"], "main.go");
    }

    #[test]
    fn missing_content_is_invalid() {
        assert!(parse_response(&json!({ "type": "error" })).is_err());
    }

    #[test]
    fn request_body_includes_tools_and_system() {
        let config = LlmConfig {
            system_prompt: Some("be brief".into()),
            ..LlmConfig::default()
        };
        let client = AnthropicClient::new(&config, "key".into());
        let tools = vec![ToolSpec {
            name: "read_file".into(),
            description: "Read a file".into(),
            input_schema: json!({ "type": "object" }),
        }];
        let body = client.request_body(&[Message::user_text("hi")], &tools);
        assert_eq!(body["model"], "claude-3-7-sonnet-latest");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["tools"][0]["name"], "read_file");
        assert_eq!(body["messages"][0]["content"][0]["text"], "hi");
    }
}
