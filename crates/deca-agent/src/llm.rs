//! The LLM collaborator interface.
//!
//! The concrete HTTP client lives outside the core; this module pins the
//! request/response shapes the gateway depends on: a system-block array
//! whose first element carries an ephemeral cache hint, tool definitions,
//! structured content blocks, and streaming text deltas followed by a final
//! message with usage counters.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use deca_core::types::{ContentBlock, Message};

#[derive(Debug, Clone, Serialize)]
pub struct CacheControl {
    #[serde(rename = "type")]
    pub kind: String,
}

/// One element of the system prompt array.
#[derive(Debug, Clone, Serialize)]
pub struct SystemBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl SystemBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
            cache_control: None,
        }
    }

    /// A block the provider may cache across turns.
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
            cache_control: Some(CacheControl {
                kind: "ephemeral".to_string(),
            }),
        }
    }
}

/// Tool definition sent to the LLM API.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: Vec<SystemBlock>,
    pub tools: Vec<ToolDefinition>,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
}

/// Token accounting for one model call, accumulated across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub input: u64,
    pub output: u64,
    pub cache_creation: u64,
    pub cache_read: u64,
}

impl Usage {
    pub fn accumulate(&mut self, other: &Usage) {
        self.input += other.input;
        self.output += other.output;
        self.cache_creation += other.cache_creation;
        self.cache_read += other.cache_read;
    }

    /// True when any prompt prefix was served from cache.
    pub fn cache_hit(&self) -> bool {
        self.cache_read > 0
    }
}

/// Terminal result of one model call.
#[derive(Debug, Clone)]
pub struct FinalMessage {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
    pub stop_reason: String,
}

impl FinalMessage {
    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_uses(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }
}

/// Events emitted while a response streams.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental text content from the model.
    TextDelta { text: String },
    /// Stream completed; the final message follows from the call's return.
    Done,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// Common interface for LLM providers. The gateway's CLIs wire a concrete
/// HTTP client; tests use in-memory fakes.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Non-streaming call. Used by the summarizer.
    async fn send(&self, req: &ChatRequest) -> Result<FinalMessage, LlmError>;

    /// Streaming call: text deltas go to `tx`, the final message is returned.
    /// Default falls back to `send`, emitting the full text as one delta.
    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<FinalMessage, LlmError> {
        let resp = self.send(req).await?;
        let text = resp.text();
        if !text.is_empty() {
            let _ = tx.send(StreamEvent::TextDelta { text }).await;
        }
        let _ = tx.send(StreamEvent::Done).await;
        Ok(resp)
    }
}
