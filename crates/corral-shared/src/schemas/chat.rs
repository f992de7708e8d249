//! The provider request/response contract.
//!
//! Concrete adapters live on the host; the child only ever sees these shapes
//! riding an `ai_prompt_request` round-trip.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::{ChatMessage, ToolCall};
use super::session::Usage;

/// An LLM-facing tool description offered with a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the tool's parameters.
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// `<provider>:<model>` identifier; the host strips the provider part.
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub message: AssistantMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// A provider response folded into a single assistant message.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedChoice {
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    /// Merge all choices into one assistant message: contents concatenate in
    /// order, tool-call lists concatenate in order, and the finish reason is
    /// `tool_calls` if any choice finished that way, else the last choice's.
    pub fn merge_choices(&self) -> MergedChoice {
        let mut content = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut finish_reason: Option<String> = None;
        let mut saw_tool_calls = false;

        for choice in &self.choices {
            if let Some(ref text) = choice.message.content {
                content.push_str(text);
            }
            if let Some(ref calls) = choice.message.tool_calls {
                tool_calls.extend(calls.iter().cloned());
            }
            if choice.finish_reason.as_deref() == Some("tool_calls") {
                saw_tool_calls = true;
            }
            finish_reason = choice.finish_reason.clone();
        }
        if saw_tool_calls {
            finish_reason = Some("tool_calls".to_string());
        }

        MergedChoice {
            message: ChatMessage::assistant(content, Some(tool_calls)),
            finish_reason,
        }
    }
}
