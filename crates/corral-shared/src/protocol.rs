//! Bridge message taxonomy.
//!
//! Every record on a duplex channel is one of these, tagged by `type`.
//! Request/response pairs carry a `messageId`: a per-process monotonic
//! integer on the child→host direction, a `"msg_<epochMs>_<rand>"` string on
//! the host→child direction. Both sides treat the peer's ids as opaque.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schemas::approval::ApprovalChoice;
use crate::schemas::chat::ChatRequest;
use crate::schemas::message::ToolCall;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Seq(u64),
    Tag(String),
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seq(n) => write!(f, "{n}"),
            Self::Tag(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    ToolCall(ToolCallMsg),
    ApprovalRequest(ApprovalRequestMsg),
    ApprovalResponse(ApprovalResponseMsg),
    QuestionRequest(QuestionRequestMsg),
    QuestionResponse(QuestionResponseMsg),
    AiPromptRequest(AiPromptRequestMsg),
    Command(CommandMsg),
    CommandResponse(CommandResponseMsg),
}

impl BridgeMessage {
    /// Correlation id, when the message participates in a round-trip.
    pub fn message_id(&self) -> Option<&MessageId> {
        match self {
            Self::ToolCall(m) => m.message_id.as_ref(),
            Self::AiPromptRequest(m) => m.message_id.as_ref(),
            Self::Command(m) => m.message_id.as_ref(),
            Self::CommandResponse(m) => m.message_id.as_ref(),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ToolCall(_) => "tool_call",
            Self::ApprovalRequest(_) => "approval_request",
            Self::ApprovalResponse(_) => "approval_response",
            Self::QuestionRequest(_) => "question_request",
            Self::QuestionResponse(_) => "question_response",
            Self::AiPromptRequest(_) => "ai_prompt_request",
            Self::Command(_) => "command",
            Self::CommandResponse(_) => "command_response",
        }
    }
}

/// A tool invocation crossing the bridge for execution on the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    pub session_id: u64,
    pub tool_call: ToolCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequestMsg {
    pub session_id: u64,
    pub tool_call_id: String,
    /// Requesting tool name, used as the approval's type tag.
    pub kind: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponseMsg {
    pub session_id: u64,
    pub tool_call_id: String,
    pub approval_id: u64,
    pub choice: ApprovalChoice,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRequestMsg {
    pub session_id: u64,
    pub tool_call_id: String,
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResponseMsg {
    pub session_id: u64,
    pub tool_call_id: String,
    pub question_id: u64,
    pub answer: String,
}

/// Completion request forwarded to the host, which owns the credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiPromptRequestMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    pub session_id: u64,
    pub request: ChatRequest,
}

/// A command line to resolve against the tool registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    /// Correlation id on the CLI control channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Target session; `None` falls back to the configured current session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,
    pub command: String,
    #[serde(default = "default_true")]
    pub wait_for_response: bool,
    /// Set on the CLI/human path; gates human-only tools.
    #[serde(default)]
    pub human: bool,
}

fn default_true() -> bool {
    true
}

/// The single response shape: matched to a pending entry by `messageId`
/// (host↔child) or `requestId` (CLI↔host).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponseMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponseMsg {
    pub fn ok(message_id: Option<MessageId>, request_id: Option<String>, data: Value) -> Self {
        Self {
            message_id,
            request_id,
            success: true,
            data,
            error: None,
        }
    }

    pub fn err(
        message_id: Option<MessageId>,
        request_id: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            message_id,
            request_id,
            success: false,
            data: Value::Null,
            error: Some(error.into()),
        }
    }
}
