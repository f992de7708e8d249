//! Session record: lifecycle state plus the conversation it drives.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::{ChatMessage, Role, ToolCall};
use super::{API_VERSION, KIND_AGENT};
use crate::fsm::Fsm;
use crate::utils::time::epoch_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Pending,
    Running,
    Paused,
    Stopped,
    Success,
    Error,
}

impl SessionStatus {
    /// Statuses for which a live child process is expected.
    pub fn expects_child(self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::Paused)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Success | Self::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionAction {
    Start,
    Complete,
    Fail,
    Pause,
    Resume,
    Stop,
    Run,
    Retry,
}

/// The session status table. Unlisted transitions are rejected.
pub fn session_fsm() -> Fsm<SessionStatus, SessionAction> {
    use SessionAction as A;
    use SessionStatus as S;
    Fsm::new()
        .rule(A::Start, &[S::Pending], S::Running)
        .rule(A::Complete, &[S::Running], S::Success)
        .rule(A::Fail, &[S::Running], S::Error)
        .rule(A::Pause, &[S::Pending, S::Running], S::Paused)
        .rule(A::Resume, &[S::Paused], S::Pending)
        .rule(A::Stop, &[S::Pending, S::Running, S::Paused], S::Stopped)
        .rule(A::Run, &[S::Stopped], S::Running)
        .rule(A::Retry, &[S::Success, S::Error], S::Pending)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub action: SessionAction,
    pub from: SessionStatus,
    pub to: SessionStatus,
    pub timestamp: i64,
}

/// One entry of the session's tool allowlist: a bare name or a name with a
/// per-session option map (`exec_on: host_danger`, a nested allowlist, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolGrant {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        options: BTreeMap<String, Value>,
    },
}

impl ToolGrant {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(n) => n,
            Self::Detailed { name, .. } => name,
        }
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Name(_) => None,
            Self::Detailed { options, .. } => options.get(key),
        }
    }
}

/// Approximate token bookkeeping from the latest provider round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: u64,
    pub name: String,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSpec {
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition: Option<TransitionRecord>,
    /// Child id, `<id>_<unix-seconds>`; doubles as the container name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub model: String,
    #[serde(default)]
    pub tools: Vec<ToolGrant>,
    pub system_prompt: String,
    #[serde(default)]
    pub system_prompt_evaluated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_usage: Option<Usage>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub api_version: String,
    pub kind: String,
    pub metadata: SessionMeta,
    pub spec: SessionSpec,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl SessionRecord {
    pub fn new(id: u64, name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND_AGENT.to_string(),
            metadata: SessionMeta {
                id,
                name: name.into(),
                created_at: epoch_ms(),
                labels: BTreeMap::new(),
                deleted_at: None,
                extra: BTreeMap::new(),
            },
            spec: SessionSpec {
                status: SessionStatus::Pending,
                last_transition: None,
                container_id: None,
                pid: None,
                model: model.into(),
                tools: Vec::new(),
                system_prompt: String::new(),
                system_prompt_evaluated: false,
                latest_usage: None,
                messages: Vec::new(),
                extra: BTreeMap::new(),
            },
            extra: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.metadata.id
    }

    pub fn is_deleted(&self) -> bool {
        self.metadata.deleted_at.is_some()
    }

    pub fn push_message(&mut self, message: ChatMessage) {
        self.spec.messages.push(message);
    }

    /// Tool calls of the trailing assistant message that have no later `tool`
    /// response — the "resumable pending" set the agent loop acts on.
    pub fn unresolved_tool_calls(&self) -> Vec<ToolCall> {
        let Some(idx) = self
            .spec
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant)
        else {
            return Vec::new();
        };
        let Some(calls) = self.spec.messages[idx].tool_calls.as_ref() else {
            return Vec::new();
        };
        let answered: Vec<&str> = self.spec.messages[idx + 1..]
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        calls
            .iter()
            .filter(|c| !answered.contains(&c.id.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fsm_matches_lifecycle_table() {
        use SessionAction as A;
        use SessionStatus as S;
        let fsm = session_fsm();
        assert_eq!(fsm.transition(S::Pending, A::Start).unwrap(), S::Running);
        assert_eq!(fsm.transition(S::Running, A::Complete).unwrap(), S::Success);
        assert_eq!(fsm.transition(S::Running, A::Fail).unwrap(), S::Error);
        assert_eq!(fsm.transition(S::Pending, A::Pause).unwrap(), S::Paused);
        assert_eq!(fsm.transition(S::Running, A::Pause).unwrap(), S::Paused);
        assert_eq!(fsm.transition(S::Paused, A::Resume).unwrap(), S::Pending);
        assert_eq!(fsm.transition(S::Paused, A::Stop).unwrap(), S::Stopped);
        assert_eq!(fsm.transition(S::Stopped, A::Run).unwrap(), S::Running);
        assert_eq!(fsm.transition(S::Error, A::Retry).unwrap(), S::Pending);

        let err = fsm.transition(S::Stopped, A::Pause).unwrap_err();
        assert_eq!(err.admissible, vec![S::Pending, S::Running]);
    }

    #[test]
    fn unresolved_tool_calls_respects_later_responses() {
        let mut record = SessionRecord::new(1, "t", "mock:mock");
        record.push_message(ChatMessage::user("ls"));
        record.push_message(ChatMessage::assistant(
            "",
            Some(vec![
                ToolCall::new("tc_1", "fs__directory__list", "{}"),
                ToolCall::new("tc_2", "shell__execute", "{}"),
            ]),
        ));
        record.push_message(ChatMessage::tool("tc_1", "fs__directory__list", "ok"));

        let pending = record.unresolved_tool_calls();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "tc_2");
    }

    #[test]
    fn unknown_manifest_keys_survive_roundtrip() {
        let text = "api_version: daemon/v1\nkind: Agent\nx_custom: keepme\nmetadata:\n  id: 7\n  name: demo\n  created_at: 0\nspec:\n  status: PENDING\n  model: mock:mock\n  system_prompt: ''\n";
        let record: SessionRecord = serde_yaml::from_str(text).unwrap();
        assert_eq!(record.id(), 7);
        let out = serde_yaml::to_string(&record).unwrap();
        assert!(out.contains("x_custom: keepme"));
    }

    #[test]
    fn tool_grant_forms() {
        let yaml = "- shell__execute\n- name: fs__file__read\n  options:\n    exec_on: host_danger\n";
        let grants: Vec<ToolGrant> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(grants[0].name(), "shell__execute");
        assert_eq!(grants[1].name(), "fs__file__read");
        assert_eq!(
            grants[1].option("exec_on").and_then(|v| v.as_str()),
            Some("host_danger")
        );
    }
}
