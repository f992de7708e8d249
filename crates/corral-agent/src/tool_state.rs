//! Process-resident tool-call state.
//!
//! A RUNNING tool keeps its phase state here between ticks; approval and
//! answer responses inject `external_data` that the next invocation of the
//! same tool call receives alongside the stored state. The map lives in the
//! child only — the host never holds it.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallStatus {
    Idle,
    Running,
    Success,
    Failure,
}

#[derive(Debug, Clone)]
pub struct ToolCallState {
    pub status: ToolCallStatus,
    pub state: Value,
    pub session_id: u64,
    pub tool_call_id: String,
    pub external_data: Option<Value>,
}

#[derive(Debug, Default)]
pub struct ToolStateMap {
    entries: Mutex<HashMap<String, ToolCallState>>,
}

impl ToolStateMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tool_call_id: &str) -> Option<ToolCallState> {
        self.entries.lock().unwrap().get(tool_call_id).cloned()
    }

    /// Record a RUNNING tool's phase state for the next tick.
    pub fn keep_running(&self, session_id: u64, tool_call_id: &str, state: Value) {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .entry(tool_call_id.to_string())
            .or_insert_with(|| ToolCallState {
                status: ToolCallStatus::Idle,
                state: Value::Null,
                session_id,
                tool_call_id: tool_call_id.to_string(),
                external_data: None,
            });
        entry.status = ToolCallStatus::Running;
        entry.state = state;
    }

    /// Inject approval/answer data for a waiting tool call.
    pub fn inject_external(&self, tool_call_id: &str, data: Value) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(tool_call_id) {
            Some(entry) => {
                entry.external_data = Some(data);
                true
            }
            None => false,
        }
    }

    /// Pull the stored state plus any injected external data for an
    /// invocation. External data is consumed; the state stays until the call
    /// terminates.
    pub fn take_for_invocation(&self, tool_call_id: &str) -> (Value, Option<Value>) {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(tool_call_id) {
            Some(entry) => (entry.state.clone(), entry.external_data.take()),
            None => (Value::Null, None),
        }
    }

    pub fn finish(&self, tool_call_id: &str) {
        self.entries.lock().unwrap().remove(tool_call_id);
    }

    pub fn is_running(&self, tool_call_id: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(tool_call_id)
            .is_some_and(|e| e.status == ToolCallStatus::Running)
    }
}
