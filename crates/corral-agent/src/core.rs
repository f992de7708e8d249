//! The child's boot-time context: one session, one bridge, one registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use corral_infra::allowlist::Allowlist;
use corral_infra::config::Configuration;
use corral_infra::sessions::SessionStore;
use corral_infra::tools::ToolRegistry;
use corral_shared::protocol::{
    ApprovalRequestMsg, BridgeMessage, QuestionRequestMsg,
};
use corral_shared::schemas::session::SessionAction;
use corral_shared::utils::cancel::CancelToken;

use crate::bridge::ChildBridge;
use crate::tool_state::ToolStateMap;

/// Services shared by the agent loop, the read loop, and the tool handlers.
pub struct ChildState {
    pub config: Configuration,
    pub session_id: u64,
    pub sessions: Mutex<SessionStore>,
    pub bridge: ChildBridge,
    pub tool_states: ToolStateMap,
    /// Trips when a pause/stop signal lands; aborts in-flight round-trips.
    pub cancel: CancelToken,
    pub pause_requested: AtomicBool,
    pub stop_requested: AtomicBool,
    pub global_allowlist: Allowlist,
}

impl ChildState {
    pub fn request_pause(&self) {
        self.pause_requested.store(true, Ordering::Relaxed);
        self.cancel.cancel();
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Relaxed);
        self.cancel.cancel();
    }

    pub fn take_pause_request(&self) -> bool {
        self.pause_requested.swap(false, Ordering::Relaxed)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Relaxed)
    }

    /// Suspend the session ahead of a human-input request. Already-paused
    /// sessions are left as they are.
    pub async fn pause_for_human_input(&self) {
        let mut sessions = self.sessions.lock().await;
        if let Err(e) = sessions.transition(self.session_id, SessionAction::Pause) {
            debug!(session_id = self.session_id, %e, "pause before human input skipped");
        }
    }

    /// Pause, then forward an approval request. Fire-and-forget: the child
    /// does not block on the host's acknowledgement; the resolution arrives
    /// later as an `approval_response`.
    pub async fn emit_approval_request(
        &self,
        tool_call_id: &str,
        kind: &str,
        description: &str,
    ) -> Result<()> {
        self.pause_for_human_input().await;
        self.bridge
            .emit(BridgeMessage::ApprovalRequest(ApprovalRequestMsg {
                session_id: self.session_id,
                tool_call_id: tool_call_id.to_string(),
                kind: kind.to_string(),
                description: description.to_string(),
            }))
            .await
    }

    /// Pause, then forward a question. Same fire-and-forget contract.
    pub async fn emit_question_request(&self, tool_call_id: &str, question: &str) -> Result<()> {
        self.pause_for_human_input().await;
        self.bridge
            .emit(BridgeMessage::QuestionRequest(QuestionRequestMsg {
                session_id: self.session_id,
                tool_call_id: tool_call_id.to_string(),
                question: question.to_string(),
            }))
            .await
    }

    /// Resume after an approval/answer reached us. Invalid transitions (the
    /// peer already resumed) only log.
    pub async fn resume_after_human_input(&self) {
        let mut sessions = self.sessions.lock().await;
        if let Err(e) = sessions.transition(self.session_id, SessionAction::Resume) {
            warn!(session_id = self.session_id, %e, "resume after human input skipped");
        }
    }
}

/// The child context handed around after boot.
#[derive(Clone)]
pub struct ChildCore {
    pub state: Arc<ChildState>,
    pub registry: Arc<ToolRegistry>,
}
