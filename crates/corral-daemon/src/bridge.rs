//! Host side of the per-session duplex channels: the routing waist.
//!
//! Connections register an outbound pump per session; requests toward a
//! child carry a `"msg_<epochMs>_<rand>"` id and park a resolver until the
//! matching `command_response` or the deadline. Inbound messages from
//! children dispatch on type.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use corral_shared::protocol::{
    AiPromptRequestMsg, BridgeMessage, CommandResponseMsg, MessageId, ToolCallMsg,
};
use corral_shared::utils::time::epoch_ms;

use corral_infra::tools::ToolCtx;
use corral_shared::outcome::Outcome;

use crate::core::{Core, HostState};
use crate::{approvals, dispatch};

/// Round-trip deadline for host↔child commands.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Subscribe the bridge to session transitions. The session layer never
/// calls into the bridge directly; this observer is the coupling point.
pub fn watch_transitions(core: &Core) {
    let mut events = core.state.events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            debug!(
                session_id = event.session_id,
                action = ?event.transition.action,
                from = ?event.transition.from,
                to = ?event.transition.to,
                "observed session transition"
            );
        }
    });
}

/// Collision-free within a session: epoch millis plus a random suffix.
pub fn next_host_message_id() -> MessageId {
    let suffix: u32 = rand::random::<u32>() & 0xff_ffff;
    MessageId::Tag(format!("msg_{}_{suffix:06x}", epoch_ms()))
}

pub async fn register_connection(
    state: &HostState,
    session_id: u64,
    tx: mpsc::UnboundedSender<BridgeMessage>,
) {
    let previous = state.connections.lock().await.insert(session_id, tx);
    if previous.is_some() {
        debug!(session_id, "replaced existing session connection");
    } else {
        info!(session_id, "session connected");
    }
}

pub async fn remove_connection(
    state: &HostState,
    session_id: u64,
    stale: &mpsc::UnboundedSender<BridgeMessage>,
) {
    let mut connections = state.connections.lock().await;
    // only drop the registration if it is still ours; a reconnect may have
    // already replaced it
    if connections
        .get(&session_id)
        .is_some_and(|current| current.same_channel(stale))
    {
        connections.remove(&session_id);
        info!(session_id, "session disconnected");
    }
}

/// Write one framed message to a session's child.
pub async fn send_to_container(
    state: &HostState,
    session_id: u64,
    message: BridgeMessage,
) -> Result<()> {
    let connections = state.connections.lock().await;
    let tx = connections
        .get(&session_id)
        .ok_or_else(|| anyhow!("no connection for session {session_id}"))?;
    tx.send(message)
        .map_err(|_| anyhow!("connection for session {session_id} is closing"))
}

/// Round-trip a request to a child: allocate the id, park a resolver, and
/// suspend until the response or the deadline. The pending entry is cleared
/// either way.
pub async fn request_container(
    state: &HostState,
    session_id: u64,
    make: impl FnOnce(MessageId) -> BridgeMessage,
    timeout: Duration,
) -> Result<CommandResponseMsg> {
    let id = next_host_message_id();
    let MessageId::Tag(ref key) = id else {
        unreachable!("host message ids are tags");
    };
    let key = key.clone();

    let (tx, rx) = oneshot::channel();
    state.pending.lock().unwrap().insert(key.clone(), tx);

    if let Err(e) = send_to_container(state, session_id, make(id)).await {
        state.pending.lock().unwrap().remove(&key);
        return Err(e);
    }

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(_)) => {
            state.pending.lock().unwrap().remove(&key);
            bail!("response channel closed for session {session_id}")
        }
        Err(_) => {
            state.pending.lock().unwrap().remove(&key);
            bail!(
                "session {session_id} did not respond within {}s",
                timeout.as_secs()
            )
        }
    }
}

fn resolve_pending(state: &HostState, response: CommandResponseMsg) {
    let Some(MessageId::Tag(ref key)) = response.message_id else {
        warn!("command response without a usable messageId");
        return;
    };
    let parked = state.pending.lock().unwrap().remove(key);
    match parked {
        Some(tx) => {
            let _ = tx.send(response);
        }
        None => warn!(message_id = %key, "no pending request for response"),
    }
}

/// Dispatch one inbound message from a session child.
pub async fn route_from_child(core: &Core, session_id: u64, message: BridgeMessage) {
    match message {
        BridgeMessage::CommandResponse(response) => resolve_pending(&core.state, response),
        BridgeMessage::ToolCall(m) => {
            // host execution can be slow; never block the channel pump
            let core = core.clone();
            tokio::spawn(async move {
                let response = execute_host_tool(&core, &m).await;
                if let Err(e) =
                    send_to_container(&core.state, session_id, BridgeMessage::CommandResponse(response))
                        .await
                {
                    warn!(session_id, error = %e, "failed to return tool result");
                }
            });
        }
        BridgeMessage::AiPromptRequest(m) => {
            let core = core.clone();
            tokio::spawn(async move {
                let response = complete_prompt(&core.state, &m).await;
                if let Err(e) =
                    send_to_container(&core.state, session_id, BridgeMessage::CommandResponse(response))
                        .await
                {
                    warn!(session_id, error = %e, "failed to return completion");
                }
            });
        }
        BridgeMessage::ApprovalRequest(m) => {
            let id = approvals::create_approval(&core.state, m).await;
            info!(approval_id = id, session_id, "approval waiting for a human");
        }
        BridgeMessage::QuestionRequest(m) => {
            let id = approvals::create_question(&core.state, m).await;
            info!(question_id = id, session_id, "question waiting for a human");
        }
        BridgeMessage::Command(cmd) => {
            let wait = cmd.wait_for_response;
            let response = dispatch::execute_command(core, cmd).await;
            if wait
                && let Err(e) = send_to_container(
                    &core.state,
                    session_id,
                    BridgeMessage::CommandResponse(response),
                )
                .await
            {
                warn!(session_id, error = %e, "failed to return command response");
            }
        }
        other => {
            warn!(r#type = other.type_name(), session_id, "unexpected message from child");
        }
    }
}

/// Run a host-executed tool on behalf of a child and wrap the outcome.
async fn execute_host_tool(core: &Core, m: &ToolCallMsg) -> CommandResponseMsg {
    let name = &m.tool_call.function.name;
    let outcome = match core.registry.get(name).and_then(|d| d.handler.clone()) {
        Some(handler) => {
            let args: serde_json::Value =
                serde_json::from_str(&m.tool_call.function.arguments).unwrap_or_default();
            let ctx = ToolCtx::new(m.session_id, m.tool_call.id.clone());
            handler(args, ctx).await
        }
        None => Outcome::failure(format!("no host handler for tool {name}")),
    };
    match serde_json::to_value(&outcome) {
        Ok(data) => CommandResponseMsg::ok(m.message_id.clone(), None, data),
        Err(e) => CommandResponseMsg::err(
            m.message_id.clone(),
            None,
            format!("failed to serialize tool outcome: {e}"),
        ),
    }
}

/// Resolve the provider by name and run the completion. Credentials live
/// only in this process.
async fn complete_prompt(state: &Arc<HostState>, m: &AiPromptRequestMsg) -> CommandResponseMsg {
    match state.providers.complete(&m.request).await {
        Ok(chat) => match serde_json::to_value(&chat) {
            Ok(data) => CommandResponseMsg::ok(m.message_id.clone(), None, data),
            Err(e) => CommandResponseMsg::err(
                m.message_id.clone(),
                None,
                format!("failed to serialize completion: {e}"),
            ),
        },
        Err(e) => {
            warn!(session_id = m.session_id, error = %e, "provider call failed");
            CommandResponseMsg::err(m.message_id.clone(), None, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_infra::config::Configuration;
    use corral_shared::protocol::{ApprovalRequestMsg, QuestionRequestMsg};
    use corral_shared::schemas::approval::ApprovalStatus;
    use corral_shared::schemas::chat::ChatRequest;
    use corral_shared::schemas::message::{ChatMessage, ToolCall};

    use crate::core::{Core, boot};

    #[test]
    fn host_message_ids_are_tagged_and_distinct() {
        let a = next_host_message_id();
        let b = next_host_message_id();
        let (MessageId::Tag(a), MessageId::Tag(b)) = (a, b) else {
            panic!("expected tags");
        };
        assert!(a.starts_with("msg_"));
        assert_ne!(a, b);
    }

    async fn test_core(dir: &std::path::Path) -> Core {
        let config = Configuration::for_home(dir.to_path_buf()).unwrap();
        config.ensure_layout().unwrap();
        boot(config).unwrap()
    }

    /// Register a fake child connection and return its receiving end.
    async fn fake_connection(
        core: &Core,
        session_id: u64,
    ) -> mpsc::UnboundedReceiver<BridgeMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        register_connection(&core.state, session_id, tx).await;
        rx
    }

    #[tokio::test]
    async fn ai_prompt_request_answers_on_the_same_message_id() {
        let tmp = tempfile::tempdir().unwrap();
        let core = test_core(tmp.path()).await;
        let mut rx = fake_connection(&core, 1).await;

        let message = BridgeMessage::AiPromptRequest(AiPromptRequestMsg {
            message_id: Some(MessageId::Seq(7)),
            session_id: 1,
            request: ChatRequest {
                model: "xai:mock".into(),
                system: None,
                messages: vec![ChatMessage::user("Ping")],
                tools: vec![],
            },
        });
        route_from_child(&core, 1, message).await;

        let BridgeMessage::CommandResponse(response) = rx.recv().await.unwrap() else {
            panic!("expected a command response");
        };
        assert_eq!(response.message_id, Some(MessageId::Seq(7)));
        assert!(response.success);
        assert_eq!(
            response.data["choices"][0]["message"]["content"],
            "Pong"
        );
    }

    #[tokio::test]
    async fn host_tool_call_returns_the_outcome_wire_shape() {
        let tmp = tempfile::tempdir().unwrap();
        let core = test_core(tmp.path()).await;
        let mut rx = fake_connection(&core, 2).await;

        let list_dir = tmp.path().join("lsme");
        std::fs::create_dir_all(list_dir.join("sub")).unwrap();
        let message = BridgeMessage::ToolCall(ToolCallMsg {
            message_id: Some(MessageId::Seq(9)),
            session_id: 2,
            tool_call: ToolCall::new(
                "tc_ls",
                "fs__directory__list",
                format!("{{\"path\": \"{}\"}}", list_dir.display()),
            ),
        });
        route_from_child(&core, 2, message).await;

        let BridgeMessage::CommandResponse(response) = rx.recv().await.unwrap() else {
            panic!("expected a command response");
        };
        assert_eq!(response.message_id, Some(MessageId::Seq(9)));
        assert_eq!(response.data["status"], "SUCCESS");
        assert_eq!(response.data["result"][0]["name"], "sub");
    }

    #[tokio::test]
    async fn approval_and_question_requests_create_pending_records() {
        let tmp = tempfile::tempdir().unwrap();
        let core = test_core(tmp.path()).await;
        let _rx = fake_connection(&core, 3).await;

        route_from_child(
            &core,
            3,
            BridgeMessage::ApprovalRequest(ApprovalRequestMsg {
                session_id: 3,
                tool_call_id: "tc_a".into(),
                kind: "shell__execute".into(),
                description: "git push".into(),
            }),
        )
        .await;
        route_from_child(
            &core,
            3,
            BridgeMessage::QuestionRequest(QuestionRequestMsg {
                session_id: 3,
                tool_call_id: "tc_q".into(),
                question: "file?".into(),
            }),
        )
        .await;

        let mut approvals = core.state.approvals.lock().await;
        let (_, approval) = approvals.get_all().pop().unwrap();
        assert_eq!(approval.status, ApprovalStatus::Pending);
        assert_eq!(approval.tool_call_id, "tc_a");

        let mut questions = core.state.questions.lock().await;
        let (_, question) = questions.get_all().pop().unwrap();
        assert_eq!(question.question, "file?");
    }

    #[tokio::test]
    async fn reconnect_replaces_and_close_removes_only_the_current_channel() {
        let tmp = tempfile::tempdir().unwrap();
        let core = test_core(tmp.path()).await;

        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        register_connection(&core.state, 5, old_tx.clone()).await;
        let (new_tx, _new_rx) = mpsc::unbounded_channel();
        register_connection(&core.state, 5, new_tx).await;

        // the stale registration is gone; removing by the old handle is a no-op
        remove_connection(&core.state, 5, &old_tx).await;
        assert!(core.state.connections.lock().await.contains_key(&5));
    }
}
