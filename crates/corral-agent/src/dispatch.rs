//! Child-side routing: execute a tool call locally or round-trip it to the
//! host, and serve commands the host forwards from the CLI.

use serde_json::Value;
use tracing::{debug, warn};

use corral_infra::tools::{ResolveError, ToolCtx};
use corral_shared::outcome::Outcome;
use corral_shared::protocol::{
    BridgeMessage, CommandMsg, CommandResponseMsg, ToolCallMsg,
};
use corral_shared::schemas::message::ToolCall;
use corral_shared::utils::time::epoch_ms;

use crate::bridge::REQUEST_TIMEOUT;
use crate::core::ChildCore;

/// Route a tool call per its metadata: host execution crosses the bridge,
/// everything else runs the resumable local executor.
pub async fn route_tool_call(core: &ChildCore, call: &ToolCall) -> Outcome {
    let name = &call.function.name;
    let Some(def) = core.registry.get(name) else {
        return Outcome::failure(format!("no handler for tool {name}"));
    };

    let host_execution = def.meta.requires_host_execution
        || exec_on_host_override(core, name).await;

    if host_execution {
        forward_to_host(core, call).await
    } else {
        execute_local(core, call).await
    }
}

/// A per-session `exec_on: host*` option upgrades a tool to host execution.
async fn exec_on_host_override(core: &ChildCore, tool_name: &str) -> bool {
    let mut sessions = core.state.sessions.lock().await;
    let Some(record) = sessions.get(core.state.session_id) else {
        return false;
    };
    record
        .spec
        .tools
        .iter()
        .find(|g| g.name() == tool_name)
        .and_then(|g| g.option("exec_on"))
        .and_then(|v| v.as_str())
        .is_some_and(|v| v.starts_with("host"))
}

async fn forward_to_host(core: &ChildCore, call: &ToolCall) -> Outcome {
    let message = BridgeMessage::ToolCall(ToolCallMsg {
        message_id: None,
        session_id: core.state.session_id,
        tool_call: call.clone(),
    });
    match core
        .state
        .bridge
        .request(message, REQUEST_TIMEOUT, &core.state.cancel)
        .await
    {
        Ok(response) if response.success => serde_json::from_value::<Outcome>(response.data)
            .unwrap_or_else(|e| Outcome::failure(format!("malformed host tool result: {e}"))),
        Ok(response) => Outcome::failure(
            response
                .error
                .unwrap_or_else(|| "host tool execution failed".to_string()),
        ),
        Err(e) => Outcome::failure(format!("host round-trip failed: {e}")),
    }
}

/// The local executor: feed the handler the stored phase state plus any
/// injected external data, and keep or clear the tool-call state according
/// to the outcome.
pub async fn execute_local(core: &ChildCore, call: &ToolCall) -> Outcome {
    let name = &call.function.name;
    let Some(def) = core.registry.get(name) else {
        return Outcome::failure(format!("no handler for tool {name}"));
    };
    let Some(handler) = def.handler.clone() else {
        return Outcome::failure(format!("tool {name} is not executable in the session context"));
    };

    let args: Value = serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
    let (state, external_data) = core.state.tool_states.take_for_invocation(&call.id);
    // park the entry before the handler runs: a handler that forwards a
    // human-input request may see the response land mid-flight, and the
    // injection needs somewhere to go
    core.state
        .tool_states
        .keep_running(core.state.session_id, &call.id, state.clone());
    let ctx = ToolCtx {
        session_id: core.state.session_id,
        tool_call_id: call.id.clone(),
        state,
        external_data,
        cancel: core.state.cancel.clone(),
        human: false,
    };

    let outcome = handler(args, ctx).await;
    match &outcome {
        Outcome::Running { state } => {
            core.state
                .tool_states
                .keep_running(core.state.session_id, &call.id, state.clone());
        }
        _ => core.state.tool_states.finish(&call.id),
    }
    debug!(tool = %name, tool_call_id = %call.id, running = outcome.is_running(), "tool executed");
    outcome
}

/// Serve a command the host forwarded over this session's channel.
pub async fn execute_command(core: &ChildCore, cmd: CommandMsg) -> CommandResponseMsg {
    let resolved = match core.registry.resolve(&cmd.command) {
        Ok(r) => r,
        Err(ResolveError::Empty) => {
            return CommandResponseMsg::err(cmd.message_id, cmd.request_id, "empty command");
        }
        Err(e) => {
            return CommandResponseMsg::err(cmd.message_id, cmd.request_id, e.to_string());
        }
    };

    let Some(def) = core.registry.get(&resolved.name) else {
        return CommandResponseMsg::err(
            cmd.message_id,
            cmd.request_id,
            format!("command not found: {}", resolved.name),
        );
    };
    if def.meta.human_only && !cmd.human {
        return CommandResponseMsg::err(
            cmd.message_id,
            cmd.request_id,
            format!("{} is restricted to the human channel", resolved.name),
        );
    }
    if def.handler.is_none() {
        return CommandResponseMsg::err(
            cmd.message_id,
            cmd.request_id,
            format!("{} cannot run in the session context", resolved.name),
        );
    }

    // run through the resumable executor so a command that suspends for
    // approval can be resumed like any other tool call
    let call = ToolCall::new(
        format!("cmd_{}", epoch_ms()),
        resolved.name,
        serde_json::to_string(&resolved.args).unwrap_or_else(|_| "{}".to_string()),
    );
    match execute_local(core, &call).await {
        Outcome::Success { result } => {
            CommandResponseMsg::ok(cmd.message_id, cmd.request_id, result)
        }
        Outcome::Failure { error } => {
            CommandResponseMsg::err(cmd.message_id, cmd.request_id, error)
        }
        Outcome::Running { state } => CommandResponseMsg::ok(
            cmd.message_id,
            cmd.request_id,
            serde_json::json!({"status": "RUNNING", "state": state}),
        ),
    }
}

/// Dispatch one inbound message from the host.
pub async fn handle_inbound(core: &ChildCore, message: BridgeMessage) {
    match message {
        BridgeMessage::CommandResponse(response) => core.state.bridge.resolve(response),
        BridgeMessage::ApprovalResponse(m) => {
            let injected = core.state.tool_states.inject_external(
                &m.tool_call_id,
                serde_json::json!({
                    "approvalReceived": true,
                    "choice": m.choice,
                    "explanation": m.explanation,
                }),
            );
            if !injected {
                warn!(tool_call_id = %m.tool_call_id, "approval response for unknown tool call");
            }
            core.state.resume_after_human_input().await;
        }
        BridgeMessage::QuestionResponse(m) => {
            let injected = core.state.tool_states.inject_external(
                &m.tool_call_id,
                serde_json::json!({
                    "answerReceived": true,
                    "answer": m.answer,
                }),
            );
            if !injected {
                warn!(tool_call_id = %m.tool_call_id, "question response for unknown tool call");
            }
            core.state.resume_after_human_input().await;
        }
        BridgeMessage::Command(cmd) => {
            let wait = cmd.wait_for_response;
            let response = execute_command(core, cmd).await;
            if wait
                && let Err(e) = core
                    .state
                    .bridge
                    .send(&BridgeMessage::CommandResponse(response))
                    .await
            {
                warn!(error = %e, "failed to send command response to host");
            }
        }
        other => {
            warn!(r#type = other.type_name(), "unexpected message in session context");
        }
    }
}
