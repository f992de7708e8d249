//! Command dispatch: resolve a command line against the registry and decide
//! where it runs.
//!
//! Host execution applies when the effective session is 0, the tool is a
//! local command, or the tool requires the host; anything else forwards to
//! the owning session's child over its channel.

use serde_json::Value;
use tracing::debug;

use corral_infra::tools::{ResolveError, ToolCtx};
use corral_shared::outcome::Outcome;
use corral_shared::protocol::{BridgeMessage, CommandMsg, CommandResponseMsg};
use corral_shared::utils::time::epoch_ms;

use crate::bridge::{self, REQUEST_TIMEOUT};
use crate::core::Core;

pub async fn execute_command(core: &Core, cmd: CommandMsg) -> CommandResponseMsg {
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

    // "current session" context from configuration when the caller did not
    // supply one
    let effective_session = cmd
        .session_id
        .unwrap_or(core.state.config.settings.current_session);

    let run_on_host = def.meta.local_command
        || effective_session == 0
        || def.meta.requires_host_execution;

    debug!(
        command = %cmd.command,
        tool = %resolved.name,
        effective_session,
        run_on_host,
        "dispatching command"
    );

    if run_on_host {
        let Some(handler) = def.handler.clone() else {
            return CommandResponseMsg::err(
                cmd.message_id,
                cmd.request_id,
                format!("command not found: {} has no host handler", resolved.name),
            );
        };
        let ctx = ToolCtx {
            session_id: effective_session,
            tool_call_id: format!("cmd_{}", epoch_ms()),
            state: Value::Null,
            external_data: None,
            cancel: Default::default(),
            human: cmd.human,
        };
        return match handler(resolved.args, ctx).await {
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
        };
    }

    // forward to the owning child
    let forwarded = CommandMsg {
        message_id: None, // assigned by request_container
        request_id: None,
        session_id: Some(effective_session),
        command: cmd.command.clone(),
        wait_for_response: cmd.wait_for_response,
        human: cmd.human,
    };

    if !cmd.wait_for_response {
        let sent = bridge::send_to_container(
            &core.state,
            effective_session,
            BridgeMessage::Command(forwarded),
        )
        .await;
        return match sent {
            Ok(()) => CommandResponseMsg::ok(
                cmd.message_id,
                cmd.request_id,
                serde_json::json!({"forwarded": true}),
            ),
            Err(e) => CommandResponseMsg::err(cmd.message_id, cmd.request_id, e.to_string()),
        };
    }

    match bridge::request_container(
        &core.state,
        effective_session,
        |message_id| {
            BridgeMessage::Command(CommandMsg {
                message_id: Some(message_id),
                ..forwarded
            })
        },
        REQUEST_TIMEOUT,
    )
    .await
    {
        Ok(child_response) => CommandResponseMsg {
            message_id: cmd.message_id,
            request_id: cmd.request_id,
            success: child_response.success,
            data: child_response.data,
            error: child_response.error,
        },
        Err(e) => CommandResponseMsg::err(cmd.message_id, cmd.request_id, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_infra::config::Configuration;

    use crate::core::{Core, boot};

    async fn test_core(dir: &std::path::Path) -> Core {
        let config = Configuration::for_home(dir.to_path_buf()).unwrap();
        config.ensure_layout().unwrap();
        boot(config).unwrap()
    }

    fn command(text: &str, session: Option<u64>, human: bool) -> CommandMsg {
        CommandMsg {
            message_id: None,
            request_id: Some("req-1".to_string()),
            session_id: session,
            command: text.to_string(),
            wait_for_response: true,
            human,
        }
    }

    #[tokio::test]
    async fn human_only_tools_reject_the_agent_path() {
        let tmp = tempfile::tempdir().unwrap();
        let core = test_core(tmp.path()).await;
        let response = execute_command(&core, command("session list", None, false)).await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("human channel"));
    }

    #[tokio::test]
    async fn local_commands_run_on_the_host() {
        let tmp = tempfile::tempdir().unwrap();
        let core = test_core(tmp.path()).await;
        let response = execute_command(&core, command("session list", None, true)).await;
        assert!(response.success);
        assert_eq!(response.data, serde_json::json!([]));
        assert_eq!(response.request_id.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn unknown_commands_are_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let core = test_core(tmp.path()).await;
        let response = execute_command(&core, command("frobnicate now", None, true)).await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("command not found"));
    }

    #[tokio::test]
    async fn forwarding_without_a_connection_is_a_routing_error() {
        let tmp = tempfile::tempdir().unwrap();
        let core = test_core(tmp.path()).await;
        let response =
            execute_command(&core, command("shell execute ls", Some(9), true)).await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("no connection for session 9"));
    }

    #[tokio::test]
    async fn missing_template_surfaces_as_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let core = test_core(tmp.path()).await;
        let response = execute_command(&core, command("session new ghost", None, true)).await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("no such template"));
    }

    #[tokio::test]
    async fn glued_resolution_reaches_aliased_tools() {
        let tmp = tempfile::tempdir().unwrap();
        let core = test_core(tmp.path()).await;
        // `approve` is an alias for approval__resolve
        let response = execute_command(&core, command("approve 1 APPROVE", None, true)).await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("no such approval"));
    }
}
