//! `shell__execute`: allowlist-gated command execution with a two-phase
//! resumable machine (`initial` → `awaiting_approval`).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info};

use corral_infra::allowlist::{Allowlist, CheckResult};
use corral_infra::tools::{ToolCtx, ToolRegistry};
use corral_shared::outcome::Outcome;
use corral_shared::utils::cancel::CancelToken;

use crate::core::ChildState;

pub const PHASE_INITIAL: &str = "initial";
pub const PHASE_AWAITING_APPROVAL: &str = "awaiting_approval";

pub fn register(registry: &mut ToolRegistry, state: Arc<ChildState>) {
    registry.bind_handler(
        "shell__execute",
        Arc::new(move |args, ctx| {
            let state = state.clone();
            Box::pin(async move { execute(state, args, ctx).await })
        }),
    );
}

async fn execute(state: Arc<ChildState>, args: Value, ctx: ToolCtx) -> Outcome {
    let phase = ctx
        .state
        .get("phase")
        .and_then(|v| v.as_str())
        .unwrap_or(PHASE_INITIAL)
        .to_string();

    match phase.as_str() {
        PHASE_AWAITING_APPROVAL => awaiting_approval(ctx).await,
        _ => initial(state, args, ctx).await,
    }
}

async fn initial(state: Arc<ChildState>, args: Value, ctx: ToolCtx) -> Outcome {
    let Some(command) = super::string_arg(&args, "command") else {
        return Outcome::failure("shell__execute requires a command argument");
    };

    // per-session allowlist (tool grant option) overrides the global one
    let session_list = session_allowlist(&state, ctx.session_id).await;
    let effective = session_list.as_ref().unwrap_or(&state.global_allowlist);

    match effective.check(&command) {
        CheckResult::Approved => run_command(&command, &ctx.cancel).await,
        not_approved => {
            let reason = match &not_approved {
                CheckResult::Denied { rule } => {
                    format!("denied by allowlist rule {rule:?}")
                }
                _ => "not approved by the allowlist".to_string(),
            };
            if state.config.settings.unattended {
                let mut message =
                    format!("command {command:?} was not executed: {reason} (unattended mode)");
                if let Some(ref list) = session_list
                    && !list.is_empty()
                {
                    message.push_str(&format!(
                        "; the session allowlist permits: {}",
                        list.approved_patterns().join(", ")
                    ));
                }
                return Outcome::failure(message);
            }

            info!(
                session_id = ctx.session_id,
                tool_call_id = %ctx.tool_call_id,
                command = %command,
                "requesting approval for shell command"
            );
            if let Err(e) = state
                .emit_approval_request(&ctx.tool_call_id, "shell__execute", &command)
                .await
            {
                return Outcome::failure(format!("failed to request approval: {e}"));
            }
            Outcome::running(json!({
                "phase": PHASE_AWAITING_APPROVAL,
                "command": command,
            }))
        }
    }
}

async fn awaiting_approval(ctx: ToolCtx) -> Outcome {
    let Some(external) = ctx.external_data else {
        // spurious re-invocation: keep waiting with the same state
        return Outcome::running(ctx.state);
    };
    if external.get("approvalReceived").and_then(|v| v.as_bool()) != Some(true) {
        return Outcome::running(ctx.state);
    }

    let command = ctx
        .state
        .get("command")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let choice = external
        .get("choice")
        .and_then(|v| v.as_str())
        .unwrap_or("REJECT");

    if choice == "APPROVE" {
        debug!(session_id = ctx.session_id, command = %command, "approval granted, executing");
        run_command(&command, &ctx.cancel).await
    } else {
        // MODIFY carries no rewrite path: it is rejection with guidance
        let explanation = external
            .get("explanation")
            .and_then(|v| v.as_str())
            .unwrap_or("no explanation provided");
        Outcome::failure(format!(
            "command {command:?} was rejected by the operator: {explanation}"
        ))
    }
}

async fn session_allowlist(state: &ChildState, session_id: u64) -> Option<Allowlist> {
    let mut sessions = state.sessions.lock().await;
    let record = sessions.get(session_id)?;
    let grant = record
        .spec
        .tools
        .iter()
        .find(|g| g.name() == "shell__execute")?;
    let map = grant.option("allowlist")?.as_object()?;
    let map: BTreeMap<String, Value> = map
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Allowlist::from_option_map(&map).ok()
}

async fn run_command(command: &str, cancel: &CancelToken) -> Outcome {
    let child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .output();

    let output = tokio::select! {
        result = child => result,
        _ = cancel.cancelled() => {
            return Outcome::failure(format!("command {command:?} was cancelled"));
        }
    };

    match output {
        Ok(out) => {
            let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&out.stderr);
            if !stderr.trim().is_empty() {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(stderr.trim_end());
            }
            if out.status.success() {
                Outcome::success(text)
            } else {
                let code = out.status.code().unwrap_or(-1);
                Outcome::failure(format!("command exited with status {code}: {text}"))
            }
        }
        Err(e) => Outcome::failure(format!("failed to spawn command: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    use corral_infra::config::Configuration;
    use corral_infra::sessions::SessionStore;
    use corral_infra::tools::ToolCtx;
    use serde_json::json;

    use crate::bridge::ChildBridge;
    use crate::tool_state::ToolStateMap;

    fn test_state(dir: &std::path::Path, unattended: bool, allowlist: &str) -> Arc<ChildState> {
        if unattended {
            std::fs::write(dir.join("config.yml"), "unattended: true\n").unwrap();
        }
        let config = Configuration::for_home(dir.to_path_buf()).unwrap();
        config.ensure_layout().unwrap();
        let sessions = SessionStore::open(&config.sessions_dir);
        Arc::new(ChildState {
            session_id: 1,
            sessions: tokio::sync::Mutex::new(sessions),
            bridge: ChildBridge::new(dir.join("unused.sock")),
            tool_states: ToolStateMap::new(),
            cancel: CancelToken::new(),
            pause_requested: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            global_allowlist: Allowlist::parse(allowlist).unwrap(),
            config,
        })
    }

    #[tokio::test]
    async fn unattended_denial_fails_with_the_matched_rule() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), true, "ls: true\nrm: false\n");

        let out = initial(
            state,
            json!({"command": "rm -rf /"}),
            ToolCtx::new(1, "tc_rm"),
        )
        .await;
        let Outcome::Failure { error } = out else {
            panic!("expected failure, got {out:?}");
        };
        assert!(error.contains("rm"));
        assert!(error.contains("unattended"));
    }

    #[tokio::test]
    async fn approved_command_executes_without_a_pause() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), true, "echo: true\n");

        let out = initial(
            state,
            json!({"command": "echo fine"}),
            ToolCtx::new(1, "tc_echo"),
        )
        .await;
        let Outcome::Success { result } = out else {
            panic!("expected success, got {out:?}");
        };
        assert_eq!(result.as_str().unwrap().trim(), "fine");
    }

    #[tokio::test]
    async fn modify_is_rejection_with_guidance() {
        let mut ctx = ToolCtx::new(1, "tc_1");
        ctx.state = json!({"phase": PHASE_AWAITING_APPROVAL, "command": "git push"});
        ctx.external_data = Some(json!({
            "approvalReceived": true,
            "choice": "MODIFY",
            "explanation": "push to the fork instead",
        }));

        let out = awaiting_approval(ctx).await;
        let Outcome::Failure { error } = out else {
            panic!("expected failure, got {out:?}");
        };
        assert!(error.contains("push to the fork instead"));
    }

    #[tokio::test]
    async fn spurious_reinvocation_keeps_waiting() {
        let mut ctx = ToolCtx::new(1, "tc_1");
        let state = json!({"phase": PHASE_AWAITING_APPROVAL, "command": "git push"});
        ctx.state = state.clone();

        let out = awaiting_approval(ctx).await;
        let Outcome::Running { state: kept } = out else {
            panic!("expected running, got {out:?}");
        };
        assert_eq!(kept, state);
    }

    #[tokio::test]
    async fn run_command_captures_output_and_status() {
        let cancel = CancelToken::new();
        let ok = run_command("echo hi", &cancel).await;
        let Outcome::Success { result } = ok else {
            panic!("expected success");
        };
        assert_eq!(result.as_str().unwrap().trim(), "hi");

        let fail = run_command("exit 3", &cancel).await;
        let Outcome::Failure { error } = fail else {
            panic!("expected failure");
        };
        assert!(error.contains("status 3"));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_execution() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let out = run_command("sleep 5", &cancel).await;
        assert!(matches!(out, Outcome::Failure { .. }));
    }
}
