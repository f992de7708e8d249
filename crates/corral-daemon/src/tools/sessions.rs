//! Session and template management commands.
//!
//! External lifecycle toggles (pause/resume/stop/run/retry) are the host's
//! side of the status field; the matching Unix signal nudges the child off
//! any in-flight work.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::warn;

use corral_infra::tools::{ToolCtx, ToolRegistry};
use corral_shared::outcome::Outcome;
use corral_shared::schemas::session::SessionAction;
use corral_shared::utils::time::epoch_ms;

use crate::core::HostState;
use crate::supervisor;

use super::{arg_str, bind, session_arg};

pub fn register(registry: &mut ToolRegistry, state: Arc<HostState>) {
    bind(registry, "session__new", state.clone(), new);
    bind(registry, "session__list", state.clone(), list);
    bind(registry, "session__show", state.clone(), show);
    bind(registry, "session__pause", state.clone(), pause);
    bind(registry, "session__resume", state.clone(), resume);
    bind(registry, "session__stop", state.clone(), stop);
    bind(registry, "session__run", state.clone(), run);
    bind(registry, "session__retry", state.clone(), retry);
    bind(registry, "session__delete", state.clone(), delete);
    bind(registry, "session__clean", state.clone(), clean);
    bind(registry, "session__logs", state.clone(), logs);
    bind(registry, "template__list", state.clone(), template_list);
    bind(registry, "template__show", state, template_show);
}

async fn new(state: Arc<HostState>, args: Value, _ctx: ToolCtx) -> Outcome {
    let Some(template_name) = arg_str(&args, "template", 0) else {
        return Outcome::failure("session new requires a template name");
    };
    let template = {
        let mut templates = state.templates.lock().await;
        templates.get(&template_name)
    };
    let Some(template) = template else {
        return Outcome::failure(format!("no such template: {template_name}"));
    };

    let record = {
        let mut sessions = state.sessions.lock().await;
        let id = sessions.generate_id();
        let name = arg_str(&args, "name", 1).unwrap_or_else(|| format!("{template_name}-{id}"));
        let record = template.instantiate(id, &name);
        if let Err(e) = sessions.persist(record.clone()) {
            return Outcome::failure(format!("failed to persist session: {e}"));
        }
        record
    };

    if let Err(e) = supervisor::spawn_session(&state.core(), record.id()).await {
        return Outcome::failure(format!("session {} created but not started: {e}", record.id()));
    }
    Outcome::success(json!({
        "id": record.id(),
        "name": record.metadata.name,
        "model": record.spec.model,
    }))
}

async fn list(state: Arc<HostState>, args: Value, _ctx: ToolCtx) -> Outcome {
    let include_deleted = args.get("all").and_then(|v| v.as_bool()).unwrap_or(false)
        || args
            .as_array()
            .is_some_and(|a| a.iter().any(|v| v.as_str() == Some("--all")));
    let mut sessions = state.sessions.lock().await;
    let rows: Vec<Value> = sessions
        .list_records(include_deleted)
        .into_iter()
        .map(|r| {
            json!({
                "id": r.id(),
                "name": r.metadata.name,
                "status": r.spec.status,
                "model": r.spec.model,
                "messages": r.spec.messages.len(),
                "created_at": r.metadata.created_at,
            })
        })
        .collect();
    Outcome::success(Value::Array(rows))
}

async fn show(state: Arc<HostState>, args: Value, ctx: ToolCtx) -> Outcome {
    let Some(id) = session_arg(&args, &ctx) else {
        return Outcome::failure("session show requires a session id");
    };
    let mut sessions = state.sessions.lock().await;
    match sessions.get(id) {
        Some(record) => match serde_json::to_value(&record) {
            Ok(value) => Outcome::success(value),
            Err(e) => Outcome::failure(format!("failed to render session {id}: {e}")),
        },
        None => Outcome::failure(format!("no such session: {id}")),
    }
}

/// Shared body for the external transitions; `signal` pokes the child after
/// the status flips.
async fn transition_with_signal(
    state: &Arc<HostState>,
    id: u64,
    action: SessionAction,
    signal: Option<i32>,
    respawn: bool,
) -> Outcome {
    let transition = {
        let mut sessions = state.sessions.lock().await;
        match sessions.transition(id, action) {
            Ok(t) => t,
            Err(e) => return Outcome::failure(e.to_string()),
        }
    };

    let core = state.core();
    if let Some(signal) = signal
        && !supervisor::signal_child(&core, id, signal).await
    {
        warn!(session_id = id, signal, "no live child to signal");
    }
    if respawn && !supervisor::child_alive(&core, id).await {
        if let Err(e) = supervisor::spawn_session(&core, id).await {
            return Outcome::failure(format!(
                "session {id} transitioned to {:?} but its child did not start: {e}",
                transition.to
            ));
        }
    }
    Outcome::success(json!({
        "id": id,
        "from": transition.from,
        "to": transition.to,
    }))
}

async fn pause(state: Arc<HostState>, args: Value, ctx: ToolCtx) -> Outcome {
    let Some(id) = session_arg(&args, &ctx) else {
        return Outcome::failure("session pause requires a session id");
    };
    transition_with_signal(&state, id, SessionAction::Pause, Some(libc::SIGUSR1), false).await
}

async fn resume(state: Arc<HostState>, args: Value, ctx: ToolCtx) -> Outcome {
    let Some(id) = session_arg(&args, &ctx) else {
        return Outcome::failure("session resume requires a session id");
    };
    transition_with_signal(&state, id, SessionAction::Resume, None, true).await
}

async fn stop(state: Arc<HostState>, args: Value, ctx: ToolCtx) -> Outcome {
    let Some(id) = session_arg(&args, &ctx) else {
        return Outcome::failure("session stop requires a session id");
    };
    transition_with_signal(&state, id, SessionAction::Stop, Some(libc::SIGUSR2), false).await
}

async fn run(state: Arc<HostState>, args: Value, ctx: ToolCtx) -> Outcome {
    let Some(id) = session_arg(&args, &ctx) else {
        return Outcome::failure("session run requires a session id");
    };
    transition_with_signal(&state, id, SessionAction::Run, None, true).await
}

async fn retry(state: Arc<HostState>, args: Value, ctx: ToolCtx) -> Outcome {
    let Some(id) = session_arg(&args, &ctx) else {
        return Outcome::failure("session retry requires a session id");
    };
    transition_with_signal(&state, id, SessionAction::Retry, None, true).await
}

async fn delete(state: Arc<HostState>, args: Value, ctx: ToolCtx) -> Outcome {
    let Some(id) = session_arg(&args, &ctx) else {
        return Outcome::failure("session delete requires a session id");
    };

    let mut sessions = state.sessions.lock().await;
    let Some(mut record) = sessions.get(id) else {
        return Outcome::failure(format!("no such session: {id}"));
    };
    if record.spec.status.expects_child() {
        // stop before tombstoning; ignore an already-terminal status
        let _ = sessions.transition(id, SessionAction::Stop);
        record = match sessions.get(id) {
            Some(r) => r,
            None => return Outcome::failure(format!("no such session: {id}")),
        };
    }
    record.metadata.deleted_at = Some(epoch_ms());
    if let Err(e) = sessions.persist(record) {
        return Outcome::failure(format!("failed to tombstone session {id}: {e}"));
    }
    drop(sessions);

    supervisor::signal_child(&state.core(), id, libc::SIGTERM).await;
    Outcome::success(json!({"id": id, "deleted": true}))
}

async fn clean(state: Arc<HostState>, _args: Value, _ctx: ToolCtx) -> Outcome {
    let mut sessions = state.sessions.lock().await;
    let doomed: Vec<u64> = sessions
        .list_records(true)
        .into_iter()
        .filter(|r| r.is_deleted())
        .map(|r| r.id())
        .collect();

    for id in &doomed {
        sessions.delete(*id);
        let workspace = state.config.workspace_dir(*id);
        if workspace.exists()
            && let Err(e) = std::fs::remove_dir_all(&workspace)
        {
            warn!(session_id = id, error = %e, "failed to remove workspace");
        }
    }
    if let Err(e) = sessions.save() {
        return Outcome::failure(format!("clean failed: {e}"));
    }
    if sessions.list_ids().is_empty() {
        sessions.reset_counter();
    }
    Outcome::success(json!({"purged": doomed}))
}

async fn logs(state: Arc<HostState>, args: Value, ctx: ToolCtx) -> Outcome {
    let Some(id) = session_arg(&args, &ctx) else {
        return Outcome::failure("session logs requires a session id");
    };
    let tail = super::arg_u64(&args, "tail", 1).unwrap_or(20) as usize;

    let mut sessions = state.sessions.lock().await;
    let Some(record) = sessions.get(id) else {
        return Outcome::failure(format!("no such session: {id}"));
    };
    let messages = &record.spec.messages;
    let rows: Vec<Value> = messages[messages.len().saturating_sub(tail)..]
        .iter()
        .map(|m| {
            let mut preview: String = m.content.chars().take(200).collect();
            if preview.len() < m.content.len() {
                preview.push('…');
            }
            json!({
                "role": m.role,
                "content": preview,
                "name": m.name,
                "tool_call_id": m.tool_call_id,
                "timestamp": m.timestamp,
            })
        })
        .collect();
    Outcome::success(json!({
        "id": id,
        "status": record.spec.status,
        "total": messages.len(),
        "messages": rows,
    }))
}

async fn template_list(state: Arc<HostState>, _args: Value, _ctx: ToolCtx) -> Outcome {
    let mut templates = state.templates.lock().await;
    let rows: Vec<Value> = templates
        .get_all()
        .into_iter()
        .map(|(name, t)| {
            json!({
                "name": name,
                "description": t.spec.description,
                "model": t.spec.model,
                "tools": t.spec.tools.iter().map(|g| g.name().to_string()).collect::<Vec<_>>(),
            })
        })
        .collect();
    Outcome::success(Value::Array(rows))
}

async fn template_show(state: Arc<HostState>, args: Value, _ctx: ToolCtx) -> Outcome {
    let Some(name) = arg_str(&args, "name", 0) else {
        return Outcome::failure("template show requires a template name");
    };
    let mut templates = state.templates.lock().await;
    match templates.get(&name) {
        Some(template) => match serde_json::to_value(&template) {
            Ok(value) => Outcome::success(value),
            Err(e) => Outcome::failure(format!("failed to render template {name}: {e}")),
        },
        None => Outcome::failure(format!("no such template: {name}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_infra::config::Configuration;
    use corral_shared::schemas::session::SessionRecord;

    async fn state_with_session(dir: &std::path::Path, record: SessionRecord) -> Arc<HostState> {
        let config = Configuration::for_home(dir.to_path_buf()).unwrap();
        config.ensure_layout().unwrap();
        let state = Arc::new(HostState::new(config).unwrap());
        state.sessions.lock().await.persist(record).unwrap();
        state
    }

    #[tokio::test]
    async fn list_excludes_soft_deleted_by_default() {
        let tmp = tempfile::tempdir().unwrap();
        let mut deleted = SessionRecord::new(1, "gone", "mock:m");
        deleted.metadata.deleted_at = Some(1);
        let state = state_with_session(tmp.path(), deleted).await;
        state
            .sessions
            .lock()
            .await
            .persist(SessionRecord::new(2, "live", "mock:m"))
            .unwrap();

        let out = list(state.clone(), json!([]), ToolCtx::new(0, "t")).await;
        let Outcome::Success { result } = out else {
            panic!("expected success")
        };
        assert_eq!(result.as_array().unwrap().len(), 1);

        let out = list(state, json!(["--all"]), ToolCtx::new(0, "t")).await;
        let Outcome::Success { result } = out else {
            panic!("expected success")
        };
        assert_eq!(result.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn clean_purges_tombstones_and_resets_the_counter() {
        let tmp = tempfile::tempdir().unwrap();
        let mut doomed = SessionRecord::new(1, "gone", "mock:m");
        doomed.metadata.deleted_at = Some(1);
        let state = state_with_session(tmp.path(), doomed).await;

        let out = clean(state.clone(), json!([]), ToolCtx::new(0, "t")).await;
        assert!(out.is_success());
        let mut sessions = state.sessions.lock().await;
        assert!(sessions.list_ids().is_empty());
        assert_eq!(sessions.generate_id(), 1);
    }
}
