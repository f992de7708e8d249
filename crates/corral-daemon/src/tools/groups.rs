//! Group commands: named session sets with exclusive membership, used only
//! for fan-out.

use std::sync::Arc;

use serde_json::{Value, json};

use corral_infra::tools::{ToolCtx, ToolRegistry};
use corral_shared::outcome::Outcome;
use corral_shared::protocol::CommandMsg;
use corral_shared::schemas::group::GroupRecord;

use crate::core::HostState;
use crate::dispatch;

use super::{arg_str, arg_u64, bind, rest_str};

pub fn register(registry: &mut ToolRegistry, state: Arc<HostState>) {
    bind(registry, "group__create", state.clone(), create);
    bind(registry, "group__add", state.clone(), add);
    bind(registry, "group__remove", state.clone(), remove);
    bind(registry, "group__list", state.clone(), list);
    bind(registry, "group__send", state, send);
}

async fn create(state: Arc<HostState>, args: Value, _ctx: ToolCtx) -> Outcome {
    let Some(name) = arg_str(&args, "name", 0) else {
        return Outcome::failure("group create requires a group name");
    };
    let mut groups = state.groups.lock().await;
    if groups.get(&name).is_some() {
        return Outcome::failure(format!("group {name} already exists"));
    }
    groups.set(&name, GroupRecord::new(&name));
    match groups.save() {
        Ok(()) => Outcome::success(json!({"name": name})),
        Err(e) => Outcome::failure(format!("failed to create group {name}: {e}")),
    }
}

async fn add(state: Arc<HostState>, args: Value, _ctx: ToolCtx) -> Outcome {
    let (Some(name), Some(id)) = (arg_str(&args, "name", 0), arg_u64(&args, "id", 1)) else {
        return Outcome::failure("group add requires a group name and a session id");
    };
    let mut groups = state.groups.lock().await;
    let Some(mut group) = groups.get(&name) else {
        return Outcome::failure(format!("no such group: {name}"));
    };

    // membership is exclusive: leave any other group first
    for (other_name, mut other) in groups.get_all() {
        if other_name != name && other.remove(id) {
            groups.set(&other_name, other);
        }
    }
    group.add(id);
    groups.set(&name, group);
    match groups.save() {
        Ok(()) => Outcome::success(json!({"name": name, "added": id})),
        Err(e) => Outcome::failure(format!("failed to update group {name}: {e}")),
    }
}

async fn remove(state: Arc<HostState>, args: Value, _ctx: ToolCtx) -> Outcome {
    let (Some(name), Some(id)) = (arg_str(&args, "name", 0), arg_u64(&args, "id", 1)) else {
        return Outcome::failure("group remove requires a group name and a session id");
    };
    let mut groups = state.groups.lock().await;
    let Some(mut group) = groups.get(&name) else {
        return Outcome::failure(format!("no such group: {name}"));
    };
    if !group.remove(id) {
        return Outcome::failure(format!("session {id} is not in group {name}"));
    }
    groups.set(&name, group);
    match groups.save() {
        Ok(()) => Outcome::success(json!({"name": name, "removed": id})),
        Err(e) => Outcome::failure(format!("failed to update group {name}: {e}")),
    }
}

async fn list(state: Arc<HostState>, _args: Value, _ctx: ToolCtx) -> Outcome {
    let mut groups = state.groups.lock().await;
    let rows: Vec<Value> = groups
        .get_all()
        .into_iter()
        .map(|(name, g)| json!({"name": name, "sessions": g.sessions}))
        .collect();
    Outcome::success(Value::Array(rows))
}

/// Fan a user message out to every member through the normal command path,
/// so each append happens in the owning child.
async fn send(state: Arc<HostState>, args: Value, _ctx: ToolCtx) -> Outcome {
    let (Some(name), Some(text)) = (arg_str(&args, "name", 0), rest_str(&args, "text", 1)) else {
        return Outcome::failure("group send requires a group name and a message");
    };
    let members = {
        let mut groups = state.groups.lock().await;
        match groups.get(&name) {
            Some(g) => g.sessions,
            None => return Outcome::failure(format!("no such group: {name}")),
        }
    };

    let core = state.core();
    let command = format!("session send {}", json!({ "text": text }));
    let mut results = Vec::new();
    for session_id in members {
        let response = dispatch::execute_command(
            &core,
            CommandMsg {
                message_id: None,
                request_id: None,
                session_id: Some(session_id),
                command: command.clone(),
                wait_for_response: true,
                human: true,
            },
        )
        .await;
        results.push(json!({
            "session": session_id,
            "success": response.success,
            "error": response.error,
        }));
    }
    Outcome::success(Value::Array(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_infra::config::Configuration;

    async fn fresh_state(dir: &std::path::Path) -> Arc<HostState> {
        let config = Configuration::for_home(dir.to_path_buf()).unwrap();
        config.ensure_layout().unwrap();
        Arc::new(HostState::new(config).unwrap())
    }

    #[tokio::test]
    async fn membership_is_exclusive_across_groups() {
        let tmp = tempfile::tempdir().unwrap();
        let state = fresh_state(tmp.path()).await;
        let ctx = ToolCtx::new(0, "t");

        assert!(create(state.clone(), json!(["qa"]), ctx.clone()).await.is_success());
        assert!(create(state.clone(), json!(["dev"]), ctx.clone()).await.is_success());
        assert!(add(state.clone(), json!(["qa", "7"]), ctx.clone()).await.is_success());
        assert!(add(state.clone(), json!(["dev", "7"]), ctx.clone()).await.is_success());

        let mut groups = state.groups.lock().await;
        assert_eq!(groups.get("qa").unwrap().sessions, Vec::<u64>::new());
        assert_eq!(groups.get("dev").unwrap().sessions, vec![7]);
    }
}
