//! `session__send`: append a user message to this session's log.
//!
//! Message appends belong to the child, so the command routes here instead
//! of running on the host.

use std::sync::Arc;

use corral_infra::tools::ToolRegistry;
use corral_shared::outcome::Outcome;
use corral_shared::schemas::message::ChatMessage;

use crate::core::ChildState;

pub fn register(registry: &mut ToolRegistry, state: Arc<ChildState>) {
    registry.bind_handler(
        "session__send",
        Arc::new(move |args, _ctx| {
            let state = state.clone();
            Box::pin(async move {
                let Some(text) = super::string_arg(&args, "text") else {
                    return Outcome::failure("session__send requires a message text");
                };
                let mut sessions = state.sessions.lock().await;
                let Some(mut record) = sessions.get(state.session_id) else {
                    return Outcome::failure(format!(
                        "session {} record is missing",
                        state.session_id
                    ));
                };
                record.push_message(ChatMessage::user(&text));
                match sessions.persist(record) {
                    Ok(()) => Outcome::success("message appended"),
                    Err(e) => Outcome::failure(format!("failed to persist message: {e}")),
                }
            })
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    use serde_json::json;

    use corral_infra::allowlist::Allowlist;
    use corral_infra::config::Configuration;
    use corral_infra::sessions::SessionStore;
    use corral_infra::tools::catalog::builtin_metas;
    use corral_infra::tools::{ToolCtx, ToolDef, ToolHandler, ToolRegistry};
    use corral_shared::schemas::message::Role;
    use corral_shared::schemas::session::SessionRecord;
    use corral_shared::utils::cancel::CancelToken;

    use crate::bridge::ChildBridge;
    use crate::core::ChildState;
    use crate::tool_state::ToolStateMap;

    fn handler_for(dir: &std::path::Path, session_id: u64, seed: bool) -> (Arc<ChildState>, ToolHandler) {
        let config = Configuration::for_home(dir.to_path_buf()).unwrap();
        config.ensure_layout().unwrap();
        let mut sessions = SessionStore::open(&config.sessions_dir);
        if seed {
            sessions
                .persist(SessionRecord::new(session_id, "t", "mock:m"))
                .unwrap();
        }
        let state = Arc::new(ChildState {
            session_id,
            sessions: tokio::sync::Mutex::new(sessions),
            bridge: ChildBridge::new(dir.join("unused.sock")),
            tool_states: ToolStateMap::new(),
            cancel: CancelToken::new(),
            pause_requested: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            global_allowlist: Allowlist::default(),
            config,
        });

        let mut registry = ToolRegistry::new();
        for meta in builtin_metas() {
            registry.register(ToolDef::meta_only(meta));
        }
        register(&mut registry, state.clone());
        let handler = registry
            .get("session__send")
            .unwrap()
            .handler
            .clone()
            .unwrap();
        (state, handler)
    }

    #[tokio::test]
    async fn appends_a_user_message_and_persists_it() {
        let tmp = tempfile::tempdir().unwrap();
        let (state, handler) = handler_for(tmp.path(), 1, true);

        let out = handler(json!({"text": "hello there"}), ToolCtx::new(1, "cmd_1")).await;
        assert!(out.is_success());

        let mut sessions = state.sessions.lock().await;
        let record = sessions.get(1).unwrap();
        let last = record.spec.messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "hello there");

        // a fresh store sees the append: it was flushed, not just staged
        let mut reopened = SessionStore::open(&state.config.sessions_dir);
        assert_eq!(reopened.get(1).unwrap().spec.messages.len(), 1);
    }

    #[tokio::test]
    async fn positional_tokens_join_into_the_message() {
        let tmp = tempfile::tempdir().unwrap();
        let (state, handler) = handler_for(tmp.path(), 1, true);

        let out = handler(json!(["fix", "the", "bug"]), ToolCtx::new(1, "cmd_2")).await;
        assert!(out.is_success());

        let mut sessions = state.sessions.lock().await;
        let record = sessions.get(1).unwrap();
        assert_eq!(record.spec.messages.last().unwrap().content, "fix the bug");
    }

    #[tokio::test]
    async fn missing_session_record_is_a_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let (_state, handler) = handler_for(tmp.path(), 7, false);

        let out = handler(json!({"text": "hi"}), ToolCtx::new(7, "cmd_3")).await;
        let Outcome::Failure { error } = out else {
            panic!("expected failure, got {out:?}");
        };
        assert!(error.contains("7"));
        assert!(error.contains("missing"));
    }

    #[tokio::test]
    async fn missing_text_is_a_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let (_state, handler) = handler_for(tmp.path(), 1, true);
        let out = handler(json!({}), ToolCtx::new(1, "cmd_4")).await;
        assert!(matches!(out, Outcome::Failure { .. }));
    }
}
