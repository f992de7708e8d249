//! `daemon__status` (alias `status`): one-shot health report for the CLI.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Value, json};

use corral_infra::process::is_process_alive;
use corral_infra::tools::{AliasMatch, ToolCtx, ToolRegistry};
use corral_shared::outcome::Outcome;
use corral_shared::schemas::approval::{ApprovalStatus, QuestionStatus};

use crate::core::HostState;

use super::bind;

pub fn register(registry: &mut ToolRegistry, state: Arc<HostState>) {
    bind(registry, "daemon__status", state, status);
    registry.bind_alias(
        "daemon__status",
        Arc::new(|argv: &[String]| {
            (argv.len() == 1 && argv[0] == "status").then(|| AliasMatch {
                name: "daemon__status".to_string(),
                args: json!({}),
            })
        }),
    );
}

async fn status(state: Arc<HostState>, _args: Value, _ctx: ToolCtx) -> Outcome {
    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    let session_total = {
        let mut sessions = state.sessions.lock().await;
        let records = sessions.list_records(false);
        for record in &records {
            *by_status
                .entry(format!("{:?}", record.spec.status).to_uppercase())
                .or_default() += 1;
        }
        records.len()
    };

    let children: Vec<Value> = {
        let children = state.children.lock().await;
        children
            .iter()
            .map(|(session_id, pid)| {
                json!({
                    "session": session_id,
                    "pid": pid,
                    "alive": is_process_alive(*pid),
                })
            })
            .collect()
    };

    let pending_approvals = {
        let mut approvals = state.approvals.lock().await;
        approvals
            .get_all()
            .iter()
            .filter(|(_, a)| a.status == ApprovalStatus::Pending)
            .count()
    };
    let pending_questions = {
        let mut questions = state.questions.lock().await;
        questions
            .get_all()
            .iter()
            .filter(|(_, q)| q.status == QuestionStatus::Pending)
            .count()
    };
    let templates = {
        let templates = state.templates.lock().await;
        templates.list().len()
    };

    Outcome::success(json!({
        "home": state.config.home_dir.to_string_lossy(),
        "pid": std::process::id(),
        "unattended": state.config.settings.unattended,
        "current_session": state.config.settings.current_session,
        "sessions": {"total": session_total, "by_status": by_status},
        "children": children,
        "templates": templates,
        "pending_approvals": pending_approvals,
        "pending_questions": pending_questions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_infra::config::Configuration;
    use corral_shared::schemas::session::{SessionRecord, SessionStatus};

    #[tokio::test]
    async fn status_counts_sessions_by_state() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Configuration::for_home(tmp.path().to_path_buf()).unwrap();
        config.ensure_layout().unwrap();
        let state = Arc::new(HostState::new(config).unwrap());
        {
            let mut sessions = state.sessions.lock().await;
            let mut a = SessionRecord::new(1, "a", "mock:m");
            a.spec.status = SessionStatus::Running;
            sessions.persist(a).unwrap();
            sessions.persist(SessionRecord::new(2, "b", "mock:m")).unwrap();
        }

        let out = status(state, json!({}), ToolCtx::new(0, "t")).await;
        let Outcome::Success { result } = out else {
            panic!("expected success");
        };
        assert_eq!(result["sessions"]["total"], 2);
        assert_eq!(result["sessions"]["by_status"]["RUNNING"], 1);
        assert_eq!(result["sessions"]["by_status"]["PENDING"], 1);
        assert_eq!(result["pending_approvals"], 0);
    }
}
