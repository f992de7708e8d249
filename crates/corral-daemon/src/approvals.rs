//! Host side of the approval/question pipeline.
//!
//! Requests from children become pending records the CLI can list; a human
//! resolution updates the record, reaches the owning child through the
//! bridge, and — for questions — appends the synthetic tool message while
//! the session is still paused.

use anyhow::{Result, anyhow, bail};

use corral_shared::protocol::{
    ApprovalRequestMsg, ApprovalResponseMsg, BridgeMessage, QuestionRequestMsg,
    QuestionResponseMsg,
};
use corral_shared::schemas::approval::{
    ApprovalChoice, ApprovalStatus, QuestionStatus,
};
use corral_shared::schemas::approval::{ApprovalRecord, QuestionRecord};
use corral_shared::schemas::message::ChatMessage;

use crate::bridge;
use crate::core::HostState;

/// Persist a pending approval so the next `save` makes it visible to CLI
/// listings. Returns the allocated id.
pub async fn create_approval(state: &HostState, m: ApprovalRequestMsg) -> u64 {
    let id = state.next_approval_id();
    let record = ApprovalRecord::pending(id, m.session_id, m.tool_call_id, m.kind, m.description);
    let mut approvals = state.approvals.lock().await;
    approvals.set(&id.to_string(), record);
    if let Err(e) = approvals.save() {
        tracing::warn!(approval_id = id, error = %e, "failed to persist approval");
    }
    id
}

pub async fn create_question(state: &HostState, m: QuestionRequestMsg) -> u64 {
    let id = state.next_question_id();
    let record = QuestionRecord::pending(id, m.session_id, m.tool_call_id, m.question);
    let mut questions = state.questions.lock().await;
    questions.set(&id.to_string(), record);
    if let Err(e) = questions.save() {
        tracing::warn!(question_id = id, error = %e, "failed to persist question");
    }
    id
}

/// Resolve a pending approval and forward the verdict to the owning child.
pub async fn resolve_approval(
    state: &HostState,
    id: u64,
    choice: ApprovalChoice,
    explanation: Option<String>,
) -> Result<ApprovalRecord> {
    let record = {
        let mut approvals = state.approvals.lock().await;
        let mut record = approvals
            .get(&id.to_string())
            .ok_or_else(|| anyhow!("no such approval: {id}"))?;
        if record.status != ApprovalStatus::Pending {
            bail!("approval {id} was already resolved to {:?}", record.status);
        }
        record.resolve(choice, explanation.clone());
        approvals.set(&id.to_string(), record.clone());
        approvals.save()?;
        record
    };

    bridge::send_to_container(
        state,
        record.session_id,
        BridgeMessage::ApprovalResponse(ApprovalResponseMsg {
            session_id: record.session_id,
            tool_call_id: record.tool_call_id.clone(),
            approval_id: record.id,
            choice,
            explanation,
        }),
    )
    .await?;
    Ok(record)
}

/// Answer a pending question: persist the answer, append the synthetic
/// `human__ask` tool message (the session is paused, so the log is ours to
/// touch), then forward the answer to the child.
pub async fn answer_question(
    state: &HostState,
    id: u64,
    answer: String,
) -> Result<QuestionRecord> {
    let record = {
        let mut questions = state.questions.lock().await;
        let mut record = questions
            .get(&id.to_string())
            .ok_or_else(|| anyhow!("no such question: {id}"))?;
        if record.status != QuestionStatus::Pending {
            bail!("question {id} was already answered");
        }
        record.answer(answer.clone());
        questions.set(&id.to_string(), record.clone());
        questions.save()?;
        record
    };

    {
        let mut sessions = state.sessions.lock().await;
        let mut session = sessions
            .get(record.session_id)
            .ok_or_else(|| anyhow!("no such session: {}", record.session_id))?;
        session.push_message(ChatMessage::tool(
            record.tool_call_id.clone(),
            "human__ask",
            answer.clone(),
        ));
        sessions.persist(session)?;
    }

    bridge::send_to_container(
        state,
        record.session_id,
        BridgeMessage::QuestionResponse(QuestionResponseMsg {
            session_id: record.session_id,
            tool_call_id: record.tool_call_id.clone(),
            question_id: record.id,
            answer,
        }),
    )
    .await?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_infra::config::Configuration;
    use corral_shared::schemas::message::Role;
    use corral_shared::schemas::session::{SessionRecord, SessionStatus};

    async fn state_with_session(dir: &std::path::Path) -> std::sync::Arc<HostState> {
        let config = Configuration::for_home(dir.to_path_buf()).unwrap();
        config.ensure_layout().unwrap();
        let state = std::sync::Arc::new(HostState::new(config).unwrap());
        let mut record = SessionRecord::new(1, "t", "mock:m");
        record.spec.status = SessionStatus::Paused;
        state.sessions.lock().await.persist(record).unwrap();
        state
    }

    #[tokio::test]
    async fn approval_ids_are_monotonic_and_records_pending() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state_with_session(tmp.path()).await;

        let first = create_approval(
            &state,
            ApprovalRequestMsg {
                session_id: 1,
                tool_call_id: "tc_1".into(),
                kind: "shell__execute".into(),
                description: "git push".into(),
            },
        )
        .await;
        let second = create_approval(
            &state,
            ApprovalRequestMsg {
                session_id: 1,
                tool_call_id: "tc_2".into(),
                kind: "shell__execute".into(),
                description: "git pull".into(),
            },
        )
        .await;
        assert_eq!(second, first + 1);

        let mut approvals = state.approvals.lock().await;
        let record = approvals.get(&first.to_string()).unwrap();
        assert_eq!(record.status, ApprovalStatus::Pending);
        assert_eq!(record.tool_call_id, "tc_1");
    }

    #[tokio::test]
    async fn answering_appends_the_synthetic_tool_message_while_paused() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state_with_session(tmp.path()).await;

        let id = create_question(
            &state,
            QuestionRequestMsg {
                session_id: 1,
                tool_call_id: "tc_q".into(),
                question: "file?".into(),
            },
        )
        .await;

        // no child connection: the forward fails, but the record and the
        // synthetic message must already be in place
        let result = answer_question(&state, id, "foo.txt".into()).await;
        assert!(result.is_err());

        let mut sessions = state.sessions.lock().await;
        let record = sessions.get(1).unwrap();
        let synthetic = record.spec.messages.last().unwrap();
        assert_eq!(synthetic.role, Role::Tool);
        assert_eq!(synthetic.tool_call_id.as_deref(), Some("tc_q"));
        assert_eq!(synthetic.name.as_deref(), Some("human__ask"));
        assert_eq!(synthetic.content, "foo.txt");

        let mut questions = state.questions.lock().await;
        assert_eq!(
            questions.get(&id.to_string()).unwrap().status,
            QuestionStatus::Answered
        );
    }

    #[tokio::test]
    async fn double_resolution_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state_with_session(tmp.path()).await;
        let id = create_approval(
            &state,
            ApprovalRequestMsg {
                session_id: 1,
                tool_call_id: "tc_1".into(),
                kind: "shell__execute".into(),
                description: "rm -rf /".into(),
            },
        )
        .await;

        // resolution updates the record even though the forward fails
        let _ = resolve_approval(&state, id, ApprovalChoice::Reject, None).await;
        let err = resolve_approval(&state, id, ApprovalChoice::Approve, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already resolved"));
    }
}
