//! Approval and question surfacing: the human's side of the pipeline.
//!
//! `approve <id> <choice> [explanation…]` and `answer <id> <text…>` are the
//! short CLI spellings, wired in as alias resolvers.

use std::sync::Arc;

use serde_json::{Value, json};

use corral_infra::tools::{AliasMatch, ToolCtx, ToolRegistry};
use corral_shared::outcome::Outcome;
use corral_shared::schemas::approval::{ApprovalChoice, ApprovalStatus, QuestionStatus};

use crate::approvals;
use crate::core::HostState;

use super::{arg_str, arg_u64, bind, rest_str};

pub fn register(registry: &mut ToolRegistry, state: Arc<HostState>) {
    bind(registry, "approval__list", state.clone(), approval_list);
    bind(registry, "approval__resolve", state.clone(), approval_resolve);
    bind(registry, "question__list", state.clone(), question_list);
    bind(registry, "question__answer", state, question_answer);

    registry.bind_alias(
        "approval__resolve",
        Arc::new(|argv: &[String]| {
            (argv.first().map(String::as_str) == Some("approve") && argv.len() >= 2).then(|| {
                AliasMatch {
                    name: "approval__resolve".to_string(),
                    args: json!({
                        "id": argv[1],
                        "choice": argv.get(2).cloned().unwrap_or_else(|| "APPROVE".to_string()),
                        "explanation": (argv.len() > 3).then(|| argv[3..].join(" ")),
                    }),
                }
            })
        }),
    );
    registry.bind_alias(
        "question__answer",
        Arc::new(|argv: &[String]| {
            (argv.first().map(String::as_str) == Some("answer") && argv.len() >= 3).then(|| {
                AliasMatch {
                    name: "question__answer".to_string(),
                    args: json!({
                        "id": argv[1],
                        "answer": argv[2..].join(" "),
                    }),
                }
            })
        }),
    );
}

async fn approval_list(state: Arc<HostState>, _args: Value, _ctx: ToolCtx) -> Outcome {
    let mut approvals = state.approvals.lock().await;
    let rows: Vec<Value> = approvals
        .get_all()
        .into_iter()
        .filter(|(_, a)| a.status == ApprovalStatus::Pending)
        .map(|(_, a)| {
            json!({
                "id": a.id,
                "session": a.session_id,
                "kind": a.kind,
                "description": a.description,
                "created_at": a.created_at,
            })
        })
        .collect();
    Outcome::success(Value::Array(rows))
}

async fn approval_resolve(state: Arc<HostState>, args: Value, _ctx: ToolCtx) -> Outcome {
    let Some(id) = arg_u64(&args, "id", 0) else {
        return Outcome::failure("approve requires an approval id");
    };
    let choice = match arg_str(&args, "choice", 1).as_deref() {
        Some("APPROVE") | None => ApprovalChoice::Approve,
        Some("REJECT") => ApprovalChoice::Reject,
        Some("MODIFY") => ApprovalChoice::Modify,
        Some(other) => {
            return Outcome::failure(format!(
                "unknown choice {other:?}: expected APPROVE, REJECT or MODIFY"
            ));
        }
    };
    let explanation = rest_str(&args, "explanation", 2);

    match approvals::resolve_approval(&state, id, choice, explanation).await {
        Ok(record) => Outcome::success(json!({
            "id": record.id,
            "session": record.session_id,
            "status": record.status,
        })),
        Err(e) => Outcome::failure(e.to_string()),
    }
}

async fn question_list(state: Arc<HostState>, _args: Value, _ctx: ToolCtx) -> Outcome {
    let mut questions = state.questions.lock().await;
    let rows: Vec<Value> = questions
        .get_all()
        .into_iter()
        .filter(|(_, q)| q.status == QuestionStatus::Pending)
        .map(|(_, q)| {
            json!({
                "id": q.id,
                "session": q.session_id,
                "question": q.question,
                "created_at": q.created_at,
            })
        })
        .collect();
    Outcome::success(Value::Array(rows))
}

async fn question_answer(state: Arc<HostState>, args: Value, _ctx: ToolCtx) -> Outcome {
    let Some(id) = arg_u64(&args, "id", 0) else {
        return Outcome::failure("answer requires a question id");
    };
    let Some(answer) = rest_str(&args, "answer", 1) else {
        return Outcome::failure("answer requires the answer text");
    };

    match approvals::answer_question(&state, id, answer).await {
        Ok(record) => Outcome::success(json!({
            "id": record.id,
            "session": record.session_id,
            "status": record.status,
        })),
        Err(e) => Outcome::failure(e.to_string()),
    }
}
