//! `human__ask`: question flow with phases `initial` → `awaiting_answer`.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::info;

use corral_infra::tools::{ToolCtx, ToolRegistry};
use corral_shared::outcome::Outcome;

use crate::core::ChildState;

pub const PHASE_INITIAL: &str = "initial";
pub const PHASE_AWAITING_ANSWER: &str = "awaiting_answer";

pub fn register(registry: &mut ToolRegistry, state: Arc<ChildState>) {
    registry.bind_handler(
        "human__ask",
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
        .unwrap_or(PHASE_INITIAL);

    if phase == PHASE_AWAITING_ANSWER {
        let Some(external) = ctx.external_data else {
            return Outcome::running(ctx.state);
        };
        if external.get("answerReceived").and_then(|v| v.as_bool()) != Some(true) {
            return Outcome::running(ctx.state);
        }
        let answer = external
            .get("answer")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        return Outcome::success(answer);
    }

    let Some(question) = super::string_arg(&args, "question") else {
        return Outcome::failure("human__ask requires a question argument");
    };

    info!(
        session_id = ctx.session_id,
        tool_call_id = %ctx.tool_call_id,
        question = %question,
        "asking the operator"
    );
    if let Err(e) = state
        .emit_question_request(&ctx.tool_call_id, &question)
        .await
    {
        return Outcome::failure(format!("failed to forward question: {e}"));
    }
    Outcome::running(json!({
        "phase": PHASE_AWAITING_ANSWER,
        "question": question,
    }))
}
