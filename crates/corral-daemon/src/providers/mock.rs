//! Deterministic adapter for tests and `*:mock` templates.

use corral_shared::schemas::chat::{AssistantMessage, ChatRequest, ChatResponse, Choice};
use corral_shared::schemas::message::Role;
use corral_shared::schemas::session::Usage;

use super::{CompletionFuture, Provider};

pub struct MockProvider;

impl Provider for MockProvider {
    fn complete(&self, _model: &str, request: &ChatRequest) -> CompletionFuture {
        let content = match request.messages.last() {
            Some(last) if last.role == Role::Tool => "done".to_string(),
            Some(last) if last.content == "Ping" => "Pong".to_string(),
            Some(last) => format!("ack: {}", last.content),
            None => String::new(),
        };
        let approx_tokens = |text: &str| (text.len() / 4) as u64;
        let prompt_tokens: u64 = request
            .messages
            .iter()
            .map(|m| approx_tokens(&m.content))
            .sum();
        let completion_tokens = approx_tokens(&content);
        let response = ChatResponse {
            choices: vec![Choice {
                message: AssistantMessage {
                    content: Some(content),
                    tool_calls: None,
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
        };
        Box::pin(async move { Ok(response) })
    }
}
