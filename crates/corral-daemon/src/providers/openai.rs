//! OpenAI-compatible chat-completions adapter.
//!
//! Configured per provider name from the environment: `<NAME>_API_KEY` and
//! `<NAME>_BASE_URL` (either suffices; the default base URL requires a key).
//! Works against any endpoint speaking the `/chat/completions` shape,
//! including local runtimes.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use corral_shared::schemas::chat::{
    AssistantMessage, ChatRequest, ChatResponse, Choice,
};
use corral_shared::schemas::message::{ChatMessage, Role, ToolCall};
use corral_shared::schemas::session::Usage;

use super::{CompletionFuture, Provider};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    provider: String,
}

impl OpenAiProvider {
    pub fn from_env(provider: &str) -> Result<Self> {
        let prefix = provider.to_uppercase().replace('-', "_");
        let api_key = std::env::var(format!("{prefix}_API_KEY")).unwrap_or_default();
        let base_url = std::env::var(format!("{prefix}_BASE_URL")).unwrap_or_default();

        if api_key.is_empty() && base_url.is_empty() {
            bail!(
                "no credentials for provider {provider:?}: set {prefix}_API_KEY or {prefix}_BASE_URL"
            );
        }
        let base_url = if base_url.is_empty() {
            DEFAULT_BASE_URL.to_string()
        } else {
            base_url.trim_end_matches('/').to_string()
        };

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            provider: provider.to_string(),
        })
    }

    async fn run(&self, model: String, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = build_payload(&model, &request);
        debug!(provider = %self.provider, model = %model, "requesting completion");

        let mut call = self.client.post(&url).json(&payload);
        if !self.api_key.is_empty() {
            call = call.bearer_auth(&self.api_key);
        }
        let response = call
            .send()
            .await
            .with_context(|| format!("provider {} is unreachable", self.provider))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!(
                "provider {} returned {status}: {}",
                self.provider,
                body.chars().take(500).collect::<String>()
            );
        }

        let wire: WireResponse = serde_json::from_str(&body)
            .with_context(|| format!("provider {} sent a malformed response", self.provider))?;
        Ok(wire.into())
    }
}

impl Provider for OpenAiProvider {
    fn complete(&self, model: &str, request: &ChatRequest) -> CompletionFuture {
        let this = Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            provider: self.provider.clone(),
        };
        let model = model.to_string();
        let request = request.clone();
        Box::pin(async move { this.run(model, request).await })
    }
}

fn build_payload(model: &str, request: &ChatRequest) -> Value {
    let mut messages = Vec::new();
    if let Some(ref system) = request.system {
        messages.push(json!({"role": "system", "content": system}));
    }
    for message in &request.messages {
        messages.push(wire_message(message));
    }

    let mut payload = json!({"model": model, "messages": messages});
    if !request.tools.is_empty() {
        payload["tools"] = Value::Array(
            request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        },
                    })
                })
                .collect(),
        );
    }
    payload
}

fn wire_message(message: &ChatMessage) -> Value {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
        Role::System => "system",
    };
    let mut wire = json!({"role": role, "content": message.content});
    if let Some(ref id) = message.tool_call_id {
        wire["tool_call_id"] = json!(id);
    }
    if let Some(ref name) = message.name {
        wire["name"] = json!(name);
    }
    if let Some(ref calls) = message.tool_calls {
        wire["tool_calls"] = serde_json::to_value(calls).unwrap_or(Value::Null);
    }
    wire
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl From<WireResponse> for ChatResponse {
    fn from(wire: WireResponse) -> Self {
        Self {
            choices: wire
                .choices
                .into_iter()
                .map(|c| Choice {
                    message: AssistantMessage {
                        content: c.message.content,
                        tool_calls: c.message.tool_calls,
                    },
                    finish_reason: c.finish_reason,
                })
                .collect(),
            usage: wire.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        }
    }
}
