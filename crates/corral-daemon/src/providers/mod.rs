//! Provider adapters.
//!
//! Only the request/response contract is interesting here: a completion
//! request goes in, choices with optional tool calls come out. Adapters are
//! selected by the provider half of the `<provider>:<model>` identifier and
//! constructed lazily from environment credentials.

pub mod mock;
pub mod openai;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use corral_shared::model::ModelId;
use corral_shared::schemas::chat::{ChatRequest, ChatResponse};

pub type CompletionFuture = Pin<Box<dyn Future<Output = Result<ChatResponse>> + Send>>;

pub trait Provider: Send + Sync {
    /// `model` is the bare model name, already stripped of the provider part.
    fn complete(&self, model: &str, request: &ChatRequest) -> CompletionFuture;
}

pub struct ProviderRegistry {
    adapters: Mutex<HashMap<String, Arc<dyn Provider>>>,
    mock: Arc<dyn Provider>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            adapters: Mutex::new(HashMap::new()),
            mock: Arc::new(mock::MockProvider),
        }
    }

    /// Select the adapter for a model identifier. `mock` short-circuits as
    /// either half of the id, so test templates like `xai:mock` never touch
    /// the network.
    pub fn resolve(&self, model: &ModelId) -> Result<Arc<dyn Provider>> {
        if model.provider == "mock" || model.model == "mock" {
            return Ok(self.mock.clone());
        }

        let mut adapters = self.adapters.lock().unwrap();
        if let Some(adapter) = adapters.get(&model.provider) {
            return Ok(adapter.clone());
        }
        let adapter: Arc<dyn Provider> = Arc::new(openai::OpenAiProvider::from_env(
            &model.provider,
        )?);
        adapters.insert(model.provider.clone(), adapter.clone());
        Ok(adapter)
    }

    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let model: ModelId = request
            .model
            .parse()
            .with_context(|| format!("bad model identifier {:?}", request.model))?;
        let adapter = self.resolve(&model)?;
        adapter.complete(&model.model, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_shared::schemas::message::ChatMessage;

    #[tokio::test]
    async fn mock_short_circuits_by_either_half() {
        let registry = ProviderRegistry::new();
        let request = ChatRequest {
            model: "xai:mock".into(),
            system: None,
            messages: vec![ChatMessage::user("Ping")],
            tools: vec![],
        };
        let response = registry.complete(&request).await.unwrap();
        assert_eq!(
            response.choices[0].message.content.as_deref(),
            Some("Pong")
        );
    }

    #[tokio::test]
    async fn missing_separator_is_an_error() {
        let registry = ProviderRegistry::new();
        let request = ChatRequest {
            model: "gpt-4o".into(),
            system: None,
            messages: vec![],
            tools: vec![],
        };
        assert!(registry.complete(&request).await.is_err());
    }
}
