//! rig-backed language models
//!
//! Each agent gets its own rig `Agent` so temperature and token limits stay
//! per role.

use async_trait::async_trait;
use rig::agent::Agent;
use rig::client::{CompletionClient, ProviderClient};
use rig::completion::{CompletionModel, Prompt};
use rig::providers::{cohere, ollama};
use std::sync::Arc;
use tracing::debug;

use super::{LanguageModel, LlmError};
use crate::config::ModelSettings;

/// Adapter from a rig `Agent` to [`LanguageModel`]
pub struct RigLanguageModel<M: CompletionModel> {
    agent: Agent<M>,
    name: String,
}

impl<M: CompletionModel> RigLanguageModel<M> {
    pub fn new(agent: Agent<M>, name: impl Into<String>) -> Self {
        Self {
            agent,
            name: name.into(),
        }
    }
}

#[async_trait]
impl<M> LanguageModel for RigLanguageModel<M>
where
    M: CompletionModel + 'static,
{
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        debug!(model = %self.name, prompt_chars = prompt.chars().count(), "Prompting model");

        let response = self
            .agent
            .prompt(prompt)
            .await
            .map_err(|e| LlmError::Provider(format!("{} completion failed: {}", self.name, e)))?;

        if response.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(response)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Cohere chat model configured with one agent's settings
pub fn cohere_model(api_key: &str, settings: &ModelSettings) -> Arc<dyn LanguageModel> {
    let client = cohere::Client::from_val(api_key.to_string().into());
    let agent = client
        .agent(&settings.model)
        .temperature(settings.temperature)
        .max_tokens(settings.max_tokens)
        .build();

    Arc::new(RigLanguageModel::new(
        agent,
        format!("cohere/{}", settings.model),
    ))
}

/// Local Ollama model configured with one agent's settings
///
/// The server comes from `OLLAMA_API_BASE_URL` (rig's `from_env`), which the
/// caller sets once at startup.
pub fn ollama_model(settings: &ModelSettings) -> Arc<dyn LanguageModel> {
    let client = ollama::Client::from_env();
    let agent = client
        .agent(&settings.model)
        .temperature(settings.temperature)
        .max_tokens(settings.max_tokens)
        .build();

    debug!(model = %settings.model, "Configured Ollama model");

    Arc::new(RigLanguageModel::new(
        agent,
        format!("ollama/{}", settings.model),
    ))
}
