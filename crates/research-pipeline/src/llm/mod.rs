//! Language model abstraction
//!
//! Agents talk to a `LanguageModel`: one prompt in, one completion out.
//! Production models are rig agents (see [`providers`]); tests script their
//! own implementations.

mod providers;

pub use providers::{cohere_model, ollama_model, RigLanguageModel};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from a language model call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("{0}")]
    Provider(String),

    #[error("Model returned an empty response")]
    EmptyResponse,
}

/// A text completion model
///
/// Implementations must be shareable across the agents of one pipeline.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a single prompt
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// Provider/model name for logging
    fn name(&self) -> &str;
}
