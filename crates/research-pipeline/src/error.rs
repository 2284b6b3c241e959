//! Error types shared across the pipeline
//!
//! Provider-specific errors live next to their traits (`llm::LlmError`,
//! `search::SearchError`); this module holds the agent, state and
//! pipeline level errors.

use thiserror::Error;

use crate::llm::LlmError;

/// Errors raised inside an agent before or while calling the model
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl AgentError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// State-shape errors: the only class of error allowed to abort a run
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Invalid state: unknown field `{0}`")]
    UnknownField(String),

    #[error("Invalid state: {0}")]
    Invalid(String),

    #[error("Invalid state: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Pipeline construction and top-level errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid {0} API key format")]
    InvalidApiKey(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    State(#[from] StateError),
}
