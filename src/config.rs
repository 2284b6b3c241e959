//! # Configuration Module
//!
//! Loads the CLI configuration from environment variables (and `.env`),
//! validates credentials and turns it into a `ResearchPipeline`.

use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use research_pipeline::config::validate_api_key;
use research_pipeline::state::{MAX_FEEDBACK_CHARS, MAX_QUESTION_CHARS};
use research_pipeline::text::truncate_chars;
use research_pipeline::{
    ollama_model, Credentials, PipelineConfig, ResearchPipeline, TavilyClient,
};

/// Default model when running against a local Ollama server
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

// =============================================================================
// MODEL PROVIDER
// =============================================================================

/// Which backend serves the three agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    #[default]
    Cohere,
    Ollama,
}

impl FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cohere" => Ok(Self::Cohere),
            "ollama" => Ok(Self::Ollama),
            other => anyhow::bail!("LLM_PROVIDER must be `cohere` or `ollama`, got `{other}`"),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cohere => f.write_str("cohere"),
            Self::Ollama => f.write_str("ollama"),
        }
    }
}

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================

/// CLI configuration
#[derive(Clone, Default)]
pub struct Config {
    pub tavily_api_key: String,

    /// Only required for the Cohere provider
    pub cohere_api_key: String,

    pub provider: LlmProvider,

    /// Model name for every agent; provider default when unset
    pub model: Option<String>,

    /// Ollama server URL (default: http://localhost:11434)
    pub ollama_host: String,

    /// Override for the Tavily endpoint
    pub tavily_base_url: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("ollama_host", &self.ollama_host)
            .field("tavily_base_url", &self.tavily_base_url)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Config {
            ollama_host: "http://localhost:11434".to_string(),
            ..Default::default()
        };

        if let Ok(val) = env::var("TAVILY_API_KEY") {
            config.tavily_api_key = val;
        }

        if let Ok(val) = env::var("COHERE_API_KEY") {
            config.cohere_api_key = val;
        }

        if let Ok(val) = env::var("LLM_PROVIDER") {
            config.provider = val.parse().context("Invalid LLM_PROVIDER")?;
        }

        if let Ok(val) = env::var("LLM_MODEL") {
            if !val.trim().is_empty() {
                config.model = Some(val);
            }
        }

        if let Ok(val) = env::var("OLLAMA_API_BASE_URL") {
            config.ollama_host = val;
        }

        if let Ok(val) = env::var("TAVILY_BASE_URL") {
            config.tavily_base_url = Some(val);
        }

        Ok(config)
    }

    /// Fail fast on missing or malformed credentials.
    pub fn validate(&self) -> Result<()> {
        validate_api_key("Tavily", &self.tavily_api_key)?;

        if self.provider == LlmProvider::Cohere {
            validate_api_key("Cohere", &self.cohere_api_key)?;
        }

        if self.provider == LlmProvider::Ollama && self.ollama_host.trim().is_empty() {
            anyhow::bail!("OLLAMA_API_BASE_URL cannot be empty");
        }

        Ok(())
    }

    /// Model name actually used for every agent
    pub fn effective_model(&self) -> Option<String> {
        match (&self.model, self.provider) {
            (Some(model), _) => Some(model.clone()),
            (None, LlmProvider::Ollama) => Some(DEFAULT_OLLAMA_MODEL.to_string()),
            (None, LlmProvider::Cohere) => None,
        }
    }

    /// Pipeline configuration with the CLI overrides applied
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        if let Some(model) = self.effective_model() {
            config = config.with_model(model);
        }
        if let Some(url) = &self.tavily_base_url {
            config.search.base_url = url.clone();
        }
        config
    }

    /// Build the pipeline for the configured provider
    pub fn build_pipeline(&self) -> Result<ResearchPipeline> {
        self.validate()?;
        let config = self.pipeline_config();

        let pipeline = match self.provider {
            LlmProvider::Cohere => {
                let credentials = Credentials::new(&self.tavily_api_key, &self.cohere_api_key);
                ResearchPipeline::from_credentials(&credentials, config)?
            }
            LlmProvider::Ollama => {
                let search = TavilyClient::new(&self.tavily_api_key)
                    .with_base_url(&config.search.base_url)
                    .with_timeout(config.search.timeout);
                let models = config.models.clone();

                // rig's Ollama client reads the server URL from the environment
                env::set_var("OLLAMA_API_BASE_URL", &self.ollama_host);

                ResearchPipeline::with_models(
                    Arc::new(search),
                    ollama_model(&models.researcher),
                    ollama_model(&models.drafter),
                    ollama_model(&models.critic),
                    config,
                )?
            }
        };

        Ok(pipeline)
    }
}

// =============================================================================
// INPUT SANITISATION
// =============================================================================

/// Trimmed question, cut to the question limit
pub fn sanitize_question(question: &str) -> String {
    truncate_chars(question.trim(), MAX_QUESTION_CHARS)
}

/// Trimmed feedback, cut to the feedback limit
pub fn sanitize_feedback(feedback: &str) -> String {
    truncate_chars(feedback.trim(), MAX_FEEDBACK_CHARS)
}

// =============================================================================
// UNIT TESTS
// =============================================================================
