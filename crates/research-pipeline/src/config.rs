//! Pipeline configuration
//!
//! Every tunable the agents and orchestrator read, with defaults that match
//! the production deployment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::PipelineError;
use crate::retry::RetryPolicy;
use crate::search::SearchDepth;
use crate::state::{MAX_FEEDBACK_CHARS, MAX_QUESTION_CHARS};

/// Minimum accepted length of a provider API key
pub const MIN_API_KEY_CHARS: usize = 20;

/// Character limits applied by the agents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_question_chars: usize,
    pub max_feedback_chars: usize,
    /// Budget for the assembled findings document
    pub max_findings_chars: usize,
    /// Findings excerpt handed to summarisation and revision prompts
    pub max_summary_input_chars: usize,
    /// Cap on drafted and refined answers
    pub max_draft_chars: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_question_chars: MAX_QUESTION_CHARS,
            max_feedback_chars: MAX_FEEDBACK_CHARS,
            max_findings_chars: 8000,
            max_summary_input_chars: 4000,
            max_draft_chars: 4000,
        }
    }
}

/// Search behaviour of the research agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub max_results: u32,
    pub depth: SearchDepth,
    /// Upper bound on generated queries per question
    pub max_queries: usize,
    pub base_url: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_results: 7,
            depth: SearchDepth::Advanced,
            max_queries: 5,
            base_url: crate::search::TAVILY_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Soft wall-clock budget checked by the research stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchTimeBudget {
    #[serde(with = "humantime_serde")]
    pub total: Duration,
    #[serde(with = "humantime_serde")]
    pub margin: Duration,
}

impl Default for ResearchTimeBudget {
    fn default() -> Self {
        Self {
            total: Duration::from_secs(300),
            margin: Duration::from_secs(30),
        }
    }
}

impl ResearchTimeBudget {
    pub fn new(total: Duration, margin: Duration) -> Self {
        Self { total, margin }
    }

    /// Elapsed time beyond which a research result is discarded
    pub fn limit(&self) -> Duration {
        self.total.saturating_sub(self.margin)
    }
}

/// Model settings for one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u64,
}

impl ModelSettings {
    pub fn new(model: impl Into<String>, temperature: f64) -> Self {
        Self {
            model: model.into(),
            temperature,
            max_tokens: 4096,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Per-role model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentModels {
    pub researcher: ModelSettings,
    pub drafter: ModelSettings,
    pub critic: ModelSettings,
}

impl Default for AgentModels {
    fn default() -> Self {
        Self {
            researcher: ModelSettings::new("command", 0.2),
            drafter: ModelSettings::new("command", 0.4),
            critic: ModelSettings::new("command", 0.3),
        }
    }
}

/// Top-level pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub limits: Limits,
    pub search: SearchSettings,
    pub retry: RetryPolicy,
    pub research_budget: ResearchTimeBudget,
    /// Completed runs kept in memory
    pub history_capacity: usize,
    /// Overall score below which the critic produces a revision
    pub revision_threshold: u8,
    pub models: AgentModels,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            search: SearchSettings::default(),
            retry: RetryPolicy::default(),
            research_budget: ResearchTimeBudget::default(),
            history_capacity: 20,
            revision_threshold: 7,
            models: AgentModels::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_research_budget(mut self, budget: ResearchTimeBudget) -> Self {
        self.research_budget = budget;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Use the same model name for every agent, keeping their temperatures
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.models.researcher.model = model.clone();
        self.models.drafter.model = model.clone();
        self.models.critic.model = model;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), PipelineError> {
        let limits = [
            ("max_question_chars", self.limits.max_question_chars),
            ("max_feedback_chars", self.limits.max_feedback_chars),
            ("max_findings_chars", self.limits.max_findings_chars),
            ("max_summary_input_chars", self.limits.max_summary_input_chars),
            ("max_draft_chars", self.limits.max_draft_chars),
            ("search.max_queries", self.search.max_queries),
            ("history_capacity", self.history_capacity),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(PipelineError::Config(format!("{name} must be greater than zero")));
        }

        if self.search.max_results == 0 {
            return Err(PipelineError::Config(
                "search.max_results must be greater than zero".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if !(1..=10).contains(&self.revision_threshold) {
            return Err(PipelineError::Config(format!(
                "revision_threshold must be between 1 and 10, got {}",
                self.revision_threshold
            )));
        }

        if self.research_budget.margin >= self.research_budget.total {
            return Err(PipelineError::Config(
                "research_budget.margin must be smaller than research_budget.total".to_string(),
            ));
        }

        for (role, settings) in [
            ("researcher", &self.models.researcher),
            ("drafter", &self.models.drafter),
            ("critic", &self.models.critic),
        ] {
            if settings.model.trim().is_empty() {
                return Err(PipelineError::Config(format!("{role} model name is empty")));
            }
            if !(0.0..=2.0).contains(&settings.temperature) {
                return Err(PipelineError::Config(format!(
                    "{role} temperature must be between 0.0 and 2.0, got {}",
                    settings.temperature
                )));
            }
        }

        Ok(())
    }
}

/// Provider credentials
#[derive(Clone)]
pub struct Credentials {
    pub tavily_api_key: String,
    pub cohere_api_key: String,
}

impl Credentials {
    pub fn new(tavily_api_key: impl Into<String>, cohere_api_key: impl Into<String>) -> Self {
        Self {
            tavily_api_key: tavily_api_key.into(),
            cohere_api_key: cohere_api_key.into(),
        }
    }

    /// Both keys must be at least [`MIN_API_KEY_CHARS`] long
    pub fn validate(&self) -> Result<(), PipelineError> {
        validate_api_key("Tavily", &self.tavily_api_key)?;
        validate_api_key("Cohere", &self.cohere_api_key)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("tavily_api_key", &"<redacted>")
            .field("cohere_api_key", &"<redacted>")
            .finish()
    }
}

/// Reject keys shorter than [`MIN_API_KEY_CHARS`]
pub fn validate_api_key(provider: &'static str, key: &str) -> Result<(), PipelineError> {
    if key.chars().count() < MIN_API_KEY_CHARS {
        return Err(PipelineError::InvalidApiKey(provider));
    }
    Ok(())
}
