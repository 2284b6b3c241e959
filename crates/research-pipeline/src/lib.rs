//! research-pipeline: vetted answers from a research → draft → critique loop
//!
//! Three role agents share one closed-schema state record:
//! - `Researcher`: generated queries, retried web search, budgeted findings,
//!   structured summary
//! - `Drafter`: markdown answer plus validated structured components
//! - `Critic`: four scores and commentary, revision below the threshold
//!
//! `ResearchPipeline` runs them as a fixed state machine with one optional
//! refinement pass, validating the state after every stage.
//!
//! ```rust,ignore
//! use research_pipeline::{Credentials, PipelineConfig, ResearchPipeline};
//!
//! let credentials = Credentials::new(tavily_key, cohere_key);
//! let pipeline = ResearchPipeline::from_credentials(&credentials, PipelineConfig::default())?;
//!
//! let first = pipeline.execute("What is quantum entanglement?", "", false).await;
//! let refined = pipeline
//!     .execute("What is quantum entanglement?", "Add real-world applications", true)
//!     .await;
//! ```

pub mod agents;
pub mod config;
pub mod error;
pub mod extract;
pub mod history;
pub mod llm;
pub mod pipeline;
pub mod retry;
pub mod search;
pub mod state;
pub mod text;

// Re-exports for convenience
pub use agents::{
    Critic, CriticAgent, DraftAgent, DraftOutcome, Drafter, ResearchAgent, ResearchResult,
    Researcher,
};
pub use config::{
    AgentModels, Credentials, Limits, ModelSettings, PipelineConfig, ResearchTimeBudget,
    SearchSettings,
};
pub use error::{AgentError, PipelineError, StateError};
pub use extract::{extract_structured, JsonMap, PARSE_FAILURE};
pub use history::{ExecutionHistory, HistoryEntry};
pub use llm::{cohere_model, ollama_model, LanguageModel, LlmError, RigLanguageModel};
pub use pipeline::{next_stage, Guard, Next, PipelineRun, ResearchPipeline, Stage, TRANSITIONS};
pub use retry::{retry_with_backoff, Backoff, RetryPolicy, Sleeper, TokioSleeper};
pub use search::{SearchDepth, SearchError, SearchHit, SearchProvider, TavilyClient};
pub use state::{
    ComponentsError, Evaluation, ResearchState, StatePatch, StructuredAnswer,
    StructuredComponents, StructuredSummary, SummaryText,
};
