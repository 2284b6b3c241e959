//! Pipeline orchestrator
//!
//! A fixed state machine over four stages:
//!
//! ```text
//! research -> draft -> critique -> [refine] -> end
//! ```
//!
//! Each stage reads the current [`ResearchState`] and returns a
//! [`StatePatch`]; the orchestrator merges and re-validates after every
//! stage. Only a state-shape error aborts a run, and even then `execute`
//! returns a schema-complete failure state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agents::{Critic, CriticAgent, DraftAgent, Drafter, ResearchAgent, Researcher};
use crate::config::{Credentials, PipelineConfig};
use crate::error::{PipelineError, StateError};
use crate::history::{ExecutionHistory, HistoryEntry};
use crate::llm::{cohere_model, LanguageModel};
use crate::retry::Sleeper;
use crate::search::{SearchProvider, TavilyClient};
use crate::state::{
    Evaluation, ResearchState, StatePatch, MAX_FEEDBACK_CHARS, MAX_QUESTION_CHARS,
};
use crate::text::truncate_chars;

// =============================================================================
// STATE MACHINE
// =============================================================================

/// Pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Research,
    Draft,
    Critique,
    Refine,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Research => "research",
            Stage::Draft => "draft",
            Stage::Critique => "critique",
            Stage::Refine => "refine",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicate on the state that selects a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Always,
    /// `needs_refinement` is set and feedback is non-empty
    RefinementRequested,
    NoRefinement,
}

impl Guard {
    pub fn holds(&self, state: &ResearchState) -> bool {
        let requested = state.needs_refinement && !state.feedback.is_empty();
        match self {
            Guard::Always => true,
            Guard::RefinementRequested => requested,
            Guard::NoRefinement => !requested,
        }
    }
}

/// Where a transition leads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Stage(Stage),
    End,
}

/// First stage of every run
pub const ENTRY: Stage = Stage::Research;

/// Transition table, checked top to bottom for the current stage.
///
/// `Draft -> Critique` is unconditional: critique runs even when the run was
/// started with a refinement request.
pub const TRANSITIONS: &[(Stage, Guard, Next)] = &[
    (Stage::Research, Guard::Always, Next::Stage(Stage::Draft)),
    (Stage::Draft, Guard::Always, Next::Stage(Stage::Critique)),
    (Stage::Critique, Guard::RefinementRequested, Next::Stage(Stage::Refine)),
    (Stage::Critique, Guard::NoRefinement, Next::End),
    (Stage::Refine, Guard::Always, Next::End),
];

/// Resolve the transition out of `stage` for `state`
pub fn next_stage(stage: Stage, state: &ResearchState) -> Next {
    TRANSITIONS
        .iter()
        .find(|(from, guard, _)| *from == stage && guard.holds(state))
        .map(|(_, _, next)| *next)
        .unwrap_or(Next::End)
}

// =============================================================================
// ORCHESTRATOR
// =============================================================================

/// Final state plus the stages that ran
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub state: ResearchState,
    pub stages: Vec<Stage>,
}

/// Research → draft → critique → refine orchestrator
pub struct ResearchPipeline {
    researcher: Arc<dyn Researcher>,
    drafter: Arc<dyn Drafter>,
    critic: Arc<dyn Critic>,
    config: PipelineConfig,
    history: ExecutionHistory,
}

impl ResearchPipeline {
    /// Build from role implementations
    pub fn new(
        researcher: Arc<dyn Researcher>,
        drafter: Arc<dyn Drafter>,
        critic: Arc<dyn Critic>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let history = ExecutionHistory::new(config.history_capacity);
        Ok(Self {
            researcher,
            drafter,
            critic,
            config,
            history,
        })
    }

    /// Build model-backed agents from a search provider and one model per role
    pub fn with_models(
        search: Arc<dyn SearchProvider>,
        researcher_llm: Arc<dyn LanguageModel>,
        drafter_llm: Arc<dyn LanguageModel>,
        critic_llm: Arc<dyn LanguageModel>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        Self::with_models_and_sleeper(search, researcher_llm, drafter_llm, critic_llm, None, config)
    }

    /// Like [`with_models`](Self::with_models), with a custom backoff sleeper
    pub fn with_models_and_sleeper(
        search: Arc<dyn SearchProvider>,
        researcher_llm: Arc<dyn LanguageModel>,
        drafter_llm: Arc<dyn LanguageModel>,
        critic_llm: Arc<dyn LanguageModel>,
        sleeper: Option<Arc<dyn Sleeper>>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let mut researcher = ResearchAgent::new(researcher_llm, search, &config);
        if let Some(sleeper) = sleeper {
            researcher = researcher.with_sleeper(sleeper);
        }
        let drafter = DraftAgent::new(drafter_llm, &config);
        let critic = CriticAgent::new(critic_llm, &config);

        Self::new(
            Arc::new(researcher),
            Arc::new(drafter),
            Arc::new(critic),
            config,
        )
    }

    /// Production pipeline: Tavily search and a Cohere model per role
    pub fn from_credentials(
        credentials: &Credentials,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        credentials.validate()?;

        let search = TavilyClient::new(&credentials.tavily_api_key)
            .with_base_url(&config.search.base_url)
            .with_timeout(config.search.timeout);
        let key = &credentials.cohere_api_key;

        Self::with_models(
            Arc::new(search),
            cohere_model(key, &config.models.researcher),
            cohere_model(key, &config.models.drafter),
            cohere_model(key, &config.models.critic),
            config,
        )
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    /// Run the pipeline and return the final state
    pub async fn execute(
        &self,
        question: &str,
        feedback: &str,
        needs_refinement: bool,
    ) -> ResearchState {
        self.execute_traced(question, feedback, needs_refinement)
            .await
            .state
    }

    /// Run the pipeline, also reporting which stages ran
    pub async fn execute_traced(
        &self,
        question: &str,
        feedback: &str,
        needs_refinement: bool,
    ) -> PipelineRun {
        let run_id = Uuid::new_v4();
        let mut stages = Vec::new();
        let limits = &self.config.limits;
        let question = truncate_chars(
            question.trim(),
            limits.max_question_chars.min(MAX_QUESTION_CHARS),
        );
        let feedback = truncate_chars(
            feedback.trim(),
            limits.max_feedback_chars.min(MAX_FEEDBACK_CHARS),
        );
        info!(%run_id, needs_refinement, "Starting pipeline run");

        match self
            .run_graph(run_id, &question, &feedback, needs_refinement, &mut stages)
            .await
        {
            Ok(state) => {
                info!(%run_id, stages = stages.len(), errors = state.errors.len(), "Pipeline run complete");
                self.history
                    .record(HistoryEntry::new(run_id, stages.clone(), state.clone()));
                PipelineRun {
                    run_id,
                    state,
                    stages,
                }
            }
            Err(e) => {
                error!(%run_id, error = %e, "Pipeline run aborted");
                PipelineRun {
                    run_id,
                    state: ResearchState::failure(question, feedback, e),
                    stages,
                }
            }
        }
    }

    async fn run_graph(
        &self,
        run_id: Uuid,
        question: &str,
        feedback: &str,
        needs_refinement: bool,
        stages: &mut Vec<Stage>,
    ) -> Result<ResearchState, StateError> {
        let mut state = ResearchState::new(question, feedback, needs_refinement)?;
        let mut stage = ENTRY;

        loop {
            info!(%run_id, %stage, "Running stage");
            stages.push(stage);

            let patch = self.run_stage(stage, &state).await;
            state = state.apply(patch)?;

            match next_stage(stage, &state) {
                Next::Stage(next) => stage = next,
                Next::End => break,
            }
        }

        Ok(state)
    }

    async fn run_stage(&self, stage: Stage, state: &ResearchState) -> StatePatch {
        match stage {
            Stage::Research => self.research_node(state).await,
            Stage::Draft => self.draft_node(state).await,
            Stage::Critique => self.critique_node(state).await,
            Stage::Refine => self.refine_node(state).await,
        }
    }

    async fn research_node(&self, state: &ResearchState) -> StatePatch {
        let started = Instant::now();
        let result = self.researcher.research(&state.question).await;
        let elapsed = started.elapsed();

        // Observational only: research has already finished at this point.
        if elapsed > self.config.research_budget.limit() {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                limit_ms = self.config.research_budget.limit().as_millis() as u64,
                "Research exceeded its time budget"
            );
            return StatePatch {
                research_findings: Some(String::new()),
                append_errors: vec!["Research error: Research took too long".to_string()],
                ..Default::default()
            };
        }

        StatePatch {
            research_findings: Some(result.research_findings),
            structured_summary: Some(result.structured_summary),
            append_errors: result.errors,
            ..Default::default()
        }
    }

    async fn draft_node(&self, state: &ResearchState) -> StatePatch {
        let outcome = self
            .drafter
            .draft_answer(
                &state.question,
                &state.research_findings,
                state.structured_summary.as_ref(),
            )
            .await;

        StatePatch {
            answer_draft: Some(outcome.answer_text),
            structured_components: outcome.structured_components,
            append_errors: outcome.errors,
            ..Default::default()
        }
    }

    async fn critique_node(&self, state: &ResearchState) -> StatePatch {
        let evaluation = self.evaluate(state, &state.answer_draft).await;
        let final_answer = evaluation
            .revised_answer
            .clone()
            .unwrap_or_else(|| state.answer_draft.clone());

        StatePatch {
            final_answer: Some(final_answer),
            append_errors: critique_errors(&evaluation),
            evaluation: Some(evaluation),
            ..Default::default()
        }
    }

    async fn refine_node(&self, state: &ResearchState) -> StatePatch {
        let current = state.displayed_answer().to_string();

        if state.feedback.is_empty() {
            return StatePatch {
                final_answer: Some(current),
                needs_refinement: Some(false),
                append_errors: vec!["No feedback provided for refinement".to_string()],
                ..Default::default()
            };
        }

        let input = truncate_chars(&current, self.config.limits.max_draft_chars);
        let refined = match self.drafter.refine_answer(&input, &state.feedback).await {
            Ok(refined) => refined,
            Err(e) => {
                warn!(error = %e, "Refinement failed");
                return StatePatch {
                    final_answer: Some(current),
                    needs_refinement: Some(true),
                    append_errors: vec![format!("Refinement failed: {e}")],
                    ..Default::default()
                };
            }
        };

        let evaluation = self.evaluate(state, &refined).await;
        let prior_score = state
            .evaluation
            .as_ref()
            .map(|e| e.overall_score)
            .unwrap_or(0);

        let final_answer = match &evaluation.revised_answer {
            Some(revised) if !revised.is_empty() && evaluation.overall_score > prior_score => {
                info!(
                    prior = prior_score,
                    new = evaluation.overall_score,
                    "Adopting critic revision of refined answer"
                );
                revised.clone()
            }
            _ => refined.clone(),
        };

        StatePatch {
            answer_draft: Some(refined),
            final_answer: Some(final_answer),
            needs_refinement: Some(false),
            append_errors: critique_errors(&evaluation),
            evaluation: Some(evaluation),
            ..Default::default()
        }
    }

    async fn evaluate(&self, state: &ResearchState, answer: &str) -> Evaluation {
        self.critic
            .evaluate_answer(
                &state.question,
                answer,
                &state.research_findings,
                state.structured_summary.as_ref(),
            )
            .await
    }
}

fn critique_errors(evaluation: &Evaluation) -> Vec<String> {
    evaluation
        .error
        .iter()
        .map(|e| format!("Critique error: {e}"))
        .collect()
}
