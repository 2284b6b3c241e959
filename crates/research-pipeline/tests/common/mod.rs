//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use research_pipeline::agents::ResearchResult;
use research_pipeline::{
    AgentError, Critic, DraftOutcome, Drafter, Evaluation, LanguageModel, LlmError,
    PipelineConfig, ResearchPipeline, Researcher, SearchDepth, SearchError, SearchHit,
    SearchProvider, Sleeper, StructuredSummary,
};

// =============================================================================
// Prompt markers
// =============================================================================

pub const QUERIES: &str = "I need to research this question thoroughly";
pub const SUMMARY: &str = "Below are research findings about this question";
pub const DRAFT: &str = "You are an expert answer drafter";
pub const COMPONENTS: &str = "Break the following answer into structured components";
pub const REFINE: &str = "You are refining a research answer";
pub const EVALUATE: &str = "You are an expert research critic";
pub const REVISE: &str = "You are an expert research editor";

// =============================================================================
// Language model
// =============================================================================

struct Route {
    marker: String,
    responses: VecDeque<Result<String, LlmError>>,
}

/// Model that answers by prompt prefix.
///
/// Responses for a marker are consumed in order; the last one repeats.
#[derive(Default)]
pub struct ScriptedModel {
    routes: Mutex<Vec<Route>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same response to every prompt
    pub fn always(response: impl Into<String>) -> Self {
        Self::new().on("", response)
    }

    pub fn on(self, marker: &str, response: impl Into<String>) -> Self {
        self.push(marker, Ok(response.into()))
    }

    pub fn fail_on(self, marker: &str, message: &str) -> Self {
        self.push(marker, Err(LlmError::Provider(message.to_string())))
    }

    fn push(self, marker: &str, response: Result<String, LlmError>) -> Self {
        {
            let mut routes = self.routes.lock().unwrap();
            match routes.iter_mut().find(|r| r.marker == marker) {
                Some(route) => route.responses.push_back(response),
                None => routes.push(Route {
                    marker: marker.to_string(),
                    responses: VecDeque::from([response]),
                }),
            }
        }
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn prompts_for(&self, marker: &str) -> Vec<String> {
        self.prompts()
            .into_iter()
            .filter(|p| p.starts_with(marker))
            .collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let mut routes = self.routes.lock().unwrap();
        let route = routes
            .iter_mut()
            .find(|r| prompt.starts_with(&r.marker))
            .ok_or_else(|| LlmError::Provider("no scripted response".to_string()))?;

        if route.responses.len() > 1 {
            route.responses.pop_front().unwrap()
        } else {
            route.responses.front().cloned().unwrap()
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// =============================================================================
// Search
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCall {
    pub query: String,
    pub max_results: u32,
    pub depth: SearchDepth,
}

/// Search provider that plays back scripted results, then a fixed fallback
#[derive(Default)]
pub struct ScriptedSearch {
    script: Mutex<VecDeque<Result<Vec<SearchHit>, SearchError>>>,
    fallback: Vec<SearchHit>,
    calls: Mutex<Vec<SearchCall>>,
}

impl ScriptedSearch {
    /// No hits for any query
    pub fn empty() -> Self {
        Self::default()
    }

    /// The same hits for every query
    pub fn returning(hits: Vec<SearchHit>) -> Self {
        Self {
            fallback: hits,
            ..Default::default()
        }
    }

    /// Queue a result ahead of the fallback
    pub fn then(self, result: Result<Vec<SearchHit>, SearchError>) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<SearchCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.query).collect()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(
        &self,
        query: &str,
        max_results: u32,
        depth: SearchDepth,
    ) -> Result<Vec<SearchHit>, SearchError> {
        self.calls.lock().unwrap().push(SearchCall {
            query: query.to_string(),
            max_results,
            depth,
        });

        match self.script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(self.fallback.clone()),
        }
    }
}

pub fn sample_hits() -> Vec<SearchHit> {
    vec![
        SearchHit::new(
            "Quantum entanglement - Overview",
            "https://physics.example.org/entanglement",
            "Entangled particles share a single quantum state.",
        ),
        SearchHit::new(
            "Bell test experiments",
            "https://physics.example.org/bell",
            "Loophole-free Bell tests were performed in 2015.",
        ),
    ]
}

// =============================================================================
// Sleeper
// =============================================================================

/// Records requested delays without waiting
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

// =============================================================================
// Role stubs
// =============================================================================

pub const STUB_FINDINGS: &str = "RESEARCH FINDINGS FOR: stub\n\nEntanglement links particles.";
pub const STUB_DRAFT: &str = "## Entanglement\n\nTwo particles share one state.";

/// Researcher returning fixed findings, optionally after a real delay
#[derive(Default)]
pub struct StubResearcher {
    pub calls: AtomicUsize,
    delay: Option<Duration>,
}

impl StubResearcher {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Researcher for StubResearcher {
    async fn research(&self, _question: &str) -> ResearchResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let summary = json!({ "key_facts": ["Entanglement links particles"] });
        ResearchResult {
            research_findings: STUB_FINDINGS.to_string(),
            structured_summary: StructuredSummary::from_extracted(summary.as_object().unwrap()),
            errors: Vec::new(),
        }
    }
}

/// Drafter returning [`STUB_DRAFT`]; refinement succeeds or fails as configured
pub struct StubDrafter {
    pub draft_calls: AtomicUsize,
    pub refine_calls: AtomicUsize,
    refine_result: Result<String, String>,
}

impl Default for StubDrafter {
    fn default() -> Self {
        Self::refining_to("Refined answer")
    }
}

impl StubDrafter {
    pub fn refining_to(refined: &str) -> Self {
        Self {
            draft_calls: AtomicUsize::new(0),
            refine_calls: AtomicUsize::new(0),
            refine_result: Ok(refined.to_string()),
        }
    }

    pub fn failing_refinement(message: &str) -> Self {
        Self {
            refine_result: Err(message.to_string()),
            ..Self::default()
        }
    }

    pub fn draft_calls(&self) -> usize {
        self.draft_calls.load(Ordering::SeqCst)
    }

    pub fn refine_calls(&self) -> usize {
        self.refine_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Drafter for StubDrafter {
    async fn draft_answer(
        &self,
        _question: &str,
        _findings: &str,
        _summary: Option<&StructuredSummary>,
    ) -> DraftOutcome {
        self.draft_calls.fetch_add(1, Ordering::SeqCst);
        DraftOutcome {
            answer_text: STUB_DRAFT.to_string(),
            structured_components: None,
            errors: Vec::new(),
        }
    }

    async fn refine_answer(&self, _draft: &str, _feedback: &str) -> Result<String, AgentError> {
        self.refine_calls.fetch_add(1, Ordering::SeqCst);
        self.refine_result.clone().map_err(AgentError::invalid)
    }
}

/// Critic playing back scripted evaluations; the last one repeats
pub struct ScriptedCritic {
    evaluations: Mutex<VecDeque<Evaluation>>,
    answers: Mutex<Vec<String>>,
}

impl ScriptedCritic {
    pub fn new(evaluations: Vec<Evaluation>) -> Self {
        Self {
            evaluations: Mutex::new(evaluations.into()),
            answers: Mutex::new(Vec::new()),
        }
    }

    /// Every answer gets `overall` with no revision
    pub fn scoring(overall: u8) -> Self {
        Self::new(vec![evaluation(overall, None)])
    }

    /// Answers passed to `evaluate_answer`, in call order
    pub fn evaluated_answers(&self) -> Vec<String> {
        self.answers.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.answers.lock().unwrap().len()
    }
}

#[async_trait]
impl Critic for ScriptedCritic {
    async fn evaluate_answer(
        &self,
        _question: &str,
        answer: &str,
        _findings: &str,
        _summary: Option<&StructuredSummary>,
    ) -> Evaluation {
        self.answers.lock().unwrap().push(answer.to_string());
        let mut evaluations = self.evaluations.lock().unwrap();
        if evaluations.len() > 1 {
            evaluations.pop_front().unwrap()
        } else {
            evaluations.front().cloned().unwrap()
        }
    }

    async fn revise_answer(
        &self,
        _question: &str,
        original: &str,
        _suggestions: &[String],
        _findings: &str,
        _summary: Option<&StructuredSummary>,
    ) -> String {
        format!("revised: {original}")
    }
}

/// Evaluation with all four scores set to `overall`
pub fn evaluation(overall: u8, revised_answer: Option<&str>) -> Evaluation {
    Evaluation {
        accuracy_score: overall,
        completeness_score: overall,
        clarity_score: overall,
        overall_score: overall,
        strengths: vec!["Clear structure".to_string()],
        weaknesses: vec!["Few numbers".to_string()],
        improvement_suggestions: vec!["Add statistics".to_string()],
        revised_answer: revised_answer.map(str::to_string),
        error: None,
    }
}

/// Critic JSON with every score set to `score`
pub fn evaluation_json(score: u8) -> String {
    json!({
        "accuracy_score": score,
        "completeness_score": score,
        "clarity_score": score,
        "overall_score": score,
        "strengths": ["Accurate", "Well sourced"],
        "weaknesses": ["Slightly long"],
        "improvement_suggestions": ["Add a worked example", "Cite a review article"]
    })
    .to_string()
}

pub fn stub_pipeline(
    researcher: Arc<dyn Researcher>,
    drafter: Arc<dyn Drafter>,
    critic: Arc<dyn Critic>,
    config: PipelineConfig,
) -> ResearchPipeline {
    ResearchPipeline::new(researcher, drafter, critic, config).expect("valid config")
}
