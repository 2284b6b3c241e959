//! Research agent
//!
//! Question → generated search queries → retried searches → budgeted
//! findings document → structured summary. Every failure degrades into the
//! returned [`ResearchResult`]; nothing escapes as an error.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use super::prompts;
use crate::config::{Limits, PipelineConfig, SearchSettings};
use crate::error::AgentError;
use crate::extract::{extract_string_list, extract_structured, is_parse_failure};
use crate::llm::LanguageModel;
use crate::retry::{retry_with_backoff, RetryPolicy, Sleeper, TokioSleeper};
use crate::search::{SearchError, SearchHit, SearchProvider};
use crate::state::StructuredSummary;
use crate::text::{char_len, truncate_chars};

/// Findings text when no query produced any hit
pub const NO_RESULTS_FINDINGS: &str = "No search results found";

const SEPARATOR_WIDTH: usize = 50;

fn leading_question_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(what|how|why|when|where|who|is|are|do|does|can|could|would|should)\s+")
            .expect("valid regex")
    })
}

/// Output of one research pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchResult {
    pub research_findings: String,
    pub structured_summary: StructuredSummary,
    pub errors: Vec<String>,
}

impl ResearchResult {
    /// Canonical result when research could not run at all
    pub fn failed(question: &str, reason: impl std::fmt::Display) -> Self {
        Self {
            research_findings: format!("Research on '{question}' failed"),
            structured_summary: StructuredSummary::failed("Research failed due to technical issues"),
            errors: vec![format!("Research failed: {reason}")],
        }
    }
}

/// Hits returned for one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResults {
    pub query: String,
    pub hits: Vec<SearchHit>,
}

impl QueryResults {
    pub fn new(query: impl Into<String>, hits: Vec<SearchHit>) -> Self {
        Self {
            query: query.into(),
            hits,
        }
    }
}

/// Researcher role
#[async_trait]
pub trait Researcher: Send + Sync {
    async fn research(&self, question: &str) -> ResearchResult;
}

/// Researcher backed by a language model and a search provider
pub struct ResearchAgent {
    llm: Arc<dyn LanguageModel>,
    search: Arc<dyn SearchProvider>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
    settings: SearchSettings,
    limits: Limits,
}

impl ResearchAgent {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            llm,
            search,
            sleeper: Arc::new(TokioSleeper),
            retry: config.retry.clone(),
            settings: config.search.clone(),
            limits: config.limits.clone(),
        }
    }

    /// Replace the backoff sleeper
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn validate_question(&self, question: &str) -> Result<String, AgentError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AgentError::invalid("Question must be a non-empty string"));
        }
        Ok(truncate_chars(question, self.limits.max_question_chars))
    }

    async fn generate_queries(&self, question: &str) -> Vec<String> {
        let prompt = prompts::search_queries(question, self.settings.max_queries);

        let generated = match self.llm.complete(&prompt).await {
            Ok(text) => extract_string_list(&text).unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Query generation failed, using fallback queries");
                Vec::new()
            }
        };

        let mut queries: Vec<String> = generated
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        if queries.is_empty() {
            debug!("No usable generated queries, deriving from question");
            queries = fallback_queries(question);
        }
        queries.truncate(self.settings.max_queries);
        queries
    }

    async fn run_query(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        let search = self.search.as_ref();
        let max_results = self.settings.max_results;
        let depth = self.settings.depth;

        retry_with_backoff(
            &self.retry,
            self.sleeper.as_ref(),
            query,
            |e: &SearchError| e.is_retryable(),
            move || search.search(query, max_results, depth),
        )
        .await
    }

    async fn summarize(&self, question: &str, findings: &str) -> (StructuredSummary, Option<String>) {
        let excerpt = truncate_chars(findings, self.limits.max_summary_input_chars);
        let prompt = prompts::summary(question, &excerpt);

        match self.llm.complete(&prompt).await {
            Ok(text) => {
                let map = extract_structured(&text);
                if is_parse_failure(&map) {
                    warn!("Summary output was unparseable, keeping empty lists");
                }
                (StructuredSummary::from_extracted(&map), None)
            }
            Err(e) => {
                let message = format!("Summary generation failed: {e}");
                warn!(error = %e, "Summary generation failed");
                (StructuredSummary::failed(message.clone()), Some(message))
            }
        }
    }

    async fn try_research(&self, question: &str) -> Result<ResearchResult, AgentError> {
        let question = self.validate_question(question)?;
        let queries = self.generate_queries(&question).await;
        info!(queries = queries.len(), "Running search queries");

        let mut sets = Vec::new();
        let mut errors = Vec::new();

        for query in &queries {
            match self.run_query(query).await {
                Ok(hits) if hits.is_empty() => debug!(query = %query, "Query returned no hits"),
                Ok(hits) => sets.push(QueryResults::new(query.clone(), hits)),
                Err(e) => {
                    warn!(query = %query, error = %e, "Search failed after retries");
                    errors.push(format!("Search failed for query '{query}': {e}"));
                }
            }
        }

        if sets.is_empty() {
            return Ok(ResearchResult {
                research_findings: NO_RESULTS_FINDINGS.to_string(),
                structured_summary: StructuredSummary::no_results(),
                errors,
            });
        }

        let findings = assemble_findings(&question, &sets, self.limits.max_findings_chars);
        debug!(chars = char_len(&findings), sets = sets.len(), "Assembled findings");

        let (summary, summary_error) = self.summarize(&question, &findings).await;
        errors.extend(summary_error);

        Ok(ResearchResult {
            research_findings: findings,
            structured_summary: summary,
            errors,
        })
    }
}

#[async_trait]
impl Researcher for ResearchAgent {
    async fn research(&self, question: &str) -> ResearchResult {
        match self.try_research(question).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Research failed");
                ResearchResult::failed(question, e)
            }
        }
    }
}

/// Deterministic queries used when the model gives none
pub fn fallback_queries(question: &str) -> Vec<String> {
    let lowered = question.to_lowercase();
    let stripped = leading_question_word_re().replace(&lowered, "").into_owned();

    [
        question.to_string(),
        stripped.clone(),
        format!("latest research {stripped}"),
        format!("overview of {stripped}"),
    ]
    .into_iter()
    .filter(|q| !q.trim().is_empty())
    .collect()
}

/// Build the findings document for `sets` within `budget` characters.
///
/// Blocks are appended in order. The first block that does not fit is cut to
/// the remaining space and assembly stops there.
pub fn assemble_findings(question: &str, sets: &[QueryResults], budget: usize) -> String {
    let mut doc = BudgetedText::new(budget);

    if !doc.push(&format!("RESEARCH FINDINGS FOR: {question}\n\n")) {
        return doc.finish();
    }

    'sets: for set in sets {
        if doc.is_full() {
            break;
        }
        let header = format!(
            "SEARCH QUERY: {}\n{}\n\n",
            set.query,
            "=".repeat(SEPARATOR_WIDTH)
        );
        if !doc.push(&header) {
            break;
        }

        for (idx, hit) in set.hits.iter().enumerate() {
            if !doc.push(&render_hit(idx + 1, hit)) {
                break 'sets;
            }
        }

        if !doc.is_full() {
            doc.push(&format!("{}\n\n", "-".repeat(SEPARATOR_WIDTH)));
        }
    }

    doc.finish()
}

fn render_hit(n: usize, hit: &SearchHit) -> String {
    format!(
        "Result {n}:\nTitle: {}\nURL: {}\nContent: {}\n\n",
        hit.title_or_default(),
        hit.url_or_default(),
        hit.content_or_default()
    )
}

/// String builder that never grows past a character budget
struct BudgetedText {
    text: String,
    remaining: usize,
}

impl BudgetedText {
    fn new(budget: usize) -> Self {
        Self {
            text: String::new(),
            remaining: budget,
        }
    }

    /// Append `block`, truncated if needed; false when it did not fit whole
    fn push(&mut self, block: &str) -> bool {
        let len = char_len(block);
        if len <= self.remaining {
            self.text.push_str(block);
            self.remaining -= len;
            true
        } else {
            self.text.push_str(&truncate_chars(block, self.remaining));
            self.remaining = 0;
            false
        }
    }

    fn is_full(&self) -> bool {
        self.remaining == 0
    }

    fn finish(self) -> String {
        self.text
    }
}
