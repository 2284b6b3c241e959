//! Critic agent
//!
//! Scores an answer and, below the revision threshold, rewrites it using its
//! own improvement suggestions.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::prompts;
use crate::config::PipelineConfig;
use crate::extract::{parse_balanced_braces, parse_direct, Strategy};
use crate::llm::LanguageModel;
use crate::state::{Evaluation, StructuredSummary};
use crate::text::truncate_chars;

/// Parsers tried on the evaluation response, in order
const EVALUATION_STRATEGIES: &[(&str, Strategy)] = &[
    ("direct", parse_direct),
    ("balanced_braces", parse_balanced_braces),
];

/// Critic role
#[async_trait]
pub trait Critic: Send + Sync {
    /// Always returns a complete evaluation
    async fn evaluate_answer(
        &self,
        question: &str,
        answer: &str,
        findings: &str,
        summary: Option<&StructuredSummary>,
    ) -> Evaluation;

    /// Revised answer, or `original` with a failure note appended
    async fn revise_answer(
        &self,
        question: &str,
        original: &str,
        suggestions: &[String],
        findings: &str,
        summary: Option<&StructuredSummary>,
    ) -> String;
}

/// Critic backed by a language model
pub struct CriticAgent {
    llm: Arc<dyn LanguageModel>,
    revision_threshold: u8,
    findings_excerpt_chars: usize,
}

impl CriticAgent {
    pub fn new(llm: Arc<dyn LanguageModel>, config: &PipelineConfig) -> Self {
        Self {
            llm,
            revision_threshold: config.revision_threshold,
            findings_excerpt_chars: config.limits.max_summary_input_chars,
        }
    }

    pub fn revision_threshold(&self) -> u8 {
        self.revision_threshold
    }
}

/// Parse a model response into a validated evaluation.
///
/// Falls back to the neutral parse-failure evaluation. A `revised_answer`
/// supplied by the model is never kept.
pub fn parse_evaluation(text: &str) -> Evaluation {
    let mut last_error = None;

    for (name, strategy) in EVALUATION_STRATEGIES {
        let Some(map) = strategy(text) else {
            continue;
        };
        match Evaluation::from_extracted(&map) {
            Ok(evaluation) => {
                debug!(strategy = name, "Parsed evaluation");
                return evaluation;
            }
            Err(reason) => last_error = Some(reason),
        }
    }

    let reason = last_error.unwrap_or_else(|| "no JSON object in response".to_string());
    warn!(%reason, "Could not extract evaluation");
    Evaluation::parse_failed(reason)
}

#[async_trait]
impl Critic for CriticAgent {
    async fn evaluate_answer(
        &self,
        question: &str,
        answer: &str,
        findings: &str,
        summary: Option<&StructuredSummary>,
    ) -> Evaluation {
        let prompt = prompts::evaluate(question, answer, &prompts::summary_text_json(summary));

        let mut evaluation = match self.llm.complete(&prompt).await {
            Ok(text) => parse_evaluation(&text),
            Err(e) => {
                warn!(error = %e, "Evaluation call failed");
                Evaluation::evaluation_failed(e)
            }
        };
        evaluation.revised_answer = None;

        info!(
            overall = evaluation.overall_score,
            threshold = self.revision_threshold,
            "Answer evaluated"
        );

        if evaluation.overall_score < self.revision_threshold {
            let revised = self
                .revise_answer(
                    question,
                    answer,
                    &evaluation.improvement_suggestions,
                    findings,
                    summary,
                )
                .await;
            evaluation.revised_answer = Some(revised);
        }

        evaluation
    }

    async fn revise_answer(
        &self,
        question: &str,
        original: &str,
        suggestions: &[String],
        findings: &str,
        summary: Option<&StructuredSummary>,
    ) -> String {
        let excerpt = truncate_chars(findings, self.findings_excerpt_chars);
        let prompt = prompts::revise(
            question,
            original,
            suggestions,
            &excerpt,
            &prompts::summary_text_json(summary),
        );

        match self.llm.complete(&prompt).await {
            Ok(revised) => revised,
            Err(e) => {
                warn!(error = %e, "Revision failed, keeping original answer");
                format!("{original}\n\n[Note: Automatic revision failed: {e}]")
            }
        }
    }
}
