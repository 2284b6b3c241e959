//! Draft agent
//!
//! Writes the prose answer from findings and summary, then asks the model for
//! a structured decomposition of that answer.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::prompts;
use crate::config::{Limits, PipelineConfig};
use crate::error::AgentError;
use crate::extract::extract_structured;
use crate::llm::LanguageModel;
use crate::state::{StructuredAnswer, StructuredComponents, StructuredSummary};
use crate::text::{char_len, truncate_chars};

/// Result of drafting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftOutcome {
    pub answer_text: String,
    /// `None` when drafting failed before components were attempted
    pub structured_components: Option<StructuredComponents>,
    pub errors: Vec<String>,
}

impl DraftOutcome {
    fn failed(error: &AgentError) -> Self {
        Self {
            answer_text: format!("Error generating answer: {error}"),
            structured_components: None,
            errors: vec![error.to_string()],
        }
    }
}

/// Drafter role
#[async_trait]
pub trait Drafter: Send + Sync {
    /// Draft an answer; failures come back as an error-text outcome
    async fn draft_answer(
        &self,
        question: &str,
        findings: &str,
        summary: Option<&StructuredSummary>,
    ) -> DraftOutcome;

    /// Rewrite `draft` to incorporate `feedback`
    async fn refine_answer(&self, draft: &str, feedback: &str) -> Result<String, AgentError>;
}

/// Drafter backed by a language model
pub struct DraftAgent {
    llm: Arc<dyn LanguageModel>,
    limits: Limits,
}

impl DraftAgent {
    pub fn new(llm: Arc<dyn LanguageModel>, config: &PipelineConfig) -> Self {
        Self {
            llm,
            limits: config.limits.clone(),
        }
    }

    async fn try_draft(
        &self,
        question: &str,
        findings: &str,
        summary: Option<&StructuredSummary>,
    ) -> Result<DraftOutcome, AgentError> {
        if question.is_empty() || char_len(question) > self.limits.max_question_chars {
            return Err(AgentError::invalid("Invalid question length"));
        }
        if findings.is_empty() {
            return Err(AgentError::invalid("Empty research findings"));
        }

        let findings = truncate_chars(findings, self.limits.max_findings_chars);
        let prompt = prompts::draft(
            question,
            &findings,
            &prompts::summary_json(summary),
            self.limits.max_draft_chars,
        );

        let response = self.llm.complete(&prompt).await?;
        let draft = truncate_chars(&response, self.limits.max_draft_chars);
        debug!(chars = char_len(&draft), "Draft written");

        let (components, errors) = self.structure(&draft).await;

        Ok(DraftOutcome {
            answer_text: draft,
            structured_components: Some(components),
            errors,
        })
    }

    async fn structure(&self, draft: &str) -> (StructuredComponents, Vec<String>) {
        match self.llm.complete(&prompts::components(draft)).await {
            Ok(text) => {
                let map = extract_structured(&text);
                match StructuredAnswer::from_extracted(&map) {
                    Ok(answer) => (StructuredComponents::Answer(answer), Vec::new()),
                    Err(reason) => {
                        warn!(%reason, "Structured components failed validation");
                        (
                            StructuredComponents::invalid(format!(
                                "Invalid structured components: {reason}"
                            )),
                            Vec::new(),
                        )
                    }
                }
            }
            Err(e) => {
                let message = format!("Structured component generation failed: {e}");
                warn!(error = %e, "Structured component call failed");
                (StructuredComponents::invalid(message.clone()), vec![message])
            }
        }
    }
}

#[async_trait]
impl Drafter for DraftAgent {
    async fn draft_answer(
        &self,
        question: &str,
        findings: &str,
        summary: Option<&StructuredSummary>,
    ) -> DraftOutcome {
        match self.try_draft(question, findings, summary).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Drafting failed");
                DraftOutcome::failed(&e)
            }
        }
    }

    async fn refine_answer(&self, draft: &str, feedback: &str) -> Result<String, AgentError> {
        if draft.is_empty() || char_len(draft) > self.limits.max_draft_chars {
            return Err(AgentError::invalid("Invalid draft answer"));
        }
        if feedback.is_empty() || char_len(feedback) > self.limits.max_feedback_chars {
            return Err(AgentError::invalid("Invalid feedback"));
        }

        let prompt = prompts::refine(draft, feedback, self.limits.max_draft_chars);
        let refined = self.llm.complete(&prompt).await?;
        Ok(truncate_chars(&refined, self.limits.max_draft_chars))
    }
}
