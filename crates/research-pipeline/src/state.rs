//! Research state threaded through every pipeline stage
//!
//! The record has a closed field set: deserialisation rejects unknown keys,
//! and stages can only change it through a typed [`StatePatch`]. Merging a
//! patch builds a new record and re-validates it.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;

use crate::error::StateError;
use crate::extract::{string_list, JsonMap};
use crate::text::{char_len, truncate_chars};

/// Longest accepted question
pub const MAX_QUESTION_CHARS: usize = 500;

/// Longest accepted refinement feedback
pub const MAX_FEEDBACK_CHARS: usize = 1000;

/// Top-level keys of a serialised [`ResearchState`]
pub const STATE_FIELDS: [&str; 10] = [
    "question",
    "research_findings",
    "structured_summary",
    "answer_draft",
    "structured_components",
    "evaluation",
    "final_answer",
    "errors",
    "feedback",
    "needs_refinement",
];

/// Keys accepted in a serialised [`StatePatch`]
pub const PATCH_FIELDS: [&str; 8] = [
    "research_findings",
    "structured_summary",
    "answer_draft",
    "structured_components",
    "evaluation",
    "final_answer",
    "needs_refinement",
    "append_errors",
];

/// The six lists of a structured summary
pub const SUMMARY_KEYS: [&str; 6] = [
    "key_facts",
    "statistics",
    "perspectives",
    "consensus",
    "disagreements",
    "sources",
];

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://\S+").expect("valid url regex"))
}

// =============================================================================
// STRUCTURED SUMMARY
// =============================================================================

/// Summary lists produced from research findings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SummaryText {
    pub key_facts: Vec<String>,
    pub statistics: Vec<String>,
    pub perspectives: Vec<String>,
    pub consensus: Vec<String>,
    pub disagreements: Vec<String>,
    pub sources: Vec<String>,
}

impl SummaryText {
    /// Pick the six known lists out of an extracted map; missing keys become
    /// empty lists and anything else is ignored.
    pub fn from_extracted(map: &JsonMap) -> Self {
        let list = |key: &str| map.get(key).map(string_list).unwrap_or_default();
        Self {
            key_facts: list("key_facts"),
            statistics: list("statistics"),
            perspectives: list("perspectives"),
            consensus: list("consensus"),
            disagreements: list("disagreements"),
            sources: list("sources"),
        }
    }

    fn with_key_fact(fact: impl Into<String>) -> Self {
        Self {
            key_facts: vec![fact.into()],
            ..Default::default()
        }
    }
}

/// Summary plus whether summarisation actually ran to completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructuredSummary {
    pub summary_text: SummaryText,
    pub processed_successfully: bool,
}

impl StructuredSummary {
    /// Search returned nothing for any query
    pub fn no_results() -> Self {
        Self {
            summary_text: SummaryText::with_key_fact("No information found"),
            processed_successfully: false,
        }
    }

    /// Summarisation (or research as a whole) failed; `reason` is the only
    /// key fact.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            summary_text: SummaryText::with_key_fact(reason),
            processed_successfully: false,
        }
    }

    /// Successful summarisation from extracted model output
    pub fn from_extracted(map: &JsonMap) -> Self {
        Self {
            summary_text: SummaryText::from_extracted(map),
            processed_successfully: true,
        }
    }
}

// =============================================================================
// STRUCTURED COMPONENTS
// =============================================================================

/// Validated decomposition of a drafted answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructuredAnswer {
    pub main_answer: String,
    pub key_points: Vec<String>,
    #[serde(default)]
    pub supporting_evidence: Vec<String>,
    #[serde(default)]
    pub limitations: Vec<String>,
    /// Only entries that look like http(s) URLs
    #[serde(default)]
    pub sources: Vec<String>,
}

impl StructuredAnswer {
    pub const MIN_MAIN_ANSWER_CHARS: usize = 10;

    /// Validate an extracted map.
    ///
    /// Non-URL sources are dropped without an error, so an empty `sources`
    /// list can mean either "none given" or "all rejected".
    pub fn from_extracted(map: &JsonMap) -> Result<Self, String> {
        let main_answer = match map.get("main_answer") {
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err("main_answer must be a string".to_string()),
            None => return Err("missing field `main_answer`".to_string()),
        };
        if char_len(&main_answer) < Self::MIN_MAIN_ANSWER_CHARS {
            return Err(format!(
                "main_answer must have at least {} characters",
                Self::MIN_MAIN_ANSWER_CHARS
            ));
        }

        let key_points = match map.get("key_points") {
            Some(value @ Value::Array(_)) => string_list(value),
            Some(_) => return Err("key_points must be a list".to_string()),
            None => return Err("missing field `key_points`".to_string()),
        };
        if key_points.is_empty() {
            return Err("key_points must contain at least one item".to_string());
        }

        let list = |key: &str| map.get(key).map(string_list).unwrap_or_default();

        Ok(Self {
            main_answer,
            key_points,
            supporting_evidence: list("supporting_evidence"),
            limitations: list("limitations"),
            sources: list("sources")
                .into_iter()
                .filter(|s| url_re().is_match(s))
                .collect(),
        })
    }
}

/// Marker stored when components could not be produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentsError {
    pub error: String,
}

/// Either a validated answer decomposition or an error marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StructuredComponents {
    Answer(StructuredAnswer),
    Invalid(ComponentsError),
}

impl StructuredComponents {
    pub fn invalid(error: impl Into<String>) -> Self {
        Self::Invalid(ComponentsError {
            error: error.into(),
        })
    }

    pub fn answer(&self) -> Option<&StructuredAnswer> {
        match self {
            Self::Answer(answer) => Some(answer),
            Self::Invalid(_) => None,
        }
    }
}

// =============================================================================
// EVALUATION
// =============================================================================

/// Critic scores and commentary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Evaluation {
    pub accuracy_score: u8,
    pub completeness_score: u8,
    pub clarity_score: u8,
    pub overall_score: u8,
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    pub improvement_suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Evaluation {
    /// Score used when no real evaluation is available
    pub const NEUTRAL_SCORE: u8 = 5;

    fn neutral(strength: &str, weakness: &str, suggestion: &str, error: String) -> Self {
        Self {
            accuracy_score: Self::NEUTRAL_SCORE,
            completeness_score: Self::NEUTRAL_SCORE,
            clarity_score: Self::NEUTRAL_SCORE,
            overall_score: Self::NEUTRAL_SCORE,
            strengths: vec![strength.to_string()],
            weaknesses: vec![weakness.to_string()],
            improvement_suggestions: vec![suggestion.to_string()],
            revised_answer: None,
            error: Some(error),
        }
    }

    /// The model call itself failed
    pub fn evaluation_failed(error: impl fmt::Display) -> Self {
        Self::neutral(
            "Could not properly evaluate",
            "Evaluation failed due to technical error",
            "Please review manually",
            error.to_string(),
        )
    }

    /// The model answered but nothing usable could be parsed out
    pub fn parse_failed(error: impl fmt::Display) -> Self {
        Self::neutral(
            "Could not extract evaluation",
            "Parser error",
            "Review manually",
            error.to_string(),
        )
    }

    /// Validate an extracted map against the evaluation shape.
    ///
    /// Scores may arrive as integers, integral floats or numeric strings.
    /// Unknown keys and any `revised_answer` are ignored.
    pub fn from_extracted(map: &JsonMap) -> Result<Self, String> {
        let strengths = required_list(map, "strengths")?;
        let improvement_suggestions = required_list(map, "improvement_suggestions")?;

        Ok(Self {
            accuracy_score: score(map, "accuracy_score")?,
            completeness_score: score(map, "completeness_score")?,
            clarity_score: score(map, "clarity_score")?,
            overall_score: score(map, "overall_score")?,
            strengths,
            weaknesses: map.get("weaknesses").map(string_list).unwrap_or_default(),
            improvement_suggestions,
            revised_answer: None,
            error: None,
        })
    }

    /// All four scores lie in 1..=10
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("accuracy_score", self.accuracy_score),
            ("completeness_score", self.completeness_score),
            ("clarity_score", self.clarity_score),
            ("overall_score", self.overall_score),
        ] {
            if !(1..=10).contains(&value) {
                return Err(format!("{name} must be between 1 and 10, got {value}"));
            }
        }
        Ok(())
    }
}

fn score(map: &JsonMap, key: &str) -> Result<u8, String> {
    let raw = match map.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
        None => return Err(format!("missing field `{key}`")),
    };
    match raw {
        Some(v) if (1..=10).contains(&v) => Ok(v as u8),
        Some(v) => Err(format!("{key} must be between 1 and 10, got {v}")),
        None => Err(format!("{key} must be an integer")),
    }
}

fn required_list(map: &JsonMap, key: &str) -> Result<Vec<String>, String> {
    let items = map
        .get(key)
        .map(string_list)
        .ok_or_else(|| format!("missing field `{key}`"))?;
    if items.is_empty() {
        return Err(format!("{key} must contain at least one item"));
    }
    Ok(items)
}

// =============================================================================
// STATE
// =============================================================================

/// The record threaded through the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResearchState {
    pub question: String,
    #[serde(default)]
    pub research_findings: String,
    #[serde(default)]
    pub structured_summary: Option<StructuredSummary>,
    #[serde(default)]
    pub answer_draft: String,
    #[serde(default)]
    pub structured_components: Option<StructuredComponents>,
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
    #[serde(default)]
    pub final_answer: String,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub needs_refinement: bool,
}

impl ResearchState {
    /// Build and validate the initial state of a run
    pub fn new(
        question: impl Into<String>,
        feedback: impl Into<String>,
        needs_refinement: bool,
    ) -> Result<Self, StateError> {
        let question = question.into();
        if question.trim().is_empty() {
            return Err(StateError::Invalid("question must not be empty".to_string()));
        }
        let state = Self::blank(question, feedback.into(), needs_refinement);
        state.validate()?;
        Ok(state)
    }

    fn blank(question: String, feedback: String, needs_refinement: bool) -> Self {
        Self {
            question,
            research_findings: String::new(),
            structured_summary: None,
            answer_draft: String::new(),
            structured_components: None,
            evaluation: None,
            final_answer: String::new(),
            errors: Vec::new(),
            feedback,
            needs_refinement,
        }
    }

    /// Schema-complete result for a run that could not complete
    ///
    /// Question and feedback are cut to their limits so the result always
    /// passes [`ResearchState::validate`].
    pub fn failure(
        question: impl Into<String>,
        feedback: impl Into<String>,
        error: impl fmt::Display,
    ) -> Self {
        let question: String = question.into();
        let feedback: String = feedback.into();
        let message = error.to_string();
        let answer = format!("Pipeline execution failed: {message}");
        Self {
            answer_draft: answer.clone(),
            final_answer: answer,
            errors: vec![message],
            ..Self::blank(
                truncate_chars(&question, MAX_QUESTION_CHARS),
                truncate_chars(&feedback, MAX_FEEDBACK_CHARS),
                false,
            )
        }
    }

    /// Merge `patch` into a copy of this state and validate the result
    pub fn apply(&self, patch: StatePatch) -> Result<Self, StateError> {
        let mut next = self.clone();

        if let Some(findings) = patch.research_findings {
            next.research_findings = findings;
        }
        if let Some(summary) = patch.structured_summary {
            next.structured_summary = Some(summary);
        }
        if let Some(draft) = patch.answer_draft {
            next.answer_draft = draft;
        }
        if let Some(components) = patch.structured_components {
            next.structured_components = Some(components);
        }
        if let Some(evaluation) = patch.evaluation {
            next.evaluation = Some(evaluation);
        }
        if let Some(final_answer) = patch.final_answer {
            next.final_answer = final_answer;
        }
        if let Some(flag) = patch.needs_refinement {
            next.needs_refinement = flag;
        }
        next.errors.extend(patch.append_errors);

        next.validate()?;
        Ok(next)
    }

    /// Check field constraints
    ///
    /// An empty question is only refused when a run starts (see
    /// [`ResearchState::new`]); failure results may carry one.
    pub fn validate(&self) -> Result<(), StateError> {
        if char_len(&self.question) > MAX_QUESTION_CHARS {
            return Err(StateError::Invalid(format!(
                "question exceeds {MAX_QUESTION_CHARS} characters"
            )));
        }
        if char_len(&self.feedback) > MAX_FEEDBACK_CHARS {
            return Err(StateError::Invalid(format!(
                "feedback exceeds {MAX_FEEDBACK_CHARS} characters"
            )));
        }
        if let Some(evaluation) = &self.evaluation {
            evaluation.validate().map_err(StateError::Invalid)?;
        }
        Ok(())
    }

    /// The answer shown to the caller
    pub fn displayed_answer(&self) -> &str {
        if self.final_answer.is_empty() {
            &self.answer_draft
        } else {
            &self.final_answer
        }
    }

    /// Parse and validate a serialised state, rejecting unknown keys
    pub fn from_value(value: Value) -> Result<Self, StateError> {
        reject_unknown_keys(&value, &STATE_FIELDS)?;
        let state: Self = serde_json::from_value(value)?;
        state.validate()?;
        Ok(state)
    }

    pub fn to_value(&self) -> Result<Value, StateError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Partial update returned by a stage
///
/// `question` and `feedback` are not patchable. Errors can only be appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_findings: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_summary: Option<StructuredSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_draft: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_components: Option<StructuredComponents>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_refinement: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub append_errors: Vec<String>,
}

impl StatePatch {
    /// Parse a serialised patch, rejecting unknown keys
    pub fn from_value(value: Value) -> Result<Self, StateError> {
        reject_unknown_keys(&value, &PATCH_FIELDS)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn reject_unknown_keys(value: &Value, allowed: &[&str]) -> Result<(), StateError> {
    if let Value::Object(map) = value {
        if let Some(key) = map.keys().find(|k| !allowed.contains(&k.as_str())) {
            return Err(StateError::UnknownField(key.clone()));
        }
    }
    Ok(())
}
