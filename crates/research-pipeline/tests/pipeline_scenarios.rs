//! End-to-end pipeline scenarios against scripted collaborators
//!
//! No network access: models, search and backoff sleeps are all scripted
//! (see `common`).

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::*;
use research_pipeline::state::STATE_FIELDS;
use research_pipeline::{
    CriticAgent, DraftAgent, PipelineConfig, ResearchAgent, ResearchPipeline, ResearchState,
    ResearchTimeBudget, RetryPolicy, SearchError, Stage, StateError, StatePatch,
    StructuredComponents,
};

const QUESTION: &str = "What is quantum entanglement?";

fn components_json() -> String {
    json!({
        "main_answer": "Entanglement is a shared quantum state between particles.",
        "key_points": ["Measurements are correlated", "No faster-than-light signalling"],
        "supporting_evidence": ["Bell test experiments"],
        "limitations": ["Interpretations differ"],
        "sources": ["https://physics.example.org/entanglement", "a textbook"]
    })
    .to_string()
}

fn researcher_model() -> ScriptedModel {
    ScriptedModel::new()
        .on(QUERIES, r#"["quantum entanglement basics", "bell test experiments"]"#)
        .on(
            SUMMARY,
            r#"{"key_facts": ["Entangled particles share one state"], "sources": ["physics.example.org"]}"#,
        )
}

fn drafter_model() -> ScriptedModel {
    ScriptedModel::new()
        .on(DRAFT, "## Quantum entanglement\n\nParticles share a single state.")
        .on(COMPONENTS, components_json())
        .on(REFINE, "## Quantum entanglement\n\nNow with real-world applications.")
}

fn keys(value: &serde_json::Value) -> BTreeSet<String> {
    value.as_object().unwrap().keys().cloned().collect()
}

fn state_fields() -> BTreeSet<String> {
    STATE_FIELDS.iter().map(|f| f.to_string()).collect()
}

// =============================================================================
// Scenarios
// =============================================================================

/// Zero search results for every query yields the canonical no-results summary
#[tokio::test]
async fn test_no_search_results_gives_no_information_summary() {
    let search = ScriptedSearch::empty().shared();
    let pipeline = ResearchPipeline::with_models(
        search.clone(),
        researcher_model().shared(),
        drafter_model().shared(),
        ScriptedModel::always(evaluation_json(8)).shared(),
        PipelineConfig::default(),
    )
    .expect("valid config");

    let state = pipeline.execute(QUESTION, "", false).await;

    let summary = state.structured_summary.as_ref().expect("summary present");
    assert_eq!(summary.summary_text.key_facts, vec!["No information found"]);
    assert!(!summary.processed_successfully);
    assert_eq!(state.research_findings, "No search results found");
    assert_eq!(search.calls().len(), 2);
    assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);
}

/// A model that always scores 9 leaves the draft as the final answer
#[tokio::test]
async fn test_high_scores_keep_draft_as_final_answer() {
    let model = ScriptedModel::always(evaluation_json(9)).shared();
    let pipeline = ResearchPipeline::with_models(
        ScriptedSearch::returning(sample_hits()).shared(),
        model.clone(),
        model.clone(),
        model.clone(),
        PipelineConfig::default(),
    )
    .expect("valid config");

    let state = pipeline.execute(QUESTION, "", false).await;

    let evaluation = state.evaluation.as_ref().expect("evaluation present");
    assert_eq!(evaluation.overall_score, 9);
    assert!(evaluation.revised_answer.is_none());
    assert_eq!(state.final_answer, state.answer_draft);
    assert!(model.prompts_for(REVISE).is_empty());

    let value = state.to_value().unwrap();
    assert!(value["evaluation"].get("revised_answer").is_none());
    // the score JSON is not an answer decomposition
    assert!(matches!(
        state.structured_components,
        Some(StructuredComponents::Invalid(_))
    ));
}

/// A revision of the refined answer wins when its score beats the stored one
#[tokio::test]
async fn test_refinement_adopts_higher_scoring_revision() {
    let config = PipelineConfig::default();
    let researcher = ResearchAgent::new(
        researcher_model().shared(),
        ScriptedSearch::returning(sample_hits()).shared(),
        &config,
    );
    let drafter = DraftAgent::new(drafter_model().shared(), &config);
    let critic = Arc::new(ScriptedCritic::new(vec![
        evaluation(5, Some("First critic revision")),
        evaluation(8, Some("Critic polish of the refined answer")),
    ]));
    let pipeline = stub_pipeline(
        Arc::new(researcher),
        Arc::new(drafter),
        critic.clone(),
        config,
    );

    let run = pipeline
        .execute_traced(QUESTION, "Add real-world applications", true)
        .await;
    let state = run.state;

    assert_eq!(
        run.stages,
        vec![Stage::Research, Stage::Draft, Stage::Critique, Stage::Refine]
    );
    assert_eq!(state.final_answer, "Critic polish of the refined answer");
    assert_eq!(
        state.answer_draft,
        "## Quantum entanglement\n\nNow with real-world applications."
    );
    assert_eq!(state.evaluation.as_ref().unwrap().overall_score, 8);
    assert!(!state.needs_refinement);
    assert_eq!(critic.calls(), 2);
}

/// Without a score improvement the plain refined answer becomes final
#[tokio::test]
async fn test_refinement_keeps_refined_draft_without_improvement() {
    let critic = Arc::new(ScriptedCritic::new(vec![
        evaluation(6, Some("First critic revision")),
        evaluation(6, Some("Second critic revision")),
    ]));
    let pipeline = stub_pipeline(
        Arc::new(StubResearcher::default()),
        Arc::new(StubDrafter::refining_to("Refined with examples")),
        critic.clone(),
        PipelineConfig::default(),
    );

    let state = pipeline.execute(QUESTION, "Give examples", true).await;

    assert_eq!(state.final_answer, "Refined with examples");
    assert_eq!(state.answer_draft, "Refined with examples");
    // the refined answer is what gets re-evaluated
    assert_eq!(
        critic.evaluated_answers(),
        vec![STUB_DRAFT.to_string(), "Refined with examples".to_string()]
    );
}

/// Two transient failures then success: results kept, two delays, no error
#[tokio::test]
async fn test_search_retry_recovers_without_error_entry() {
    let search = ScriptedSearch::returning(sample_hits())
        .then(Err(SearchError::Transient("connection reset".to_string())))
        .then(Err(SearchError::Transient("connection reset".to_string())))
        .shared();
    let sleeper = Arc::new(RecordingSleeper::default());
    let researcher_llm = ScriptedModel::new()
        .on(QUERIES, r#"["entanglement explained"]"#)
        .on(SUMMARY, r#"{"key_facts": ["Shared state"]}"#)
        .shared();

    let pipeline = ResearchPipeline::with_models_and_sleeper(
        search.clone(),
        researcher_llm,
        drafter_model().shared(),
        ScriptedModel::always(evaluation_json(8)).shared(),
        Some(sleeper.clone()),
        PipelineConfig::default(),
    )
    .expect("valid config");

    let state = pipeline.execute(QUESTION, "", false).await;

    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_secs(2), Duration::from_secs(4)]
    );
    assert_eq!(search.queries(), vec!["entanglement explained"; 3]);
    assert!(state
        .research_findings
        .contains("SEARCH QUERY: entanglement explained"));
    assert!(state.research_findings.contains("Bell test experiments"));
    assert!(state.errors.iter().all(|e| !e.contains("Search failed")));
}

/// Failed queries are reported but do not stop the others
#[tokio::test]
async fn test_exhausted_retries_record_error_and_continue() {
    let search = ScriptedSearch::returning(sample_hits())
        .then(Err(SearchError::Timeout))
        .then(Err(SearchError::Timeout))
        .shared();
    let sleeper = Arc::new(RecordingSleeper::default());
    let config = PipelineConfig::default().with_retry_policy(RetryPolicy::new(2));

    let pipeline = ResearchPipeline::with_models_and_sleeper(
        search.clone(),
        researcher_model().shared(),
        drafter_model().shared(),
        ScriptedModel::always(evaluation_json(8)).shared(),
        Some(sleeper.clone()),
        config,
    )
    .expect("valid config");

    let state = pipeline.execute(QUESTION, "", false).await;

    assert_eq!(sleeper.delays(), vec![Duration::from_secs(2)]);
    assert_eq!(
        state.errors,
        vec!["Search failed for query 'quantum entanglement basics': Request timed out"]
    );
    assert!(!state.research_findings.contains("quantum entanglement basics"));
    assert!(state
        .research_findings
        .contains("SEARCH QUERY: bell test experiments"));
}

// =============================================================================
// Routing
// =============================================================================

/// research -> draft -> critique, with the refine stage skipped
#[tokio::test]
async fn test_three_stages_without_refinement() {
    for (feedback, needs_refinement) in [("", false), ("", true), ("Shorter please", false)] {
        let researcher = Arc::new(StubResearcher::default());
        let drafter = Arc::new(StubDrafter::default());
        let critic = Arc::new(ScriptedCritic::scoring(8));
        let pipeline = stub_pipeline(
            researcher.clone(),
            drafter.clone(),
            critic.clone(),
            PipelineConfig::default(),
        );

        let run = pipeline
            .execute_traced(QUESTION, feedback, needs_refinement)
            .await;

        assert_eq!(
            run.stages,
            vec![Stage::Research, Stage::Draft, Stage::Critique]
        );
        assert_eq!(researcher.calls(), 1);
        assert_eq!(drafter.draft_calls(), 1);
        assert_eq!(drafter.refine_calls(), 0);
        assert_eq!(critic.calls(), 1);
        assert_eq!(run.state.final_answer, STUB_DRAFT);
    }
}

/// Feedback plus the refinement flag adds the refine stage
#[tokio::test]
async fn test_four_stages_with_refinement() {
    let researcher = Arc::new(StubResearcher::default());
    let drafter = Arc::new(StubDrafter::default());
    let critic = Arc::new(ScriptedCritic::scoring(8));
    let pipeline = stub_pipeline(
        researcher.clone(),
        drafter.clone(),
        critic.clone(),
        PipelineConfig::default(),
    );

    let run = pipeline
        .execute_traced(QUESTION, "Mention quantum computing", true)
        .await;

    assert_eq!(run.stages.len(), 4);
    assert_eq!(researcher.calls(), 1);
    assert_eq!(drafter.draft_calls(), 1);
    assert_eq!(drafter.refine_calls(), 1);
    // critique runs before refine, then once more on the refined answer
    assert_eq!(critic.calls(), 2);
}

/// A failed refinement keeps the answer and leaves the flag set
#[tokio::test]
async fn test_refinement_failure_is_reported() {
    let pipeline = stub_pipeline(
        Arc::new(StubResearcher::default()),
        Arc::new(StubDrafter::failing_refinement("Invalid feedback")),
        Arc::new(ScriptedCritic::scoring(8)),
        PipelineConfig::default(),
    );

    let state = pipeline.execute(QUESTION, "More detail", true).await;

    assert_eq!(state.final_answer, STUB_DRAFT);
    assert!(state.needs_refinement);
    assert_eq!(state.errors, vec!["Refinement failed: Invalid feedback"]);
}

// =============================================================================
// Degraded paths
// =============================================================================

/// Research slower than its budget is replaced by an error-carrying patch
#[tokio::test]
async fn test_research_over_budget_degrades() {
    let config = PipelineConfig::default().with_research_budget(ResearchTimeBudget::new(
        Duration::from_millis(3),
        Duration::from_millis(1),
    ));
    let researcher = Arc::new(StubResearcher::slow(Duration::from_millis(25)));
    let drafter = DraftAgent::new(drafter_model().shared(), &config);
    let pipeline = stub_pipeline(
        researcher,
        Arc::new(drafter),
        Arc::new(ScriptedCritic::scoring(8)),
        config,
    );

    let state = pipeline.execute(QUESTION, "", false).await;

    assert_eq!(state.research_findings, "");
    assert!(state.structured_summary.is_none());
    assert_eq!(state.errors[0], "Research error: Research took too long");
    // drafting then rejects the empty findings
    assert_eq!(
        state.answer_draft,
        "Error generating answer: Empty research findings"
    );
    assert!(state.errors.contains(&"Empty research findings".to_string()));
}

/// Critic and model failures still end in a complete evaluation
#[tokio::test]
async fn test_critic_model_failure_degrades_to_neutral_evaluation() {
    let config = PipelineConfig::default();
    let critic_llm = ScriptedModel::new()
        .fail_on(EVALUATE, "quota exceeded")
        .on(REVISE, "Revised despite the failed evaluation")
        .shared();
    let pipeline = stub_pipeline(
        Arc::new(StubResearcher::default()),
        Arc::new(StubDrafter::default()),
        Arc::new(CriticAgent::new(critic_llm, &config)),
        config,
    );

    let state = pipeline.execute(QUESTION, "", false).await;

    let evaluation = state.evaluation.as_ref().unwrap();
    assert_eq!(evaluation.overall_score, 5);
    assert_eq!(evaluation.strengths, vec!["Could not properly evaluate"]);
    assert_eq!(state.final_answer, "Revised despite the failed evaluation");
    assert_eq!(state.errors, vec!["Critique error: quota exceeded"]);
}

/// An out-of-range score fails validation and aborts with a failure result
#[tokio::test]
async fn test_invalid_state_aborts_run() {
    let pipeline = stub_pipeline(
        Arc::new(StubResearcher::default()),
        Arc::new(StubDrafter::default()),
        Arc::new(ScriptedCritic::scoring(11)),
        PipelineConfig::default(),
    );

    let run = pipeline.execute_traced(QUESTION, "", false).await;
    let state = run.state;

    assert_eq!(
        run.stages,
        vec![Stage::Research, Stage::Draft, Stage::Critique]
    );
    assert!(state
        .final_answer
        .starts_with("Pipeline execution failed: Invalid state:"));
    assert_eq!(state.answer_draft, state.final_answer);
    assert_eq!(state.errors.len(), 1);
    assert!(state.errors[0].contains("must be between 1 and 10, got 11"));
    assert!(state.evaluation.is_none());
    assert_eq!(state.question, QUESTION);
    assert!(pipeline.history().is_empty());
}

/// An oversized question is trimmed and cut to the limit, then runs normally
#[tokio::test]
async fn test_oversized_question_is_truncated_and_runs() {
    let researcher = Arc::new(StubResearcher::default());
    let pipeline = stub_pipeline(
        researcher.clone(),
        Arc::new(StubDrafter::default()),
        Arc::new(ScriptedCritic::scoring(8)),
        PipelineConfig::default(),
    );
    let question = format!("  {}  ", "q".repeat(501));

    let run = pipeline.execute_traced(&question, "", false).await;

    assert_eq!(run.stages, vec![Stage::Research, Stage::Draft, Stage::Critique]);
    assert_eq!(researcher.calls(), 1);
    assert_eq!(run.state.question, "q".repeat(500));
    assert!(run.state.errors.is_empty(), "unexpected errors: {:?}", run.state.errors);

    let parsed = ResearchState::from_value(run.state.to_value().unwrap()).unwrap();
    assert_eq!(parsed, run.state);
}

/// A blank question fails before any collaborator is called
#[tokio::test]
async fn test_blank_question_fails_fast() {
    let researcher = Arc::new(StubResearcher::default());
    let pipeline = stub_pipeline(
        researcher.clone(),
        Arc::new(StubDrafter::default()),
        Arc::new(ScriptedCritic::scoring(8)),
        PipelineConfig::default(),
    );

    let run = pipeline.execute_traced("   ", "", false).await;

    assert!(run.stages.is_empty());
    assert_eq!(researcher.calls(), 0);
    assert!(run.state.question.is_empty());
    assert!(run
        .state
        .final_answer
        .starts_with("Pipeline execution failed:"));
    assert!(pipeline.history().is_empty());
}

// =============================================================================
// Schema
// =============================================================================

/// Every result carries exactly the state fields, failures included
#[tokio::test]
async fn test_results_have_closed_schema() {
    let good = stub_pipeline(
        Arc::new(StubResearcher::default()),
        Arc::new(StubDrafter::default()),
        Arc::new(ScriptedCritic::scoring(8)),
        PipelineConfig::default(),
    );
    let bad = stub_pipeline(
        Arc::new(StubResearcher::default()),
        Arc::new(StubDrafter::default()),
        Arc::new(ScriptedCritic::scoring(0)),
        PipelineConfig::default(),
    );

    let results = vec![
        good.execute(QUESTION, "", false).await,
        good.execute(QUESTION, "Add history", true).await,
        bad.execute(QUESTION, "", false).await,
        good.execute("", "", false).await,
        good.execute("   ", "", false).await,
        good.execute(&"q".repeat(501), &"f".repeat(1001), true).await,
    ];

    for state in results {
        let value = state.to_value().unwrap();
        assert_eq!(keys(&value), state_fields());
        let parsed = ResearchState::from_value(value).unwrap();
        assert_eq!(parsed, state);
    }
}

/// Patches with fields outside the schema are refused
#[test]
fn test_patch_with_unknown_field_is_rejected() {
    let err = StatePatch::from_value(json!({
        "final_answer": "ok",
        "question": "rewritten"
    }))
    .unwrap_err();
    assert!(matches!(err, StateError::UnknownField(ref f) if f == "question"));

    let state = ResearchState::new(QUESTION, "", false).unwrap();
    let patch = StatePatch::from_value(json!({
        "final_answer": "ok",
        "append_errors": ["first"]
    }))
    .unwrap();
    let next = state.apply(patch).unwrap();
    assert_eq!(next.final_answer, "ok");
    assert_eq!(next.errors, vec!["first"]);
}

// =============================================================================
// History
// =============================================================================

/// History keeps the most recent completed runs up to its capacity
#[tokio::test]
async fn test_history_is_bounded() {
    let pipeline = stub_pipeline(
        Arc::new(StubResearcher::default()),
        Arc::new(StubDrafter::default()),
        Arc::new(ScriptedCritic::scoring(8)),
        PipelineConfig::default().with_history_capacity(2),
    );

    for question in ["First?", "Second?", "Third?"] {
        pipeline.execute(question, "", false).await;
    }

    let history = pipeline.history().snapshot();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].result.question, "Second?");
    assert_eq!(history[1].result.question, "Third?");
    assert_eq!(history[1].stages.len(), 3);
    assert_eq!(
        pipeline.history().latest().unwrap().run_id,
        history[1].run_id
    );
}
