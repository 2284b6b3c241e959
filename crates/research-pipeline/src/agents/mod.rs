//! The three pipeline roles: researcher, drafter, critic
//!
//! Each role is a trait so the orchestrator can run against scripted
//! collaborators; the `*Agent` types are the model-backed implementations.

pub mod critic;
pub mod drafter;
pub mod prompts;
pub mod researcher;

pub use critic::{parse_evaluation, Critic, CriticAgent};
pub use drafter::{DraftAgent, DraftOutcome, Drafter};
pub use researcher::{
    assemble_findings, fallback_queries, QueryResults, ResearchAgent, ResearchResult, Researcher,
    NO_RESULTS_FINDINGS,
};
