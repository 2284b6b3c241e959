//! # Vetted Research
//!
//! Command-line shell around the research pipeline: a question goes in,
//! a researched, drafted and critiqued markdown answer comes out.
//!
//! ## Quick Start
//! ```bash
//! export TAVILY_API_KEY=... COHERE_API_KEY=...
//! cargo run -- "What is quantum entanglement?"
//!
//! # Second pass with reader feedback
//! cargo run -- "What is quantum entanglement?" --feedback "Add real-world applications"
//! ```

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// Environment configuration and pipeline construction
mod config;

// =============================================================================
// IMPORTS
// =============================================================================
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use research_pipeline::ResearchState;

use crate::config::{sanitize_feedback, sanitize_question, Config};

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "vetted-research",
    version,
    about = "Research a question on the web, draft an answer and have it critiqued",
    long_about = r#"
Vetted Research - research, draft, critique, refine.

The pipeline:
  1. Generates search queries and searches the web (Tavily)
  2. Drafts a markdown answer from the findings
  3. Scores the answer and revises it when the score is low
  4. Optionally refines the answer with your feedback

ENVIRONMENT:
  TAVILY_API_KEY        Tavily search key (required)
  COHERE_API_KEY        Cohere key (required for the cohere provider)
  LLM_PROVIDER          cohere (default) or ollama
  LLM_MODEL             Model name for every agent
  OLLAMA_API_BASE_URL   Ollama server (default http://localhost:11434)

EXAMPLES:
  vetted-research "How do vaccines train the immune system?"
  vetted-research --feedback "Mention mRNA vaccines" "How do vaccines work?"
  vetted-research --json "What is CRISPR?" > answer.json
"#
)]
struct Args {
    /// The question to research
    #[arg(value_name = "QUESTION")]
    question: String,

    /// Reader feedback; runs the refinement stage after critique
    #[arg(short = 'f', long = "feedback")]
    feedback: Option<String>,

    /// Print the whole result as JSON
    #[arg(long = "json", default_value = "false")]
    json: bool,

    /// Model name for every agent (overrides LLM_MODEL)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    verbose: bool,
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // .env has to be loaded before the filter reads RUST_LOG
    let mut config = Config::from_env()?;
    init_logging(args.verbose)?;

    if let Some(model) = args.model {
        info!(model = %model, "Using model from command line");
        config.model = Some(model);
    }

    let pipeline = config
        .build_pipeline()
        .context("Could not set up the research pipeline")?;

    info!(
        provider = %config.provider,
        model = config.effective_model().as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    let question = sanitize_question(&args.question);
    if question.is_empty() {
        anyhow::bail!("The question cannot be empty");
    }

    let state = match args.feedback.as_deref().map(sanitize_feedback) {
        Some(feedback) if !feedback.is_empty() => {
            info!("Running research with refinement");
            pipeline.execute(&question, &feedback, true).await
        }
        _ => {
            info!("Running research");
            pipeline.execute(&question, "", false).await
        }
    };

    if !state.errors.is_empty() {
        warn!(count = state.errors.len(), "Pipeline finished with errors");
    }

    if args.json {
        let json = serde_json::to_string_pretty(&state).context("Failed to serialize result")?;
        println!("{json}");
    } else {
        print_report(&state);
    }

    Ok(())
}

// =============================================================================
// OUTPUT
// =============================================================================
fn print_report(state: &ResearchState) {
    println!("\n{}", "=".repeat(60));
    println!("ANSWER");
    println!("{}\n", "=".repeat(60));
    println!("{}", state.displayed_answer());

    if let Some(evaluation) = &state.evaluation {
        println!("\n{}", "-".repeat(60));
        println!(
            "Scores: overall {}/10 (accuracy {}, completeness {}, clarity {})",
            evaluation.overall_score,
            evaluation.accuracy_score,
            evaluation.completeness_score,
            evaluation.clarity_score
        );
        for strength in &evaluation.strengths {
            println!("  + {strength}");
        }
        for weakness in &evaluation.weaknesses {
            println!("  - {weakness}");
        }
    }

    if !state.errors.is_empty() {
        println!("\n{}", "-".repeat(60));
        println!("Issues encountered:");
        for error in &state.errors {
            println!("  ! {error}");
        }
    }

    println!("\n{}", "=".repeat(60));
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise INFO, or DEBUG with `--verbose`.
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
