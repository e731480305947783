//! CLI interface for Opina.

pub mod handlers;
pub mod output;

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};

use crate::services::{ProcessingStrategy, WorkflowStrategy};
use output::OutputMode;

/// Opina - customer feedback analysis for Spanish, Guaraní and Jopará
#[derive(Parser)]
#[command(name = "opina", version, about, long_about = None)]
pub struct Cli {
    /// Override data directory (default: ~/.opina)
    #[arg(long, env = "OPINA_DATA_PATH", global = true)]
    pub data_path: Option<PathBuf>,

    /// Config file (default: {data_path}/opina.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze comments: dedupe, plan, run every engine and integrate
    Analyze {
        /// JSON or YAML array of comments (stdin if omitted)
        input: Option<PathBuf>,
        /// Processing strategy: sequential, parallel, distributed, adaptive
        #[arg(long)]
        strategy: Option<ProcessingStrategy>,
        /// Engine invocation: sequential, parallel, cascade, adaptive
        #[arg(long)]
        workflow: Option<WorkflowStrategy>,
        /// Concurrent sub-batches
        #[arg(long)]
        concurrency: Option<usize>,
        /// Comments per sub-batch
        #[arg(long)]
        batch_size: Option<usize>,
        /// Pause at quality checkpoints until Enter is pressed
        #[arg(long)]
        pause_on_checkpoint: bool,
        /// Maximum result rows to print
        #[arg(long, default_value = "30")]
        limit: usize,
    },

    /// Report duplicate groups without analysing
    Dedupe {
        /// JSON or YAML array of comments (stdin if omitted)
        input: Option<PathBuf>,
        /// Override the fuzzy similarity threshold
        #[arg(long)]
        fuzzy_threshold: Option<f64>,
        /// Override the semantic similarity threshold
        #[arg(long)]
        semantic_threshold: Option<f64>,
    },

    /// Show the batch plan the optimizer would use
    Plan {
        /// JSON or YAML array of comments (stdin if omitted)
        input: Option<PathBuf>,
        #[arg(long)]
        strategy: Option<ProcessingStrategy>,
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, elvish, powershell)
        shell: clap_complete::Shell,
    },
}

/// Execute a CLI command.
pub async fn execute(
    command: &Commands,
    ctx: &mut crate::init::AppContext,
    mode: OutputMode,
) -> anyhow::Result<()> {
    match command {
        Commands::Analyze {
            input,
            strategy,
            workflow,
            concurrency,
            batch_size,
            pause_on_checkpoint,
            limit,
        } => {
            let options = handlers::analyze::AnalyzeOptions {
                strategy: *strategy,
                workflow: *workflow,
                concurrency: *concurrency,
                batch_size: *batch_size,
                pause_on_checkpoint: *pause_on_checkpoint,
                limit: *limit,
            };
            handlers::analyze::handle_analyze(ctx, input.as_deref(), options, mode).await?
        }

        Commands::Dedupe {
            input,
            fuzzy_threshold,
            semantic_threshold,
        } => {
            handlers::dedupe::handle_dedupe(
                ctx,
                input.as_deref(),
                *fuzzy_threshold,
                *semantic_threshold,
                mode,
            )
            .await?
        }

        Commands::Plan {
            input,
            strategy,
            concurrency,
            batch_size,
        } => {
            let overrides = crate::services::PlanOverrides {
                strategy: *strategy,
                concurrency: *concurrency,
                batch_size: *batch_size,
            };
            handlers::plan::handle_plan(ctx, input.as_deref(), overrides, mode).await?
        }

        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "opina", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_analyze_flags_parse() {
        let cli = Cli::try_parse_from([
            "opina",
            "--json",
            "analyze",
            "comments.json",
            "--strategy",
            "adaptive",
            "--workflow",
            "cascade",
            "--batch-size",
            "50",
        ])
        .expect("parse");
        assert!(cli.json);
        match cli.command {
            Commands::Analyze {
                strategy,
                workflow,
                batch_size,
                ..
            } => {
                assert_eq!(strategy, Some(ProcessingStrategy::Adaptive));
                assert_eq!(workflow, Some(WorkflowStrategy::Cascade));
                assert_eq!(batch_size, Some(50));
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        assert!(Cli::try_parse_from(["opina", "plan", "--strategy", "warp"]).is_err());
    }
}
