//! Opina - customer feedback analysis engine
//!
//! Usage:
//!   opina analyze comments.json     Dedupe, plan and analyze a batch
//!   opina dedupe comments.json      Duplicate groups only
//!   opina plan comments.json        Show the batch plan
//!   opina --help                    Show all commands

use anyhow::Result;
use clap::Parser;

use opina::cli::output::OutputMode;
use opina::cli::Cli;
use opina::init::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Tracing to stderr so --json output stays clean
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("opina=info".parse()?),
        )
        .init();

    let mode = OutputMode::from_json_flag(cli.json);

    let mut ctx = AppContext::new(cli.data_path.clone(), cli.config.as_deref())?;
    opina::cli::execute(&cli.command, &mut ctx, mode).await?;

    Ok(())
}
