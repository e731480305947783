//! `opina analyze`: the full pipeline with a live progress bar.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;

use crate::cli::output::{
    output_json, percent, print_header, print_hint, print_kv, print_success, print_table,
    print_warning, severity_cell, BarObserver, OutputMode,
};
use crate::init::AppContext;
use crate::models::{EngineKind, IntegratedResult};
use crate::services::{
    AnalysisReport, NoopProgressObserver, PlanOverrides, ProcessingStrategy, ProgressObserver,
    SessionControl, WorkflowStrategy,
};

use super::input::read_comments;

#[derive(Debug, Clone, Copy)]
pub struct AnalyzeOptions {
    pub strategy: Option<ProcessingStrategy>,
    pub workflow: Option<WorkflowStrategy>,
    pub concurrency: Option<usize>,
    pub batch_size: Option<usize>,
    pub pause_on_checkpoint: bool,
    pub limit: usize,
}

pub async fn handle_analyze(
    ctx: &mut AppContext,
    input: Option<&Path>,
    options: AnalyzeOptions,
    mode: OutputMode,
) -> Result<()> {
    if let Some(workflow) = options.workflow {
        let mut config = ctx.config.clone();
        config.workflow.strategy = workflow;
        *ctx = AppContext::with_config(ctx.data_path.clone(), config)?;
    }

    let comments = read_comments(input)?;
    let total = comments.len();

    let control = SessionControl::new(!options.pause_on_checkpoint);
    let bar = match mode {
        OutputMode::Human => Some(Arc::new(BarObserver::new(
            total as u64,
            control.clone(),
            options.pause_on_checkpoint,
        ))),
        OutputMode::Json => None,
    };
    let observer: Arc<dyn ProgressObserver> = match &bar {
        Some(bar) => Arc::clone(bar) as Arc<dyn ProgressObserver>,
        None => Arc::new(NoopProgressObserver),
    };

    let ctrl_c = {
        let control = control.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling session");
                control.cancel();
            }
        })
    };

    let overrides = PlanOverrides {
        strategy: options.strategy,
        concurrency: options.concurrency,
        batch_size: options.batch_size,
    };
    let result = ctx.pipeline(observer).run(comments, &control, &overrides).await;
    ctrl_c.abort();
    if let Some(bar) = &bar {
        bar.finish();
    }
    let report = result?;

    match mode {
        OutputMode::Json => output_json(&report),
        OutputMode::Human => print_report(&report, options.limit),
    }
    Ok(())
}

fn label(result: &IntegratedResult, kind: EngineKind) -> String {
    result
        .label(kind)
        .map(str::to_string)
        .unwrap_or_else(|| "-".dimmed().to_string())
}

fn print_report(report: &AnalysisReport, limit: usize) {
    print_header(&format!("Analysis {}", report.session_id));
    let stats = &report.statistics;
    print_kv("Input comments", &report.input_count.to_string());
    print_kv(
        "Unique after dedup",
        &format!(
            "{} ({} groups, {} filtered)",
            report.dedup_stats.unique,
            report.duplicates.len(),
            report.filtered.len()
        ),
    );
    print_kv(
        "Plan",
        &format!(
            "{} x {} comments, {} workers",
            report.plan.strategy, report.plan.batch_size, report.plan.concurrency
        ),
    );
    print_kv(
        "Processed",
        &format!(
            "{} ok, {} failed, {} cancelled",
            stats.processed_count.to_string().green(),
            stats.failed_count.to_string().red(),
            stats.cancelled_count
        ),
    );
    print_kv(
        "Throughput",
        &format!("{:.1}/s over {} ms ({} retries)", stats.throughput, stats.duration_ms, stats.retries),
    );
    if report.partial {
        print_warning("Session was cancelled; results are partial.");
    } else {
        print_success(&format!("Analysed {} comments", report.input_count));
    }

    let rows: Vec<Vec<String>> = report
        .results
        .iter()
        .take(limit)
        .map(|r| {
            vec![
                r.comment_id.clone(),
                label(r, EngineKind::Language),
                label(r, EngineKind::Sentiment),
                label(r, EngineKind::Theme),
                label(r, EngineKind::Emotion),
                percent(r.overall_confidence),
                percent(r.consensus_level),
                severity_cell(r.max_severity()),
                if r.requires_manual_review {
                    "yes".yellow().to_string()
                } else {
                    String::new()
                },
            ]
        })
        .collect();
    print_header("Results");
    print_table(
        &[
            "Comment", "Language", "Sentiment", "Theme", "Emotion", "Confidence", "Consensus",
            "Conflict", "Review",
        ],
        rows,
    );
    if report.results.len() > limit {
        print_hint(&format!(
            "{} more results, use --json for the full report",
            report.results.len() - limit
        ));
    }

    if !report.failed.is_empty() {
        print_header("Failed");
        let rows = report
            .failed
            .iter()
            .take(limit)
            .map(|f| {
                vec![
                    f.comment_id.clone(),
                    f.attempts.to_string(),
                    f.reason.clone(),
                ]
            })
            .collect();
        print_table(&["Comment", "Attempts", "Reason"], rows);
    }

    let review = report.review_count();
    if review > 0 {
        print_hint(&format!("{} results flagged for manual review", review));
    }
}
