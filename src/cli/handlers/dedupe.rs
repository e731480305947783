//! `opina dedupe`: duplicate groups only.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use crate::cli::output::{create_spinner, output_json, print_header, print_kv, print_table, OutputMode};
use crate::init::AppContext;
use crate::models::{DedupStats, DuplicateGroup};
use crate::services::{DedupThresholds, TextNormalizer};
use crate::utils::sanitize::validate_comments;

use super::input::read_comments;

#[derive(Serialize)]
struct DedupeReport<'a> {
    unique_ids: Vec<&'a str>,
    passthrough_ids: &'a [String],
    groups: &'a [DuplicateGroup],
    stats: &'a DedupStats,
}

pub async fn handle_dedupe(
    ctx: &AppContext,
    input: Option<&Path>,
    fuzzy_threshold: Option<f64>,
    semantic_threshold: Option<f64>,
    mode: OutputMode,
) -> Result<()> {
    let comments = read_comments(input)?;
    validate_comments(&comments)?;

    let detector = ctx.detector();
    let mut thresholds = DedupThresholds::from(detector.config());
    if let Some(fuzzy) = fuzzy_threshold {
        thresholds.fuzzy = fuzzy.clamp(0.0, 1.0);
    }
    if let Some(semantic) = semantic_threshold {
        thresholds.semantic = semantic.clamp(0.0, 1.0);
    }

    let spinner = (mode == OutputMode::Human)
        .then(|| create_spinner(&format!("Checking {} comments for duplicates...", comments.len())));
    let normalized = TextNormalizer::new(ctx.config.normalizer.clone()).normalize_all(comments);
    let outcome = detector.dedupe_with(&normalized, thresholds).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if mode == OutputMode::Json {
        output_json(&DedupeReport {
            unique_ids: outcome.unique.iter().map(|c| c.id.as_str()).collect(),
            passthrough_ids: &outcome.passthrough_ids,
            groups: &outcome.groups,
            stats: &outcome.stats,
        });
        return Ok(());
    }

    print_header("Duplicate detection");
    print_kv("Input", &outcome.stats.input.to_string());
    print_kv("Unique", &outcome.stats.unique.to_string().green().to_string());
    print_kv("Passed through", &outcome.stats.passthrough.to_string());
    print_kv("Filtered spam", &outcome.stats.filtered_spam.to_string());
    print_kv("Took", &format!("{} ms", outcome.stats.duration_ms));

    let rows = outcome
        .groups
        .iter()
        .map(|g| {
            vec![
                g.stage.as_str().to_string(),
                g.len().to_string(),
                g.representative
                    .clone()
                    .unwrap_or_else(|| "(filtered)".red().to_string()),
                format!("{:?}", g.policy),
                format!("{:.2}", g.similarity),
                g.member_ids.join(", "),
            ]
        })
        .collect();
    print_header("Groups");
    print_table(
        &["Stage", "Size", "Representative", "Policy", "Similarity", "Members"],
        rows,
    );
    Ok(())
}
