//! `opina plan`: what the optimizer would do with an input.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::cli::output::{output_json, print_header, print_kv, OutputMode};
use crate::init::AppContext;
use crate::services::{NoopProgressObserver, PlanOverrides};

use super::input::read_comments;

pub async fn handle_plan(
    ctx: &AppContext,
    input: Option<&Path>,
    overrides: PlanOverrides,
    mode: OutputMode,
) -> Result<()> {
    let comments = read_comments(input)?;
    let pipeline = ctx.pipeline(Arc::new(NoopProgressObserver));
    let dedup = pipeline.deduplicate(comments).await?;
    let plan = pipeline.plan(&dedup.unique, &overrides);

    if mode == OutputMode::Json {
        output_json(&plan);
        return Ok(());
    }

    print_header("Batch plan");
    print_kv("Comments", &format!("{} (after dedup)", plan.total_comments));
    print_kv("Average length", &format!("{:.0} chars", plan.avg_length));
    print_kv("Profile", &plan.profile.to_string());
    print_kv("Strategy", plan.strategy.as_str());
    print_kv("Batch size", &plan.batch_size.to_string());
    print_kv("Sub-batches", &plan.sub_batch_count().to_string());
    print_kv("Concurrency", &plan.concurrency.to_string());
    print_kv(
        "Factors",
        &format!(
            "length {:.2}, complexity {:.2}, memory {:.2}, learned {:.2}",
            plan.factors.length, plan.factors.complexity, plan.factors.memory, plan.factors.learned
        ),
    );
    Ok(())
}
