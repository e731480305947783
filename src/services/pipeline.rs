//! End-to-end analysis: validate, normalize, dedupe, plan, process.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{
    Comment, DedupOutcome, DedupStats, DuplicateGroup, FailedComment, IntegratedResult,
    SessionState, SessionStatistics,
};
use crate::services::control::SessionControl;
use crate::services::dedup::DuplicateDetector;
use crate::services::history::SessionSample;
use crate::services::normalizer::TextNormalizer;
use crate::services::optimizer::{BatchOptimizer, BatchPlan, ProcessingStrategy};
use crate::services::processor::BatchProcessor;
use crate::services::resources::{ResourceMonitor, SystemResourceMonitor};
use crate::utils::sanitize::validate_comments;
use crate::OpinaError;

/// Caller overrides applied on top of the computed plan.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlanOverrides {
    pub strategy: Option<ProcessingStrategy>,
    pub concurrency: Option<usize>,
    pub batch_size: Option<usize>,
}

impl PlanOverrides {
    pub fn is_empty(&self) -> bool {
        self.strategy.is_none() && self.concurrency.is_none() && self.batch_size.is_none()
    }

    pub fn apply(&self, plan: BatchPlan) -> BatchPlan {
        let mut plan = plan;
        if let Some(strategy) = self.strategy {
            plan.strategy = strategy;
            if strategy == ProcessingStrategy::Sequential && self.concurrency.is_none() {
                plan.concurrency = 1;
            }
        }
        if let Some(batch_size) = self.batch_size {
            plan.batch_size = batch_size.max(1);
        }
        if let Some(concurrency) = self.concurrency {
            plan.concurrency = concurrency.max(1);
        }
        plan
    }
}

/// Everything the insight/export side needs from one analysis request.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub session_id: Uuid,
    pub state: SessionState,
    pub input_count: usize,
    /// One per analysed comment, in input order
    pub results: Vec<IntegratedResult>,
    pub failed: Vec<FailedComment>,
    pub cancelled: Vec<String>,
    pub duplicates: Vec<DuplicateGroup>,
    pub dedup_stats: DedupStats,
    /// Grouped input id -> id of the comment that was analysed for it
    pub representatives: BTreeMap<String, String>,
    /// Ids dropped as spam or boilerplate
    pub filtered: Vec<String>,
    pub plan: BatchPlan,
    pub statistics: SessionStatistics,
    pub partial: bool,
}

impl AnalysisReport {
    /// Result standing in for any input id, following duplicate groups to
    /// their representative.
    pub fn result_for(&self, input_id: &str) -> Option<&IntegratedResult> {
        let analysed = self
            .representatives
            .get(input_id)
            .map(String::as_str)
            .unwrap_or(input_id);
        self.results.iter().find(|r| r.comment_id == analysed)
    }

    /// Failure record for an input id, following duplicate groups.
    pub fn failure_for(&self, input_id: &str) -> Option<&FailedComment> {
        let analysed = self
            .representatives
            .get(input_id)
            .map(String::as_str)
            .unwrap_or(input_id);
        self.failed.iter().find(|f| f.comment_id == analysed)
    }

    pub fn review_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.requires_manual_review)
            .count()
    }
}

/// Wires the stages together for one request at a time.
pub struct AnalysisPipeline {
    normalizer: TextNormalizer,
    detector: DuplicateDetector,
    optimizer: Arc<BatchOptimizer>,
    processor: BatchProcessor,
    monitor: Arc<dyn ResourceMonitor>,
    record_history: bool,
}

impl AnalysisPipeline {
    pub fn new(
        normalizer: TextNormalizer,
        detector: DuplicateDetector,
        optimizer: Arc<BatchOptimizer>,
        processor: BatchProcessor,
    ) -> Self {
        let monitor: Arc<dyn ResourceMonitor> = Arc::new(SystemResourceMonitor);
        Self {
            normalizer,
            detector,
            processor: processor
                .with_optimizer(Arc::clone(&optimizer))
                .with_monitor(Arc::clone(&monitor)),
            optimizer,
            monitor,
            record_history: true,
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn ResourceMonitor>) -> Self {
        self.processor = self.processor.with_monitor(Arc::clone(&monitor));
        self.monitor = monitor;
        self
    }

    pub fn with_history_recording(mut self, enabled: bool) -> Self {
        self.record_history = enabled;
        self
    }

    pub fn processor(&self) -> &BatchProcessor {
        &self.processor
    }

    pub fn optimizer(&self) -> &Arc<BatchOptimizer> {
        &self.optimizer
    }

    /// Validate and normalize, then run duplicate detection.
    pub async fn deduplicate(&self, comments: Vec<Comment>) -> Result<DedupOutcome, OpinaError> {
        validate_comments(&comments)?;
        let normalized = self.normalizer.normalize_all(comments);
        Ok(self.detector.dedupe(&normalized).await)
    }

    /// Plan the analysis of already deduplicated comments.
    pub fn plan(&self, unique: &[Comment], overrides: &PlanOverrides) -> BatchPlan {
        let kinds = self.processor.workflow().kinds();
        let plan = self.optimizer.plan(unique, kinds, &self.monitor.snapshot());
        if overrides.is_empty() {
            plan
        } else {
            let plan = overrides.apply(plan);
            info!(
                batch_size = plan.batch_size,
                strategy = %plan.strategy,
                concurrency = plan.concurrency,
                "Applied plan overrides"
            );
            plan
        }
    }

    /// Run a full analysis request.
    ///
    /// Only input validation and cancellation before any work started are
    /// errors; everything else is reported per comment.
    pub async fn run(
        &self,
        comments: Vec<Comment>,
        control: &SessionControl,
        overrides: &PlanOverrides,
    ) -> Result<AnalysisReport, OpinaError> {
        let input_count = comments.len();
        let dedup = self.deduplicate(comments).await?;
        if control.is_cancelled() {
            return Err(OpinaError::Cancelled);
        }

        info!(
            input = input_count,
            unique = dedup.unique.len(),
            groups = dedup.groups.len(),
            "Duplicate detection finished"
        );

        let plan = self.plan(&dedup.unique, overrides);
        let outcome = self
            .processor
            .process(dedup.unique.clone(), &plan, control)
            .await;

        let settled = outcome.statistics.processed_count + outcome.statistics.failed_count;
        if self.record_history && !outcome.partial && settled > 0 {
            let history = self.optimizer.history();
            history.record(
                &plan.profile,
                SessionSample {
                    batch_size: plan.batch_size,
                    throughput: outcome.statistics.throughput,
                    failure_rate: outcome.statistics.failed_count as f64 / settled as f64,
                },
            );
            if let Err(e) = history.save() {
                warn!("Failed to persist performance history: {}", e);
            }
        }

        Ok(AnalysisReport {
            session_id: outcome.session_id,
            state: outcome.state,
            input_count,
            results: outcome.results,
            failed: outcome.failed,
            cancelled: outcome.cancelled,
            representatives: dedup.representative_map().into_iter().collect(),
            filtered: dedup.filtered_ids(),
            duplicates: dedup.groups,
            dedup_stats: dedup.stats,
            plan,
            statistics: outcome.statistics,
            partial: outcome.partial,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::EngineRegistry;
    use crate::services::dedup::DedupConfig;
    use crate::services::processor::ProcessorConfig;
    use crate::services::resources::{ResourceSnapshot, StaticResourceMonitor};
    use crate::services::workflow::WorkflowManager;

    fn pipeline() -> AnalysisPipeline {
        let workflow = WorkflowManager::with_defaults(EngineRegistry::builtin()).expect("workflow");
        let processor = BatchProcessor::new(Arc::new(workflow), ProcessorConfig::default());
        AnalysisPipeline::new(
            TextNormalizer::default(),
            DuplicateDetector::new(DedupConfig::default()),
            Arc::new(BatchOptimizer::default()),
            processor,
        )
        .with_monitor(Arc::new(StaticResourceMonitor(ResourceSnapshot {
            cpu_cores: 4,
            ..Default::default()
        })))
    }

    #[tokio::test]
    async fn test_duplicates_map_to_representative_result() {
        let pipeline = pipeline();
        let comments = vec![
            Comment::new("a", "La atención fue excelente, muy amables"),
            Comment::new("b", "La atención fue excelente, muy amables"),
            Comment::new("c", "El precio es muy caro para lo que ofrecen"),
        ];
        let control = SessionControl::default();
        let report = pipeline
            .run(comments, &control, &PlanOverrides::default())
            .await
            .expect("report");

        assert_eq!(report.input_count, 3);
        assert_eq!(report.results.len(), 2);
        let a = report.result_for("a").expect("a analysed");
        let b = report.result_for("b").expect("b mapped");
        assert_eq!(a.comment_id, b.comment_id);
        assert!(report.result_for("c").is_some());
        assert!(!report.partial);
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_rejected() {
        let pipeline = pipeline();
        let comments = vec![Comment::new("a", "uno"), Comment::new("a", "dos")];
        let err = pipeline
            .run(comments, &SessionControl::default(), &PlanOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OpinaError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_is_an_error() {
        let pipeline = pipeline();
        let control = SessionControl::default();
        control.cancel();
        let err = pipeline
            .run(
                vec![Comment::new("a", "Excelente servicio")],
                &control,
                &PlanOverrides::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OpinaError::Cancelled));
    }

    #[test]
    fn test_overrides_replace_plan_values() {
        let pipeline = pipeline();
        let unique: Vec<Comment> = (0..300)
            .map(|i| Comment::new(format!("c{}", i), "texto de prueba"))
            .collect();
        let overrides = PlanOverrides {
            strategy: Some(ProcessingStrategy::Sequential),
            concurrency: None,
            batch_size: Some(25),
        };
        let plan = pipeline.plan(&unique, &overrides);
        assert_eq!(plan.batch_size, 25);
        assert_eq!(plan.strategy, ProcessingStrategy::Sequential);
        assert_eq!(plan.concurrency, 1);
    }
}
