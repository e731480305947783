//! Batch execution: sub-batches under bounded concurrency, retry with
//! backoff, progress reporting and the failure-rate checkpoint.
//!
//! Per-item failures never escape: they are recorded against the affected
//! comment and the session carries on.

use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{
    BatchSession, Comment, FailedComment, IntegratedResult, ProgressCounters, SessionState,
    SessionStatistics, SubBatch, SubBatchState,
};
use crate::services::control::SessionControl;
use crate::services::optimizer::{BatchOptimizer, BatchPlan, ProcessingStrategy, RuntimeMetrics};
use crate::services::progress::{noop_observer, ProgressObserver, ProgressUpdate, QualityCheckpoint};
use crate::services::resources::{ResourceMonitor, SystemResourceMonitor};
use crate::services::workflow::WorkflowManager;
use crate::WorkflowError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Retries of a sub-batch after an upstream failure
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Failure rate that trips the quality checkpoint
    pub failure_rate_threshold: f64,
    /// Settled comments required before the checkpoint is evaluated
    pub checkpoint_min_settled: usize,
    /// Comments handed to the workflow per call within a sub-batch
    pub chunk_size: usize,
    /// Record checkpoints without pausing (unattended runs)
    pub auto_acknowledge: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 200,
            backoff_max_ms: 10_000,
            failure_rate_threshold: 0.05,
            checkpoint_min_settled: 20,
            chunk_size: 16,
            auto_acknowledge: false,
        }
    }
}

impl ProcessorConfig {
    /// Delay before retry number `attempt` (1-based): doubled each time,
    /// capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let ms = self
            .backoff_base_ms
            .saturating_mul(1u64 << exponent)
            .min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }
}

/// Everything a session produced, handed to the insight/export side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOutcome {
    pub session_id: Uuid,
    pub state: SessionState,
    /// In input order
    pub results: Vec<IntegratedResult>,
    pub failed: Vec<FailedComment>,
    /// Comments never analysed because the session was cancelled
    pub cancelled: Vec<String>,
    pub sub_batches: Vec<SubBatch>,
    pub statistics: SessionStatistics,
    /// Cancelled before every comment settled
    pub partial: bool,
}

// ============================================================================
// Sub-batch worker
// ============================================================================

#[derive(Debug)]
struct SubBatchReport {
    index: usize,
    attempts: u32,
    state: SubBatchState,
    results: Vec<(usize, IntegratedResult)>,
    failed: Vec<(usize, FailedComment)>,
    cancelled: Vec<(usize, String)>,
}

impl SubBatchReport {
    fn new(index: usize) -> Self {
        Self {
            index,
            attempts: 0,
            state: SubBatchState::Running,
            results: Vec::new(),
            failed: Vec::new(),
            cancelled: Vec::new(),
        }
    }

    fn settled(&self) -> usize {
        self.results.len() + self.failed.len()
    }

    fn failure_rate(&self) -> f64 {
        if self.settled() == 0 {
            0.0
        } else {
            self.failed.len() as f64 / self.settled() as f64
        }
    }
}

/// State cloned into every spawned sub-batch task.
#[derive(Clone)]
struct Worker {
    workflow: Arc<WorkflowManager>,
    config: ProcessorConfig,
    progress: Arc<ProgressCounters>,
    cancel: CancellationToken,
    session_id: Uuid,
}

impl Worker {
    fn fail_rest(
        &self,
        report: &mut SubBatchReport,
        sub: &SubBatch,
        comments: &[Comment],
        from: usize,
        reason: &str,
    ) {
        self.fail_range(report, sub, comments, from, comments.len(), reason);
    }

    fn fail_range(
        &self,
        report: &mut SubBatchReport,
        sub: &SubBatch,
        comments: &[Comment],
        from: usize,
        to: usize,
        reason: &str,
    ) {
        let range = &comments[from..to];
        self.progress.record_failed(range.len());
        for (offset, comment) in range.iter().enumerate() {
            report.failed.push((
                sub.start + from + offset,
                FailedComment {
                    comment_id: comment.id.clone(),
                    reason: reason.to_string(),
                    attempts: report.attempts,
                    sub_batch: Some(sub.index),
                },
            ));
        }
    }

    fn cancel_rest(report: &mut SubBatchReport, sub: &SubBatch, comments: &[Comment], from: usize) {
        for (offset, comment) in comments[from..].iter().enumerate() {
            report.cancelled.push((sub.start + from + offset, comment.id.clone()));
        }
        report.state = SubBatchState::Cancelled;
    }

    /// Process a sub-batch chunk by chunk. An upstream failure retries the
    /// sub-batch from its first unsettled comment; settled comments keep
    /// their outcome.
    async fn run(self, sub: SubBatch, all: Arc<[Comment]>) -> SubBatchReport {
        let comments = &all[sub.range()];
        let chunk_size = self.config.chunk_size.max(1);
        let mut report = SubBatchReport::new(sub.index);
        let mut cursor = 0;

        loop {
            report.attempts += 1;
            let mut upstream: Option<WorkflowError> = None;

            while cursor < comments.len() && upstream.is_none() {
                let end = (cursor + chunk_size).min(comments.len());
                let run = match AssertUnwindSafe(self.workflow.run(&comments[cursor..end], &self.cancel))
                    .catch_unwind()
                    .await
                {
                    Ok(run) => run,
                    Err(panic) => {
                        // Only this chunk is lost; earlier chunks keep their outcome
                        let reason = format!("engine panicked: {}", panic_message(&*panic));
                        error!(
                            session_id = %self.session_id,
                            sub_batch = sub.index,
                            comments = end - cursor,
                            "{}",
                            reason
                        );
                        self.fail_range(&mut report, &sub, comments, cursor, end, &reason);
                        cursor = end;
                        continue;
                    }
                };

                let mut settled = 0;
                let mut cancelled = false;
                for (offset, (comment_id, outcome)) in run.outcomes.into_iter().enumerate() {
                    let position = sub.start + cursor + offset;
                    match outcome {
                        Ok(result) => {
                            self.progress.record_processed();
                            report.results.push((position, result));
                        }
                        Err(err @ WorkflowError::NoResults { .. }) => {
                            self.progress.record_failed(1);
                            report.failed.push((
                                position,
                                FailedComment {
                                    comment_id,
                                    reason: err.to_string(),
                                    attempts: report.attempts,
                                    sub_batch: Some(sub.index),
                                },
                            ));
                        }
                        Err(WorkflowError::Cancelled { .. }) => {
                            cancelled = true;
                            break;
                        }
                        Err(err @ WorkflowError::Upstream { .. }) => {
                            upstream = Some(err);
                            break;
                        }
                    }
                    settled += 1;
                }
                cursor += settled;

                if cancelled {
                    Self::cancel_rest(&mut report, &sub, comments, cursor);
                    return report;
                }
            }

            let Some(err) = upstream else {
                report.state = SubBatchState::Succeeded;
                return report;
            };

            if report.attempts > self.config.max_retries {
                error!(
                    session_id = %self.session_id,
                    sub_batch = sub.index,
                    attempts = report.attempts,
                    failed = comments.len() - cursor,
                    "Sub-batch exhausted retries: {}",
                    err
                );
                self.fail_rest(&mut report, &sub, comments, cursor, &err.to_string());
                report.state = SubBatchState::Failed;
                return report;
            }

            self.progress.record_retry();
            let delay = self.config.backoff(report.attempts);
            warn!(
                session_id = %self.session_id,
                sub_batch = sub.index,
                attempt = report.attempts,
                delay_ms = delay.as_millis() as u64,
                "Upstream failure, retrying sub-batch: {}",
                err
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => {
                    Self::cancel_rest(&mut report, &sub, comments, cursor);
                    return report;
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

// ============================================================================
// Processor
// ============================================================================

/// Executes a planned session.
pub struct BatchProcessor {
    workflow: Arc<WorkflowManager>,
    optimizer: Arc<BatchOptimizer>,
    monitor: Arc<dyn ResourceMonitor>,
    observer: Arc<dyn ProgressObserver>,
    config: ProcessorConfig,
}

impl BatchProcessor {
    pub fn new(workflow: Arc<WorkflowManager>, config: ProcessorConfig) -> Self {
        Self {
            workflow,
            optimizer: Arc::new(BatchOptimizer::default()),
            monitor: Arc::new(SystemResourceMonitor),
            observer: noop_observer(),
            config,
        }
    }

    /// Optimizer used to re-plan adaptive sessions.
    pub fn with_optimizer(mut self, optimizer: Arc<BatchOptimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn ResourceMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn workflow(&self) -> &Arc<WorkflowManager> {
        &self.workflow
    }

    /// A control handle honouring this processor's acknowledge setting.
    pub fn session_control(&self) -> SessionControl {
        SessionControl::new(self.config.auto_acknowledge)
    }

    /// Process comments under a plan in a fresh session.
    pub async fn process(
        &self,
        comments: Vec<Comment>,
        plan: &BatchPlan,
        control: &SessionControl,
    ) -> ProcessingOutcome {
        let mut session = BatchSession::new(comments);
        self.run_session(&mut session, plan, control).await
    }

    fn progress_update(&self, session: &BatchSession, started: Instant, sub_batch: usize) -> ProgressUpdate {
        let processed = session.progress.processed();
        let failed = session.progress.failed();
        let settled = processed + failed;
        let elapsed = started.elapsed().as_secs_f64();
        let throughput = if elapsed > 0.0 {
            settled as f64 / elapsed
        } else {
            0.0
        };
        let remaining = session.total().saturating_sub(settled);
        let estimated_completion = (throughput > 0.0).then(|| {
            Utc::now() + chrono::Duration::milliseconds((remaining as f64 / throughput * 1000.0) as i64)
        });
        ProgressUpdate {
            session_id: session.session_id,
            processed_count: processed,
            failed_count: failed,
            total_count: session.total(),
            throughput,
            estimated_completion,
            sub_batch,
        }
    }

    /// Run an existing session to completion or cancellation.
    pub async fn run_session(
        &self,
        session: &mut BatchSession,
        plan: &BatchPlan,
        control: &SessionControl,
    ) -> ProcessingOutcome {
        let started = Instant::now();
        session.start();

        let total = session.total();
        let batch_size = plan.batch_size.max(1);
        session.sub_batches = (0..total)
            .step_by(batch_size)
            .enumerate()
            .map(|(index, start)| SubBatch::new(index, start, batch_size.min(total - start)))
            .collect();

        info!(
            session_id = %session.session_id,
            comments = total,
            sub_batches = session.sub_batches.len(),
            strategy = %plan.strategy,
            concurrency = plan.concurrency,
            "Starting batch session"
        );

        let worker = Worker {
            workflow: Arc::clone(&self.workflow),
            config: self.config.clone(),
            progress: Arc::clone(&session.progress),
            cancel: control.token().clone(),
            session_id: session.session_id,
        };

        let mut pending: VecDeque<usize> = (0..session.sub_batches.len()).collect();
        let mut in_flight = FuturesUnordered::new();
        let mut current_plan = plan.clone();
        let mut concurrency = plan.concurrency.max(1);

        let mut results: BTreeMap<usize, IntegratedResult> = BTreeMap::new();
        let mut failed: BTreeMap<usize, FailedComment> = BTreeMap::new();
        let mut cancelled: BTreeMap<usize, String> = BTreeMap::new();
        let mut checkpoints = 0;
        let mut failed_at_last_trip = 0;

        loop {
            if !control.is_cancelled() {
                while in_flight.len() < concurrency
                    && !control.gate().is_closed()
                    && !control.is_cancelled()
                {
                    let Some(index) = pending.pop_front() else {
                        break;
                    };
                    let sub = &mut session.sub_batches[index];
                    sub.state = SubBatchState::Running;
                    let task = tokio::spawn(worker.clone().run(sub.clone(), Arc::clone(&session.comments)));
                    in_flight.push(async move { (index, task.await) });
                }

                if in_flight.is_empty() && !pending.is_empty() && control.gate().is_closed() {
                    info!(session_id = %session.session_id, "Scheduling paused at quality checkpoint");
                    if control.gate().wait_open(control.token()).await {
                        info!(session_id = %session.session_id, "Quality checkpoint acknowledged");
                        continue;
                    }
                }
            }

            let Some((index, joined)) = in_flight.next().await else {
                break;
            };

            let report = match joined {
                Ok(report) => report,
                Err(join_error) => {
                    // Chunk panics are caught inside the task, so only an
                    // abort lands here; the task's partial outcome is gone
                    error!(sub_batch = index, "Sub-batch task aborted: {}", join_error);
                    let sub = session.sub_batches[index].clone();
                    let mut report = SubBatchReport::new(index);
                    report.attempts = 1;
                    worker.fail_rest(
                        &mut report,
                        &sub,
                        &session.comments[sub.range()],
                        0,
                        &format!("worker aborted: {}", join_error),
                    );
                    report.state = SubBatchState::Failed;
                    report
                }
            };

            let sub = &mut session.sub_batches[report.index];
            sub.attempts = report.attempts;
            sub.state = report.state;
            let recent_failure_rate = report.failure_rate();
            results.extend(report.results);
            failed.extend(report.failed);
            cancelled.extend(report.cancelled);

            let update = self.progress_update(session, started, index);
            info!(
                session_id = %session.session_id,
                sub_batch = index,
                processed = update.processed_count,
                failed = update.failed_count,
                total = update.total_count,
                "Sub-batch settled"
            );
            self.observer.on_progress(&update).await;

            let settled = update.settled();
            if settled >= self.config.checkpoint_min_settled
                && update.failed_count > failed_at_last_trip
                && update.failed_count as f64 / settled as f64 > self.config.failure_rate_threshold
            {
                failed_at_last_trip = update.failed_count;
                checkpoints += 1;
                let checkpoint = QualityCheckpoint {
                    session_id: session.session_id,
                    failure_rate: update.failed_count as f64 / settled as f64,
                    threshold: self.config.failure_rate_threshold,
                    settled_count: settled,
                };
                let paused = control.gate().trip();
                warn!(
                    session_id = %session.session_id,
                    failure_rate = checkpoint.failure_rate,
                    paused,
                    "Quality checkpoint tripped"
                );
                self.observer.on_checkpoint(&checkpoint).await;
            }

            if plan.strategy == ProcessingStrategy::Adaptive {
                let metrics = RuntimeMetrics {
                    settled,
                    failed: update.failed_count,
                    throughput: update.throughput,
                    recent_failure_rate,
                };
                current_plan = self
                    .optimizer
                    .replan(&current_plan, &metrics, &self.monitor.snapshot());
                concurrency = current_plan.concurrency.max(1);
            }
        }

        // Sub-batches never scheduled because of cancellation
        for index in pending {
            let sub = &mut session.sub_batches[index];
            sub.state = SubBatchState::Cancelled;
            for position in sub.range() {
                cancelled.insert(position, session.comments[position].id.clone());
            }
        }

        let partial = !cancelled.is_empty();
        session.finish(if partial {
            SessionState::Cancelled
        } else {
            SessionState::Completed
        });

        let duration = started.elapsed();
        let settled = results.len() + failed.len();
        let statistics = SessionStatistics {
            total_count: total,
            processed_count: results.len(),
            failed_count: failed.len(),
            cancelled_count: cancelled.len(),
            duration_ms: duration.as_millis() as u64,
            throughput: if duration.as_secs_f64() > 0.0 {
                settled as f64 / duration.as_secs_f64()
            } else {
                0.0
            },
            sub_batches: session.sub_batches.len(),
            retries: session.progress.retries(),
            checkpoints,
        };

        info!(
            session_id = %session.session_id,
            processed = statistics.processed_count,
            failed = statistics.failed_count,
            cancelled = statistics.cancelled_count,
            duration_ms = statistics.duration_ms,
            "Batch session finished"
        );

        ProcessingOutcome {
            session_id: session.session_id,
            state: session.state,
            results: results.into_values().collect(),
            failed: failed.into_values().collect(),
            cancelled: cancelled.into_values().collect(),
            sub_batches: session.sub_batches.clone(),
            statistics,
            partial,
        }
    }
}
