//! Batch planning: batch size, processing strategy and concurrency.
//!
//! Batch size starts from a base and is scaled by four multiplicative
//! factors (comment length, requested engine count, memory headroom and a
//! learned multiplier for the workload profile), then clamped to bounds.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{Comment, EngineKind};
use crate::services::history::{PerformanceHistory, WorkloadProfile};
use crate::services::resources::ResourceSnapshot;

/// How sub-batches are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStrategy {
    /// One sub-batch at a time
    Sequential,
    /// Up to one sub-batch per core
    Parallel,
    /// Full worker pool, for large workloads
    Distributed,
    /// Concurrency re-evaluated after every sub-batch
    Adaptive,
}

impl ProcessingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStrategy::Sequential => "sequential",
            ProcessingStrategy::Parallel => "parallel",
            ProcessingStrategy::Distributed => "distributed",
            ProcessingStrategy::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for ProcessingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(ProcessingStrategy::Sequential),
            "parallel" => Ok(ProcessingStrategy::Parallel),
            "distributed" => Ok(ProcessingStrategy::Distributed),
            "adaptive" => Ok(ProcessingStrategy::Adaptive),
            other => Err(format!(
                "Unknown processing strategy '{}'. Valid: sequential, parallel, distributed, adaptive",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub base_batch_size: usize,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    /// Average comment length (chars) at which the length factor is 1.0
    pub reference_length: f64,
    /// Upper bound on concurrently running sub-batches
    pub max_concurrency: usize,
    /// Workloads at or below this size run sequentially
    pub small_workload: usize,
    /// Workloads at or above this size use the full worker pool
    pub large_workload: usize,
    /// CPU or memory pressure at or above which planning turns adaptive
    pub high_pressure: f64,
    /// Failure rate above which adaptive scheduling backs off
    pub failure_backoff_rate: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            base_batch_size: 500,
            min_batch_size: 10,
            max_batch_size: 5000,
            reference_length: 120.0,
            max_concurrency: 16,
            small_workload: 100,
            large_workload: 5000,
            high_pressure: 0.85,
            failure_backoff_rate: 0.05,
        }
    }
}

/// The multiplicative factors behind a batch size, kept for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanFactors {
    pub length: f64,
    pub complexity: f64,
    pub memory: f64,
    pub learned: f64,
}

impl PlanFactors {
    pub fn product(&self) -> f64 {
        self.length * self.complexity * self.memory * self.learned
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPlan {
    pub batch_size: usize,
    pub strategy: ProcessingStrategy,
    pub concurrency: usize,
    pub total_comments: usize,
    pub avg_length: f64,
    pub profile: WorkloadProfile,
    pub factors: PlanFactors,
}

impl BatchPlan {
    pub fn sub_batch_count(&self) -> usize {
        self.total_comments.div_ceil(self.batch_size.max(1))
    }
}

/// Live metrics fed back into adaptive re-planning.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RuntimeMetrics {
    pub settled: usize,
    pub failed: usize,
    /// Comments per second so far
    pub throughput: f64,
    /// Failure rate of the most recent sub-batch
    pub recent_failure_rate: f64,
}

/// Computes batch plans from workload and resource signals.
#[derive(Debug, Clone)]
pub struct BatchOptimizer {
    config: OptimizerConfig,
    history: Arc<PerformanceHistory>,
}

impl Default for BatchOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default(), Arc::new(PerformanceHistory::default()))
    }
}

impl BatchOptimizer {
    pub fn new(config: OptimizerConfig, history: Arc<PerformanceHistory>) -> Self {
        Self { config, history }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<PerformanceHistory> {
        &self.history
    }

    fn bounds(&self) -> (usize, usize) {
        let max = self.config.max_batch_size.max(1);
        let min = self.config.min_batch_size.clamp(1, max);
        (min, max)
    }

    /// Plan a session.
    pub fn plan(
        &self,
        comments: &[Comment],
        kinds: &[EngineKind],
        snapshot: &ResourceSnapshot,
    ) -> BatchPlan {
        let total = comments.len();
        let avg_length = if total == 0 {
            self.config.reference_length
        } else {
            comments.iter().map(|c| c.char_len() as f64).sum::<f64>() / total as f64
        };
        let profile = WorkloadProfile::new(avg_length, kinds.len());

        let factors = PlanFactors {
            length: (self.config.reference_length / avg_length.max(1.0)).clamp(0.25, 2.0),
            complexity: 1.0 / (1.0 + 0.2 * kinds.len().saturating_sub(1) as f64),
            memory: memory_factor(snapshot),
            learned: self.history.multiplier(&profile).clamp(0.25, 2.0),
        };

        let (min, max) = self.bounds();
        let raw = (self.config.base_batch_size as f64 * factors.product()).round();
        let batch_size = if raw.is_finite() {
            (raw as usize).clamp(min, max)
        } else {
            min
        };

        let sub_batches = total.div_ceil(batch_size).max(1);
        let strategy = self.select_strategy(total, snapshot);
        let concurrency = self.concurrency_for(strategy, snapshot, sub_batches);

        info!(
            comments = total,
            batch_size,
            strategy = %strategy,
            concurrency,
            profile = %profile,
            "Planned batch session"
        );

        BatchPlan {
            batch_size,
            strategy,
            concurrency,
            total_comments: total,
            avg_length,
            profile,
            factors,
        }
    }

    fn select_strategy(&self, total: usize, snapshot: &ResourceSnapshot) -> ProcessingStrategy {
        let pressure = snapshot
            .cpu_pressure()
            .unwrap_or(0.0)
            .max(snapshot.memory_pressure().unwrap_or(0.0));

        if snapshot.cpu_cores <= 1 || total <= self.config.small_workload {
            ProcessingStrategy::Sequential
        } else if pressure >= self.config.high_pressure {
            ProcessingStrategy::Adaptive
        } else if total >= self.config.large_workload {
            ProcessingStrategy::Distributed
        } else {
            ProcessingStrategy::Parallel
        }
    }

    fn concurrency_for(
        &self,
        strategy: ProcessingStrategy,
        snapshot: &ResourceSnapshot,
        sub_batches: usize,
    ) -> usize {
        let cores = snapshot.cpu_cores.max(1);
        let wanted = match strategy {
            ProcessingStrategy::Sequential => 1,
            ProcessingStrategy::Parallel => cores,
            ProcessingStrategy::Distributed => cores * 2,
            ProcessingStrategy::Adaptive => (cores / 2).max(1),
        };
        wanted
            .min(self.config.max_concurrency.max(1))
            .min(sub_batches)
            .max(1)
    }

    /// Re-evaluate concurrency after a sub-batch. Batch size is kept since
    /// sub-batches are never re-split.
    pub fn replan(
        &self,
        previous: &BatchPlan,
        metrics: &RuntimeMetrics,
        snapshot: &ResourceSnapshot,
    ) -> BatchPlan {
        let cap = self
            .config
            .max_concurrency
            .max(1)
            .min(snapshot.cpu_cores.max(1) * 2)
            .min(previous.sub_batch_count().max(1));
        let pressure = snapshot.cpu_pressure().unwrap_or(0.0);

        let concurrency = if metrics.recent_failure_rate > self.config.failure_backoff_rate {
            (previous.concurrency / 2).max(1)
        } else if pressure >= self.config.high_pressure {
            previous.concurrency.saturating_sub(1).max(1)
        } else if pressure < 0.5 {
            (previous.concurrency + 1).min(cap)
        } else {
            previous.concurrency.min(cap)
        };

        if concurrency != previous.concurrency {
            debug!(
                from = previous.concurrency,
                to = concurrency,
                failure_rate = metrics.recent_failure_rate,
                "Adaptive concurrency change"
            );
        }

        BatchPlan {
            concurrency,
            ..previous.clone()
        }
    }
}

/// Shrinks batches once more than half of memory is in use.
fn memory_factor(snapshot: &ResourceSnapshot) -> f64 {
    match snapshot.memory_pressure() {
        Some(p) if p > 0.5 => ((1.0 - p) * 2.0).clamp(0.2, 1.0),
        _ => 1.0,
    }
}
