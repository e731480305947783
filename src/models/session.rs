//! Batch session model.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::comment::Comment;

/// Lifecycle of a batch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Running,
    Completed,
    /// Stopped by its cancellation token; completed work is still reported
    Cancelled,
    Failed,
}

/// Lifecycle of one sub-batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubBatchState {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Stopped by cancellation; settled comments keep their outcome
    Cancelled,
}

/// A contiguous slice of the session's comments assigned to one worker.
///
/// Never re-split; a failing sub-batch is retried as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubBatch {
    pub index: usize,
    /// Offset of the first comment in the session's ordered sequence
    pub start: usize,
    pub len: usize,
    pub state: SubBatchState,
    pub attempts: u32,
}

impl SubBatch {
    pub fn new(index: usize, start: usize, len: usize) -> Self {
        Self {
            index,
            start,
            len,
            state: SubBatchState::Pending,
            attempts: 0,
        }
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.len
    }
}

/// A comment that could not be analysed, with the reason recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedComment {
    pub comment_id: String,
    pub reason: String,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_batch: Option<usize>,
}

/// Progress counters shared between the coordinator and its workers.
#[derive(Debug, Default)]
pub struct ProgressCounters {
    processed: AtomicUsize,
    failed: AtomicUsize,
    retries: AtomicUsize,
}

impl ProgressCounters {
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self, count: usize) {
        self.failed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> usize {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn settled(&self) -> usize {
        self.processed() + self.failed()
    }
}

/// Statistics handed to the insight/export collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub total_count: usize,
    pub processed_count: usize,
    pub failed_count: usize,
    pub cancelled_count: usize,
    pub duration_ms: u64,
    /// Comments settled per second over the whole session
    pub throughput: f64,
    pub sub_batches: usize,
    pub retries: usize,
    pub checkpoints: usize,
}

/// One analysis request: the ordered comments, the plan, and progress.
///
/// Passed explicitly through the stages; there is no process-wide session
/// state.
#[derive(Debug)]
pub struct BatchSession {
    pub session_id: Uuid,
    pub comments: Arc<[Comment]>,
    pub state: SessionState,
    pub sub_batches: Vec<SubBatch>,
    pub progress: Arc<ProgressCounters>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchSession {
    pub fn new(comments: Vec<Comment>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            comments: comments.into(),
            state: SessionState::Pending,
            sub_batches: Vec::new(),
            progress: Arc::new(ProgressCounters::default()),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn total(&self) -> usize {
        self.comments.len()
    }

    pub fn processed_count(&self) -> usize {
        self.progress.processed()
    }

    pub fn failed_count(&self) -> usize {
        self.progress.failed()
    }

    pub fn start(&mut self) {
        self.state = SessionState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn finish(&mut self, state: SessionState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
    }

    pub fn elapsed_ms(&self) -> u64 {
        match self.started_at {
            Some(start) => {
                let end = self.finished_at.unwrap_or_else(Utc::now);
                (end - start).num_milliseconds().max(0) as u64
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_batch_range() {
        let sub = SubBatch::new(2, 100, 50);
        assert_eq!(sub.range(), 100..150);
        assert_eq!(sub.state, SubBatchState::Pending);
    }

    #[test]
    fn test_counters_settled() {
        let counters = ProgressCounters::default();
        counters.record_processed();
        counters.record_processed();
        counters.record_failed(3);
        counters.record_retry();
        assert_eq!(counters.settled(), 5);
        assert_eq!(counters.retries(), 1);
    }

    #[test]
    fn test_session_lifecycle() {
        let mut session = BatchSession::new(vec![Comment::new("a", "hola")]);
        assert_eq!(session.state, SessionState::Pending);
        assert_eq!(session.elapsed_ms(), 0);
        session.start();
        assert_eq!(session.state, SessionState::Running);
        session.finish(SessionState::Completed);
        assert!(session.finished_at.is_some());
        assert_eq!(session.total(), 1);
    }
}
