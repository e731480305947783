//! Progress reporting for batch sessions.
//!
//! The processor notifies an observer after every completed sub-batch and
//! whenever the quality checkpoint trips. The CLI drives a progress bar from
//! these events; library callers can subscribe through a channel.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Snapshot emitted after each completed sub-batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub session_id: Uuid,
    pub processed_count: usize,
    pub failed_count: usize,
    pub total_count: usize,
    /// Comments settled per second so far
    pub throughput: f64,
    /// Extrapolated from throughput; `None` until anything has settled
    pub estimated_completion: Option<DateTime<Utc>>,
    pub sub_batch: usize,
}

impl ProgressUpdate {
    pub fn settled(&self) -> usize {
        self.processed_count + self.failed_count
    }

    /// Fraction done in [0, 1].
    pub fn fraction(&self) -> f64 {
        if self.total_count == 0 {
            1.0
        } else {
            self.settled() as f64 / self.total_count as f64
        }
    }
}

/// Emitted when the running failure rate crosses the checkpoint threshold.
/// Scheduling is paused until the session's quality gate is acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCheckpoint {
    pub session_id: Uuid,
    pub failure_rate: f64,
    pub threshold: f64,
    pub settled_count: usize,
}

/// Receives session progress. Implementations are fire-and-forget and must
/// never fail the caller.
#[async_trait]
pub trait ProgressObserver: Send + Sync {
    async fn on_progress(&self, update: &ProgressUpdate);

    async fn on_checkpoint(&self, _checkpoint: &QualityCheckpoint) {}
}

/// Observer that ignores everything.
pub struct NoopProgressObserver;

#[async_trait]
impl ProgressObserver for NoopProgressObserver {
    async fn on_progress(&self, _update: &ProgressUpdate) {}
}

/// Shorthand for a shared no-op observer.
pub fn noop_observer() -> Arc<dyn ProgressObserver> {
    Arc::new(NoopProgressObserver)
}

/// Events forwarded by [`ChannelProgressObserver`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Progress(ProgressUpdate),
    Checkpoint(QualityCheckpoint),
}

/// Forwards events to an unbounded tokio channel. Events are dropped once
/// the receiver is gone.
pub struct ChannelProgressObserver {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ProgressObserver for ChannelProgressObserver {
    async fn on_progress(&self, update: &ProgressUpdate) {
        let _ = self.tx.send(ProgressEvent::Progress(update.clone()));
    }

    async fn on_checkpoint(&self, checkpoint: &QualityCheckpoint) {
        let _ = self.tx.send(ProgressEvent::Checkpoint(checkpoint.clone()));
    }
}
