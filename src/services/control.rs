//! Session control: cancellation and the quality checkpoint gate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Backpressure gate closed by the failure-rate checkpoint.
///
/// While closed, the processor schedules no new sub-batches; in-flight ones
/// finish normally. With auto-acknowledge the trip is recorded but the gate
/// never closes, for unattended runs.
#[derive(Debug, Default)]
pub struct QualityGate {
    closed: AtomicBool,
    notify: Notify,
    auto_acknowledge: bool,
    trips: AtomicUsize,
}

impl QualityGate {
    pub fn new(auto_acknowledge: bool) -> Self {
        Self {
            auto_acknowledge,
            ..Default::default()
        }
    }

    /// Record a checkpoint. Returns whether the gate is now closed.
    pub fn trip(&self) -> bool {
        self.trips.fetch_add(1, Ordering::Relaxed);
        if self.auto_acknowledge {
            return false;
        }
        self.closed.store(true, Ordering::SeqCst);
        true
    }

    /// Reopen the gate and wake the waiting scheduler.
    pub fn acknowledge(&self) {
        self.closed.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn trips(&self) -> usize {
        self.trips.load(Ordering::Relaxed)
    }

    /// Wait until the gate is open. Returns `false` if cancelled first.
    pub async fn wait_open(&self, cancel: &CancellationToken) -> bool {
        loop {
            // Registered before the check so an acknowledge in between is not lost
            let notified = self.notify.notified();
            if !self.is_closed() {
                return true;
            }
            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return false,
            }
        }
    }
}

/// Handle shared between a running session and its caller.
#[derive(Debug, Clone, Default)]
pub struct SessionControl {
    cancel: CancellationToken,
    gate: Arc<QualityGate>,
}

impl SessionControl {
    pub fn new(auto_acknowledge: bool) -> Self {
        Self {
            cancel: CancellationToken::new(),
            gate: Arc::new(QualityGate::new(auto_acknowledge)),
        }
    }

    /// Request cancellation. Checked between sub-batches and cascade stages.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn gate(&self) -> &QualityGate {
        &self.gate
    }

    /// Reopen scheduling after a quality checkpoint.
    pub fn acknowledge_checkpoint(&self) {
        self.gate.acknowledge();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_open_gate_does_not_wait() {
        let control = SessionControl::new(false);
        assert!(control.gate().wait_open(control.token()).await);
    }

    #[tokio::test]
    async fn test_acknowledge_reopens_gate() {
        let control = SessionControl::new(false);
        assert!(control.gate().trip());
        assert!(control.gate().is_closed());

        let waiter = control.clone();
        let handle = tokio::spawn(async move { waiter.gate().wait_open(waiter.token()).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        control.acknowledge_checkpoint();

        let opened = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("gate reopened")
            .expect("task");
        assert!(opened);
    }

    #[tokio::test]
    async fn test_cancel_releases_closed_gate() {
        let control = SessionControl::new(false);
        control.gate().trip();
        control.cancel();
        assert!(!control.gate().wait_open(control.token()).await);
    }

    #[test]
    fn test_auto_acknowledge_never_closes() {
        let gate = QualityGate::new(true);
        assert!(!gate.trip());
        assert!(!gate.is_closed());
        assert_eq!(gate.trips(), 1);
    }
}
