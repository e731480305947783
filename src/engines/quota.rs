//! Shared engine quota: a token-bucket rate limiter plus an atomic call
//! counter with an optional hard cap.
//!
//! This is the one piece of mutable state shared by every concurrent worker.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tracing::warn;

use super::{AnalysisEngine, EngineConfig, EngineSettings};
use crate::models::{Comment, EngineKind, EngineResult};
use crate::{EngineError, OpinaError};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Process-wide engine call budget.
pub struct QuotaTracker {
    limiter: Option<DirectLimiter>,
    calls: AtomicU64,
    max_calls: Option<u64>,
}

impl std::fmt::Debug for QuotaTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaTracker")
            .field("throttled", &self.limiter.is_some())
            .field("calls", &self.calls())
            .field("max_calls", &self.max_calls)
            .finish()
    }
}

impl QuotaTracker {
    /// Build a tracker. `rate_per_second` of zero is a configuration error.
    pub fn new(
        rate_per_second: Option<u32>,
        burst: Option<u32>,
        max_calls: Option<u64>,
    ) -> Result<Self, OpinaError> {
        let limiter = match rate_per_second {
            Some(rate) => {
                let rate = NonZeroU32::new(rate).ok_or_else(|| {
                    OpinaError::Config("engines.rate_per_second must be positive".into())
                })?;
                let mut quota = Quota::per_second(rate);
                if let Some(burst) = burst.and_then(NonZeroU32::new) {
                    quota = quota.allow_burst(burst);
                }
                Some(RateLimiter::direct(quota))
            }
            None => None,
        };
        Ok(Self {
            limiter,
            calls: AtomicU64::new(0),
            max_calls,
        })
    }

    /// A tracker when the settings ask for throttling or a cap, else `None`.
    pub fn from_settings(settings: &EngineSettings) -> Result<Option<Self>, OpinaError> {
        if settings.rate_per_second.is_none() && settings.max_calls.is_none() {
            return Ok(None);
        }
        Self::new(settings.rate_per_second, settings.burst, settings.max_calls).map(Some)
    }

    pub fn unlimited() -> Self {
        Self {
            limiter: None,
            calls: AtomicU64::new(0),
            max_calls: None,
        }
    }

    /// Wait for a rate-limit slot, then charge one call against the cap.
    pub async fn acquire(&self, engine: &str) -> Result<(), EngineError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        let used = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(max) = self.max_calls {
            if used > max {
                warn!(engine, used, max, "Engine call quota exhausted");
                return Err(EngineError::RateLimited {
                    engine: engine.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Calls charged so far, including rejected ones.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> Option<u64> {
        self.max_calls.map(|max| max.saturating_sub(self.calls()))
    }
}

/// Wraps an engine so every call goes through a shared [`QuotaTracker`].
pub struct RateLimitedEngine {
    inner: Arc<dyn AnalysisEngine>,
    quota: Arc<QuotaTracker>,
}

impl RateLimitedEngine {
    pub fn new(inner: Arc<dyn AnalysisEngine>, quota: Arc<QuotaTracker>) -> Self {
        Self { inner, quota }
    }
}

#[async_trait]
impl AnalysisEngine for RateLimitedEngine {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> EngineKind {
        self.inner.kind()
    }

    fn is_available(&self) -> bool {
        self.inner.is_available() && self.quota.remaining() != Some(0)
    }

    async fn analyze_batch(
        &self,
        comments: &[Comment],
        config: &EngineConfig,
    ) -> Result<Vec<EngineResult>, EngineError> {
        self.quota.acquire(self.inner.name()).await?;
        self.inner.analyze_batch(comments, config).await
    }
}
