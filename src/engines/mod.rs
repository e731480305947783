//! Analysis engines.
//!
//! Engines are pure functions from comments plus an [`EngineConfig`] to
//! [`EngineResult`]s. They hold no reference to the workflow that calls them;
//! upstream outputs reach them only through the config context.

pub mod emotion;
pub mod language;
pub mod lexicon;
pub mod quota;
pub mod sentiment;
pub mod theme;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Comment, EngineKind, EngineResult};
use crate::{EngineError, OpinaError};

pub use emotion::LexiconEmotionEngine;
pub use language::MarkerLanguageEngine;
pub use quota::{QuotaTracker, RateLimitedEngine};
pub use sentiment::LexiconSentimentEngine;
pub use theme::KeywordThemeEngine;

/// Context keys written by the cascade strategy and the refinement pass.
pub mod context_keys {
    /// Detected language code of the comment
    pub const LANGUAGE: &str = "language";
    /// Confidence of the language detection
    pub const LANGUAGE_CONFIDENCE: &str = "language_confidence";
    /// Whether the comment code-switches ("true"/"false")
    pub const LANGUAGE_MIXED: &str = "language_mixed";
    /// Sentiment label from the upstream stage
    pub const SENTIMENT: &str = "sentiment";
    /// Sentiment polarity from the upstream stage
    pub const SENTIMENT_SCORE: &str = "sentiment_score";
    /// Primary theme from the upstream stage
    pub const THEME: &str = "theme";
    /// Set on re-queries issued by quality refinement
    pub const REFINE: &str = "refine";
}

/// Per-call engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Language the caller already knows or detected
    pub language_hint: Option<String>,
    /// Upstream outputs (see [`context_keys`])
    pub context: BTreeMap<String, String>,
    /// Per-call timeout applied by the caller
    pub timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            language_hint: None,
            context: BTreeMap::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn context(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    /// Explicit hint first, then a cascaded detection.
    pub fn language(&self) -> Option<&str> {
        self.language_hint
            .as_deref()
            .or_else(|| self.context(context_keys::LANGUAGE))
    }

    pub fn is_refinement(&self) -> bool {
        self.context(context_keys::REFINE) == Some("true")
    }
}

/// Capability interface every engine implements.
///
/// Must be safe to call concurrently. Failures are reported as
/// [`EngineError`]; an engine may also omit results for individual comments
/// it cannot analyse, which the workflow records as `Invalid`.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Registered name, unique within a registry.
    fn name(&self) -> &str;

    /// Capability this engine provides.
    fn kind(&self) -> EngineKind;

    /// Whether the engine can currently serve calls.
    fn is_available(&self) -> bool {
        true
    }

    /// Analyse a batch of comments.
    async fn analyze_batch(
        &self,
        comments: &[Comment],
        config: &EngineConfig,
    ) -> Result<Vec<EngineResult>, EngineError>;
}

/// Which engines to build and how to throttle them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Built-in capabilities to register
    pub enabled: Vec<EngineKind>,
    /// Sustained calls per second across all engines (None = unthrottled)
    pub rate_per_second: Option<u32>,
    /// Burst size for the rate limiter
    pub burst: Option<u32>,
    /// Hard cap on total engine calls per process (None = unlimited)
    pub max_calls: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            enabled: EngineKind::ALL.to_vec(),
            rate_per_second: None,
            burst: None,
            max_calls: None,
        }
    }
}

/// Explicit engine registry. Engines are only dispatched if registered here.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: BTreeMap<EngineKind, Vec<Arc<dyn AnalysisEngine>>>,
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: BTreeMap<EngineKind, Vec<&str>> = self
            .engines
            .iter()
            .map(|(kind, engines)| (*kind, engines.iter().map(|e| e.name()).collect()))
            .collect();
        f.debug_struct("EngineRegistry").field("engines", &names).finish()
    }
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in lexicon engines for the enabled kinds,
    /// throttled through a shared quota when one is configured.
    pub fn from_settings(settings: &EngineSettings) -> Result<Self, OpinaError> {
        let quota = QuotaTracker::from_settings(settings)?.map(Arc::new);
        let mut registry = Self::new();
        for kind in EngineKind::ALL {
            if !settings.enabled.contains(&kind) {
                continue;
            }
            let engine: Arc<dyn AnalysisEngine> = match kind {
                EngineKind::Language => Arc::new(MarkerLanguageEngine::new()),
                EngineKind::Sentiment => Arc::new(LexiconSentimentEngine::new()),
                EngineKind::Theme => Arc::new(KeywordThemeEngine::new()),
                EngineKind::Emotion => Arc::new(LexiconEmotionEngine::new()),
            };
            let engine: Arc<dyn AnalysisEngine> = match &quota {
                Some(quota) => Arc::new(RateLimitedEngine::new(engine, Arc::clone(quota))),
                None => engine,
            };
            registry.register(engine)?;
        }
        Ok(registry)
    }

    /// All built-in engines, unthrottled.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.insert(Arc::new(MarkerLanguageEngine::new()));
        registry.insert(Arc::new(LexiconSentimentEngine::new()));
        registry.insert(Arc::new(KeywordThemeEngine::new()));
        registry.insert(Arc::new(LexiconEmotionEngine::new()));
        registry
    }

    fn insert(&mut self, engine: Arc<dyn AnalysisEngine>) {
        self.engines.entry(engine.kind()).or_default().push(engine);
    }

    /// Register an engine. Several engines may serve one kind; names must be
    /// unique.
    pub fn register(&mut self, engine: Arc<dyn AnalysisEngine>) -> Result<(), OpinaError> {
        if self.names().contains(&engine.name()) {
            return Err(OpinaError::Config(format!(
                "Engine '{}' is already registered",
                engine.name()
            )));
        }
        debug!(engine = engine.name(), kind = %engine.kind(), "Registered engine");
        self.insert(engine);
        Ok(())
    }

    /// Available engines for a kind, in registration order.
    pub fn engines_for(&self, kind: EngineKind) -> Vec<Arc<dyn AnalysisEngine>> {
        self.engines
            .get(&kind)
            .map(|engines| {
                engines
                    .iter()
                    .filter(|e| e.is_available())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Kinds with at least one available engine, in cascade order.
    pub fn usable_kinds(&self) -> Vec<EngineKind> {
        EngineKind::ALL
            .into_iter()
            .filter(|kind| !self.engines_for(*kind).is_empty())
            .collect()
    }

    /// Usable kinds, or the session-fatal error when there are none.
    pub fn ensure_usable(&self) -> Result<Vec<EngineKind>, OpinaError> {
        let kinds = self.usable_kinds();
        if kinds.is_empty() {
            Err(OpinaError::NoUsableEngines)
        } else {
            Ok(kinds)
        }
    }

    /// Look up an engine by registered name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn AnalysisEngine>> {
        self.engines
            .values()
            .flatten()
            .find(|e| e.name() == name)
            .cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.engines.values().flatten().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.engines.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Comments with non-blank text; `Invalid` when a non-empty batch has none.
pub(crate) fn analysable<'a>(
    engine: &str,
    comments: &'a [Comment],
) -> Result<Vec<&'a Comment>, EngineError> {
    let usable: Vec<&Comment> = comments
        .iter()
        .filter(|c| !c.analysis_text().trim().is_empty())
        .collect();
    if usable.is_empty() && !comments.is_empty() {
        return Err(EngineError::Invalid {
            engine: engine.to_string(),
            message: "no comment with analysable text".into(),
        });
    }
    Ok(usable)
}
