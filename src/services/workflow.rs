//! Engine invocation strategies and the per-chunk analysis state machine.
//!
//! A run takes a chunk of comments through
//! `Pending → Preparing → Executing → Integrating → QualityChecking → Done`
//! (or `Failed`). Engine failures never abort a run: the failing
//! (comment, engine) pair is recorded as missing and integration proceeds
//! with whatever engines succeeded.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engines::lexicon::language_profile;
use crate::engines::{context_keys, AnalysisEngine, EngineConfig, EngineRegistry};
use crate::models::{Comment, EngineKind, EnginePayload, EngineResult, IntegratedResult};
use crate::services::integrator::ResultIntegrator;
use crate::services::quality::{QualityAssurance, Refiner};
use crate::{EngineError, OpinaError, WorkflowError};

// ============================================================================
// Strategy and phase
// ============================================================================

/// How engines are invoked for a chunk of comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStrategy {
    /// One engine after another
    Sequential,
    /// All engines at once
    Parallel,
    /// Language, then sentiment, theme and emotion, each fed upstream output
    Cascade,
    /// Picks one of the above per chunk from its content profile
    Adaptive,
}

impl WorkflowStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStrategy::Sequential => "sequential",
            WorkflowStrategy::Parallel => "parallel",
            WorkflowStrategy::Cascade => "cascade",
            WorkflowStrategy::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for WorkflowStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(WorkflowStrategy::Sequential),
            "parallel" => Ok(WorkflowStrategy::Parallel),
            "cascade" => Ok(WorkflowStrategy::Cascade),
            "adaptive" => Ok(WorkflowStrategy::Adaptive),
            other => Err(format!(
                "Unknown workflow strategy '{}'. Valid: sequential, parallel, cascade, adaptive",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Pending,
    Preparing,
    Executing,
    Integrating,
    QualityChecking,
    Done,
    Failed,
}

impl WorkflowPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowPhase::Done | WorkflowPhase::Failed)
    }

    /// Forward transitions only; any live phase may fail.
    pub fn can_advance_to(self, next: WorkflowPhase) -> bool {
        use WorkflowPhase::*;
        match (self, next) {
            (Pending, Preparing)
            | (Preparing, Executing)
            | (Executing, Integrating)
            | (Integrating, QualityChecking)
            | (QualityChecking, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub strategy: WorkflowStrategy,
    /// Per engine call
    pub engine_timeout_ms: u64,
    /// Engine calls in flight across all workers
    pub engine_concurrency: usize,
    /// Share of Guaraní/Jopará comments at which adaptive picks cascade
    pub mixed_language_share: f64,
    /// Recent engine error rate at which adaptive falls back to sequential
    pub error_rate_threshold: f64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            strategy: WorkflowStrategy::Adaptive,
            engine_timeout_ms: 30_000,
            engine_concurrency: 8,
            mixed_language_share: 0.2,
            error_rate_threshold: 0.1,
        }
    }
}

impl WorkflowConfig {
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms.max(1))
    }
}

// ============================================================================
// Run output
// ============================================================================

/// Result of one comment's trip through the workflow.
pub type CommentOutcome = Result<IntegratedResult, WorkflowError>;

/// Outcome of one chunk.
#[derive(Debug)]
pub struct WorkflowRun {
    pub strategy: WorkflowStrategy,
    pub phase: WorkflowPhase,
    /// One entry per input comment, in input order
    pub outcomes: Vec<(String, CommentOutcome)>,
}

impl WorkflowRun {
    fn new() -> Self {
        Self {
            strategy: WorkflowStrategy::Adaptive,
            phase: WorkflowPhase::Pending,
            outcomes: Vec::new(),
        }
    }

    fn advance(&mut self, next: WorkflowPhase) {
        if self.phase.can_advance_to(next) {
            debug!(from = ?self.phase, to = ?next, "Workflow phase");
            self.phase = next;
        } else {
            warn!(from = ?self.phase, to = ?next, "Ignoring invalid workflow transition");
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_ok()).count()
    }
}

// ============================================================================
// Collected engine output
// ============================================================================

#[derive(Debug, Default)]
struct Collected {
    results: HashMap<String, Vec<EngineResult>>,
    errors: HashMap<String, Vec<EngineError>>,
}

impl Collected {
    /// Highest-confidence result so far for a comment and kind.
    fn best(&self, comment_id: &str, kind: EngineKind) -> Option<&EngineResult> {
        self.results.get(comment_id)?.iter().filter(|r| r.kind == kind).fold(
            None,
            |best: Option<&EngineResult>, r| match best {
                Some(b) if b.confidence >= r.confidence => Some(b),
                _ => Some(r),
            },
        )
    }
}

/// Upstream context handed to a cascade stage.
fn cascade_context(collected: &Collected, comment_id: &str, stage: EngineKind) -> BTreeMap<String, String> {
    let mut context = BTreeMap::new();
    for upstream in EngineKind::ALL.into_iter().filter(|k| *k < stage) {
        let Some(best) = collected.best(comment_id, upstream) else {
            continue;
        };
        match &best.payload {
            EnginePayload::Language { code, mixed } => {
                context.insert(context_keys::LANGUAGE.to_string(), code.clone());
                // Coarse so that comments still batch together
                context.insert(
                    context_keys::LANGUAGE_CONFIDENCE.to_string(),
                    format!("{:.1}", best.confidence),
                );
                context.insert(context_keys::LANGUAGE_MIXED.to_string(), mixed.to_string());
            }
            EnginePayload::Sentiment { label, .. } => {
                context.insert(context_keys::SENTIMENT.to_string(), label.as_str().to_string());
            }
            EnginePayload::Theme { primary, .. } => {
                context.insert(context_keys::THEME.to_string(), primary.clone());
            }
            EnginePayload::Emotion { .. } => {}
        }
    }
    context
}

/// Comments sharing a language hint and upstream context, in input order.
type Group<'a> = (EngineConfig, Vec<&'a Comment>);

fn group_comments<'a>(
    comments: &'a [Comment],
    timeout: Duration,
    context_for: impl Fn(&Comment) -> BTreeMap<String, String>,
) -> Vec<Group<'a>> {
    let mut groups: BTreeMap<(Option<String>, BTreeMap<String, String>), Vec<&'a Comment>> =
        BTreeMap::new();
    for comment in comments {
        groups
            .entry((comment.language.clone(), context_for(comment)))
            .or_default()
            .push(comment);
    }
    groups
        .into_iter()
        .map(|((language_hint, context), members)| {
            (
                EngineConfig {
                    language_hint,
                    context,
                    timeout,
                },
                members,
            )
        })
        .collect()
}

#[derive(Debug, Default)]
struct CallTrend {
    calls: u64,
    error_rate: f64,
    latency_ms: f64,
}

// ============================================================================
// Manager
// ============================================================================

/// Chooses and executes an engine-invocation strategy, then integrates and
/// quality-checks each comment.
pub struct WorkflowManager {
    registry: EngineRegistry,
    kinds: Vec<EngineKind>,
    integrator: Arc<ResultIntegrator>,
    quality: Arc<QualityAssurance>,
    config: WorkflowConfig,
    permits: Arc<Semaphore>,
    trend: Mutex<CallTrend>,
}

impl fmt::Debug for WorkflowManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowManager")
            .field("registry", &self.registry)
            .field("kinds", &self.kinds)
            .field("config", &self.config)
            .finish()
    }
}

impl WorkflowManager {
    /// Fails with [`OpinaError::NoUsableEngines`] when the registry cannot
    /// serve any capability.
    pub fn new(
        registry: EngineRegistry,
        integrator: Arc<ResultIntegrator>,
        quality: Arc<QualityAssurance>,
        config: WorkflowConfig,
    ) -> Result<Self, OpinaError> {
        let kinds = registry.ensure_usable()?;
        let permits = Arc::new(Semaphore::new(config.engine_concurrency.max(1)));
        Ok(Self {
            registry,
            kinds,
            integrator,
            quality,
            config,
            permits,
            trend: Mutex::new(CallTrend::default()),
        })
    }

    /// Built-in engines with default integration and quality settings.
    pub fn with_defaults(registry: EngineRegistry) -> Result<Self, OpinaError> {
        Self::new(
            registry,
            Arc::new(ResultIntegrator::default()),
            Arc::new(QualityAssurance::default()),
            WorkflowConfig::default(),
        )
    }

    /// Capabilities analysed for every comment, in cascade order.
    pub fn kinds(&self) -> &[EngineKind] {
        &self.kinds
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    fn observe(&self, latency: Duration, failed: bool) {
        let mut trend = self.trend.lock().unwrap_or_else(|e| e.into_inner());
        let alpha = 0.2;
        let failure = if failed { 1.0 } else { 0.0 };
        let latency_ms = latency.as_secs_f64() * 1000.0;
        if trend.calls == 0 {
            trend.error_rate = failure;
            trend.latency_ms = latency_ms;
        } else {
            trend.error_rate = (1.0 - alpha) * trend.error_rate + alpha * failure;
            trend.latency_ms = (1.0 - alpha) * trend.latency_ms + alpha * latency_ms;
        }
        trend.calls += 1;
    }

    /// Recent engine error rate (decayed), 0.0 before any call.
    pub fn recent_error_rate(&self) -> f64 {
        self.trend.lock().unwrap_or_else(|e| e.into_inner()).error_rate
    }

    /// Resolve the configured strategy for a chunk. Adaptive inspects the
    /// chunk's language mix and the recent engine error trend.
    pub fn select_strategy(&self, comments: &[Comment]) -> WorkflowStrategy {
        if self.config.strategy != WorkflowStrategy::Adaptive {
            return self.config.strategy;
        }
        if self.kinds.len() <= 1 {
            return WorkflowStrategy::Sequential;
        }

        let (calls, error_rate) = {
            let trend = self.trend.lock().unwrap_or_else(|e| e.into_inner());
            (trend.calls, trend.error_rate)
        };
        if calls >= 4 && error_rate > self.config.error_rate_threshold {
            return WorkflowStrategy::Sequential;
        }

        if comments.is_empty() {
            return WorkflowStrategy::Parallel;
        }
        let guarani = comments
            .iter()
            .filter(|c| match c.language.as_deref() {
                Some(code) => matches!(code, "gn" | "jopara"),
                None => language_profile(c.analysis_text()).involves_guarani(),
            })
            .count();
        if guarani as f64 / comments.len() as f64 >= self.config.mixed_language_share
            && self.kinds.contains(&EngineKind::Language)
        {
            WorkflowStrategy::Cascade
        } else {
            WorkflowStrategy::Parallel
        }
    }

    /// One engine call under the shared permit pool and per-call timeout.
    async fn call(
        &self,
        engine: &Arc<dyn AnalysisEngine>,
        comments: &[&Comment],
        config: &EngineConfig,
    ) -> Result<Vec<EngineResult>, EngineError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| EngineError::Unavailable {
                engine: engine.name().to_string(),
                message: "engine pool closed".into(),
            })?;
        let batch: Vec<Comment> = comments.iter().map(|c| (*c).clone()).collect();
        let started = Instant::now();
        let outcome = match tokio::time::timeout(config.timeout, engine.analyze_batch(&batch, config)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(EngineError::Timeout {
                engine: engine.name().to_string(),
                after_ms: config.timeout.as_millis() as u64,
            }),
        };
        self.observe(started.elapsed(), outcome.is_err());
        outcome
    }

    /// Record a call's results, or its failure against every comment it
    /// covered. Comments an engine silently skipped count as `Invalid`.
    fn absorb(
        engine: &dyn AnalysisEngine,
        group: &[&Comment],
        outcome: Result<Vec<EngineResult>, EngineError>,
        collected: &mut Collected,
    ) {
        let name = engine.name();
        match outcome {
            Ok(results) => {
                let expected: HashSet<&str> = group.iter().map(|c| c.id.as_str()).collect();
                let mut answered: HashSet<String> = HashSet::new();
                for result in results {
                    let valid = result.kind == engine.kind()
                        && expected.contains(result.comment_id.as_str())
                        && result.confidence.is_finite();
                    if !valid || !answered.insert(result.comment_id.clone()) {
                        debug!(engine = name, comment_id = %result.comment_id, "Dropping unexpected engine result");
                        continue;
                    }
                    collected
                        .results
                        .entry(result.comment_id.clone())
                        .or_default()
                        .push(result);
                }
                for comment in group.iter().filter(|c| !answered.contains(&c.id)) {
                    collected
                        .errors
                        .entry(comment.id.clone())
                        .or_default()
                        .push(EngineError::Invalid {
                            engine: name.to_string(),
                            message: "no result returned".into(),
                        });
                }
            }
            Err(err) => {
                warn!(engine = name, comments = group.len(), "Engine call failed: {}", err);
                for comment in group {
                    collected
                        .errors
                        .entry(comment.id.clone())
                        .or_default()
                        .push(err.clone());
                }
            }
        }
    }

    /// Run every engine of `kinds` over `groups` concurrently.
    async fn run_concurrently(
        &self,
        kinds: &[EngineKind],
        groups: &[Group<'_>],
        collected: &mut Collected,
    ) {
        let mut calls = Vec::new();
        for kind in kinds {
            for engine in self.registry.engines_for(*kind) {
                for (config, members) in groups {
                    calls.push((engine.clone(), members, config));
                }
            }
        }
        let outcomes = join_all(
            calls
                .iter()
                .map(|(engine, members, config)| self.call(engine, members, config)),
        )
        .await;
        for ((engine, members, _), outcome) in calls.iter().zip(outcomes) {
            Self::absorb(engine.as_ref(), members, outcome, collected);
        }
    }

    async fn execute(
        &self,
        strategy: WorkflowStrategy,
        comments: &[Comment],
        cancel: &CancellationToken,
    ) -> Result<Collected, ()> {
        let timeout = self.config.engine_timeout();
        let mut collected = Collected::default();

        match strategy {
            WorkflowStrategy::Sequential => {
                let groups = group_comments(comments, timeout, |_| BTreeMap::new());
                for kind in &self.kinds {
                    for engine in self.registry.engines_for(*kind) {
                        for (config, members) in &groups {
                            let outcome = self.call(&engine, members, config).await;
                            Self::absorb(engine.as_ref(), members, outcome, &mut collected);
                        }
                    }
                }
            }
            WorkflowStrategy::Parallel | WorkflowStrategy::Adaptive => {
                let groups = group_comments(comments, timeout, |_| BTreeMap::new());
                self.run_concurrently(&self.kinds, &groups, &mut collected).await;
            }
            WorkflowStrategy::Cascade => {
                for stage in &self.kinds {
                    if cancel.is_cancelled() {
                        debug!(stage = %stage, "Cascade cancelled between stages");
                        return Err(());
                    }
                    let groups = group_comments(comments, timeout, |c| {
                        cascade_context(&collected, &c.id, *stage)
                    });
                    debug!(stage = %stage, groups = groups.len(), "Cascade stage");
                    self.run_concurrently(std::slice::from_ref(stage), &groups, &mut collected)
                        .await;
                }
            }
        }
        Ok(collected)
    }

    /// Analyse a chunk of comments end to end.
    pub async fn run(&self, comments: &[Comment], cancel: &CancellationToken) -> WorkflowRun {
        let mut run = WorkflowRun::new();

        run.advance(WorkflowPhase::Preparing);
        run.strategy = self.select_strategy(comments);
        debug!(strategy = %run.strategy, comments = comments.len(), "Running workflow");

        run.advance(WorkflowPhase::Executing);
        let collected = match self.execute(run.strategy, comments, cancel).await {
            Ok(collected) => collected,
            Err(()) => {
                run.advance(WorkflowPhase::Failed);
                run.outcomes = comments
                    .iter()
                    .map(|c| {
                        (
                            c.id.clone(),
                            Err(WorkflowError::Cancelled {
                                comment_id: c.id.clone(),
                            }),
                        )
                    })
                    .collect();
                return run;
            }
        };

        run.advance(WorkflowPhase::Integrating);
        let mut integrated: Vec<(String, CommentOutcome)> = Vec::with_capacity(comments.len());
        for comment in comments {
            let id = comment.id.clone();
            let errors = collected.errors.get(&id).cloned().unwrap_or_default();
            let outcome = match collected.results.get(&id) {
                Some(results) if !results.is_empty() => {
                    let mut result = self.integrator.integrate(&id, results);
                    let mut missing: Vec<String> =
                        errors.iter().map(|e| e.engine().to_string()).collect();
                    missing.sort();
                    missing.dedup();
                    result.missing_engines = missing;
                    Ok(result)
                }
                _ if errors.iter().any(|e| e.is_systemic()) => Err(WorkflowError::Upstream {
                    comment_id: id.clone(),
                    errors,
                }),
                _ => Err(WorkflowError::NoResults {
                    comment_id: id.clone(),
                    errors,
                }),
            };
            integrated.push((id, outcome));
        }

        run.advance(WorkflowPhase::QualityChecking);
        let refiner = ChunkRefiner {
            manager: self,
            comments: comments.iter().map(|c| (c.id.as_str(), c)).collect(),
            collected: &collected,
        };
        for (id, outcome) in integrated {
            let outcome = match outcome {
                Ok(result) => Ok(self.quality.assess(result, &self.kinds, &refiner).await),
                Err(e) => Err(e),
            };
            run.outcomes.push((id, outcome));
        }

        if run.succeeded() == 0 && !comments.is_empty() {
            run.advance(WorkflowPhase::Failed);
        } else {
            run.advance(WorkflowPhase::Done);
        }
        run
    }
}

// ============================================================================
// Refinement
// ============================================================================

/// Re-queries one capability for a comment of the current chunk, passing
/// the other resolved capabilities as context.
struct ChunkRefiner<'a> {
    manager: &'a WorkflowManager,
    comments: HashMap<&'a str, &'a Comment>,
    collected: &'a Collected,
}

impl ChunkRefiner<'_> {
    fn context(result: &IntegratedResult, kind: EngineKind) -> BTreeMap<String, String> {
        let mut context = BTreeMap::new();
        context.insert(context_keys::REFINE.to_string(), "true".to_string());
        for (other, resolved) in &result.per_capability {
            if *other == kind {
                continue;
            }
            match &resolved.payload {
                EnginePayload::Language { code, mixed } => {
                    context.insert(context_keys::LANGUAGE.to_string(), code.clone());
                    context.insert(
                        context_keys::LANGUAGE_CONFIDENCE.to_string(),
                        format!("{:.2}", resolved.confidence),
                    );
                    context.insert(context_keys::LANGUAGE_MIXED.to_string(), mixed.to_string());
                }
                EnginePayload::Sentiment { label, score } => {
                    context.insert(context_keys::SENTIMENT.to_string(), label.as_str().to_string());
                    context.insert(context_keys::SENTIMENT_SCORE.to_string(), format!("{:.2}", score));
                }
                EnginePayload::Theme { primary, .. } => {
                    context.insert(context_keys::THEME.to_string(), primary.clone());
                }
                EnginePayload::Emotion { .. } => {}
            }
        }
        context
    }
}

#[async_trait]
impl Refiner for ChunkRefiner<'_> {
    async fn refine(&self, result: &IntegratedResult, kind: EngineKind) -> Option<IntegratedResult> {
        let comment = *self.comments.get(result.comment_id.as_str())?;
        let engines = self.manager.registry.engines_for(kind);
        if engines.is_empty() {
            return None;
        }

        let config = EngineConfig {
            language_hint: comment.language.clone(),
            context: Self::context(result, kind),
            timeout: self.manager.config.engine_timeout(),
        };
        let members = [comment];
        let outcomes = join_all(
            engines
                .iter()
                .map(|engine| self.manager.call(engine, &members, &config)),
        )
        .await;

        let mut refreshed = Collected::default();
        for (engine, outcome) in engines.iter().zip(outcomes) {
            WorkflowManager::absorb(engine.as_ref(), &members, outcome, &mut refreshed);
        }
        let fresh = refreshed.results.remove(&comment.id).unwrap_or_default();
        if fresh.is_empty() {
            return None;
        }

        let answered: HashSet<&str> = fresh.iter().map(|r| r.engine.as_str()).collect();
        let mut merged: Vec<EngineResult> = self
            .collected
            .results
            .get(&comment.id)
            .map(|results| results.iter().filter(|r| r.kind != kind).cloned().collect())
            .unwrap_or_default();
        merged.extend(fresh.iter().cloned());

        let mut candidate = self.manager.integrator.reintegrate(&comment.id, &merged);
        candidate.missing_engines = result
            .missing_engines
            .iter()
            .filter(|name| !answered.contains(name.as_str()))
            .cloned()
            .collect();
        Some(candidate)
    }
}
