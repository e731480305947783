//! Cross-engine result integration and conflict resolution.
//!
//! Every capability of a comment resolves to exactly one value. How it is
//! resolved depends on how strongly the contributing engines disagree:
//!
//! | Severity | Condition                                   | Resolution                    |
//! |----------|---------------------------------------------|-------------------------------|
//! | None     | same label, scores within tolerance         | highest confidence            |
//! | Low      | same label, scores diverge                  | highest confidence            |
//! | Medium   | different labels                            | confidence-weighted consensus |
//! | High     | opposite polarity, both confident           | historical accuracy prior     |
//!
//! High severity always flags the result for manual review.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{
    ConflictSeverity, EngineKind, EnginePayload, EngineResult, IntegratedResult,
    ResolutionMethod, ResolvedValue, SentimentLabel,
};
use crate::services::accuracy::{AccuracyPrior, DecayingAccuracyTracker};
use crate::utils::math::weighted_mean;

/// Bucket used for the accuracy prior when no language was resolved.
pub const UNKNOWN_BUCKET: &str = "und";

// ============================================================================
// Configuration
// ============================================================================

/// Capability weights for the overall confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityWeights {
    pub sentiment: f64,
    pub theme: f64,
    pub emotion: f64,
    pub language: f64,
}

impl Default for CapabilityWeights {
    fn default() -> Self {
        Self {
            sentiment: 0.3,
            theme: 0.25,
            emotion: 0.25,
            language: 0.2,
        }
    }
}

impl CapabilityWeights {
    pub fn weight(&self, kind: EngineKind) -> f64 {
        match kind {
            EngineKind::Sentiment => self.sentiment,
            EngineKind::Theme => self.theme,
            EngineKind::Emotion => self.emotion,
            EngineKind::Language => self.language,
        }
        .max(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    pub weights: CapabilityWeights,
    /// Sentiment scores within this distance count as agreeing
    pub score_tolerance: f64,
    /// Both engines must exceed this confidence for a high-severity conflict
    pub high_confidence: f64,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            weights: CapabilityWeights::default(),
            score_tolerance: 0.2,
            high_confidence: 0.7,
        }
    }
}

// ============================================================================
// Polarity helpers
// ============================================================================

/// Valence of an emotion label, if it has one.
fn emotion_valence(label: &str) -> Option<SentimentLabel> {
    match label {
        "joy" | "trust" => Some(SentimentLabel::Positive),
        "anger" | "sadness" | "fear" => Some(SentimentLabel::Negative),
        _ => None,
    }
}

/// Whether two payloads point in opposite directions. Only sentiment and
/// emotion have a polarity; themes and languages can differ but never
/// oppose each other.
fn is_opposite(a: &EnginePayload, b: &EnginePayload) -> bool {
    match (a, b) {
        (EnginePayload::Sentiment { label: x, .. }, EnginePayload::Sentiment { label: y, .. }) => {
            x.is_opposite(*y)
        }
        (EnginePayload::Emotion { dominant: x, .. }, EnginePayload::Emotion { dominant: y, .. }) => {
            match (emotion_valence(x), emotion_valence(y)) {
                (Some(x), Some(y)) => x.is_opposite(y),
                _ => false,
            }
        }
        _ => false,
    }
}

/// Combine an accuracy prior with a reported confidence (odds product).
fn posterior(prior: f64, confidence: f64) -> f64 {
    let agree = prior * confidence;
    let disagree = (1.0 - prior) * (1.0 - confidence);
    if agree + disagree <= f64::EPSILON {
        0.5
    } else {
        agree / (agree + disagree)
    }
}

/// Highest-confidence result; ties go to the earliest.
fn most_confident<'a>(results: &[&'a EngineResult]) -> Option<&'a EngineResult> {
    results.iter().copied().fold(None, |best, r| match best {
        Some(b) if b.confidence >= r.confidence => Some(b),
        _ => Some(r),
    })
}

/// Sum `weight` per label, keeping first-seen order for ties.
fn tally<'a>(results: &[&'a EngineResult], weight: impl Fn(&EngineResult) -> f64) -> Vec<(&'a str, f64)> {
    let mut totals: Vec<(&str, f64)> = Vec::new();
    for &r in results {
        let label = r.payload.label();
        let w = weight(r);
        match totals.iter_mut().find(|(l, _)| *l == label) {
            Some((_, total)) => *total += w,
            None => totals.push((label, w)),
        }
    }
    totals
}

/// Winning label of a tally; ties go to the first seen.
fn winner<'a>(totals: &[(&'a str, f64)]) -> Option<(&'a str, f64)> {
    totals.iter().copied().fold(None, |best, (label, w)| match best {
        Some((_, bw)) if bw >= w => best,
        _ => Some((label, w)),
    })
}

// ============================================================================
// Integrator
// ============================================================================

/// Merges per-engine results into one [`IntegratedResult`] per comment.
pub struct ResultIntegrator {
    config: IntegratorConfig,
    prior: Arc<dyn AccuracyPrior>,
}

impl Default for ResultIntegrator {
    fn default() -> Self {
        Self::new(
            IntegratorConfig::default(),
            Arc::new(DecayingAccuracyTracker::default()),
        )
    }
}

impl ResultIntegrator {
    pub fn new(config: IntegratorConfig, prior: Arc<dyn AccuracyPrior>) -> Self {
        Self { config, prior }
    }

    pub fn config(&self) -> &IntegratorConfig {
        &self.config
    }

    /// Integrate a comment's engine results and feed the agreement outcome
    /// back into the accuracy prior.
    pub fn integrate(&self, comment_id: &str, results: &[EngineResult]) -> IntegratedResult {
        self.integrate_inner(comment_id, results, true)
    }

    /// Integrate without updating the accuracy prior. Used when results that
    /// were already counted are merged again after refinement.
    pub fn reintegrate(&self, comment_id: &str, results: &[EngineResult]) -> IntegratedResult {
        self.integrate_inner(comment_id, results, false)
    }

    fn integrate_inner(
        &self,
        comment_id: &str,
        results: &[EngineResult],
        record: bool,
    ) -> IntegratedResult {
        let mut by_kind: BTreeMap<EngineKind, Vec<&EngineResult>> = BTreeMap::new();
        for result in results {
            if result.comment_id != comment_id {
                warn!(
                    comment_id,
                    other = %result.comment_id,
                    engine = %result.engine,
                    "Ignoring engine result for another comment"
                );
                continue;
            }
            by_kind.entry(result.kind).or_default().push(result);
        }

        // Language resolves first (kind order) and becomes the prior bucket
        let mut bucket = UNKNOWN_BUCKET.to_string();
        let mut per_capability = BTreeMap::new();
        for (kind, results) in &by_kind {
            let resolved = self.resolve(*kind, results, &bucket);
            if record && results.len() > 1 {
                for r in results {
                    let agreed = r.payload.label() == resolved.payload.label();
                    self.prior.record(&r.engine, &bucket, agreed);
                }
            }
            if *kind == EngineKind::Language {
                bucket = resolved.payload.label().to_string();
            }
            per_capability.insert(*kind, resolved);
        }

        let weighted: Vec<(f64, f64)> = per_capability
            .iter()
            .map(|(kind, v)| (v.confidence, self.config.weights.weight(*kind)))
            .collect();
        let overall_confidence = if weighted.is_empty() {
            0.0
        } else {
            weighted_mean(&weighted)
        };

        let consensus_level = if per_capability.is_empty() {
            1.0
        } else {
            per_capability
                .values()
                .filter(|v| v.severity == ConflictSeverity::None)
                .count() as f64
                / per_capability.len() as f64
        };

        let requires_manual_review = per_capability
            .values()
            .any(|v| v.severity == ConflictSeverity::High);
        if requires_manual_review {
            debug!(comment_id, "High-severity conflict flagged for manual review");
        }

        IntegratedResult {
            comment_id: comment_id.to_string(),
            per_capability,
            overall_confidence,
            consensus_level,
            requires_manual_review,
            missing_engines: Vec::new(),
            quality: None,
        }
    }

    /// Severity of the disagreement among results for one capability.
    pub fn classify(&self, results: &[&EngineResult]) -> ConflictSeverity {
        if results.len() < 2 {
            return ConflictSeverity::None;
        }
        let first = results[0].payload.label();
        if results.iter().all(|r| r.payload.label() == first) {
            let scores: Vec<f64> = results.iter().filter_map(|r| r.payload.score()).collect();
            let spread = match (
                scores.iter().copied().reduce(f64::max),
                scores.iter().copied().reduce(f64::min),
            ) {
                (Some(max), Some(min)) => max - min,
                _ => 0.0,
            };
            return if spread <= self.config.score_tolerance {
                ConflictSeverity::None
            } else {
                ConflictSeverity::Low
            };
        }

        let confident = |r: &EngineResult| r.confidence > self.config.high_confidence;
        for (i, a) in results.iter().enumerate() {
            for b in &results[i + 1..] {
                if confident(a) && confident(b) && is_opposite(&a.payload, &b.payload) {
                    return ConflictSeverity::High;
                }
            }
        }
        ConflictSeverity::Medium
    }

    fn resolve(&self, kind: EngineKind, results: &[&EngineResult], bucket: &str) -> ResolvedValue {
        let contributing_engines: Vec<String> = results.iter().map(|r| r.engine.clone()).collect();
        let severity = self.classify(results);

        let (payload, confidence, method) = match (results, severity) {
            ([single], _) => (single.payload.clone(), single.confidence, ResolutionMethod::SingleSource),
            (_, ConflictSeverity::None) => self.highest_confidence(results, ResolutionMethod::Unanimous),
            (_, ConflictSeverity::Low) => {
                self.highest_confidence(results, ResolutionMethod::HighestConfidence)
            }
            (_, ConflictSeverity::Medium) => self.weighted_consensus(kind, results),
            (_, ConflictSeverity::High) => self.historical_prior(results, bucket),
        };

        ResolvedValue {
            payload,
            confidence: confidence.clamp(0.0, 1.0),
            severity,
            method,
            contributing_engines,
        }
    }

    fn highest_confidence(
        &self,
        results: &[&EngineResult],
        method: ResolutionMethod,
    ) -> (EnginePayload, f64, ResolutionMethod) {
        match most_confident(results) {
            Some(best) => (best.payload.clone(), best.confidence, method),
            None => (EnginePayload::sentiment(0.0), 0.0, method),
        }
    }

    /// Confidence-weighted vote. Sentiment resolves to the weighted mean
    /// polarity; other capabilities to the label with the most weight.
    fn weighted_consensus(
        &self,
        kind: EngineKind,
        results: &[&EngineResult],
    ) -> (EnginePayload, f64, ResolutionMethod) {
        let method = ResolutionMethod::WeightedConsensus;
        let total: f64 = results.iter().map(|r| r.confidence).sum();

        let payload = if kind == EngineKind::Sentiment {
            let pairs: Vec<(f64, f64)> = results
                .iter()
                .filter_map(|r| r.payload.score().map(|s| (s, r.confidence)))
                .collect();
            EnginePayload::sentiment(weighted_mean(&pairs))
        } else {
            let totals = tally(results, |r| r.confidence);
            let Some((label, _)) = winner(&totals) else {
                return self.highest_confidence(results, method);
            };
            let supporters: Vec<&EngineResult> = results
                .iter()
                .copied()
                .filter(|r| r.payload.label() == label)
                .collect();
            match most_confident(&supporters) {
                Some(best) => best.payload.clone(),
                None => return self.highest_confidence(results, method),
            }
        };

        let supporters: Vec<&EngineResult> = results
            .iter()
            .copied()
            .filter(|r| r.payload.label() == payload.label())
            .collect();
        let confidence = if supporters.is_empty() || total <= 0.0 {
            // The compromise value has no direct backer
            0.5 * weighted_mean(
                &results
                    .iter()
                    .map(|r| (r.confidence, r.confidence))
                    .collect::<Vec<_>>(),
            )
        } else {
            let support: f64 = supporters.iter().map(|r| r.confidence).sum::<f64>() / total;
            let best = supporters
                .iter()
                .map(|r| r.confidence)
                .fold(0.0, f64::max);
            best * (0.5 + 0.5 * support)
        };

        (payload, confidence, method)
    }

    /// Weigh each engine's confidence by its historical accuracy on content
    /// of the same bucket.
    fn historical_prior(
        &self,
        results: &[&EngineResult],
        bucket: &str,
    ) -> (EnginePayload, f64, ResolutionMethod) {
        let method = ResolutionMethod::HistoricalPrior;
        let scored: Vec<(&EngineResult, f64)> = results
            .iter()
            .map(|r| (*r, posterior(self.prior.accuracy(&r.engine, bucket), r.confidence)))
            .collect();

        let mut totals: Vec<(&str, f64)> = Vec::new();
        for (r, p) in &scored {
            let label = r.payload.label();
            match totals.iter_mut().find(|(l, _)| *l == label) {
                Some((_, total)) => *total += p,
                None => totals.push((label, *p)),
            }
        }
        let total: f64 = totals.iter().map(|(_, w)| w).sum();
        let Some((label, weight)) = winner(&totals) else {
            return self.highest_confidence(results, method);
        };

        let best = scored
            .iter()
            .filter(|(r, _)| r.payload.label() == label)
            .fold(None, |best: Option<(&EngineResult, f64)>, (r, p)| match best {
                Some((_, bp)) if bp >= *p => best,
                _ => Some((*r, *p)),
            });
        match best {
            Some((r, _)) => {
                let share = if total > 0.0 { weight / total } else { 0.5 };
                (r.payload.clone(), r.confidence * share, method)
            }
            None => self.highest_confidence(results, method),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentiment(engine: &str, score: f64, confidence: f64) -> EngineResult {
        EngineResult::new("c1", engine, EnginePayload::sentiment(score), confidence)
    }

    fn theme(engine: &str, primary: &str, confidence: f64) -> EngineResult {
        EngineResult::new(
            "c1",
            engine,
            EnginePayload::Theme {
                primary: primary.into(),
                themes: vec![],
            },
            confidence,
        )
    }

    fn emotion(engine: &str, dominant: &str, confidence: f64) -> EngineResult {
        EngineResult::new(
            "c1",
            engine,
            EnginePayload::Emotion {
                dominant: dominant.into(),
                scores: vec![],
            },
            confidence,
        )
    }

    fn language(engine: &str, code: &str, confidence: f64) -> EngineResult {
        EngineResult::new(
            "c1",
            engine,
            EnginePayload::Language {
                code: code.into(),
                mixed: false,
            },
            confidence,
        )
    }

    #[test]
    fn test_single_source() {
        let integrator = ResultIntegrator::default();
        let result = integrator.integrate("c1", &[sentiment("a", 0.6, 0.8)]);
        let resolved = result.resolved(EngineKind::Sentiment).expect("sentiment");
        assert_eq!(resolved.method, ResolutionMethod::SingleSource);
        assert_eq!(resolved.severity, ConflictSeverity::None);
        assert_eq!(result.consensus_level, 1.0);
        assert!(!result.requires_manual_review);
    }

    #[test]
    fn test_agreement_takes_max_confidence() {
        let integrator = ResultIntegrator::default();
        let result = integrator.integrate(
            "c1",
            &[sentiment("a", 0.6, 0.7), sentiment("b", 0.7, 0.9)],
        );
        let resolved = result.resolved(EngineKind::Sentiment).expect("sentiment");
        assert_eq!(resolved.severity, ConflictSeverity::None);
        assert_eq!(resolved.method, ResolutionMethod::Unanimous);
        assert_eq!(resolved.confidence, 0.9);
        assert_eq!(result.consensus_level, 1.0);
    }

    #[test]
    fn test_low_severity_takes_most_confident() {
        let integrator = ResultIntegrator::default();
        let result = integrator.integrate(
            "c1",
            &[sentiment("a", 0.2, 0.9), sentiment("b", 0.9, 0.6)],
        );
        let resolved = result.resolved(EngineKind::Sentiment).expect("sentiment");
        assert_eq!(resolved.severity, ConflictSeverity::Low);
        assert_eq!(resolved.payload.score(), Some(0.2));
        assert_eq!(result.consensus_level, 0.0);
        assert!(!result.requires_manual_review);
    }

    #[test]
    fn test_medium_sentiment_uses_weighted_mean() {
        let integrator = ResultIntegrator::default();
        // positive vs neutral: different labels, not opposite
        let result = integrator.integrate(
            "c1",
            &[sentiment("a", 0.6, 0.75), sentiment("b", 0.0, 0.25)],
        );
        let resolved = result.resolved(EngineKind::Sentiment).expect("sentiment");
        assert_eq!(resolved.severity, ConflictSeverity::Medium);
        assert_eq!(resolved.method, ResolutionMethod::WeightedConsensus);
        let score = resolved.payload.score().expect("score");
        assert!((score - 0.45).abs() < 1e-9);
        assert_eq!(resolved.payload.label(), "positive");
    }

    #[test]
    fn test_medium_theme_vote() {
        let integrator = ResultIntegrator::default();
        let result = integrator.integrate(
            "c1",
            &[
                theme("a", "precio", 0.5),
                theme("b", "servicio", 0.6),
                theme("c", "precio", 0.4),
            ],
        );
        let resolved = result.resolved(EngineKind::Theme).expect("theme");
        assert_eq!(resolved.severity, ConflictSeverity::Medium);
        assert_eq!(resolved.payload.label(), "precio");
        assert_eq!(resolved.contributing_engines, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_opposite_confident_sentiment_is_high_and_flagged() {
        let integrator = ResultIntegrator::default();
        let result = integrator.integrate(
            "c1",
            &[sentiment("primary", 0.8, 0.9), sentiment("fallback", -0.7, 0.85)],
        );
        let resolved = result.resolved(EngineKind::Sentiment).expect("sentiment");
        assert_eq!(resolved.severity, ConflictSeverity::High);
        assert_eq!(resolved.method, ResolutionMethod::HistoricalPrior);
        assert_eq!(resolved.payload.label(), "positive");
        assert!(result.requires_manual_review);
    }

    #[test]
    fn test_opposite_but_unconfident_is_medium() {
        let integrator = ResultIntegrator::default();
        let result = integrator.integrate(
            "c1",
            &[sentiment("a", 0.8, 0.9), sentiment("b", -0.7, 0.6)],
        );
        assert_eq!(
            result.resolved(EngineKind::Sentiment).expect("sentiment").severity,
            ConflictSeverity::Medium
        );
        assert!(!result.requires_manual_review);
    }

    #[test]
    fn test_prior_can_overturn_confidence() {
        let tracker = Arc::new(DecayingAccuracyTracker::default());
        tracker.seed("primary", UNKNOWN_BUCKET, 0.2);
        tracker.seed("fallback", UNKNOWN_BUCKET, 0.95);
        let integrator = ResultIntegrator::new(IntegratorConfig::default(), tracker);

        let result = integrator.integrate(
            "c1",
            &[sentiment("primary", 0.8, 0.9), sentiment("fallback", -0.7, 0.85)],
        );
        assert_eq!(result.label(EngineKind::Sentiment), Some("negative"));
        assert!(result.requires_manual_review);
    }

    #[test]
    fn test_prior_bucket_follows_resolved_language() {
        let tracker = Arc::new(DecayingAccuracyTracker::default());
        tracker.seed("primary", "gn", 0.1);
        let integrator = ResultIntegrator::new(IntegratorConfig::default(), tracker.clone());

        let result = integrator.integrate(
            "c1",
            &[
                language("lang", "gn", 0.9),
                sentiment("primary", 0.8, 0.9),
                sentiment("fallback", -0.7, 0.85),
            ],
        );
        assert_eq!(result.label(EngineKind::Sentiment), Some("negative"));
        // The losing engine's accuracy on Guaraní content drops further
        assert!(tracker.accuracy("primary", "gn") < 0.1);
        assert!(tracker.accuracy("fallback", "gn") > 0.5);
    }

    #[test]
    fn test_opposite_emotions_are_high() {
        let integrator = ResultIntegrator::default();
        let result = integrator.integrate(
            "c1",
            &[emotion("a", "joy", 0.8), emotion("b", "anger", 0.75)],
        );
        assert_eq!(result.max_severity(), ConflictSeverity::High);

        let result = integrator.integrate(
            "c1",
            &[emotion("a", "joy", 0.8), emotion("b", "surprise", 0.75)],
        );
        assert_eq!(result.max_severity(), ConflictSeverity::Medium);
    }

    #[test]
    fn test_overall_confidence_uses_capability_weights() {
        let integrator = ResultIntegrator::default();
        let result = integrator.integrate(
            "c1",
            &[sentiment("s", 0.5, 1.0), language("l", "es", 0.5)],
        );
        // (0.3 * 1.0 + 0.2 * 0.5) / 0.5
        assert!((result.overall_confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_foreign_results_ignored() {
        let integrator = ResultIntegrator::default();
        let foreign = EngineResult::new("c2", "s", EnginePayload::sentiment(0.5), 0.9);
        let result = integrator.integrate("c1", &[foreign, theme("t", "precio", 0.6)]);
        assert!(result.resolved(EngineKind::Sentiment).is_none());
        assert_eq!(result.per_capability.len(), 1);
    }

    #[test]
    fn test_reintegrate_does_not_touch_prior() {
        let tracker = Arc::new(DecayingAccuracyTracker::default());
        let integrator = ResultIntegrator::new(IntegratorConfig::default(), tracker.clone());
        let results = [sentiment("a", 0.6, 0.8), sentiment("b", -0.6, 0.8)];
        integrator.reintegrate("c1", &results);
        assert_eq!(tracker.accuracy("a", UNKNOWN_BUCKET), 0.5);
        integrator.integrate("c1", &results);
        assert_ne!(tracker.accuracy("b", UNKNOWN_BUCKET), 0.5);
    }

    #[test]
    fn test_posterior() {
        assert!((posterior(0.5, 0.8) - 0.8).abs() < 1e-9);
        assert!(posterior(0.9, 0.6) > 0.6);
        assert!(posterior(0.1, 0.6) < 0.6);
        assert_eq!(posterior(1.0, 0.0), 0.5);
    }
}
