//! Post-integration quality scoring with one bounded improve pass.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{EngineKind, IntegratedResult, QualityScore, SentimentLabel};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Results scoring below this get an improve pass
    pub threshold: f64,
    /// Improve passes per result (0 disables refinement)
    pub improve_passes: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            improve_passes: 1,
        }
    }
}

/// Re-queries engines for one capability of a result.
#[async_trait]
pub trait Refiner: Send + Sync {
    /// A re-integrated candidate, or `None` if nothing new came back.
    async fn refine(&self, result: &IntegratedResult, kind: EngineKind) -> Option<IntegratedResult>;
}

/// Refiner that never finds anything.
pub struct NoopRefiner;

#[async_trait]
impl Refiner for NoopRefiner {
    async fn refine(&self, _result: &IntegratedResult, _kind: EngineKind) -> Option<IntegratedResult> {
        None
    }
}

/// Sentiment and dominant emotion pull in opposite directions.
fn cross_capability_conflict(result: &IntegratedResult) -> bool {
    let sentiment = result
        .label(EngineKind::Sentiment)
        .and_then(|l| l.parse::<SentimentLabel>().ok());
    let emotion = match result.label(EngineKind::Emotion) {
        Some("joy") | Some("trust") => Some(SentimentLabel::Positive),
        Some("anger") | Some("sadness") | Some("fear") => Some(SentimentLabel::Negative),
        _ => None,
    };
    matches!((sentiment, emotion), (Some(s), Some(e)) if s.is_opposite(e))
}

pub struct QualityAssurance {
    config: QualityConfig,
}

impl Default for QualityAssurance {
    fn default() -> Self {
        Self::new(QualityConfig::default())
    }
}

impl QualityAssurance {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Score a result against the capabilities that were requested.
    pub fn score(&self, result: &IntegratedResult, expected: &[EngineKind]) -> QualityScore {
        let accuracy = result.overall_confidence;

        let consistency = if cross_capability_conflict(result) {
            result.consensus_level * 0.7
        } else {
            result.consensus_level
        };

        let completeness = if expected.is_empty() {
            1.0
        } else {
            expected
                .iter()
                .filter(|k| result.per_capability.contains_key(*k))
                .count() as f64
                / expected.len() as f64
        };

        let answered: usize = result
            .per_capability
            .values()
            .map(|v| v.contributing_engines.len())
            .sum();
        let asked = answered + result.missing_engines.len();
        let reliability = if asked == 0 {
            0.0
        } else {
            answered as f64 / asked as f64
        };

        let overall = 0.35 * accuracy + 0.25 * consistency + 0.2 * completeness + 0.2 * reliability;
        QualityScore {
            accuracy,
            consistency,
            completeness,
            reliability,
            overall,
            refined: false,
        }
    }

    /// Capability to refine: a missing one first, else the least confident.
    pub fn weakest_capability(
        &self,
        result: &IntegratedResult,
        expected: &[EngineKind],
    ) -> Option<EngineKind> {
        if let Some(missing) = expected
            .iter()
            .find(|k| !result.per_capability.contains_key(*k))
        {
            return Some(*missing);
        }
        result
            .per_capability
            .iter()
            .min_by(|a, b| {
                a.1.confidence
                    .partial_cmp(&b.1.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(kind, _)| *kind)
    }

    /// Score and finalize a result, refining it once if it falls below the
    /// threshold. Finalized results are returned unchanged.
    pub async fn assess(
        &self,
        result: IntegratedResult,
        expected: &[EngineKind],
        refiner: &dyn Refiner,
    ) -> IntegratedResult {
        if result.is_finalized() {
            return result;
        }

        let score = self.score(&result, expected);
        if score.overall >= self.config.threshold || self.config.improve_passes == 0 {
            return IntegratedResult {
                quality: Some(score),
                ..result
            };
        }

        let mut best = result;
        let mut best_score = score;
        for pass in 0..self.config.improve_passes {
            let Some(kind) = self.weakest_capability(&best, expected) else {
                break;
            };
            let Some(candidate) = refiner.refine(&best, kind).await else {
                break;
            };
            let candidate_score = self.score(&candidate, expected);
            debug!(
                comment_id = %best.comment_id,
                capability = %kind,
                pass,
                before = best_score.overall,
                after = candidate_score.overall,
                "Refined low-quality result"
            );
            if candidate_score.overall > best_score.overall {
                best = candidate;
                best_score = candidate_score;
            }
            if best_score.overall >= self.config.threshold {
                break;
            }
        }

        IntegratedResult {
            quality: Some(QualityScore {
                refined: true,
                ..best_score
            }),
            ..best
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConflictSeverity, EnginePayload, ResolutionMethod, ResolvedValue};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn resolved(payload: EnginePayload, confidence: f64) -> ResolvedValue {
        ResolvedValue {
            payload,
            confidence,
            severity: ConflictSeverity::None,
            method: ResolutionMethod::SingleSource,
            contributing_engines: vec!["e".into()],
        }
    }

    fn result(confidence: f64) -> IntegratedResult {
        let mut per_capability = BTreeMap::new();
        per_capability.insert(
            EngineKind::Sentiment,
            resolved(EnginePayload::sentiment(0.5), confidence),
        );
        IntegratedResult {
            comment_id: "c1".into(),
            per_capability,
            overall_confidence: confidence,
            consensus_level: 1.0,
            requires_manual_review: false,
            missing_engines: vec![],
            quality: None,
        }
    }

    struct BoostingRefiner {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Refiner for BoostingRefiner {
        async fn refine(&self, result: &IntegratedResult, _kind: EngineKind) -> Option<IntegratedResult> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let mut better = result.clone();
            better.overall_confidence = 0.95;
            Some(better)
        }
    }

    #[tokio::test]
    async fn test_good_result_passes_through() {
        let qa = QualityAssurance::default();
        let refiner = BoostingRefiner {
            calls: AtomicUsize::new(0),
        };
        let out = qa.assess(result(0.9), &[EngineKind::Sentiment], &refiner).await;
        let quality = out.quality.as_ref().expect("quality");
        assert!(!quality.refined);
        assert!(quality.overall >= 0.7);
        assert_eq!(refiner.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_low_result_is_refined_once() {
        let qa = QualityAssurance::default();
        let refiner = BoostingRefiner {
            calls: AtomicUsize::new(0),
        };
        let expected = [EngineKind::Sentiment, EngineKind::Theme];
        let out = qa.assess(result(0.3), &expected, &refiner).await;
        let quality = out.quality.as_ref().expect("quality");
        assert!(quality.refined);
        assert_eq!(out.overall_confidence, 0.95);
        assert_eq!(refiner.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_assess_is_idempotent() {
        let qa = QualityAssurance::default();
        let refiner = BoostingRefiner {
            calls: AtomicUsize::new(0),
        };
        let once = qa.assess(result(0.1), &[EngineKind::Sentiment], &refiner).await;
        let twice = qa.assess(once.clone(), &[EngineKind::Sentiment], &refiner).await;
        assert_eq!(once, twice);
        assert_eq!(refiner.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_noop_refiner_still_finalizes() {
        let qa = QualityAssurance::default();
        let out = qa.assess(result(0.0), &[EngineKind::Sentiment], &NoopRefiner).await;
        let quality = out.quality.expect("quality");
        assert!(quality.refined);
        assert!(quality.overall < 0.7);
    }

    #[test]
    fn test_missing_capability_is_weakest() {
        let qa = QualityAssurance::default();
        let r = result(0.9);
        assert_eq!(
            qa.weakest_capability(&r, &[EngineKind::Sentiment, EngineKind::Theme]),
            Some(EngineKind::Theme)
        );
        assert_eq!(
            qa.weakest_capability(&r, &[EngineKind::Sentiment]),
            Some(EngineKind::Sentiment)
        );
    }

    #[test]
    fn test_cross_capability_conflict_lowers_consistency() {
        let qa = QualityAssurance::default();
        let mut r = result(0.9);
        r.per_capability.insert(
            EngineKind::Emotion,
            resolved(
                EnginePayload::Emotion {
                    dominant: "anger".into(),
                    scores: vec![],
                },
                0.9,
            ),
        );
        let score = qa.score(&r, &[EngineKind::Sentiment, EngineKind::Emotion]);
        assert!((score.consistency - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_reliability_counts_missing_engines() {
        let qa = QualityAssurance::default();
        let mut r = result(0.9);
        r.missing_engines = vec!["theme-keywords".into()];
        let score = qa.score(&r, &[EngineKind::Sentiment]);
        assert_eq!(score.reliability, 0.5);
    }
}
