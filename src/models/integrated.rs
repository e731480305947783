//! Integrated result model: the reconciled, single-valued-per-capability
//! outcome for one comment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::engine::{EngineKind, EnginePayload};

/// How strongly the contributing engines disagreed on one capability.
///
/// Ordered from least to most severe so the worst conflict of a result can
/// be found with `max()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    /// Engines agree (or only one engine contributed)
    None,
    /// Same label, scores diverge beyond tolerance
    Low,
    /// Different labels, moderate divergence
    Medium,
    /// Strongly opposite outputs, each backed by high confidence
    High,
}

/// Which rule produced the resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    SingleSource,
    Unanimous,
    HighestConfidence,
    WeightedConsensus,
    HistoricalPrior,
}

/// The one resolved value for a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedValue {
    pub payload: EnginePayload,
    pub confidence: f64,
    pub severity: ConflictSeverity,
    pub method: ResolutionMethod,
    /// Engines whose results were considered
    pub contributing_engines: Vec<String>,
}

/// Quality sub-scores attached by quality assurance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub accuracy: f64,
    pub consistency: f64,
    pub completeness: f64,
    pub reliability: f64,
    pub overall: f64,
    /// An improve pass ran (whether or not it raised the score)
    pub refined: bool,
}

/// Reconciled result for one comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegratedResult {
    pub comment_id: String,
    /// Exactly one resolved value per capability that produced any result
    pub per_capability: BTreeMap<EngineKind, ResolvedValue>,
    pub overall_confidence: f64,
    /// Fraction of capabilities resolved without conflict
    pub consensus_level: f64,
    /// Set whenever a high-severity disagreement was resolved
    pub requires_manual_review: bool,
    /// Engines that failed or returned nothing for this comment
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_engines: Vec<String>,
    /// Present once quality assurance has finalized the result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityScore>,
}

impl IntegratedResult {
    pub fn resolved(&self, kind: EngineKind) -> Option<&ResolvedValue> {
        self.per_capability.get(&kind)
    }

    /// Worst conflict across capabilities.
    pub fn max_severity(&self) -> ConflictSeverity {
        self.per_capability
            .values()
            .map(|v| v.severity)
            .max()
            .unwrap_or(ConflictSeverity::None)
    }

    pub fn is_finalized(&self) -> bool {
        self.quality.is_some()
    }

    /// Resolved categorical label for a capability, if any.
    pub fn label(&self, kind: EngineKind) -> Option<&str> {
        self.per_capability.get(&kind).map(|v| v.payload.label())
    }
}
