//! Historical engine accuracy, used as a prior when engines strongly
//! disagree.

use std::collections::HashMap;
use std::sync::RwLock;

/// Per-engine accuracy on similar content.
///
/// `bucket` groups similar content; the integrator uses the detected
/// language code.
pub trait AccuracyPrior: Send + Sync {
    /// Accuracy estimate in [0, 1].
    fn accuracy(&self, engine: &str, bucket: &str) -> f64;

    /// Record whether an engine agreed with the resolved value.
    fn record(&self, engine: &str, bucket: &str, agreed: bool);
}

/// Exponentially decayed agreement rate per (engine, bucket).
///
/// Each observation moves the estimate by `1 - decay` toward 1.0 (agreed) or
/// 0.0 (disagreed). Unseen pairs start at `initial`.
#[derive(Debug)]
pub struct DecayingAccuracyTracker {
    decay: f64,
    initial: f64,
    scores: RwLock<HashMap<(String, String), f64>>,
}

impl Default for DecayingAccuracyTracker {
    fn default() -> Self {
        Self::new(0.9, 0.5)
    }
}

impl DecayingAccuracyTracker {
    pub fn new(decay: f64, initial: f64) -> Self {
        Self {
            decay: decay.clamp(0.0, 1.0),
            initial: initial.clamp(0.0, 1.0),
            scores: RwLock::new(HashMap::new()),
        }
    }

    /// Seed a known accuracy, e.g. from an offline evaluation.
    pub fn seed(&self, engine: &str, bucket: &str, accuracy: f64) {
        let mut scores = self.scores.write().unwrap_or_else(|e| e.into_inner());
        scores.insert((engine.to_string(), bucket.to_string()), accuracy.clamp(0.0, 1.0));
    }
}

impl AccuracyPrior for DecayingAccuracyTracker {
    fn accuracy(&self, engine: &str, bucket: &str) -> f64 {
        let scores = self.scores.read().unwrap_or_else(|e| e.into_inner());
        scores
            .get(&(engine.to_string(), bucket.to_string()))
            .copied()
            .unwrap_or(self.initial)
    }

    fn record(&self, engine: &str, bucket: &str, agreed: bool) {
        let observation = if agreed { 1.0 } else { 0.0 };
        let mut scores = self.scores.write().unwrap_or_else(|e| e.into_inner());
        let score = scores
            .entry((engine.to_string(), bucket.to_string()))
            .or_insert(self.initial);
        *score = self.decay * *score + (1.0 - self.decay) * observation;
    }
}
