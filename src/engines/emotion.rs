//! Lexicon emotion engine.
//!
//! Scores joy, anger, sadness, fear, surprise and trust from keyword hits.
//! When no keyword matches, a cascaded sentiment label gives a weak guess;
//! otherwise the comment is neutral.

use async_trait::async_trait;

use super::lexicon::{emotion_hits, NEUTRAL_EMOTION};
use super::{analysable, context_keys, AnalysisEngine, EngineConfig};
use crate::models::{Comment, EngineKind, EnginePayload, EngineResult, LabelScore};
use crate::EngineError;

#[derive(Debug, Clone)]
pub struct LexiconEmotionEngine {
    name: String,
}

impl Default for LexiconEmotionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Sort scores descending and pick the dominant label.
fn to_emotion_payload(scores: Vec<(String, f64)>) -> EnginePayload {
    let mut sorted: Vec<LabelScore> = scores
        .into_iter()
        .map(|(label, score)| LabelScore::new(label, score))
        .collect();
    sorted.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let dominant = sorted
        .first()
        .map(|s| s.label.clone())
        .unwrap_or_else(|| NEUTRAL_EMOTION.to_string());

    EnginePayload::Emotion {
        dominant,
        scores: sorted,
    }
}

impl LexiconEmotionEngine {
    pub const NAME: &'static str = "emotion-lexicon";

    pub fn new() -> Self {
        Self::named(Self::NAME)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn analyze_text(&self, text: &str, config: &EngineConfig) -> (EnginePayload, f64) {
        let hits = emotion_hits(text);
        let total: usize = hits.iter().map(|(_, n)| n).sum();

        if total > 0 {
            let top = hits[0].1;
            let scores = hits
                .into_iter()
                .map(|(emotion, n)| (emotion.to_string(), n as f64 / total as f64))
                .collect();
            let confidence = (0.5 + 0.15 * top as f64).min(0.9);
            return (to_emotion_payload(scores), confidence);
        }

        match config.context(context_keys::SENTIMENT) {
            Some("positive") => (to_emotion_payload(vec![("joy".into(), 1.0)]), 0.35),
            Some("negative") => (to_emotion_payload(vec![("anger".into(), 1.0)]), 0.3),
            _ => (to_emotion_payload(Vec::new()), 0.4),
        }
    }
}

#[async_trait]
impl AnalysisEngine for LexiconEmotionEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Emotion
    }

    async fn analyze_batch(
        &self,
        comments: &[Comment],
        config: &EngineConfig,
    ) -> Result<Vec<EngineResult>, EngineError> {
        Ok(analysable(&self.name, comments)?
            .into_iter()
            .map(|comment| {
                let (payload, confidence) = self.analyze_text(comment.analysis_text(), config);
                EngineResult::new(&comment.id, &self.name, payload, confidence)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dominant_emotion_from_keywords() {
        let engine = LexiconEmotionEngine::new();
        let (payload, _) = engine.analyze_text("Qué bronca, estoy harto", &EngineConfig::default());
        assert_eq!(payload.label(), "anger");
    }

    #[test]
    fn test_neutral_without_keywords_or_context() {
        let engine = LexiconEmotionEngine::new();
        let (payload, _) = engine.analyze_text("Fui ayer", &EngineConfig::default());
        assert_eq!(payload.label(), NEUTRAL_EMOTION);
    }

    #[test]
    fn test_cascaded_sentiment_guides_fallback() {
        let engine = LexiconEmotionEngine::new();
        let config = EngineConfig::default().with_context(context_keys::SENTIMENT, "positive");
        let (payload, confidence) = engine.analyze_text("Fui ayer", &config);
        assert_eq!(payload.label(), "joy");
        assert!(confidence < 0.5);
    }

    #[test]
    fn test_to_emotion_payload_sorts_descending() {
        let payload = to_emotion_payload(vec![("fear".into(), 0.2), ("joy".into(), 0.8)]);
        match payload {
            EnginePayload::Emotion { dominant, scores } => {
                assert_eq!(dominant, "joy");
                assert_eq!(scores[1].label, "fear");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
