//! Lexicon sentiment engine for Spanish, Guaraní and Jopará comments.

use async_trait::async_trait;

use super::lexicon::{language_profile, polarity};
use super::{analysable, context_keys, AnalysisEngine, EngineConfig};
use crate::models::{Comment, EngineKind, EnginePayload, EngineResult};
use crate::EngineError;

/// Polarity from a weighted lexicon with negation and intensifier handling.
///
/// Guaraní morphology (circumfix negation, intensifying suffixes) is only
/// applied when the config carries a Guaraní/Jopará language hint, or on a
/// refinement pass where the engine checks the language itself. Comments
/// with unanalysed Guaraní stems get a reduced confidence.
#[derive(Debug, Clone)]
pub struct LexiconSentimentEngine {
    name: String,
}

impl Default for LexiconSentimentEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LexiconSentimentEngine {
    pub const NAME: &'static str = "sentiment-lexicon";

    pub fn new() -> Self {
        Self::named(Self::NAME)
    }

    /// Same engine under another registered name (for fallbacks).
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn uses_morphology(text: &str, config: &EngineConfig) -> bool {
        match config.language() {
            Some(code) => matches!(code, "gn" | "jopara"),
            None => config.is_refinement() && language_profile(text).involves_guarani(),
        }
    }

    /// Payload and confidence for one text.
    pub fn analyze_text(&self, text: &str, config: &EngineConfig) -> (EnginePayload, f64) {
        let scan = polarity(text, Self::uses_morphology(text, config));

        let mut confidence = if scan.hits == 0 {
            0.45
        } else {
            (0.55 + 0.1 * scan.hits as f64).min(0.95)
        };
        if scan.unanalysed_guarani > 0 {
            confidence *= 0.6;
        }
        // A cascaded language detection that was itself unsure caps ours
        if let Some(lang_conf) = config
            .context(context_keys::LANGUAGE_CONFIDENCE)
            .and_then(|v| v.parse::<f64>().ok())
        {
            confidence = confidence.min(0.5 + lang_conf / 2.0);
        }

        (EnginePayload::sentiment(scan.score), confidence)
    }
}

#[async_trait]
impl AnalysisEngine for LexiconSentimentEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Sentiment
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
