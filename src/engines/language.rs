//! Marker-word language detection: Spanish, Guaraní or Jopará.

use async_trait::async_trait;

use super::lexicon::language_profile;
use super::{analysable, AnalysisEngine, EngineConfig};
use crate::models::{Comment, EngineKind, EnginePayload, EngineResult};
use crate::EngineError;

#[derive(Debug, Clone)]
pub struct MarkerLanguageEngine {
    name: String,
}

impl Default for MarkerLanguageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerLanguageEngine {
    pub const NAME: &'static str = "language-markers";

    pub fn new() -> Self {
        Self::named(Self::NAME)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Detect the language of one comment. A language already supplied by
    /// ingestion is trusted.
    pub fn detect(&self, comment: &Comment) -> (EnginePayload, f64) {
        if let Some(known) = comment.language.as_deref().filter(|l| !l.is_empty()) {
            return (
                EnginePayload::Language {
                    code: known.to_string(),
                    mixed: known == "jopara",
                },
                0.99,
            );
        }

        let profile = language_profile(comment.analysis_text());
        let code = profile.code();
        let confidence = if code == "und" {
            0.3
        } else {
            0.4 + 0.5 * profile.coverage()
        };
        (
            EnginePayload::Language {
                code: code.to_string(),
                mixed: profile.is_mixed(),
            },
            confidence,
        )
    }
}

#[async_trait]
impl AnalysisEngine for MarkerLanguageEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Language
    }

    async fn analyze_batch(
        &self,
        comments: &[Comment],
        _config: &EngineConfig,
    ) -> Result<Vec<EngineResult>, EngineError> {
        Ok(analysable(&self.name, comments)?
            .into_iter()
            .map(|comment| {
                let (payload, confidence) = self.detect(comment);
                EngineResult::new(&comment.id, &self.name, payload, confidence)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_jopara_as_mixed() {
        let engine = MarkerLanguageEngine::new();
        let (payload, confidence) =
            engine.detect(&Comment::new("a", "La atención iporã pero el precio hepy heta"));
        assert_eq!(
            payload,
            EnginePayload::Language {
                code: "jopara".into(),
                mixed: true
            }
        );
        assert!(confidence > 0.4);
    }

    #[test]
    fn test_trusts_ingested_language() {
        let engine = MarkerLanguageEngine::new();
        let comment = Comment::new("a", "whatever").with_language("es");
        let (payload, confidence) = engine.detect(&comment);
        assert_eq!(payload.label(), "es");
        assert!(confidence > 0.9);
    }

    #[tokio::test]
    async fn test_batch_of_blank_comments_is_invalid() {
        let engine = MarkerLanguageEngine::new();
        let err = engine
            .analyze_batch(&[Comment::new("a", "")], &EngineConfig::default())
            .await
            .unwrap_err();
        assert!(!err.is_systemic());
    }
}
