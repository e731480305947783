//! Keyword theme engine for customer-feedback topics.

use async_trait::async_trait;

use super::lexicon::{theme_hits, GENERAL_THEME};
use super::{analysable, AnalysisEngine, EngineConfig};
use crate::models::{Comment, EngineKind, EnginePayload, EngineResult, LabelScore};
use crate::EngineError;

#[derive(Debug, Clone)]
pub struct KeywordThemeEngine {
    name: String,
}

impl Default for KeywordThemeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordThemeEngine {
    pub const NAME: &'static str = "theme-keywords";

    pub fn new() -> Self {
        Self::named(Self::NAME)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn analyze_text(&self, text: &str, config: &EngineConfig) -> (EnginePayload, f64) {
        let hits = theme_hits(text);
        let total: usize = hits.iter().map(|(_, n)| n).sum();

        if total == 0 {
            // Mostly-Guaraní text falls outside the keyword list more often
            let confidence = if config.language() == Some("gn") { 0.25 } else { 0.35 };
            return (
                EnginePayload::Theme {
                    primary: GENERAL_THEME.to_string(),
                    themes: Vec::new(),
                },
                confidence,
            );
        }

        let themes: Vec<LabelScore> = hits
            .iter()
            .map(|(theme, n)| LabelScore::new(*theme, *n as f64 / total as f64))
            .collect();
        let top = hits[0].1;
        let tied = hits.iter().filter(|(_, n)| *n == top).count();
        let mut confidence = (0.5 + 0.15 * top as f64).min(0.9);
        if tied > 1 {
            confidence *= 0.8;
        }

        (
            EnginePayload::Theme {
                primary: hits[0].0.to_string(),
                themes,
            },
            confidence,
        )
    }
}

#[async_trait]
impl AnalysisEngine for KeywordThemeEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Theme
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
