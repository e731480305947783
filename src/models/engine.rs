//! Engine output model: one capability's raw result for one comment.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of analysis capabilities.
///
/// Declaration order is the cascade order: language first, then sentiment,
/// theme and emotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Language,
    Sentiment,
    Theme,
    Emotion,
}

impl EngineKind {
    pub const ALL: [EngineKind; 4] = [
        EngineKind::Language,
        EngineKind::Sentiment,
        EngineKind::Theme,
        EngineKind::Emotion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Language => "language",
            EngineKind::Sentiment => "sentiment",
            EngineKind::Theme => "theme",
            EngineKind::Emotion => "emotion",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "language" | "lang" => Ok(EngineKind::Language),
            "sentiment" => Ok(EngineKind::Sentiment),
            "theme" | "topic" => Ok(EngineKind::Theme),
            "emotion" => Ok(EngineKind::Emotion),
            other => Err(format!(
                "Unknown engine kind '{}'. Valid kinds: language, sentiment, theme, emotion",
                other
            )),
        }
    }
}

/// Coarse sentiment polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    /// Scores inside this band around zero are neutral.
    pub const NEUTRAL_BAND: f64 = 0.1;

    pub fn from_score(score: f64) -> Self {
        if score > Self::NEUTRAL_BAND {
            SentimentLabel::Positive
        } else if score < -Self::NEUTRAL_BAND {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }

    /// Positive vs negative. Neutral is never opposite to anything.
    pub fn is_opposite(self, other: SentimentLabel) -> bool {
        matches!(
            (self, other),
            (SentimentLabel::Positive, SentimentLabel::Negative)
                | (SentimentLabel::Negative, SentimentLabel::Positive)
        )
    }
}

impl FromStr for SentimentLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" | "positivo" => Ok(SentimentLabel::Positive),
            "negative" | "negativo" => Ok(SentimentLabel::Negative),
            "neutral" => Ok(SentimentLabel::Neutral),
            other => Err(format!("Unknown sentiment label '{}'", other)),
        }
    }
}

/// A label and its score, sorted descending wherever lists of these appear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

impl LabelScore {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Capability-specific engine output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnginePayload {
    /// Polarity score in [-1, 1] plus its coarse label
    Sentiment { label: SentimentLabel, score: f64 },
    /// Primary theme plus all detected themes
    Theme {
        primary: String,
        themes: Vec<LabelScore>,
    },
    /// Dominant emotion plus per-emotion scores
    Emotion {
        dominant: String,
        scores: Vec<LabelScore>,
    },
    /// Language code ("es", "gn", "jopara", "und"); `mixed` flags code-switching
    Language { code: String, mixed: bool },
}

impl EnginePayload {
    pub fn sentiment(score: f64) -> Self {
        let score = score.clamp(-1.0, 1.0);
        EnginePayload::Sentiment {
            label: SentimentLabel::from_score(score),
            score,
        }
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            EnginePayload::Sentiment { .. } => EngineKind::Sentiment,
            EnginePayload::Theme { .. } => EngineKind::Theme,
            EnginePayload::Emotion { .. } => EngineKind::Emotion,
            EnginePayload::Language { .. } => EngineKind::Language,
        }
    }

    /// Categorical label used for agreement checks and voting.
    pub fn label(&self) -> &str {
        match self {
            EnginePayload::Sentiment { label, .. } => label.as_str(),
            EnginePayload::Theme { primary, .. } => primary,
            EnginePayload::Emotion { dominant, .. } => dominant,
            EnginePayload::Language { code, .. } => code,
        }
    }

    /// Continuous score, only meaningful for sentiment.
    pub fn score(&self) -> Option<f64> {
        match self {
            EnginePayload::Sentiment { score, .. } => Some(*score),
            _ => None,
        }
    }
}

/// One engine's output for one comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResult {
    pub comment_id: String,
    /// Registered name of the producing engine (distinguishes fallbacks)
    pub engine: String,
    pub kind: EngineKind,
    pub payload: EnginePayload,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

impl EngineResult {
    /// Build a result; the kind follows the payload and confidence is clamped.
    pub fn new(
        comment_id: impl Into<String>,
        engine: impl Into<String>,
        payload: EnginePayload,
        confidence: f64,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            comment_id: comment_id.into(),
            engine: engine.into(),
            kind: payload.kind(),
            payload,
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_label_from_score_bands() {
        assert_eq!(SentimentLabel::from_score(0.8), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_score(-0.4), SentimentLabel::Negative);
        assert_eq!(SentimentLabel::from_score(0.05), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-0.1), SentimentLabel::Neutral);
    }

    #[test]
    fn test_opposites() {
        assert!(SentimentLabel::Positive.is_opposite(SentimentLabel::Negative));
        assert!(!SentimentLabel::Positive.is_opposite(SentimentLabel::Neutral));
        assert!(!SentimentLabel::Neutral.is_opposite(SentimentLabel::Negative));
    }

    #[test]
    fn test_engine_result_clamps_confidence_and_sets_kind() {
        let result = EngineResult::new("c1", "lex", EnginePayload::sentiment(2.0), 1.7);
        assert_eq!(result.kind, EngineKind::Sentiment);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.payload.score(), Some(1.0));

        let nan = EngineResult::new("c1", "lex", EnginePayload::sentiment(0.0), f64::NAN);
        assert_eq!(nan.confidence, 0.0);
    }

    #[test]
    fn test_engine_kind_order_is_cascade_order() {
        let mut kinds = vec![EngineKind::Emotion, EngineKind::Theme, EngineKind::Language];
        kinds.push(EngineKind::Sentiment);
        kinds.sort();
        assert_eq!(kinds, EngineKind::ALL.to_vec());
    }

    #[test]
    fn test_engine_kind_parse() {
        assert_eq!("Topic".parse::<EngineKind>(), Ok(EngineKind::Theme));
        assert!("vibes".parse::<EngineKind>().is_err());
    }

    #[test]
    fn test_payload_serializes_tagged() {
        let payload = EnginePayload::Language {
            code: "jopara".into(),
            mixed: true,
        };
        let json = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(json["type"], "language");
        assert_eq!(json["code"], "jopara");
    }
}
