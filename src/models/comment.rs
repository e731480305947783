//! Comment model: one piece of customer feedback as handed over by ingestion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single customer comment.
///
/// Immutable once ingested. The normalizer produces a new value with
/// `normalized_text` filled in rather than mutating the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Caller-supplied identifier, unique within a session
    pub id: String,
    /// Raw comment text (UTF-8, non-empty when coming from ingestion)
    pub text: String,
    /// Canonical form produced by the text normalizer
    #[serde(default)]
    pub normalized_text: String,
    /// Language code if already known upstream (e.g., "es", "gn", "jopara")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Free-form ingestion metadata (source, rating, branch, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Comment {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            normalized_text: String::new(),
            language: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a known language (builder style).
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Text engines and detectors should look at: the normalized form when
    /// present, the raw text otherwise.
    pub fn analysis_text(&self) -> &str {
        if self.normalized_text.is_empty() {
            &self.text
        } else {
            &self.normalized_text
        }
    }

    /// Length in characters (not bytes) of the analysis text.
    pub fn char_len(&self) -> usize {
        self.analysis_text().chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_text_prefers_normalized() {
        let mut comment = Comment::new("c1", "  Muy BUENO  ");
        assert_eq!(comment.analysis_text(), "  Muy BUENO  ");
        comment.normalized_text = "muy bueno".into();
        assert_eq!(comment.analysis_text(), "muy bueno");
    }

    #[test]
    fn test_char_len_counts_chars_not_bytes() {
        let comment = Comment::new("c1", "porã");
        assert_eq!(comment.char_len(), 4);
        assert!(comment.text.len() > 4);
    }

    #[test]
    fn test_deserialize_minimal_comment() {
        let comment: Comment =
            serde_json::from_str(r#"{"id": "1", "text": "Excelente servicio!"}"#)
                .expect("deserialize");
        assert_eq!(comment.id, "1");
        assert!(comment.normalized_text.is_empty());
        assert!(comment.language.is_none());
        assert!(comment.metadata.is_empty());
    }
}
