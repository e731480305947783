//! Text normalization for duplicate detection and engines.
//!
//! Two forms are produced:
//! - the canonical form (NFC, lowercase, unified apostrophes, collapsed
//!   whitespace) stored on [`Comment::normalized_text`]; Guaraní diacritics
//!   survive because they carry meaning;
//! - the comparison key (canonical form with accents, punctuation and
//!   stopwords removed) used by the normalized-match stage.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::models::Comment;

/// Spanish and Guaraní function words dropped from comparison keys.
///
/// Negations ("no", "nunca", "ni", "nd-", ...) are absent: "me gustó" and
/// "no me gustó" must never share a key. Sentiment and intensity words
/// ("bien", "muy", "más") are absent too: "todo bien" is not "todo".
const STOPWORDS: &[&str] = &[
    // Spanish
    "el", "la", "los", "las", "un", "una", "unos", "unas", "de", "del", "al", "a", "en", "y",
    "e", "o", "u", "que", "se", "lo", "le", "les", "me", "te", "nos", "su", "sus", "mi", "mis",
    "tu", "tus", "es", "son", "fue", "era", "por", "para", "con", "como", "pero",
    "este", "esta", "estos", "estas", "ese", "esa", "eso", "esto", "aqui", "ahi", "ya", "tan",
    "todo", "toda", "todos", "todas", "hay", "ha", "he", "han", "porque", "cuando",
    // Guaraní
    "pe", "ko", "upe", "ha'e", "avei", "katu", "voi", "niko", "hina", "kuera",
];

static WHITESPACE_REGEX: OnceLock<Regex> = OnceLock::new();
static PUNCTUATION_REGEX: OnceLock<Regex> = OnceLock::new();
static STOPWORD_SET: OnceLock<HashSet<&'static str>> = OnceLock::new();

fn whitespace_regex() -> &'static Regex {
    WHITESPACE_REGEX.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

/// Everything that is not a word character, whitespace or an apostrophe
/// (the Guaraní glottal stop, as in "mba'e").
fn punctuation_regex() -> &'static Regex {
    PUNCTUATION_REGEX.get_or_init(|| Regex::new(r"[^\w\s']").expect("valid punctuation regex"))
}

fn stopwords() -> &'static HashSet<&'static str> {
    STOPWORD_SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

/// Map typographic apostrophes and the Guaraní puso variants to `'`.
fn unify_apostrophe(c: char) -> char {
    match c {
        '\u{2019}' | '\u{2018}' | '\u{02BC}' | '\u{00B4}' | '`' => '\'',
        other => other,
    }
}

/// Split text into word tokens. Apostrophes inside a word are kept
/// ("mba'e"); leading/trailing ones are trimmed.
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || is_combining_mark(c)))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Normalizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Convert to lowercase
    pub lowercase: bool,
    /// Drop control characters (except whitespace)
    pub strip_control: bool,
    /// Drop stopwords from comparison keys
    pub strip_stopwords: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            strip_control: true,
            strip_stopwords: true,
        }
    }
}

/// Produces canonical text and comparison keys.
#[derive(Debug, Clone, Default)]
pub struct TextNormalizer {
    config: NormalizerConfig,
}

impl TextNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Canonical form: NFC, control chars removed, lowercase, unified
    /// apostrophes, whitespace collapsed and trimmed.
    pub fn normalize(&self, text: &str) -> String {
        let cleaned: String = text
            .nfc()
            .filter(|c| !self.config.strip_control || !c.is_control() || c.is_whitespace())
            .map(unify_apostrophe)
            .collect();
        let cased = if self.config.lowercase {
            cleaned.to_lowercase()
        } else {
            cleaned
        };
        whitespace_regex()
            .replace_all(cased.trim(), " ")
            .into_owned()
    }

    /// Aggressive comparison key: canonical form without accents,
    /// punctuation or stopwords.
    pub fn comparison_key(&self, text: &str) -> String {
        let canonical = self.normalize(text);
        let unaccented: String = canonical.nfkd().filter(|c| !is_combining_mark(*c)).collect();
        let stripped = punctuation_regex().replace_all(&unaccented, " ");
        let stop = stopwords();
        tokenize(&stripped)
            .into_iter()
            .filter(|t| !self.config.strip_stopwords || !stop.contains(t))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Return a copy of the comment with `normalized_text` filled in.
    pub fn normalize_comment(&self, comment: &Comment) -> Comment {
        let mut normalized = comment.clone();
        normalized.normalized_text = self.normalize(&comment.text);
        normalized
    }

    pub fn normalize_all(&self, comments: Vec<Comment>) -> Vec<Comment> {
        comments
            .into_iter()
            .map(|mut c| {
                c.normalized_text = self.normalize(&c.text);
                c
            })
            .collect()
    }
}
