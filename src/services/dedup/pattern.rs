//! Boilerplate detection: templated text and repetitive-token spam.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::services::normalizer::tokenize;

struct PlaceholderRegexes {
    url: Regex,
    email: Regex,
    date: Regex,
    number: Regex,
    name: Regex,
    whitespace: Regex,
}

static PLACEHOLDERS: OnceLock<PlaceholderRegexes> = OnceLock::new();

fn placeholders() -> &'static PlaceholderRegexes {
    PLACEHOLDERS.get_or_init(|| PlaceholderRegexes {
        url: Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("valid url regex"),
        email: Regex::new(r"(?i)\b[\w.+-]+@[\w-]+\.[\w.]+\b").expect("valid email regex"),
        date: Regex::new(r"\b\d{1,2}[/-]\d{1,2}(?:[/-]\d{2,4})?\b").expect("valid date regex"),
        number: Regex::new(r"#?\b\w*\d[\w.,]*\b").expect("valid number regex"),
        // Capitalized word not at the start of the text or a sentence
        name: Regex::new(r"([^.!?¡¿\s]\s+)\p{Lu}\p{Ll}+").expect("valid name regex"),
        whitespace: Regex::new(r"\s+").expect("valid whitespace regex"),
    })
}

/// Placeholder names substituted into template signatures.
pub const PLACEHOLDER_TOKENS: &[&str] = &["<url>", "<email>", "<date>", "<num>", "<name>"];

/// Signature of a text with URLs, emails, dates, numbers and mid-sentence
/// proper names replaced by placeholders. `None` when nothing was replaced,
/// since such text cannot be a template instance.
///
/// Runs on raw text: capitalization is what identifies names.
pub fn template_signature(text: &str) -> Option<String> {
    let re = placeholders();
    let s = re.url.replace_all(text, "<url>");
    let s = re.email.replace_all(&s, "<email>");
    let s = re.date.replace_all(&s, "<date>");
    let s = re.number.replace_all(&s, "<num>");
    let s = re.name.replace_all(&s, "${1}<name>");
    let signature = re.whitespace.replace_all(s.trim(), " ").to_lowercase();

    PLACEHOLDER_TOKENS
        .iter()
        .any(|p| signature.contains(p))
        .then_some(signature)
}

/// Length of the longest run of one repeated character.
fn longest_char_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut prev = None;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        if Some(c) == prev {
            current += 1;
        } else {
            current = 1;
            prev = Some(c);
        }
        longest = longest.max(current);
    }
    longest
}

/// Thresholds for repetitive-token spam.
#[derive(Debug, Clone, Copy)]
pub struct RepetitionLimits {
    /// Minimum tokens before the unique-ratio check applies
    pub min_tokens: usize,
    /// Unique/total token ratio at or below which text is spam
    pub max_unique_ratio: f64,
    /// Character run length that marks spam on its own ("!!!!!!!!!!")
    pub max_char_run: usize,
}

impl Default for RepetitionLimits {
    fn default() -> Self {
        Self {
            min_tokens: 6,
            max_unique_ratio: 0.3,
            max_char_run: 10,
        }
    }
}

/// Whether the text is repetitive spam.
pub fn is_repetitive(text: &str, limits: &RepetitionLimits) -> bool {
    if longest_char_run(text) >= limits.max_char_run {
        return true;
    }
    let lowered = text.to_lowercase();
    let tokens = tokenize(&lowered);
    if tokens.len() < limits.min_tokens {
        return false;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in tokens.iter().copied() {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts.len() as f64 / tokens.len() as f64 <= limits.max_unique_ratio
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_signature_masks_numbers_and_names() {
        let a = template_signature("Pedido #4512 llegó tarde, atendido por Carlos").expect("sig");
        let b = template_signature("Pedido #9981 llegó tarde, atendido por María").expect("sig");
        assert_eq!(a, b);
        assert!(a.contains("<num>"));
        assert!(a.contains("<name>"));
    }

    #[test]
    fn test_template_signature_masks_dates_and_urls() {
        let a = template_signature("Visité el 12/03/2024, ver www.ejemplo.com/a").expect("sig");
        let b = template_signature("Visité el 01/11/2023, ver www.ejemplo.com/b").expect("sig");
        assert_eq!(a, b);
    }

    #[test]
    fn test_plain_text_has_no_signature() {
        assert_eq!(template_signature("la atención fue buena"), None);
    }

    #[test]
    fn test_sentence_initial_capital_is_not_a_name() {
        assert_eq!(template_signature("Excelente servicio"), None);
    }

    #[test]
    fn test_repetitive_tokens() {
        let limits = RepetitionLimits::default();
        assert!(is_repetitive("compra compra compra compra compra ya ya", &limits));
        assert!(!is_repetitive("muy muy bueno el servicio", &limits));
    }

    #[test]
    fn test_repeated_characters() {
        let limits = RepetitionLimits::default();
        assert!(is_repetitive("!!!!!!!!!!!!", &limits));
        assert!(!is_repetitive("genial!!!", &limits));
    }
}
