//! Spanish / Guaraní lexicons shared by the built-in engines and by the
//! semantic duplicate guard.
//!
//! Lexicon keys are accent-folded; lookups fold tokens the same way. The
//! language profile works on raw tokens because Guaraní nasal vowels are
//! themselves a signal.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::services::normalizer::tokenize;

const POSITIVE: &[(&str, f64)] = &[
    ("excelente", 1.0), ("excelentes", 1.0), ("genial", 0.9), ("perfecto", 0.9),
    ("perfecta", 0.9), ("maravilloso", 0.9), ("maravillosa", 0.9), ("encanto", 0.9),
    ("encanta", 0.8), ("increible", 0.8), ("recomiendo", 0.8), ("recomendable", 0.8),
    ("satisfecho", 0.8), ("satisfecha", 0.8), ("feliz", 0.8), ("contento", 0.7),
    ("contenta", 0.7), ("amable", 0.7), ("amables", 0.7), ("eficiente", 0.7),
    ("bueno", 0.6), ("buena", 0.6), ("buenos", 0.6), ("buenas", 0.6), ("gusta", 0.6),
    ("gusto", 0.6), ("mejor", 0.6), ("atento", 0.6), ("atenta", 0.6), ("rapido", 0.5),
    ("rapida", 0.5), ("limpio", 0.5), ("limpia", 0.5), ("facil", 0.5), ("comodo", 0.5),
    ("barato", 0.4), ("economico", 0.4), ("gracias", 0.4), ("bien", 0.4),
    // Guaraní, whole words
    ("ipora", 0.8), ("pora", 0.8), ("rohayhu", 0.9), ("aguyje", 0.5), ("aguyjevete", 0.6),
    ("vy'a", 0.8), ("avy'a", 0.8),
];

const NEGATIVE: &[(&str, f64)] = &[
    ("pesimo", -1.0), ("pesima", -1.0), ("horrible", -1.0), ("estafa", -1.0),
    ("fraude", -1.0), ("odio", -1.0), ("desastre", -1.0), ("terrible", -0.9),
    ("grosero", -0.9), ("grosera", -0.9), ("maleducado", -0.9), ("maleducada", -0.9),
    ("peor", -0.8), ("defectuoso", -0.8), ("decepcionado", -0.8), ("decepcionada", -0.8),
    ("decepcion", -0.8), ("verguenza", -0.8), ("lamentable", -0.8), ("inutil", -0.8),
    ("malo", -0.7), ("mala", -0.7), ("malos", -0.7), ("malas", -0.7), ("sucio", -0.7),
    ("sucia", -0.7), ("roto", -0.7), ("rota", -0.7), ("mal", -0.6), ("lento", -0.6),
    ("lenta", -0.6), ("falla", -0.6), ("caro", -0.5), ("demora", -0.5), ("demoro", -0.5),
    ("problema", -0.5), ("problemas", -0.5), ("queja", -0.5), ("reclamo", -0.5),
    ("error", -0.5), ("dificil", -0.4), ("tarde", -0.3),
    // Guaraní, whole words
    ("vai", -0.8), ("ivai", -0.8), ("ipochy", -0.8), ("pochy", -0.7), ("hasy", -0.6),
    ("hepy", -0.4),
];

const NEGATORS: &[&str] = &[
    "no", "nunca", "jamas", "tampoco", "ni", "sin", "nada", "nahaniri", "nda", "ndaha'ei",
];

const INTENSIFIERS: &[&str] = &[
    "muy", "super", "re", "tan", "demasiado", "bastante", "sumamente", "realmente",
];

/// Guaraní intensifying suffixes ("porãiterei" = very good).
const GUARANI_INTENSIFIER_SUFFIXES: &[&str] = &["iterei", "eterei", "ite", "ete"];

/// Guaraní stems recognized inside inflected words when morphology is on.
const GUARANI_STEMS: &[(&str, f64)] = &[
    ("pora", 0.8),
    ("vy'a", 0.8),
    ("rohayhu", 0.9),
    ("vai", -0.8),
    ("pochy", -0.7),
    ("hasy", -0.6),
];

const SPANISH_MARKERS: &[&str] = &[
    "el", "la", "los", "las", "de", "del", "que", "y", "en", "un", "una", "es", "muy", "por",
    "para", "con", "pero", "no", "me", "se", "lo", "mi", "su", "al", "fue", "esta", "este",
    "como", "mas", "todo", "bien", "servicio", "atencion", "gracias", "siempre", "nunca",
    "bueno", "buena", "malo", "mala", "excelente", "pesimo", "producto", "precio", "tiempo",
    "local", "hoy", "ayer", "cuando", "porque", "hay", "son", "tienen", "tiene", "estoy",
];

const GUARANI_MARKERS: &[&str] = &[
    "ha", "ndive", "che", "nde", "ko", "pe", "upe", "nande", "ore", "pora", "ipora", "vai",
    "ivai", "mba'e", "heta", "michi", "ara", "avei", "ndaha'ei", "oi", "rohayhu", "aguyje",
    "aguyjevete", "ndaipori", "hina", "voi", "katu", "kuera", "piko", "pa", "ne", "jaha",
    "aha", "ou", "oho", "ojapo", "hepy", "pya'e", "mbegue", "nahaniri", "ipochy", "vy'a",
    "che'i", "hetaiterei", "mita", "kuna", "karai", "ndaje", "anga", "jepe", "nda",
];

const THEMES: &[(&str, &[&str])] = &[
    ("servicio", &["servicio", "atencion", "atender", "atendieron", "atendio", "trato", "ayuda", "soporte", "pytyvo"]),
    ("precio", &["precio", "precios", "caro", "barato", "costo", "costoso", "plata", "cobro", "cobraron", "tarifa", "hepy", "economico"]),
    ("calidad", &["calidad", "defectuoso", "roto", "rota", "durable", "fallado", "material", "falla"]),
    ("entrega", &["entrega", "envio", "delivery", "demora", "demoro", "llego", "pedido", "mbegue", "pya'e"]),
    ("personal", &["personal", "empleado", "empleada", "empleados", "cajero", "cajera", "vendedor", "vendedora", "mozo", "moza", "guardia", "mba'apohara"]),
    ("producto", &["producto", "productos", "articulo", "mercaderia", "stock", "variedad"]),
    ("app", &["app", "aplicacion", "pagina", "web", "sistema", "online", "internet", "login", "celular"]),
    ("limpieza", &["limpio", "limpia", "sucio", "sucia", "limpieza", "bano", "banos"]),
    ("espera", &["espera", "fila", "cola", "esperar", "esperando", "minutos", "horas"]),
];

const EMOTIONS: &[(&str, &[&str])] = &[
    ("joy", &["feliz", "contento", "contenta", "alegre", "alegria", "encanto", "encanta", "genial", "vy'a", "avy'a", "rovy'a"]),
    ("anger", &["enojado", "enojada", "furioso", "furiosa", "bronca", "indignado", "indignada", "harto", "harta", "rabia", "pochy", "ipochy", "inaceptable", "verguenza"]),
    ("sadness", &["triste", "tristeza", "decepcionado", "decepcionada", "decepcion", "lamentable", "pena", "lastima", "nembyasy"]),
    ("fear", &["miedo", "preocupado", "preocupada", "temor", "inseguro", "insegura", "peligro", "kyhyje"]),
    ("surprise", &["sorprendido", "sorprendida", "sorpresa", "increible", "wow", "inesperado", "inesperada"]),
    ("trust", &["confiable", "confianza", "recomiendo", "recomendable", "honesto", "honesta", "jerovia"]),
];

/// Default theme when no keyword matches.
pub const GENERAL_THEME: &str = "general";
/// Default emotion when no keyword matches.
pub const NEUTRAL_EMOTION: &str = "neutral";

struct Lexicons {
    sentiment: HashMap<&'static str, f64>,
    negators: HashSet<&'static str>,
    intensifiers: HashSet<&'static str>,
    spanish: HashSet<&'static str>,
    guarani: HashSet<&'static str>,
    themes: HashMap<&'static str, &'static str>,
    emotions: HashMap<&'static str, &'static str>,
}

static LEXICONS: OnceLock<Lexicons> = OnceLock::new();

fn lexicons() -> &'static Lexicons {
    LEXICONS.get_or_init(|| {
        let mut themes = HashMap::new();
        for (theme, words) in THEMES {
            for word in *words {
                themes.entry(*word).or_insert(*theme);
            }
        }
        let mut emotions = HashMap::new();
        for (emotion, words) in EMOTIONS {
            for word in *words {
                emotions.entry(*word).or_insert(*emotion);
            }
        }
        Lexicons {
            sentiment: POSITIVE.iter().chain(NEGATIVE.iter()).copied().collect(),
            negators: NEGATORS.iter().copied().collect(),
            intensifiers: INTENSIFIERS.iter().copied().collect(),
            spanish: SPANISH_MARKERS.iter().copied().collect(),
            guarani: GUARANI_MARKERS.iter().copied().collect(),
            themes,
            emotions,
        }
    })
}

/// Lowercase and strip combining marks ("pésimo" -> "pesimo", "porã" -> "pora").
pub fn fold(token: &str) -> String {
    token
        .to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

fn folded_tokens(text: &str) -> Vec<String> {
    tokenize(&text.to_lowercase()).into_iter().map(fold).collect()
}

/// Characters that only show up in Guaraní orthography (nasal ỹ ẽ ĩ ũ g̃).
fn has_guarani_orthography(token: &str) -> bool {
    token.contains(['ỹ', 'ẽ', 'ĩ', 'ũ'])
        || token.nfd().collect::<String>().contains("g\u{0303}")
}

// ============================================================================
// Language
// ============================================================================

/// Marker counts for a text.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LanguageProfile {
    pub token_count: usize,
    pub spanish_hits: usize,
    pub guarani_hits: usize,
}

impl LanguageProfile {
    /// Share of marker hits that are Guaraní.
    pub fn guarani_share(&self) -> f64 {
        let total = self.spanish_hits + self.guarani_hits;
        if total == 0 {
            0.0
        } else {
            self.guarani_hits as f64 / total as f64
        }
    }

    /// "es", "gn", "jopara" or "und".
    pub fn code(&self) -> &'static str {
        if self.spanish_hits == 0 && self.guarani_hits == 0 {
            return "und";
        }
        let share = self.guarani_share();
        if share >= 0.75 {
            "gn"
        } else if share <= 0.15 {
            "es"
        } else {
            "jopara"
        }
    }

    pub fn is_mixed(&self) -> bool {
        self.code() == "jopara"
    }

    /// Fraction of tokens that hit either marker list.
    pub fn coverage(&self) -> f64 {
        if self.token_count == 0 {
            0.0
        } else {
            ((self.spanish_hits + self.guarani_hits) as f64 / self.token_count as f64).min(1.0)
        }
    }

    /// Whether text contains enough Guaraní to need morphology-aware reading.
    pub fn involves_guarani(&self) -> bool {
        matches!(self.code(), "gn" | "jopara")
    }
}

pub fn language_profile(text: &str) -> LanguageProfile {
    let lex = lexicons();
    let lowered = text.to_lowercase();
    let raw_tokens = tokenize(&lowered);
    let mut profile = LanguageProfile {
        token_count: raw_tokens.len(),
        ..Default::default()
    };
    for raw in raw_tokens {
        let folded = fold(raw);
        if lex.guarani.contains(folded.as_str()) || has_guarani_orthography(raw) {
            profile.guarani_hits += 1;
        } else if lex.spanish.contains(folded.as_str()) {
            profile.spanish_hits += 1;
        }
    }
    profile
}

// ============================================================================
// Sentiment
// ============================================================================

/// Outcome of a polarity scan.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PolarityScan {
    /// Polarity in [-1, 1]
    pub score: f64,
    /// Lexicon words that contributed
    pub hits: usize,
    /// Tokens that looked Guaraní-inflected but were not analysed
    pub unanalysed_guarani: usize,
}

/// Person, negation and attributive prefixes that may precede a stem.
const GUARANI_PREFIXES: &[&str] = &[
    "", "i", "a", "o", "ro", "re", "ja", "pe", "ni", "na", "nai", "nd", "nda", "ndai", "nde",
    "che",
];

struct StemSplit<'a> {
    prefix: &'a str,
    rest: &'a str,
    base: f64,
}

/// Split an inflected Guaraní word into prefix, known stem and remainder.
/// Bare stems are lexicon words and do not split.
fn split_guarani_stem(token: &str) -> Option<StemSplit<'_>> {
    GUARANI_STEMS.iter().find_map(|(stem, base)| {
        if token == *stem {
            return None;
        }
        let pos = token.find(stem)?;
        let prefix = &token[..pos];
        GUARANI_PREFIXES.contains(&prefix).then(|| StemSplit {
            prefix,
            rest: &token[pos + stem.len()..],
            base: *base,
        })
    })
}

/// Score of a Guaraní token read morphologically: circumfix negation
/// ("nd-/n- ... -i") flips the stem, intensifying suffixes amplify it.
fn guarani_morphology(token: &str) -> Option<f64> {
    let split = split_guarani_stem(token)?;
    let mut weight = split.base;
    let negated = split.prefix.starts_with('n') && split.rest.ends_with('i');
    let suffix = if negated {
        weight = -weight;
        &split.rest[..split.rest.len() - 1]
    } else {
        split.rest
    };
    if GUARANI_INTENSIFIER_SUFFIXES.iter().any(|s| suffix.ends_with(s)) {
        weight *= 1.5;
    }
    Some(weight)
}

/// Lexicon polarity with Spanish negation/intensifier handling.
///
/// With `guarani_morphology` on, inflected Guaraní words are analysed by
/// stem and affix; otherwise only whole Guaraní words count.
pub fn polarity(text: &str, guarani_morphology: bool) -> PolarityScan {
    let lex = lexicons();
    let tokens = folded_tokens(text);
    let mut sum = 0.0;
    let mut scan = PolarityScan::default();

    for (i, token) in tokens.iter().enumerate() {
        let weight = match lex.sentiment.get(token.as_str()) {
            Some(w) => Some(*w),
            None if guarani_morphology => self::guarani_morphology(token),
            None => {
                if split_guarani_stem(token).is_some() {
                    scan.unanalysed_guarani += 1;
                }
                None
            }
        };
        let Some(mut weight) = weight else { continue };

        let window = &tokens[i.saturating_sub(3)..i];
        if window.iter().any(|t| lex.intensifiers.contains(t.as_str())) {
            weight *= 1.5;
        }
        if window.iter().any(|t| lex.negators.contains(t.as_str())) {
            weight = -weight;
        }
        sum += weight;
        scan.hits += 1;
    }

    if scan.hits > 0 {
        scan.score = (sum / scan.hits as f64).clamp(-1.0, 1.0);
    }
    scan
}

// ============================================================================
// Themes and emotions
// ============================================================================

fn keyword_counts(text: &str, table: &HashMap<&'static str, &'static str>) -> Vec<(&'static str, usize)> {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for token in folded_tokens(text) {
        if let Some(label) = table.get(token.as_str()) {
            *counts.entry(*label).or_insert(0) += 1;
        }
    }
    let mut counts: Vec<_> = counts.into_iter().collect();
    // Highest count first, ties broken alphabetically for determinism
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    counts
}

/// Theme keyword hits, highest first.
pub fn theme_hits(text: &str) -> Vec<(&'static str, usize)> {
    keyword_counts(text, &lexicons().themes)
}

/// Emotion keyword hits, highest first.
pub fn emotion_hits(text: &str) -> Vec<(&'static str, usize)> {
    keyword_counts(text, &lexicons().emotions)
}

/// Primary theme or [`GENERAL_THEME`].
pub fn dominant_theme(text: &str) -> &'static str {
    theme_hits(text)
        .first()
        .map(|(t, _)| *t)
        .unwrap_or(GENERAL_THEME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_strips_accents() {
        assert_eq!(fold("Pésimo"), "pesimo");
        assert_eq!(fold("porã"), "pora");
    }

    #[test]
    fn test_polarity_positive() {
        let scan = polarity("excelente servicio!", false);
        assert!(scan.score > 0.9, "got {:?}", scan);
        assert_eq!(scan.hits, 1);
    }

    #[test]
    fn test_polarity_negation_flips() {
        let scan = polarity("no es bueno", false);
        assert!(scan.score < 0.0, "got {:?}", scan);
    }

    #[test]
    fn test_polarity_neutral_without_hits() {
        let scan = polarity("fui al local el martes", false);
        assert_eq!(scan.hits, 0);
        assert_eq!(scan.score, 0.0);
    }

    #[test]
    fn test_guarani_circumfix_negation_needs_morphology() {
        let without = polarity("la atención ndaiporãi", false);
        assert_eq!(without.hits, 0);
        assert_eq!(without.unanalysed_guarani, 1);

        let with = polarity("la atención ndaiporãi", true);
        assert!(with.score < 0.0, "got {:?}", with);
    }

    #[test]
    fn test_guarani_intensifier_suffix() {
        let scan = polarity("porãiterei", true);
        assert!(scan.score >= 1.0 - 1e-9, "got {:?}", scan);
    }

    #[test]
    fn test_spanish_words_are_not_read_as_guarani_stems() {
        let scan = polarity("la temporada", true);
        assert_eq!(scan.hits, 0);
    }

    #[test]
    fn test_language_profile_spanish() {
        let profile = language_profile("El servicio fue muy bueno y la atención excelente");
        assert_eq!(profile.code(), "es");
    }

    #[test]
    fn test_language_profile_guarani() {
        let profile = language_profile("Che ha nde jaha ko ára");
        assert_eq!(profile.code(), "gn");
    }

    #[test]
    fn test_language_profile_jopara() {
        let profile = language_profile("La atención iporã pero el precio hepy heta");
        assert_eq!(profile.code(), "jopara");
        assert!(profile.involves_guarani());
    }

    #[test]
    fn test_language_profile_undetermined() {
        assert_eq!(language_profile("12345 !!!").code(), "und");
    }

    #[test]
    fn test_theme_hits_and_dominant() {
        assert_eq!(dominant_theme("El delivery tuvo mucha demora"), "entrega");
        assert_eq!(dominant_theme("nada que ver"), GENERAL_THEME);
    }

    #[test]
    fn test_emotion_hits() {
        let hits = emotion_hits("Estoy muy enojado, qué bronca");
        assert_eq!(hits.first().map(|(e, _)| *e), Some("anger"));
        assert_eq!(hits.first().map(|(_, n)| *n), Some(2));
    }
}
