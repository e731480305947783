//! Fuzzy similarity: edit distance, token Jaccard and TF-IDF cosine,
//! combined with configurable weights.

use std::collections::{HashMap, HashSet};

use rapidfuzz::distance::levenshtein;
use serde::{Deserialize, Serialize};

use crate::services::normalizer::tokenize;

/// Weights of the three fuzzy components. They need not sum to one; the
/// composite is divided by their total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyWeights {
    pub edit: f64,
    pub jaccard: f64,
    pub tfidf: f64,
}

impl Default for FuzzyWeights {
    fn default() -> Self {
        Self {
            edit: 0.3,
            jaccard: 0.3,
            tfidf: 0.4,
        }
    }
}

impl FuzzyWeights {
    fn total(&self) -> f64 {
        self.edit.max(0.0) + self.jaccard.max(0.0) + self.tfidf.max(0.0)
    }
}

/// Normalized Levenshtein similarity in [0, 1].
pub fn edit_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    levenshtein::normalized_similarity(a.chars(), b.chars())
}

/// Jaccard index of two token sets; two empty sets are identical.
pub fn token_jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// TF-IDF vectors over a fixed document set.
#[derive(Debug, Clone, Default)]
pub struct TfIdfIndex {
    vectors: Vec<HashMap<String, f64>>,
}

impl TfIdfIndex {
    /// Build unit-length TF-IDF vectors, smoothed idf = ln((1+n)/(1+df)) + 1.
    pub fn build<S: AsRef<str>>(docs: &[S]) -> Self {
        let tokenized: Vec<Vec<&str>> = docs.iter().map(|d| tokenize(d.as_ref())).collect();

        let mut df: HashMap<&str, usize> = HashMap::new();
        for tokens in &tokenized {
            let unique: HashSet<&str> = tokens.iter().copied().collect();
            for token in unique {
                *df.entry(token).or_insert(0) += 1;
            }
        }

        let n = docs.len() as f64;
        let vectors = tokenized
            .iter()
            .map(|tokens| {
                let mut tf: HashMap<&str, f64> = HashMap::new();
                for token in tokens.iter().copied() {
                    *tf.entry(token).or_insert(0.0) += 1.0;
                }
                let mut vector: HashMap<String, f64> = tf
                    .into_iter()
                    .map(|(token, count)| {
                        let doc_freq = df.get(token).copied().unwrap_or(0) as f64;
                        let idf = ((1.0 + n) / (1.0 + doc_freq)).ln() + 1.0;
                        (token.to_string(), count * idf)
                    })
                    .collect();
                let norm = vector.values().map(|v| v * v).sum::<f64>().sqrt();
                if norm > 0.0 {
                    vector.values_mut().for_each(|v| *v /= norm);
                }
                vector
            })
            .collect();

        Self { vectors }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Cosine between documents `i` and `j` (vectors are unit length).
    pub fn cosine(&self, i: usize, j: usize) -> f64 {
        let (Some(a), Some(b)) = (self.vectors.get(i), self.vectors.get(j)) else {
            return 0.0;
        };
        let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
        small
            .iter()
            .filter_map(|(token, wa)| large.get(token).map(|wb| wa * wb))
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }
}

/// Weighted composite of the three components.
pub fn composite(weights: &FuzzyWeights, edit: f64, jaccard: f64, tfidf: f64) -> f64 {
    let total = weights.total();
    if total == 0.0 {
        return 0.0;
    }
    (weights.edit.max(0.0) * edit
        + weights.jaccard.max(0.0) * jaccard
        + weights.tfidf.max(0.0) * tfidf)
        / total
}

/// Upper bound on edit similarity given the two lengths; used to skip
/// hopeless pairs before running Levenshtein.
pub fn length_ratio(a_len: usize, b_len: usize) -> f64 {
    let (short, long) = if a_len <= b_len { (a_len, b_len) } else { (b_len, a_len) };
    if long == 0 {
        1.0
    } else {
        short as f64 / long as f64
    }
}
