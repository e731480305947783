//! Information value and per-group preservation policy.

use std::collections::HashSet;

use crate::engines::lexicon::theme_hits;
use crate::models::{Comment, PreservationPolicy};
use crate::services::normalizer::tokenize;
use crate::utils::math::{mean, variance};

/// Group-size and value thresholds for choosing a policy.
#[derive(Debug, Clone, Copy)]
pub struct PreservationLimits {
    /// Groups up to this size keep only their best member
    pub small_group_max: usize,
    /// Groups larger than this keep a bounded sample
    pub large_group_min: usize,
    /// Value variance above which every valuable member is kept
    pub variance_threshold: f64,
    /// Upper bound on members kept by the representative sample
    pub max_representatives: usize,
    /// Comments shorter than this (chars) never represent a group
    pub min_representative_len: usize,
}

impl Default for PreservationLimits {
    fn default() -> Self {
        Self {
            small_group_max: 3,
            large_group_min: 10,
            variance_threshold: 0.05,
            max_representatives: 5,
            min_representative_len: 10,
        }
    }
}

/// How much a comment tells an analyst, in [0, 1].
///
/// Mixes length (saturating at 200 chars), lexical diversity and mentions of
/// concrete feedback themes.
pub fn information_value(comment: &Comment) -> f64 {
    let text = comment.analysis_text();
    let lowered = text.to_lowercase();
    let tokens = tokenize(&lowered);
    if tokens.is_empty() {
        return 0.0;
    }

    let length = (comment.char_len() as f64 / 200.0).min(1.0);
    let unique: HashSet<&str> = tokens.iter().copied().collect();
    let diversity = unique.len() as f64 / tokens.len() as f64;
    let theme_mentions: usize = theme_hits(text).iter().map(|(_, n)| n).sum();
    let specificity = (theme_mentions as f64 / 3.0).min(1.0);

    0.4 * length + 0.3 * diversity + 0.3 * specificity
}

/// Outcome of applying a policy to one group.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub policy: PreservationPolicy,
    pub representative: String,
    /// Other members kept as variants, in input order
    pub retained: Vec<String>,
}

/// Choose the policy for a group and apply it.
///
/// `members` pairs each comment with its information value, in input order.
/// Returns `None` when no member is long enough to represent the group, in
/// which case the group should not be formed.
pub fn resolve(members: &[(&Comment, f64)], limits: &PreservationLimits) -> Option<Resolution> {
    let eligible: Vec<usize> = (0..members.len())
        .filter(|&i| members[i].0.char_len() >= limits.min_representative_len)
        .collect();

    // Highest value wins; ties go to the earliest member
    let best = eligible.iter().copied().fold(None, |best: Option<usize>, i| match best {
        Some(b) if members[b].1 >= members[i].1 => Some(b),
        _ => Some(i),
    })?;
    let representative = members[best].0.id.clone();

    let values: Vec<f64> = members.iter().map(|(_, v)| *v).collect();
    let size = members.len();

    let (policy, mut retained_idx): (PreservationPolicy, Vec<usize>) = if size <= limits.small_group_max {
        (PreservationPolicy::KeepBest, Vec::new())
    } else if size > limits.large_group_min {
        let mut ranked: Vec<usize> = eligible.iter().copied().filter(|&i| i != best).collect();
        ranked.sort_by(|&a, &b| {
            members[b]
                .1
                .partial_cmp(&members[a].1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        ranked.truncate(limits.max_representatives.saturating_sub(1));
        (PreservationPolicy::KeepRepresentative, ranked)
    } else if variance(&values) > limits.variance_threshold {
        let avg = mean(&values);
        let valuable = eligible
            .iter()
            .copied()
            .filter(|&i| i != best && members[i].1 >= avg)
            .collect();
        (PreservationPolicy::KeepAllValuable, valuable)
    } else {
        (PreservationPolicy::KeepBest, Vec::new())
    };

    retained_idx.sort_unstable();
    Some(Resolution {
        policy,
        representative,
        retained: retained_idx
            .into_iter()
            .map(|i| members[i].0.id.clone())
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comments(texts: &[&str]) -> Vec<Comment> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Comment::new(format!("c{}", i), *t))
            .collect()
    }

    fn valued<'a>(comments: &'a [Comment], values: &[f64]) -> Vec<(&'a Comment, f64)> {
        comments.iter().zip(values.iter().copied()).collect()
    }

    #[test]
    fn test_information_value_prefers_specific_longer_text() {
        let short = Comment::new("a", "bueno bueno");
        let rich = Comment::new(
            "b",
            "La atención del personal fue rápida pero el precio del delivery es caro",
        );
        assert!(information_value(&rich) > information_value(&short));
        assert_eq!(information_value(&Comment::new("c", "  ")), 0.0);
    }

    #[test]
    fn test_small_group_keeps_best() {
        let c = comments(&["servicio bueno", "servicio muy bueno y rápido", "servicio bueno!"]);
        let resolution = resolve(&valued(&c, &[0.3, 0.6, 0.3]), &PreservationLimits::default())
            .expect("resolution");
        assert_eq!(resolution.policy, PreservationPolicy::KeepBest);
        assert_eq!(resolution.representative, "c1");
        assert!(resolution.retained.is_empty());
    }

    #[test]
    fn test_short_member_never_represents() {
        let c = comments(&["ok!", "todo estuvo bien hoy"]);
        let resolution = resolve(&valued(&c, &[0.9, 0.2]), &PreservationLimits::default())
            .expect("resolution");
        assert_eq!(resolution.representative, "c1");

        let only_short = comments(&["ok", "ok!"]);
        assert!(resolve(&valued(&only_short, &[0.5, 0.5]), &PreservationLimits::default()).is_none());
    }

    #[test]
    fn test_high_variance_keeps_all_valuable() {
        let c = comments(&[
            "comentario numero uno",
            "comentario numero dos",
            "comentario numero tres",
            "comentario numero cuatro",
            "comentario numero cinco",
        ]);
        let resolution = resolve(
            &valued(&c, &[0.9, 0.1, 0.8, 0.1, 0.7]),
            &PreservationLimits::default(),
        )
        .expect("resolution");
        assert_eq!(resolution.policy, PreservationPolicy::KeepAllValuable);
        assert_eq!(resolution.representative, "c0");
        assert_eq!(resolution.retained, vec!["c2".to_string(), "c4".to_string()]);
    }

    #[test]
    fn test_low_variance_mid_group_keeps_best() {
        let c = comments(&["texto repetido a", "texto repetido b", "texto repetido c", "texto repetido d"]);
        let resolution = resolve(
            &valued(&c, &[0.5, 0.5, 0.52, 0.5]),
            &PreservationLimits::default(),
        )
        .expect("resolution");
        assert_eq!(resolution.policy, PreservationPolicy::KeepBest);
        assert_eq!(resolution.representative, "c2");
    }

    #[test]
    fn test_large_group_keeps_bounded_sample() {
        let texts: Vec<String> = (0..12).map(|i| format!("comentario largo {}", i)).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let c = comments(&refs);
        let values: Vec<f64> = (0..12).map(|i| i as f64 / 12.0).collect();
        let limits = PreservationLimits::default();
        let resolution = resolve(&valued(&c, &values), &limits).expect("resolution");

        assert_eq!(resolution.policy, PreservationPolicy::KeepRepresentative);
        assert_eq!(resolution.representative, "c11");
        assert_eq!(resolution.retained.len(), limits.max_representatives - 1);
        assert_eq!(resolution.retained, vec!["c7", "c8", "c9", "c10"]);
    }
}
