//! Five-stage duplicate detection.
//!
//! Stages run in order over the survivors of the previous stage:
//! exact, normalized, fuzzy, semantic, pattern. Every pairwise score depends
//! only on the two comments compared, so running the detector on its own
//! output finds nothing further.
//!
//! Empty comments bypass detection and are returned untouched. Short
//! comments take part in every stage but never represent a group, so a
//! group made only of short comments is not formed.

pub mod pattern;
pub mod preservation;
pub mod semantic;
pub mod similarity;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engines::lexicon::{dominant_theme, polarity};
use crate::models::{
    Comment, DedupOutcome, DedupStats, DetectionStage, DuplicateGroup, PatternKind,
    PreservationPolicy, SentimentLabel,
};
use crate::services::normalizer::{tokenize, TextNormalizer};
use crate::utils::math::cosine_similarity;

use pattern::{is_repetitive, template_signature, RepetitionLimits};
use preservation::{information_value, resolve, PreservationLimits};
use semantic::{CachedEmbedder, EmbeddingService, HashingEmbedder};
use similarity::{composite, edit_similarity, length_ratio, token_jaccard, FuzzyWeights, TfIdfIndex};

/// Duplicate detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Composite fuzzy score at or above which two comments are duplicates
    pub fuzzy_threshold: f64,
    /// Embedding cosine at or above which two comments are duplicates
    pub semantic_threshold: f64,
    pub fuzzy_weights: FuzzyWeights,
    /// Comments shorter than this (chars) never represent a group
    pub min_length: usize,
    pub variance_threshold: f64,
    pub max_representatives: usize,
    pub small_group_max: usize,
    pub large_group_min: usize,
    /// Template groups at least this large are filtered as boilerplate;
    /// smaller ones are merged like any other group
    pub template_filter_min: usize,
    pub semantic_enabled: bool,
    pub embedding_dimensions: usize,
    pub embedding_cache_capacity: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.85,
            semantic_threshold: 0.8,
            fuzzy_weights: FuzzyWeights::default(),
            min_length: 10,
            variance_threshold: 0.05,
            max_representatives: 5,
            small_group_max: 3,
            large_group_min: 10,
            template_filter_min: 5,
            semantic_enabled: true,
            embedding_dimensions: 256,
            embedding_cache_capacity: 50_000,
        }
    }
}

impl DedupConfig {
    fn preservation_limits(&self) -> PreservationLimits {
        PreservationLimits {
            small_group_max: self.small_group_max,
            large_group_min: self.large_group_min,
            variance_threshold: self.variance_threshold,
            max_representatives: self.max_representatives.max(1),
            min_representative_len: self.min_length,
        }
    }
}

/// Per-call threshold overrides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupThresholds {
    pub fuzzy: f64,
    pub semantic: f64,
}

impl From<&DedupConfig> for DedupThresholds {
    fn from(config: &DedupConfig) -> Self {
        Self {
            fuzzy: config.fuzzy_threshold,
            semantic: config.semantic_threshold,
        }
    }
}

/// Disjoint-set forest over survivor positions.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Lower index becomes root so components are stable
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }

    /// Components with at least two members, each in ascending order.
    fn components(&mut self) -> Vec<Vec<usize>> {
        let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..self.parent.len() {
            let root = self.find(i);
            by_root.entry(root).or_default().push(i);
        }
        by_root.into_values().filter(|c| c.len() > 1).collect()
    }
}

/// Working state of one detection run.
struct Run<'a> {
    comments: &'a [Comment],
    values: Vec<f64>,
    /// Indices into `comments` still in play, ascending
    survivors: Vec<usize>,
    groups: Vec<DuplicateGroup>,
    removed_by_stage: HashMap<DetectionStage, usize>,
    filtered: usize,
}

impl<'a> Run<'a> {
    /// Resolve candidate groups (survivor-position lists) formed at `stage`
    /// and drop every non-representative member from the survivors.
    fn apply(
        &mut self,
        stage: DetectionStage,
        candidates: Vec<(Vec<usize>, f64)>,
        limits: &PreservationLimits,
    ) {
        let mut removed: HashSet<usize> = HashSet::new();
        for (positions, similarity) in candidates {
            let indices: Vec<usize> = positions.iter().map(|&p| self.survivors[p]).collect();
            let members: Vec<(&Comment, f64)> = indices
                .iter()
                .map(|&i| (&self.comments[i], self.values[i]))
                .collect();
            let Some(resolution) = resolve(&members, limits) else {
                continue;
            };
            for &i in &indices {
                if self.comments[i].id != resolution.representative {
                    removed.insert(i);
                }
            }
            self.groups.push(DuplicateGroup {
                stage,
                member_ids: indices.iter().map(|&i| self.comments[i].id.clone()).collect(),
                representative: Some(resolution.representative),
                retained_ids: resolution.retained,
                policy: resolution.policy,
                similarity,
                pattern: None,
            });
        }
        self.drop_removed(stage, &removed);
    }

    fn drop_removed(&mut self, stage: DetectionStage, removed: &HashSet<usize>) {
        if removed.is_empty() {
            return;
        }
        self.survivors.retain(|i| !removed.contains(i));
        *self.removed_by_stage.entry(stage).or_insert(0) += removed.len();
        debug!(
            stage = stage.as_str(),
            removed = removed.len(),
            survivors = self.survivors.len(),
            "Duplicate stage complete"
        );
    }

    /// Group survivors sharing a key (stages 1 and 2).
    fn key_groups<F>(&self, key: F) -> Vec<(Vec<usize>, f64)>
    where
        F: Fn(&Comment) -> String,
    {
        let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for (pos, &i) in self.survivors.iter().enumerate() {
            let k = key(&self.comments[i]);
            if k.is_empty() {
                continue;
            }
            let entry = by_key.entry(k.clone()).or_default();
            if entry.is_empty() {
                order.push(k);
            }
            entry.push(pos);
        }
        order
            .into_iter()
            .filter_map(|k| by_key.remove(&k))
            .filter(|positions| positions.len() > 1)
            .map(|positions| (positions, 1.0))
            .collect()
    }
}

/// Link survivors whose pairwise score passes, returning components with the
/// weakest link that joined them.
fn link_pairs<F>(n: usize, candidate_pairs: Vec<(usize, usize)>, mut score: F) -> Vec<(Vec<usize>, f64)>
where
    F: FnMut(usize, usize) -> Option<f64>,
{
    let mut uf = UnionFind::new(n);
    let mut weakest: HashMap<(usize, usize), f64> = HashMap::new();
    for (a, b) in candidate_pairs {
        if let Some(s) = score(a, b) {
            uf.union(a, b);
            weakest.insert((a, b), s);
        }
    }
    uf.components()
        .into_iter()
        .map(|component| {
            let members: HashSet<usize> = component.iter().copied().collect();
            let similarity = weakest
                .iter()
                .filter(|((a, b), _)| members.contains(a) && members.contains(b))
                .map(|(_, s)| *s)
                .fold(1.0, f64::min);
            (component, similarity)
        })
        .collect()
}

/// Partitions comments into unique comments and duplicate groups.
pub struct DuplicateDetector {
    config: DedupConfig,
    normalizer: TextNormalizer,
    embedder: Arc<dyn EmbeddingService>,
}

impl DuplicateDetector {
    /// Detector with the hashing embedder behind a cache.
    pub fn new(config: DedupConfig) -> Self {
        let embedder = Arc::new(CachedEmbedder::new(
            Arc::new(HashingEmbedder::new(config.embedding_dimensions)),
            config.embedding_cache_capacity,
            Duration::from_secs(3600),
        ));
        Self::with_embedder(config, embedder)
    }

    pub fn with_embedder(config: DedupConfig, embedder: Arc<dyn EmbeddingService>) -> Self {
        Self {
            config,
            normalizer: TextNormalizer::default(),
            embedder,
        }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Deduplicate with the configured thresholds.
    pub async fn dedupe(&self, comments: &[Comment]) -> DedupOutcome {
        self.dedupe_with(comments, DedupThresholds::from(&self.config))
            .await
    }

    /// Deduplicate with explicit thresholds. Never fails: anything that
    /// cannot be analysed is passed through.
    pub async fn dedupe_with(&self, comments: &[Comment], thresholds: DedupThresholds) -> DedupOutcome {
        let start = Instant::now();
        let limits = self.config.preservation_limits();

        let normalized: Vec<Comment> = comments
            .iter()
            .map(|c| self.normalizer.normalize_comment(c))
            .collect();

        let mut passthrough = Vec::new();
        let mut eligible = Vec::new();
        for (i, c) in normalized.iter().enumerate() {
            if c.normalized_text.is_empty() {
                passthrough.push(i);
            } else {
                eligible.push(i);
            }
        }

        let mut run = Run {
            comments: &normalized,
            values: normalized.iter().map(information_value).collect(),
            survivors: eligible,
            groups: Vec::new(),
            removed_by_stage: HashMap::new(),
            filtered: 0,
        };

        // 1. Exact
        let exact = run.key_groups(|c| c.normalized_text.clone());
        run.apply(DetectionStage::Exact, exact, &limits);

        // 2. Normalized
        let keys = run.key_groups(|c| self.normalizer.comparison_key(&c.text));
        run.apply(DetectionStage::Normalized, keys, &limits);

        // 3. Fuzzy
        let fuzzy = self.fuzzy_groups(&run, thresholds.fuzzy);
        run.apply(DetectionStage::Fuzzy, fuzzy, &limits);

        // 4. Semantic
        if self.config.semantic_enabled {
            match self.semantic_groups(&run, thresholds.semantic).await {
                Ok(semantic) => run.apply(DetectionStage::Semantic, semantic, &limits),
                Err(e) => warn!("Semantic duplicate stage skipped: {}", e),
            }
        }

        // 5. Pattern
        self.pattern_stage(&mut run, &limits);

        let mut kept: Vec<usize> = run.survivors.iter().copied().chain(passthrough.iter().copied()).collect();
        kept.sort_unstable();

        let stats = DedupStats {
            input: comments.len(),
            unique: kept.len(),
            passthrough: passthrough.len(),
            removed_by_stage: run.removed_by_stage,
            filtered_spam: run.filtered,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            input = stats.input,
            unique = stats.unique,
            groups = run.groups.len(),
            passthrough = stats.passthrough,
            "Duplicate detection complete"
        );

        DedupOutcome {
            unique: kept.iter().map(|&i| normalized[i].clone()).collect(),
            groups: run.groups,
            passthrough_ids: passthrough.iter().map(|&i| normalized[i].id.clone()).collect(),
            stats,
        }
    }

    fn fuzzy_groups(&self, run: &Run<'_>, threshold: f64) -> Vec<(Vec<usize>, f64)> {
        let weights = self.config.fuzzy_weights;
        let texts: Vec<&str> = run
            .survivors
            .iter()
            .map(|&i| run.comments[i].normalized_text.as_str())
            .collect();
        let keys: Vec<String> = run
            .survivors
            .iter()
            .map(|&i| self.normalizer.comparison_key(&run.comments[i].text))
            .collect();
        let token_sets: Vec<HashSet<&str>> = keys.iter().map(|k| tokenize(k).into_iter().collect()).collect();
        let lengths: Vec<usize> = texts.iter().map(|t| t.chars().count()).collect();

        // Pairs sharing no key token score at most the edit share, so they
        // can be skipped whenever that share is below the threshold.
        let edit_share = {
            let total = weights.edit.max(0.0) + weights.jaccard.max(0.0) + weights.tfidf.max(0.0);
            if total == 0.0 { 1.0 } else { weights.edit.max(0.0) / total }
        };
        let pairs = if edit_share < threshold {
            shared_token_pairs(&token_sets)
        } else {
            all_pairs(texts.len())
        };

        link_pairs(texts.len(), pairs, |a, b| {
            // Composite can not reach the threshold if even a perfect edit
            // ratio and perfect token scores would fall short
            let ratio = length_ratio(lengths[a], lengths[b]);
            if composite(&weights, ratio, 1.0, 1.0) < threshold {
                return None;
            }
            let edit = edit_similarity(texts[a], texts[b]);
            let jaccard = token_jaccard(&token_sets[a], &token_sets[b]);
            let tfidf = TfIdfIndex::build(&[keys[a].as_str(), keys[b].as_str()]).cosine(0, 1);
            let score = composite(&weights, edit, jaccard, tfidf);
            (score >= threshold).then_some(score)
        })
    }

    async fn semantic_groups(
        &self,
        run: &Run<'_>,
        threshold: f64,
    ) -> Result<Vec<(Vec<usize>, f64)>, crate::OpinaError> {
        let keys: Vec<String> = run
            .survivors
            .iter()
            .map(|&i| self.normalizer.comparison_key(&run.comments[i].text))
            .collect();
        let embeddings = self.embedder.embed_batch(&keys).await?;
        if embeddings.len() != keys.len() {
            return Err(crate::OpinaError::Internal(format!(
                "Embedder returned {} vectors for {} texts",
                embeddings.len(),
                keys.len()
            )));
        }

        // Only pairs agreeing on polarity and topic may merge, so compare
        // within those buckets.
        let mut buckets: BTreeMap<(&'static str, &'static str), Vec<usize>> = BTreeMap::new();
        for (pos, &i) in run.survivors.iter().enumerate() {
            let text = run.comments[i].analysis_text();
            let label = SentimentLabel::from_score(polarity(text, false).score);
            buckets
                .entry((label.as_str(), dominant_theme(text)))
                .or_default()
                .push(pos);
        }
        let pairs: Vec<(usize, usize)> = buckets
            .values()
            .flat_map(|members| {
                members
                    .iter()
                    .enumerate()
                    .flat_map(move |(x, &a)| members[x + 1..].iter().map(move |&b| (a, b)))
            })
            .collect();

        Ok(link_pairs(keys.len(), pairs, |a, b| {
            if keys[a].is_empty() || keys[b].is_empty() {
                return None;
            }
            let sim = cosine_similarity(&embeddings[a], &embeddings[b]) as f64;
            (sim >= threshold).then_some(sim)
        }))
    }

    fn pattern_stage(&self, run: &mut Run<'_>, limits: &PreservationLimits) {
        let repetition = RepetitionLimits::default();

        // Repetitive spam: one filtered group
        let spam: Vec<usize> = run
            .survivors
            .iter()
            .copied()
            .filter(|&i| is_repetitive(&run.comments[i].text, &repetition))
            .collect();
        if !spam.is_empty() {
            run.filtered += spam.len();
            run.groups.push(DuplicateGroup {
                stage: DetectionStage::Pattern,
                member_ids: spam.iter().map(|&i| run.comments[i].id.clone()).collect(),
                representative: None,
                retained_ids: Vec::new(),
                policy: PreservationPolicy::Filter,
                similarity: 1.0,
                pattern: Some(PatternKind::Repetitive),
            });
            let removed: HashSet<usize> = spam.into_iter().collect();
            run.drop_removed(DetectionStage::Pattern, &removed);
        }

        // Templates: same signature after placeholder masking
        let mut by_signature: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (pos, &i) in run.survivors.iter().enumerate() {
            if let Some(signature) = template_signature(&run.comments[i].text) {
                by_signature.entry(signature).or_default().push(pos);
            }
        }
        let mut candidates: Vec<Vec<usize>> = by_signature
            .into_values()
            .filter(|positions| positions.len() > 1)
            .collect();
        candidates.sort_by_key(|positions| positions[0]);

        let mut filtered: HashSet<usize> = HashSet::new();
        let mut merged = Vec::new();
        for positions in candidates {
            if positions.len() >= self.config.template_filter_min {
                let indices: Vec<usize> = positions.iter().map(|&p| run.survivors[p]).collect();
                run.filtered += indices.len();
                run.groups.push(DuplicateGroup {
                    stage: DetectionStage::Pattern,
                    member_ids: indices.iter().map(|&i| run.comments[i].id.clone()).collect(),
                    representative: None,
                    retained_ids: Vec::new(),
                    policy: PreservationPolicy::Filter,
                    similarity: 1.0,
                    pattern: Some(PatternKind::Template),
                });
                filtered.extend(indices);
            } else {
                merged.push((positions, 1.0));
            }
        }

        let first_new = run.groups.len();
        run.apply(DetectionStage::Pattern, merged, limits);
        for group in &mut run.groups[first_new..] {
            group.pattern = Some(PatternKind::Template);
        }
        run.drop_removed(DetectionStage::Pattern, &filtered);
    }
}

/// Pairs of positions whose token sets intersect. Positions with empty sets
/// are paired with each other.
fn shared_token_pairs(token_sets: &[HashSet<&str>]) -> Vec<(usize, usize)> {
    let mut postings: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut empty = Vec::new();
    for (pos, tokens) in token_sets.iter().enumerate() {
        if tokens.is_empty() {
            empty.push(pos);
        }
        for token in tokens {
            postings.entry(token).or_default().push(pos);
        }
    }
    let mut pairs: HashSet<(usize, usize)> = HashSet::new();
    for list in postings.values().chain(std::iter::once(&empty)) {
        for (x, &a) in list.iter().enumerate() {
            for &b in &list[x + 1..] {
                pairs.insert((a.min(b), a.max(b)));
            }
        }
    }
    let mut pairs: Vec<(usize, usize)> = pairs.into_iter().collect();
    pairs.sort_unstable();
    pairs
}

fn all_pairs(n: usize) -> Vec<(usize, usize)> {
    (0..n)
        .flat_map(|a| (a + 1..n).map(move |b| (a, b)))
        .collect()
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

    fn ids(outcome: &DedupOutcome) -> Vec<&str> {
        outcome.unique.iter().map(|c| c.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_exact_duplicates_after_normalization() {
        let detector = DuplicateDetector::new(DedupConfig::default());
        let input = comments(&["Excelente servicio!", "  excelente   SERVICIO! ", "Precio muy caro hoy"]);
        let outcome = detector.dedupe(&input).await;

        assert_eq!(outcome.unique.len(), 2);
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].stage, DetectionStage::Exact);
        assert_eq!(outcome.stats.removed_by_stage.get(&DetectionStage::Exact), Some(&1));
    }

    #[tokio::test]
    async fn test_normalized_stage_ignores_accents_and_stopwords() {
        let detector = DuplicateDetector::new(DedupConfig::default());
        let input = comments(&["La atención fue rápida", "atencion rapida!!"]);
        let outcome = detector.dedupe(&input).await;
        assert_eq!(outcome.unique.len(), 1);
        assert_eq!(outcome.groups[0].stage, DetectionStage::Normalized);
    }

    #[tokio::test]
    async fn test_fuzzy_stage_catches_typos() {
        let detector = DuplicateDetector::new(DedupConfig::default());
        let input = comments(&[
            "el pedido llego tarde, la comida estaba fria, el repartidor fue grosero y encima cobraron envio extra sin avisar",
            "el pedido llego tarde, la comida estaba fria, el repartidr fue grosero y encima cobraron envio extra sin avisar",
        ]);
        let outcome = detector.dedupe(&input).await;
        assert_eq!(outcome.unique.len(), 1);
        assert_eq!(outcome.groups[0].stage, DetectionStage::Fuzzy);
        assert!(outcome.groups[0].similarity >= 0.85);
    }

    #[tokio::test]
    async fn test_negation_is_never_merged() {
        let detector = DuplicateDetector::new(DedupConfig::default());
        let input = comments(&["Me gustó mucho el producto", "No me gustó mucho el producto"]);
        let outcome = detector.dedupe(&input).await;
        assert_eq!(outcome.unique.len(), 2);
        assert!(outcome.groups.is_empty());
    }

    #[tokio::test]
    async fn test_empty_passes_through_and_short_groups_are_not_formed() {
        let detector = DuplicateDetector::new(DedupConfig::default());
        let input = comments(&["ok", "ok", "", "El servicio fue excelente"]);
        let outcome = detector.dedupe(&input).await;

        assert_eq!(ids(&outcome), vec!["c0", "c1", "c2", "c3"]);
        assert_eq!(outcome.passthrough_ids, vec!["c2"]);
        assert!(outcome.groups.is_empty());
    }

    #[tokio::test]
    async fn test_short_variants_join_longer_representative() {
        let detector = DuplicateDetector::new(DedupConfig::default());
        let input = comments(&["Muy bueno!!", "muy bueno", "Muy bueno", "Muy bueno"]);
        let outcome = detector.dedupe(&input).await;

        assert_eq!(ids(&outcome), vec!["c0"]);
        assert!(outcome.passthrough_ids.is_empty());
        assert_eq!(outcome.groups.len(), 1);
        let group = &outcome.groups[0];
        assert_eq!(group.stage, DetectionStage::Normalized);
        assert_eq!(group.representative.as_deref(), Some("c0"));
        assert_eq!(group.len(), 4);
    }

    #[tokio::test]
    async fn test_repetitive_spam_is_filtered() {
        let detector = DuplicateDetector::new(DedupConfig::default());
        let input = comments(&[
            "gana gana gana gana gana gana premio",
            "La cajera fue muy amable conmigo",
        ]);
        let outcome = detector.dedupe(&input).await;
        assert_eq!(ids(&outcome), vec!["c1"]);
        assert_eq!(outcome.filtered_ids(), vec!["c0".to_string()]);
        assert_eq!(outcome.stats.filtered_spam, 1);
    }

    #[tokio::test]
    async fn test_small_template_groups_merge() {
        let detector = DuplicateDetector::new(DedupConfig::default());
        let input = comments(&[
            "Pedido #4512 llegó tarde, atendido por Carlos",
            "Pedido #9981 llegó tarde, atendido por María",
        ]);
        let outcome = detector.dedupe(&input).await;
        assert_eq!(outcome.unique.len(), 1);
        let group = outcome.groups.last().expect("group");
        assert_eq!(group.stage, DetectionStage::Pattern);
        assert_eq!(group.pattern, Some(PatternKind::Template));
    }

    #[tokio::test]
    async fn test_unique_preserves_input_order() {
        let detector = DuplicateDetector::new(DedupConfig::default());
        let input = comments(&[
            "Precio muy caro para lo que es",
            "Excelente servicio en la sucursal",
            "Precio muy caro para lo que es",
            "La app se cae todo el tiempo",
        ]);
        let outcome = detector.dedupe(&input).await;
        assert_eq!(ids(&outcome), vec!["c0", "c1", "c3"]);
        let map = outcome.representative_map();
        assert_eq!(map.get("c2").map(String::as_str), Some("c0"));
    }

    #[tokio::test]
    async fn test_second_run_finds_nothing() {
        let detector = DuplicateDetector::new(DedupConfig::default());
        let input = comments(&[
            "Excelente servicio!",
            "excelente servicio",
            "La atención fue rápida",
            "atencion rapida",
            "el delivery llego tarde y frio otra vez",
            "el delivery llego tarde y frio otra ves",
            "gana gana gana gana gana gana premio",
        ]);
        let first = detector.dedupe(&input).await;
        let second = detector.dedupe(&first.unique).await;
        assert!(second.groups.is_empty());
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_union_find_components() {
        let mut uf = UnionFind::new(5);
        uf.union(3, 1);
        uf.union(1, 4);
        assert_eq!(uf.components(), vec![vec![1, 3, 4]]);
    }

    #[test]
    fn test_shared_token_pairs() {
        let sets: Vec<HashSet<&str>> = vec![
            ["a", "b"].into_iter().collect(),
            ["b"].into_iter().collect(),
            ["c"].into_iter().collect(),
            HashSet::new(),
            HashSet::new(),
        ];
        assert_eq!(shared_token_pairs(&sets), vec![(0, 1), (3, 4)]);
    }
}
