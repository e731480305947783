//! Duplicate detection model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::comment::Comment;

/// Detection stage that formed a group. Stages run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStage {
    Exact,
    Normalized,
    Fuzzy,
    Semantic,
    Pattern,
}

impl DetectionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionStage::Exact => "exact",
            DetectionStage::Normalized => "normalized",
            DetectionStage::Fuzzy => "fuzzy",
            DetectionStage::Semantic => "semantic",
            DetectionStage::Pattern => "pattern",
        }
    }
}

/// How a group decides which members survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreservationPolicy {
    /// Small groups: keep the single most informative comment
    KeepBest,
    /// High value variance: keep every member at or above the mean value
    KeepAllValuable,
    /// Large groups: keep a bounded sample of distinct members
    KeepRepresentative,
    /// Spam: nothing is kept for analysis
    Filter,
}

/// Kind of boilerplate found by the pattern stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Same text modulo numbers, names, dates and similar placeholders
    Template,
    /// Repetitive-token spam
    Repetitive,
}

/// A set of comments judged equivalent at one detection stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub stage: DetectionStage,
    /// Every member, representative included, in input order
    pub member_ids: Vec<String>,
    /// Member that goes on to analysis; `None` for filtered spam
    pub representative: Option<String>,
    /// Valuable variants kept alongside the representative (never analysed
    /// separately; they inherit the representative's result)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retained_ids: Vec<String>,
    pub policy: PreservationPolicy,
    /// Lowest pairwise similarity that linked the group (1.0 for exact)
    pub similarity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<PatternKind>,
}

impl DuplicateGroup {
    pub fn len(&self) -> usize {
        self.member_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_ids.is_empty()
    }

    pub fn is_filtered(&self) -> bool {
        self.representative.is_none()
    }
}

/// Counters for a detection run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupStats {
    pub input: usize,
    pub unique: usize,
    /// Comments excluded from duplicate analysis (empty or too short)
    pub passthrough: usize,
    pub removed_by_stage: HashMap<DetectionStage, usize>,
    pub filtered_spam: usize,
    pub duration_ms: u64,
}

/// Output of the duplicate detector.
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Comments that go on to analysis, in input order
    pub unique: Vec<Comment>,
    pub groups: Vec<DuplicateGroup>,
    /// Ids that bypassed duplicate analysis untouched
    pub passthrough_ids: Vec<String>,
    pub stats: DedupStats,
}

impl DedupOutcome {
    /// Map every grouped comment id to the unique comment that stands in for
    /// it. Chains across stages are followed; filtered members map nowhere.
    pub fn representative_map(&self) -> HashMap<String, String> {
        let mut direct: HashMap<&str, &str> = HashMap::new();
        for group in &self.groups {
            if let Some(rep) = group.representative.as_deref() {
                for member in &group.member_ids {
                    if member != rep {
                        direct.insert(member.as_str(), rep);
                    }
                }
            }
        }

        let mut resolved = HashMap::with_capacity(direct.len());
        for (&member, &rep) in &direct {
            let mut current = rep;
            // Stages strictly reduce the survivor set, so chains are acyclic
            // and at most one hop per stage.
            for _ in 0..5 {
                match direct.get(current) {
                    Some(&next) => current = next,
                    None => break,
                }
            }
            resolved.insert(member.to_string(), current.to_string());
        }
        resolved
    }

    /// Ids removed as spam.
    pub fn filtered_ids(&self) -> Vec<String> {
        self.groups
            .iter()
            .filter(|g| g.is_filtered())
            .flat_map(|g| g.member_ids.iter().cloned())
            .collect()
    }
}
