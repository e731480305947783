//! Learned batch-size multipliers per workload profile.
//!
//! After each session the observed throughput and failure rate nudge the
//! multiplier for that profile: failures shrink future batches, throughput
//! gains grow them. The table is small and persisted as JSON under the data
//! path.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::OpinaError;

/// History file name under the data path.
pub const HISTORY_FILE: &str = "history.json";

const MIN_MULTIPLIER: f64 = 0.25;
const MAX_MULTIPLIER: f64 = 2.0;

/// Coarse comment-length class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthBucket {
    Short,
    Medium,
    Long,
}

impl LengthBucket {
    pub fn from_avg_len(avg_chars: f64) -> Self {
        if avg_chars < 60.0 {
            LengthBucket::Short
        } else if avg_chars < 200.0 {
            LengthBucket::Medium
        } else {
            LengthBucket::Long
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LengthBucket::Short => "short",
            LengthBucket::Medium => "medium",
            LengthBucket::Long => "long",
        }
    }
}

/// What "similar workload" means for the learned multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadProfile {
    pub length: LengthBucket,
    pub engine_count: usize,
}

impl WorkloadProfile {
    pub fn new(avg_chars: f64, engine_count: usize) -> Self {
        Self {
            length: LengthBucket::from_avg_len(avg_chars),
            engine_count,
        }
    }

    fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for WorkloadProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.length.as_str(), self.engine_count)
    }
}

/// Outcome of one finished session, as seen by the history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSample {
    pub batch_size: usize,
    /// Comments per second
    pub throughput: f64,
    pub failure_rate: f64,
}

/// Learned state for one profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub multiplier: f64,
    pub sessions: u32,
    /// Decayed mean throughput
    pub throughput: f64,
    /// Decayed mean failure rate
    pub failure_rate: f64,
}

impl Default for ProfileStats {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            sessions: 0,
            throughput: 0.0,
            failure_rate: 0.0,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    profiles: BTreeMap<String, ProfileStats>,
}

/// Per-profile multipliers, optionally backed by a JSON file.
#[derive(Debug)]
pub struct PerformanceHistory {
    profiles: RwLock<BTreeMap<String, ProfileStats>>,
    decay: f64,
    failure_threshold: f64,
    path: Option<PathBuf>,
}

impl Default for PerformanceHistory {
    fn default() -> Self {
        Self::in_memory(0.9, 0.05)
    }
}

impl PerformanceHistory {
    /// History that is never persisted.
    pub fn in_memory(decay: f64, failure_threshold: f64) -> Self {
        Self {
            profiles: RwLock::new(BTreeMap::new()),
            decay: decay.clamp(0.0, 1.0),
            failure_threshold,
            path: None,
        }
    }

    /// Load from `path`, starting empty if the file is missing or corrupt.
    pub fn load(path: impl Into<PathBuf>, decay: f64, failure_threshold: f64) -> Self {
        let path = path.into();
        let mut history = Self::in_memory(decay, failure_threshold);
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<HistoryFile>(&contents) {
                Ok(file) => {
                    debug!(path = %path.display(), profiles = file.profiles.len(), "Loaded performance history");
                    history.profiles = RwLock::new(file.profiles);
                }
                Err(e) => warn!(path = %path.display(), "Ignoring unreadable performance history: {}", e),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), "Failed to read performance history: {}", e),
        }
        history.path = Some(path);
        history
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Learned multiplier for a profile; 1.0 when unseen.
    pub fn multiplier(&self, profile: &WorkloadProfile) -> f64 {
        self.stats(profile).map(|s| s.multiplier).unwrap_or(1.0)
    }

    pub fn stats(&self, profile: &WorkloadProfile) -> Option<ProfileStats> {
        let profiles = self.profiles.read().unwrap_or_else(|e| e.into_inner());
        profiles.get(&profile.key()).copied()
    }

    /// Fold a finished session into the profile's learned state.
    pub fn record(&self, profile: &WorkloadProfile, sample: SessionSample) -> ProfileStats {
        let mut profiles = self.profiles.write().unwrap_or_else(|e| e.into_inner());
        let stats = profiles.entry(profile.key()).or_default();

        let factor = if sample.failure_rate > self.failure_threshold {
            0.8
        } else if stats.sessions > 0 && sample.throughput > stats.throughput * 1.05 {
            1.1
        } else {
            1.0
        };
        stats.multiplier = (stats.multiplier * factor).clamp(MIN_MULTIPLIER, MAX_MULTIPLIER);

        if stats.sessions == 0 {
            stats.throughput = sample.throughput;
            stats.failure_rate = sample.failure_rate;
        } else {
            stats.throughput = self.decay * stats.throughput + (1.0 - self.decay) * sample.throughput;
            stats.failure_rate =
                self.decay * stats.failure_rate + (1.0 - self.decay) * sample.failure_rate;
        }
        stats.sessions += 1;

        debug!(
            profile = %profile,
            batch_size = sample.batch_size,
            multiplier = stats.multiplier,
            "Recorded session performance"
        );
        *stats
    }

    /// Write to the backing file, if any.
    pub fn save(&self) -> Result<(), OpinaError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = HistoryFile {
            profiles: self
                .profiles
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(throughput: f64, failure_rate: f64) -> SessionSample {
        SessionSample {
            batch_size: 100,
            throughput,
            failure_rate,
        }
    }

    #[test]
    fn test_length_buckets() {
        assert_eq!(LengthBucket::from_avg_len(20.0), LengthBucket::Short);
        assert_eq!(LengthBucket::from_avg_len(120.0), LengthBucket::Medium);
        assert_eq!(LengthBucket::from_avg_len(900.0), LengthBucket::Long);
        assert_eq!(WorkloadProfile::new(120.0, 4).to_string(), "medium:4");
    }

    #[test]
    fn test_unseen_profile_is_neutral() {
        let history = PerformanceHistory::default();
        assert_eq!(history.multiplier(&WorkloadProfile::new(50.0, 2)), 1.0);
    }

    #[test]
    fn test_failures_shrink_and_throughput_grows() {
        let history = PerformanceHistory::default();
        let profile = WorkloadProfile::new(50.0, 4);

        history.record(&profile, sample(100.0, 0.2));
        assert!((history.multiplier(&profile) - 0.8).abs() < 1e-9);

        history.record(&profile, sample(200.0, 0.0));
        assert!((history.multiplier(&profile) - 0.88).abs() < 1e-9);

        // No throughput gain, no failures: unchanged
        let before = history.multiplier(&profile);
        history.record(&profile, sample(1.0, 0.0));
        assert_eq!(history.multiplier(&profile), before);
    }

    #[test]
    fn test_multiplier_is_bounded() {
        let history = PerformanceHistory::default();
        let profile = WorkloadProfile::new(500.0, 1);
        for _ in 0..50 {
            history.record(&profile, sample(10.0, 1.0));
        }
        assert_eq!(history.multiplier(&profile), MIN_MULTIPLIER);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join(HISTORY_FILE);
        let profile = WorkloadProfile::new(150.0, 3);

        let history = PerformanceHistory::load(&path, 0.9, 0.05);
        history.record(&profile, sample(50.0, 0.5));
        history.save().expect("save");

        let reloaded = PerformanceHistory::load(&path, 0.9, 0.05);
        assert_eq!(reloaded.stats(&profile), history.stats(&profile));
        assert_eq!(reloaded.stats(&profile).expect("stats").sessions, 1);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join(HISTORY_FILE);
        std::fs::write(&path, "{not json").expect("write");
        let history = PerformanceHistory::load(&path, 0.9, 0.05);
        assert_eq!(history.multiplier(&WorkloadProfile::new(10.0, 1)), 1.0);
    }
}
