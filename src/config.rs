//! Configuration loading and data path resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engines::EngineSettings;
use crate::services::{
    DedupConfig, IntegratorConfig, NormalizerConfig, OptimizerConfig, ProcessorConfig,
    QualityConfig, WorkflowConfig,
};
use crate::OpinaError;

/// Config file looked up under the data path.
pub const CONFIG_FILE: &str = "opina.toml";
/// Env var holding a JSON config.
pub const CONFIG_ENV: &str = "OPINA_CONFIG";
pub const DATA_PATH_ENV: &str = "OPINA_DATA_PATH";

/// Learned batch-size history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Persist learned multipliers under the data path
    pub enabled: bool,
    pub decay: f64,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            decay: 0.9,
        }
    }
}

/// Complete runtime configuration. Every field has a default, so partial
/// files are fine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpinaConfig {
    pub normalizer: NormalizerConfig,
    pub dedup: DedupConfig,
    pub optimizer: OptimizerConfig,
    pub processor: ProcessorConfig,
    pub workflow: WorkflowConfig,
    pub integrator: IntegratorConfig,
    pub quality: QualityConfig,
    pub engines: EngineSettings,
    pub history: HistorySettings,
}

fn unit_interval(name: &str, value: f64) -> Result<(), OpinaError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(OpinaError::Config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

impl OpinaConfig {
    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<(), OpinaError> {
        unit_interval("dedup.fuzzy_threshold", self.dedup.fuzzy_threshold)?;
        unit_interval("dedup.semantic_threshold", self.dedup.semantic_threshold)?;
        unit_interval("processor.failure_rate_threshold", self.processor.failure_rate_threshold)?;
        unit_interval("quality.threshold", self.quality.threshold)?;
        unit_interval("integrator.high_confidence", self.integrator.high_confidence)?;
        unit_interval("workflow.mixed_language_share", self.workflow.mixed_language_share)?;
        unit_interval("history.decay", self.history.decay)?;

        if self.optimizer.min_batch_size == 0
            || self.optimizer.min_batch_size > self.optimizer.max_batch_size
        {
            return Err(OpinaError::Config(format!(
                "optimizer batch bounds are inconsistent: min {} max {}",
                self.optimizer.min_batch_size, self.optimizer.max_batch_size
            )));
        }
        if self.optimizer.reference_length <= 0.0 {
            return Err(OpinaError::Config(
                "optimizer.reference_length must be positive".into(),
            ));
        }
        if self.processor.chunk_size == 0 {
            return Err(OpinaError::Config("processor.chunk_size must be at least 1".into()));
        }
        if self.workflow.engine_concurrency == 0 {
            return Err(OpinaError::Config(
                "workflow.engine_concurrency must be at least 1".into(),
            ));
        }
        let w = &self.integrator.weights;
        if w.sentiment + w.theme + w.emotion + w.language <= 0.0 {
            return Err(OpinaError::Config(
                "integrator.weights must not all be zero".into(),
            ));
        }
        if self.engines.enabled.is_empty() {
            return Err(OpinaError::NoUsableEngines);
        }
        Ok(())
    }
}

fn read_toml(path: &Path) -> Option<OpinaConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<OpinaConfig>(&contents) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                Some(config)
            }
            Err(e) => {
                warn!("Failed to parse {}: {}. Trying next source.", path.display(), e);
                None
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {}. Trying next source.", path.display(), e);
            None
        }
    }
}

/// Load config with priority:
/// 1. explicit `--config` file
/// 2. `{data_path}/opina.toml`
/// 3. `OPINA_CONFIG` env var (JSON)
/// 4. defaults
pub fn load_config(explicit: Option<&Path>, data_path: &Path) -> OpinaConfig {
    if let Some(config) = explicit.and_then(read_toml) {
        return config;
    }

    let config_path = data_path.join(CONFIG_FILE);
    if config_path.exists() {
        if let Some(config) = read_toml(&config_path) {
            return config;
        }
    }

    if let Ok(json) = std::env::var(CONFIG_ENV) {
        match serde_json::from_str::<OpinaConfig>(&json) {
            Ok(config) => {
                info!("Loaded config from {} env", CONFIG_ENV);
                return config;
            }
            Err(e) => warn!("Failed to parse {}: {}. Using defaults.", CONFIG_ENV, e),
        }
    }

    OpinaConfig::default()
}

/// Data path priority: explicit path > OPINA_DATA_PATH env > ./.opina (if
/// exists) > ~/.opina
pub fn resolve_data_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var(DATA_PATH_ENV).ok().map(PathBuf::from))
        .or_else(|| {
            let local_path = Path::new(".opina");
            if local_path.is_dir() {
                Some(local_path.to_path_buf())
            } else {
                None
            }
        })
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".opina"))
                .unwrap_or_else(|| PathBuf::from(".opina"))
        })
}
