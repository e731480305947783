//! Shared initialization for CLI commands and embedding callers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{load_config, resolve_data_path, OpinaConfig};
use crate::engines::EngineRegistry;
use crate::services::history::HISTORY_FILE;
use crate::services::{
    AnalysisPipeline, BatchOptimizer, BatchProcessor, DecayingAccuracyTracker, DuplicateDetector,
    PerformanceHistory, ProgressObserver, QualityAssurance, ResultIntegrator, TextNormalizer,
    WorkflowManager,
};
use crate::OpinaError;

/// Application context: resolved paths, config and the shared services.
pub struct AppContext {
    pub data_path: PathBuf,
    pub config: OpinaConfig,
    pub registry: EngineRegistry,
    pub history: Arc<PerformanceHistory>,
    pub optimizer: Arc<BatchOptimizer>,
    pub workflow: Arc<WorkflowManager>,
}

impl AppContext {
    /// Resolve the data path, load config and build the services.
    pub fn new(explicit_path: Option<PathBuf>, config_file: Option<&Path>) -> Result<Self, OpinaError> {
        let data_path = resolve_data_path(explicit_path);
        tracing::info!("Using data path: {}", data_path.display());
        let config = load_config(config_file, &data_path);
        Self::with_config(data_path, config)
    }

    /// Build the services from an already loaded config.
    pub fn with_config(data_path: PathBuf, config: OpinaConfig) -> Result<Self, OpinaError> {
        config.validate()?;

        let registry = EngineRegistry::from_settings(&config.engines)?;
        tracing::info!("Registered engines: {}", registry.names().join(", "));

        let history = Arc::new(if config.history.enabled {
            PerformanceHistory::load(
                data_path.join(HISTORY_FILE),
                config.history.decay,
                config.processor.failure_rate_threshold,
            )
        } else {
            PerformanceHistory::in_memory(
                config.history.decay,
                config.processor.failure_rate_threshold,
            )
        });
        let optimizer = Arc::new(BatchOptimizer::new(
            config.optimizer.clone(),
            Arc::clone(&history),
        ));

        let integrator = Arc::new(ResultIntegrator::new(
            config.integrator.clone(),
            Arc::new(DecayingAccuracyTracker::new(config.history.decay, 0.5)),
        ));
        let workflow = Arc::new(WorkflowManager::new(
            registry.clone(),
            integrator,
            Arc::new(QualityAssurance::new(config.quality.clone())),
            config.workflow.clone(),
        )?);

        Ok(Self {
            data_path,
            config,
            registry,
            history,
            optimizer,
            workflow,
        })
    }

    pub fn detector(&self) -> DuplicateDetector {
        DuplicateDetector::new(self.config.dedup.clone())
    }

    /// A pipeline over the shared workflow, reporting to `observer`.
    pub fn pipeline(&self, observer: Arc<dyn ProgressObserver>) -> AnalysisPipeline {
        let processor = BatchProcessor::new(Arc::clone(&self.workflow), self.config.processor.clone())
            .with_observer(observer);
        AnalysisPipeline::new(
            TextNormalizer::new(self.config.normalizer.clone()),
            self.detector(),
            Arc::clone(&self.optimizer),
            processor,
        )
        .with_history_recording(self.config.history.enabled)
    }
}
