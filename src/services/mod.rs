pub mod accuracy;
pub mod control;
pub mod dedup;
pub mod history;
pub mod integrator;
pub mod normalizer;
pub mod optimizer;
pub mod pipeline;
pub mod processor;
pub mod progress;
pub mod quality;
pub mod resources;
pub mod workflow;

pub use accuracy::{AccuracyPrior, DecayingAccuracyTracker};
pub use control::{QualityGate, SessionControl};
pub use dedup::{DedupConfig, DedupThresholds, DuplicateDetector};
pub use history::{PerformanceHistory, ProfileStats, SessionSample, WorkloadProfile};
pub use integrator::{CapabilityWeights, IntegratorConfig, ResultIntegrator};
pub use normalizer::{NormalizerConfig, TextNormalizer};
pub use optimizer::{
    BatchOptimizer, BatchPlan, OptimizerConfig, PlanFactors, ProcessingStrategy, RuntimeMetrics,
};
pub use pipeline::{AnalysisPipeline, AnalysisReport, PlanOverrides};
pub use processor::{BatchProcessor, ProcessingOutcome, ProcessorConfig};
pub use progress::{
    ChannelProgressObserver, NoopProgressObserver, ProgressEvent, ProgressObserver,
    ProgressUpdate, QualityCheckpoint,
};
pub use quality::{NoopRefiner, QualityAssurance, QualityConfig, Refiner};
pub use resources::{
    ResourceMonitor, ResourceSnapshot, StaticResourceMonitor, SystemResourceMonitor,
};
pub use workflow::{
    CommentOutcome, WorkflowConfig, WorkflowManager, WorkflowPhase, WorkflowRun, WorkflowStrategy,
};
