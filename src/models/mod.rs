pub mod comment;
pub mod duplicate;
pub mod engine;
pub mod integrated;
pub mod session;

pub use comment::Comment;
pub use duplicate::{
    DedupOutcome, DedupStats, DetectionStage, DuplicateGroup, PatternKind, PreservationPolicy,
};
pub use engine::{EngineKind, EnginePayload, EngineResult, LabelScore, SentimentLabel};
pub use integrated::{
    ConflictSeverity, IntegratedResult, QualityScore, ResolutionMethod, ResolvedValue,
};
pub use session::{
    BatchSession, FailedComment, ProgressCounters, SessionState, SessionStatistics, SubBatch,
    SubBatchState,
};
