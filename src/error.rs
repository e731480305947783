use thiserror::Error;

/// Custom error type for Opina operations.
///
/// Only session-fatal conditions reach callers through this type. Engine,
/// integration and batch level problems are absorbed and annotated on the
/// affected comments instead.
#[derive(Debug, Error)]
pub enum OpinaError {
    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input validation failed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No analysis engine is registered or available; the session cannot run.
    #[error("No usable analysis engines configured")]
    NoUsableEngines,

    /// I/O failure (history persistence, input files).
    #[error("I/O error: {0}")]
    Io(String),

    /// (De)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The session was cancelled before any work could start.
    #[error("Session cancelled")]
    Cancelled,

    /// Internal invariant broken.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for OpinaError {
    fn from(err: serde_json::Error) -> Self {
        OpinaError::Serialization(format!("JSON serialization error: {}", err))
    }
}

impl From<std::io::Error> for OpinaError {
    fn from(err: std::io::Error) -> Self {
        OpinaError::Io(err.to_string())
    }
}

/// Structured failure reported by an analysis engine.
///
/// Engines never panic or bubble raw errors to the caller; every failure is
/// one of these four kinds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The call did not complete within the per-call timeout.
    #[error("Engine '{engine}' timed out after {after_ms} ms")]
    Timeout { engine: String, after_ms: u64 },

    /// The shared quota or rate limit rejected the call.
    #[error("Engine '{engine}' is rate limited")]
    RateLimited { engine: String },

    /// The engine rejected the input or produced a malformed response.
    #[error("Engine '{engine}' returned an invalid result: {message}")]
    Invalid { engine: String, message: String },

    /// The engine (or its upstream) is down.
    #[error("Engine '{engine}' is unavailable: {message}")]
    Unavailable { engine: String, message: String },
}

impl EngineError {
    /// Name of the engine that produced the error.
    pub fn engine(&self) -> &str {
        match self {
            EngineError::Timeout { engine, .. }
            | EngineError::RateLimited { engine }
            | EngineError::Invalid { engine, .. }
            | EngineError::Unavailable { engine, .. } => engine,
        }
    }

    /// Systemic errors point at the upstream rather than the comment and are
    /// worth retrying after a backoff.
    pub fn is_systemic(&self) -> bool {
        !matches!(self, EngineError::Invalid { .. })
    }
}

/// Failure of one comment's trip through the workflow.
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    /// Every engine failed and at least one failure was systemic. The whole
    /// sub-batch is retried.
    #[error("Upstream failure for comment '{comment_id}': {errors:?}")]
    Upstream {
        comment_id: String,
        errors: Vec<EngineError>,
    },

    /// Every engine rejected the comment. Recorded as an item failure.
    #[error("No engine produced a result for comment '{comment_id}': {errors:?}")]
    NoResults {
        comment_id: String,
        errors: Vec<EngineError>,
    },

    /// The session was cancelled between cascade stages.
    #[error("Analysis of comment '{comment_id}' cancelled")]
    Cancelled { comment_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_is_not_systemic() {
        let err = EngineError::Invalid {
            engine: "sentiment-lexicon".into(),
            message: "empty".into(),
        };
        assert!(!err.is_systemic());
        assert_eq!(err.engine(), "sentiment-lexicon");
    }

    #[test]
    fn test_timeout_rate_limit_unavailable_are_systemic() {
        let errors = [
            EngineError::Timeout {
                engine: "a".into(),
                after_ms: 10,
            },
            EngineError::RateLimited { engine: "b".into() },
            EngineError::Unavailable {
                engine: "c".into(),
                message: "503".into(),
            },
        ];
        assert!(errors.iter().all(|e| e.is_systemic()));
    }

    #[test]
    fn test_error_display_mentions_engine() {
        let err = EngineError::Timeout {
            engine: "theme-keywords".into(),
            after_ms: 30_000,
        };
        assert_eq!(
            err.to_string(),
            "Engine 'theme-keywords' timed out after 30000 ms"
        );
    }
}
