//! Scripted engines for driving the workflow deterministically.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opina::engines::{AnalysisEngine, EngineConfig};
use opina::models::{Comment, EngineKind, EnginePayload, EngineResult};
use opina::EngineError;

type Responder = Arc<dyn Fn(&Comment) -> Option<(EnginePayload, f64)> + Send + Sync>;
type Trigger = Arc<dyn Fn(&[Comment]) -> Option<Fault> + Send + Sync>;

/// What a scripted call does instead of answering.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Return this error
    Error(EngineError),
    /// Sleep this long before answering (exceeds the workflow timeout)
    Hang(Duration),
    /// Panic mid-call, as a broken engine would
    Panic(&'static str),
}

/// Engine whose answers and failures are closures over the call's input.
pub struct ScriptedEngine {
    name: String,
    kind: EngineKind,
    respond: Responder,
    fault: Option<Trigger>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    pub fn new(
        name: &str,
        kind: EngineKind,
        respond: impl Fn(&Comment) -> Option<(EnginePayload, f64)> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind,
            respond: Arc::new(respond),
            fault: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Same sentiment for every comment.
    pub fn sentiment(name: &str, score: f64, confidence: f64) -> Self {
        Self::new(name, EngineKind::Sentiment, move |_| {
            Some((EnginePayload::sentiment(score), confidence))
        })
    }

    /// Same primary theme for every comment.
    pub fn theme(name: &str, theme: &str, confidence: f64) -> Self {
        let theme = theme.to_string();
        Self::new(name, EngineKind::Theme, move |_| {
            Some((
                EnginePayload::Theme {
                    primary: theme.clone(),
                    themes: vec![],
                },
                confidence,
            ))
        })
    }

    /// Fail calls for which `trigger` returns a fault.
    pub fn failing_when(
        mut self,
        trigger: impl Fn(&[Comment]) -> Option<Fault> + Send + Sync + 'static,
    ) -> Self {
        self.fault = Some(Arc::new(trigger));
        self
    }

    /// Shared call counter, readable after the engine is registered.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl AnalysisEngine for ScriptedEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EngineKind {
        self.kind
    }

    async fn analyze_batch(
        &self,
        comments: &[Comment],
        _config: &EngineConfig,
    ) -> Result<Vec<EngineResult>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(trigger) = &self.fault {
            match trigger(comments) {
                Some(Fault::Error(err)) => return Err(err),
                Some(Fault::Hang(delay)) => tokio::time::sleep(delay).await,
                Some(Fault::Panic(message)) => panic!("{}", message),
                None => {}
            }
        }
        Ok(comments
            .iter()
            .filter_map(|c| {
                (self.respond)(c).map(|(payload, confidence)| {
                    EngineResult::new(c.id.clone(), self.name.clone(), payload, confidence)
                })
            })
            .collect())
    }
}
