//! End to end: config, dedup, planning, analysis and history persistence.

use std::sync::Arc;

use opina::config::OpinaConfig;
use opina::init::AppContext;
use opina::models::{Comment, EngineKind, SessionState};
use opina::services::history::HISTORY_FILE;
use opina::services::{NoopProgressObserver, PlanOverrides, ProcessingStrategy, SessionControl};
use opina::OpinaError;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn feedback() -> Vec<Comment> {
    vec![
        Comment::new("f1", "Excelente atención en la sucursal del centro, muy amables"),
        Comment::new("f2", "Excelente atención en la sucursal del centro, muy amables"),
        Comment::new("f3", "El precio del combo subió demasiado, está carísimo"),
        Comment::new("f4", "La aplicación se cierra cuando quiero pagar con tarjeta"),
        Comment::new("f5", "Che ndaikatúi apaga tarjeta reheve, ajepa ivaieterei"),
        Comment::new("f6", "ok"),
    ]
}

#[tokio::test]
async fn test_full_request_accounts_for_every_input() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = AppContext::with_config(dir.path().to_path_buf(), OpinaConfig::default())
        .expect("context");

    let report = ctx
        .pipeline(Arc::new(NoopProgressObserver))
        .run(feedback(), &SessionControl::new(true), &PlanOverrides::default())
        .await
        .expect("report");

    assert_eq!(report.state, SessionState::Completed);
    assert!(!report.partial);
    assert_eq!(report.input_count, 6);
    assert_eq!(report.dedup_stats.unique, 5);
    assert_eq!(report.representatives.len(), 1);
    assert_eq!(
        report.results.len() + report.failed.len(),
        report.dedup_stats.unique
    );

    // The duplicate resolves to whatever its representative got
    match (report.result_for("f1"), report.result_for("f2")) {
        (Some(a), Some(b)) => assert_eq!(a, b),
        (None, None) => assert!(report.failure_for("f2").is_some()),
        other => panic!("duplicates resolved differently: {:?}", other),
    }

    for result in &report.results {
        assert!(result.is_finalized());
        assert!(result.per_capability.len() <= EngineKind::ALL.len());
        assert!((0.0..=1.0).contains(&result.overall_confidence));
        assert!((0.0..=1.0).contains(&result.consensus_level));
    }

    let json = serde_json::to_value(&report).expect("serialize");
    assert_eq!(json["input_count"], 6);
    assert!(json["plan"]["batch_size"].as_u64().is_some());
}

#[tokio::test]
async fn test_history_is_persisted_and_reloaded() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = AppContext::with_config(dir.path().to_path_buf(), OpinaConfig::default())
        .expect("context");

    let report = ctx
        .pipeline(Arc::new(NoopProgressObserver))
        .run(feedback(), &SessionControl::new(true), &PlanOverrides::default())
        .await
        .expect("report");

    assert!(dir.path().join(HISTORY_FILE).exists());

    let reloaded = AppContext::with_config(dir.path().to_path_buf(), OpinaConfig::default())
        .expect("context");
    let stats = reloaded
        .history
        .stats(&report.plan.profile)
        .expect("profile recorded");
    assert_eq!(stats.sessions, 1);
}

#[tokio::test]
async fn test_disabled_history_writes_nothing() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = OpinaConfig::default();
    config.history.enabled = false;
    let ctx = AppContext::with_config(dir.path().to_path_buf(), config).expect("context");

    ctx.pipeline(Arc::new(NoopProgressObserver))
        .run(feedback(), &SessionControl::new(true), &PlanOverrides::default())
        .await
        .expect("report");

    assert!(!dir.path().join(HISTORY_FILE).exists());
}

#[tokio::test]
async fn test_overrides_shape_the_session() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = AppContext::with_config(dir.path().to_path_buf(), OpinaConfig::default())
        .expect("context");
    let overrides = PlanOverrides {
        strategy: Some(ProcessingStrategy::Sequential),
        concurrency: None,
        batch_size: Some(2),
    };

    let report = ctx
        .pipeline(Arc::new(NoopProgressObserver))
        .run(feedback(), &SessionControl::new(true), &overrides)
        .await
        .expect("report");

    assert_eq!(report.plan.batch_size, 2);
    assert_eq!(report.plan.concurrency, 1);
    assert_eq!(report.statistics.sub_batches, 3);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = OpinaConfig::default();
    config.engines.enabled.clear();

    let err = AppContext::with_config(dir.path().to_path_buf(), config)
        .err()
        .expect("config error");
    assert!(matches!(err, OpinaError::NoUsableEngines));
}

#[tokio::test]
async fn test_empty_request_completes_without_work() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = AppContext::with_config(dir.path().to_path_buf(), OpinaConfig::default())
        .expect("context");

    let report = ctx
        .pipeline(Arc::new(NoopProgressObserver))
        .run(Vec::new(), &SessionControl::new(true), &PlanOverrides::default())
        .await
        .expect("report");

    assert!(report.results.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(report.state, SessionState::Completed);
    assert!(!dir.path().join(HISTORY_FILE).exists());
}
