//! Conflict classification and resolution across engines of one capability.

mod common;

use std::sync::Arc;

use common::{comments, ScriptedEngine};
use opina::engines::EngineRegistry;
use opina::models::{ConflictSeverity, EngineKind, EnginePayload, IntegratedResult, ResolutionMethod};
use opina::services::WorkflowManager;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

async fn analyse(engines: Vec<ScriptedEngine>) -> IntegratedResult {
    let mut registry = EngineRegistry::new();
    for engine in engines {
        registry.register(Arc::new(engine)).expect("register");
    }
    let manager = WorkflowManager::with_defaults(registry).expect("workflow");
    let input = comments(&[("c1", "La atención fue rara, no sé qué pensar")]);

    let mut run = manager.run(&input, &CancellationToken::new()).await;
    assert_eq!(run.outcomes.len(), 1);
    let (id, outcome) = run.outcomes.remove(0);
    assert_eq!(id, "c1");
    outcome.expect("integrated result")
}

#[tokio::test]
async fn test_confident_opposite_sentiments_need_review() {
    let result = analyse(vec![
        ScriptedEngine::sentiment("lex-a", 0.6, 0.9),
        ScriptedEngine::sentiment("lex-b", -0.6, 0.85),
    ])
    .await;

    let sentiment = result.resolved(EngineKind::Sentiment).expect("sentiment");
    assert_eq!(sentiment.severity, ConflictSeverity::High);
    assert_eq!(sentiment.method, ResolutionMethod::HistoricalPrior);
    assert_eq!(sentiment.contributing_engines, vec!["lex-a", "lex-b"]);
    // Equal priors, so the more confident engine wins
    assert_eq!(result.label(EngineKind::Sentiment), Some("positive"));
    assert!(result.requires_manual_review);
    assert_eq!(result.consensus_level, 0.0);
    assert!(result.is_finalized());
}

#[tokio::test]
async fn test_agreeing_engines_reach_full_consensus() {
    let result = analyse(vec![
        ScriptedEngine::sentiment("lex-a", 0.6, 0.9),
        ScriptedEngine::sentiment("lex-b", 0.55, 0.8),
    ])
    .await;

    let sentiment = result.resolved(EngineKind::Sentiment).expect("sentiment");
    assert_eq!(sentiment.severity, ConflictSeverity::None);
    assert_eq!(sentiment.method, ResolutionMethod::Unanimous);
    assert_eq!(sentiment.confidence, 0.9);
    assert_eq!(result.consensus_level, 1.0);
    assert!(!result.requires_manual_review);
}

#[tokio::test]
async fn test_low_confidence_disagreement_resolves_to_weighted_mean() {
    let result = analyse(vec![
        ScriptedEngine::sentiment("lex-a", 0.6, 0.9),
        ScriptedEngine::sentiment("lex-b", -0.6, 0.5),
    ])
    .await;

    let sentiment = result.resolved(EngineKind::Sentiment).expect("sentiment");
    assert_eq!(sentiment.severity, ConflictSeverity::Medium);
    assert_eq!(sentiment.method, ResolutionMethod::WeightedConsensus);
    let score = sentiment.payload.score().expect("score");
    assert!(score > 0.0 && score < 0.6, "score {}", score);
    assert!(!result.requires_manual_review);
}

#[tokio::test]
async fn test_same_label_with_diverging_scores_is_low_severity() {
    let result = analyse(vec![
        ScriptedEngine::sentiment("lex-a", 0.9, 0.6),
        ScriptedEngine::sentiment("lex-b", 0.3, 0.8),
    ])
    .await;

    let sentiment = result.resolved(EngineKind::Sentiment).expect("sentiment");
    assert_eq!(sentiment.severity, ConflictSeverity::Low);
    assert_eq!(sentiment.method, ResolutionMethod::HighestConfidence);
    assert_eq!(sentiment.payload, EnginePayload::sentiment(0.3));
    assert_eq!(result.consensus_level, 0.0);
}

#[tokio::test]
async fn test_conflict_in_one_capability_leaves_the_other_resolved() {
    let result = analyse(vec![
        ScriptedEngine::sentiment("lex-a", 0.6, 0.9),
        ScriptedEngine::sentiment("lex-b", -0.6, 0.85),
        ScriptedEngine::theme("themes", "service", 0.8),
    ])
    .await;

    assert_eq!(result.per_capability.len(), 2);
    let theme = result.resolved(EngineKind::Theme).expect("theme");
    assert_eq!(theme.severity, ConflictSeverity::None);
    assert_eq!(theme.method, ResolutionMethod::SingleSource);
    assert_eq!(result.consensus_level, 0.5);
    assert_eq!(result.max_severity(), ConflictSeverity::High);
}
