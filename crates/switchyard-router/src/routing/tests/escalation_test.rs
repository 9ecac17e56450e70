//! Tests for confidence-driven escalation and budget handling.

use super::router_with;
use crate::error::RoutingError;
use crate::routing::types::LatencyTier;
use std::sync::Arc;
use std::time::Duration;
use switchyard_abstraction::{BackendError, BackendKind, ClassificationResult, Complexity};
use switchyard_backends::ScriptedBackend;

fn scripted(kind: BackendKind, confidence: f64) -> Arc<ScriptedBackend> {
    Arc::new(ScriptedBackend::new(kind).respond_with("question_answering", confidence))
}

fn failing(kind: BackendKind, error: BackendError) -> Arc<ScriptedBackend> {
    Arc::new(ScriptedBackend::new(kind).fail(error))
}

#[tokio::test]
async fn test_confident_first_candidate_returns_immediately() {
    let rules = scripted(BackendKind::Rules, 0.92);
    let zero_shot = scripted(BackendKind::ZeroShot, 0.99);
    let router = router_with("", &[&rules, &zero_shot]);

    let (result, decision) = router
        .route_and_classify("what time is it", LatencyTier::Standard, 0.7, None)
        .await
        .unwrap();

    assert_eq!(result.confidence, 0.92);
    assert_eq!(decision.selected_backend, BackendKind::Rules);
    assert_eq!(decision.attempted, vec![BackendKind::Rules]);
    assert_eq!(decision.confidence_threshold_used, 0.85);
    assert!(decision.reasons.iter().all(|r| !r.starts_with("upgrade")));
    assert_eq!(zero_shot.calls(), 0);
}

#[tokio::test]
async fn test_low_confidence_escalates_to_next_candidate() {
    let rules = scripted(BackendKind::Rules, 0.60);
    let zero_shot = scripted(BackendKind::ZeroShot, 0.88);
    let heavy = scripted(BackendKind::HeavyModel, 0.99);
    let router = router_with("", &[&rules, &zero_shot, &heavy]);

    let (_, decision) = router
        .route_and_classify("explain this", LatencyTier::Standard, 0.7, None)
        .await
        .unwrap();

    assert_eq!(decision.selected_backend, BackendKind::ZeroShot);
    assert_eq!(decision.attempted, vec![BackendKind::Rules, BackendKind::ZeroShot]);
    assert!(decision
        .reasons
        .iter()
        .any(|r| r.starts_with("upgrade: rules confidence 0.60 below threshold 0.85")));
    assert_eq!(heavy.calls(), 0);
}

#[tokio::test]
async fn test_min_confidence_raises_effective_threshold() {
    let rules = scripted(BackendKind::Rules, 0.90);
    let zero_shot = scripted(BackendKind::ZeroShot, 0.96);
    let router = router_with("", &[&rules, &zero_shot]);

    let (_, decision) = router
        .route_and_classify("x", LatencyTier::Standard, 0.95, None)
        .await
        .unwrap();

    assert_eq!(decision.selected_backend, BackendKind::ZeroShot);
    assert_eq!(decision.confidence_threshold_used, 0.95);
}

#[tokio::test]
async fn test_last_candidate_is_final_even_below_threshold() {
    let rules = scripted(BackendKind::Rules, 0.40);
    let zero_shot = scripted(BackendKind::ZeroShot, 0.50);
    let router = router_with("", &[&rules, &zero_shot]);

    let (result, decision) = router
        .route_and_classify("x", LatencyTier::Critical, 0.7, None)
        .await
        .unwrap();

    assert_eq!(result.confidence, 0.50);
    assert_eq!(decision.selected_backend, BackendKind::ZeroShot);
    assert!(decision.reasons.last().unwrap().contains("no further candidates"));
}

#[tokio::test]
async fn test_unregistered_candidates_do_not_count_as_eligible() {
    let rules = scripted(BackendKind::Rules, 0.40);
    let router = router_with("", &[&rules]);

    let (_, decision) = router
        .route_and_classify("x", LatencyTier::Relaxed, 0.7, None)
        .await
        .unwrap();

    assert_eq!(decision.selected_backend, BackendKind::Rules);
    assert!(decision.reasons.last().unwrap().contains("no further candidates"));
}

#[tokio::test]
async fn test_no_registered_candidate() {
    let heavy = scripted(BackendKind::HeavyModel, 0.9);
    let router = router_with("", &[&heavy]);

    let err = router
        .route_and_classify("x", LatencyTier::Critical, 0.7, None)
        .await
        .unwrap_err();

    assert!(matches!(err, RoutingError::NoEligibleBackend { .. }));
    assert_eq!(err.reasons().len(), 2);
    assert_eq!(router.get_routing_stats().failed_requests, 1);
}

#[tokio::test(start_paused = true)]
async fn test_budget_exhaustion_keeps_current_result() {
    let rules = Arc::new(ScriptedBackend::new(BackendKind::Rules).respond_after(
        ClassificationResult::new("translation", 0.5, Complexity::Simple),
        Duration::from_millis(40),
    ));
    let zero_shot = scripted(BackendKind::ZeroShot, 0.95);
    let router = router_with("", &[&rules, &zero_shot]);

    // 100ms critical budget minus 40ms leaves less than zero_shot's 80ms prior.
    let (_, decision) = router
        .route_and_classify("x", LatencyTier::Critical, 0.7, None)
        .await
        .unwrap();

    assert_eq!(decision.selected_backend, BackendKind::Rules);
    assert!(decision.reasons.last().unwrap().starts_with("budget exhausted"));
    assert_eq!(zero_shot.calls(), 0);
}

#[tokio::test]
async fn test_failure_escalates_without_consuming_budget() {
    let rules = failing(BackendKind::Rules, BackendError::Inference("bad regex".into()));
    let zero_shot = scripted(BackendKind::ZeroShot, 0.9);
    let router = router_with("", &[&rules, &zero_shot]);

    let (_, decision) = router
        .route_and_classify("x", LatencyTier::Standard, 0.7, None)
        .await
        .unwrap();

    assert_eq!(decision.selected_backend, BackendKind::ZeroShot);
    assert!(decision.reasons.iter().any(|r| r.starts_with("rules failed")));
}

#[tokio::test]
async fn test_earlier_result_kept_when_later_candidates_fail() {
    let rules = scripted(BackendKind::Rules, 0.60);
    let zero_shot = failing(BackendKind::ZeroShot, BackendError::Inference("oom".into()));
    let heavy = failing(BackendKind::HeavyModel, BackendError::Inference("oom".into()));
    let router = router_with("", &[&rules, &zero_shot, &heavy]);

    let (result, decision) = router
        .route_and_classify("x", LatencyTier::Standard, 0.7, None)
        .await
        .unwrap();

    assert_eq!(result.confidence, 0.60);
    assert_eq!(decision.selected_backend, BackendKind::Rules);
    assert_eq!(decision.attempted.len(), 3);
    assert!(decision.reasons.last().unwrap().contains("keeping rules result"));
}

#[tokio::test]
async fn test_all_candidates_fail() {
    let rules = failing(BackendKind::Rules, BackendError::Inference("a".into()));
    let zero_shot = failing(BackendKind::ZeroShot, BackendError::Inference("b".into()));
    let router = router_with("", &[&rules, &zero_shot]);

    let err = router
        .route_and_classify("x", LatencyTier::Critical, 0.7, None)
        .await
        .unwrap_err();

    let RoutingError::Exhausted { last, reasons } = &err else {
        panic!("expected Exhausted, got {err:?}");
    };
    assert_eq!(last.backend(), Some(BackendKind::ZeroShot));
    assert_eq!(reasons.len(), 2);
    assert!(err.to_string().contains("rules failed"));
}

#[tokio::test]
async fn test_attempt_cap_limits_escalation() {
    let rules = scripted(BackendKind::Rules, 0.5);
    let zero_shot = scripted(BackendKind::ZeroShot, 0.5);
    let heavy = scripted(BackendKind::HeavyModel, 0.99);
    let router = router_with("max_attempts_per_request = 2", &[&rules, &zero_shot, &heavy]);

    let (_, decision) = router
        .route_and_classify("x", LatencyTier::Relaxed, 0.7, None)
        .await
        .unwrap();

    assert_eq!(decision.selected_backend, BackendKind::ZeroShot);
    assert_eq!(
        decision.reasons.last().unwrap(),
        "zero_shot final: attempt cap of 2 reached before heavy_model; keeping zero_shot result at confidence 0.50"
    );
    assert_eq!(heavy.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_escalation_keeps_result_when_next_cannot_fit() {
    let rules = scripted(BackendKind::Rules, 0.5);
    let zero_shot = Arc::new(ScriptedBackend::new(BackendKind::ZeroShot).respond_after(
        ClassificationResult::new("analysis", 0.99, Complexity::Complex),
        Duration::from_secs(1),
    ));
    let heavy = Arc::new(ScriptedBackend::new(BackendKind::HeavyModel).respond_after(
        ClassificationResult::new("analysis", 0.99, Complexity::Complex),
        Duration::from_millis(250),
    ));
    let router = router_with("", &[&rules, &zero_shot, &heavy]);

    // zero_shot times out at 300ms, leaving 200ms against heavy_model's 300ms prior.
    for _ in 0..5 {
        let (_, decision) = router
            .route_and_classify("x", LatencyTier::Standard, 0.7, None)
            .await
            .unwrap();
        assert_eq!(decision.selected_backend, BackendKind::Rules);
        assert_eq!(decision.attempted, vec![BackendKind::Rules, BackendKind::ZeroShot]);
        let last = decision.reasons.last().unwrap();
        assert!(last.starts_with("budget exhausted"));
        assert!(last.ends_with("heavy_model expects 300ms; keeping rules result at confidence 0.50"));
    }

    assert_eq!(heavy.calls(), 0);
    assert_eq!(router.circuit_state(BackendKind::HeavyModel).map(|s| s.as_str()), Some("closed"));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_abandons_slow_candidate() {
    let rules = failing(BackendKind::Rules, BackendError::Inference("bad regex".into()));
    let zero_shot = Arc::new(ScriptedBackend::new(BackendKind::ZeroShot).respond_after(
        ClassificationResult::new("analysis", 0.99, Complexity::Complex),
        Duration::from_secs(1),
    ));
    let heavy = Arc::new(ScriptedBackend::new(BackendKind::HeavyModel).respond_after(
        ClassificationResult::new("analysis", 0.99, Complexity::Complex),
        Duration::from_secs(1),
    ));
    let router = router_with("", &[&rules, &zero_shot, &heavy]);

    let start = tokio::time::Instant::now();
    let err = router
        .route_and_classify("x", LatencyTier::Standard, 0.7, None)
        .await
        .unwrap_err();

    // zero_shot times out at its 300ms call timeout, heavy_model at the 500ms tier deadline.
    assert!(start.elapsed() <= Duration::from_millis(501));
    let RoutingError::Exhausted { last, reasons } = &err else {
        panic!("expected Exhausted, got {err:?}");
    };
    assert!(last.is_timeout());
    assert_eq!(last.backend(), Some(BackendKind::HeavyModel));
    assert_eq!(reasons.last().map(String::as_str), Some("deadline reached"));
}

#[tokio::test]
async fn test_rejects_invalid_min_confidence() {
    let rules = scripted(BackendKind::Rules, 0.9);
    let router = router_with("", &[&rules]);

    for bad in [1.2, -0.01, f64::NAN] {
        let err = router
            .route_and_classify("x", LatencyTier::Standard, bad, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::Configuration(_)));
    }
    assert_eq!(rules.calls(), 0);
}
