//! Tests for A/B strategies applied during routing.

use super::router_with;
use crate::routing::types::LatencyTier;
use std::sync::Arc;
use switchyard_abstraction::BackendKind;
use switchyard_backends::ScriptedBackend;

fn experiment(strategies: &str, rollout: f64) -> String {
    format!(
        "[experiment]\nenabled = true\nname = \"routing_test\"\nrollout_percentage = {rollout:.1}\nstrategies = [{strategies}]\n"
    )
}

fn backends(rules: f64, zero_shot: f64, heavy: f64) -> [Arc<ScriptedBackend>; 3] {
    [
        Arc::new(ScriptedBackend::new(BackendKind::Rules).respond_with("translation", rules)),
        Arc::new(ScriptedBackend::new(BackendKind::ZeroShot).respond_with("translation", zero_shot)),
        Arc::new(ScriptedBackend::new(BackendKind::HeavyModel).respond_with("translation", heavy)),
    ]
}

#[tokio::test]
async fn test_quality_first_forces_heavy_model_under_critical_tier() {
    let [rules, zero_shot, heavy] = backends(0.99, 0.99, 0.91);
    let router = router_with(&experiment("\"quality_first\"", 100.0), &[&rules, &zero_shot, &heavy]);

    let (_, decision) = router
        .route_and_classify("traduce esto", LatencyTier::Critical, 0.7, Some("user-42"))
        .await
        .unwrap();

    assert_eq!(decision.selected_backend, BackendKind::HeavyModel);
    assert_eq!(decision.ab_group.as_deref(), Some("quality_first"));
    assert_eq!(decision.reasons[0], "A/B group 'quality_first'");
    assert_eq!(decision.reasons[1], "forced heavy_model first by strategy 'quality_first'");
    assert_eq!(rules.calls(), 0);
}

#[tokio::test]
async fn test_aggressive_rules_accepts_cheap_backend_sooner() {
    let [rules, zero_shot, heavy] = backends(0.75, 0.9, 0.9);
    let router = router_with(&experiment("\"aggressive_rules\"", 100.0), &[&rules, &zero_shot, &heavy]);

    let (_, decision) = router
        .route_and_classify("x", LatencyTier::Standard, 0.7, Some("user-1"))
        .await
        .unwrap();

    assert_eq!(decision.selected_backend, BackendKind::Rules);
    assert!(decision.confidence_threshold_used < 0.75 + f64::EPSILON);
    assert_eq!(zero_shot.calls(), 0);
}

#[tokio::test]
async fn test_users_outside_rollout_get_control() {
    let [rules, zero_shot, heavy] = backends(0.75, 0.9, 0.9);
    let router = router_with(&experiment("\"aggressive_rules\"", 0.0), &[&rules, &zero_shot, &heavy]);

    let (_, decision) = router
        .route_and_classify("x", LatencyTier::Standard, 0.7, Some("user-1"))
        .await
        .unwrap();

    assert_eq!(decision.ab_group.as_deref(), Some("control"));
    // Control keeps the 0.85 default, so rules at 0.75 escalates.
    assert_eq!(decision.selected_backend, BackendKind::ZeroShot);
}

#[tokio::test]
async fn test_disabled_experiment_has_no_group() {
    let [rules, zero_shot, heavy] = backends(0.9, 0.9, 0.9);
    let router = router_with("", &[&rules, &zero_shot, &heavy]);

    let (_, decision) = router
        .route_and_classify("x", LatencyTier::Standard, 0.7, Some("user-1"))
        .await
        .unwrap();

    assert_eq!(decision.ab_group, None);
    assert!(router.get_routing_stats().ab_test_groups.is_empty());
}

#[tokio::test]
async fn test_custom_strategy_from_config() {
    let [rules, zero_shot, heavy] = backends(0.9, 0.62, 0.9);
    let toml = format!(
        "{}\n[[strategies]]\nname = \"zero_shot_first\"\nforced_backend = \"zero_shot\"\nthresholds = {{ zero_shot = 0.6 }}\n",
        experiment("\"zero_shot_first\"", 100.0)
    );
    let router = router_with(&toml, &[&rules, &zero_shot, &heavy]);

    let (_, decision) = router
        .route_and_classify("x", LatencyTier::Standard, 0.5, Some("user-9"))
        .await
        .unwrap();

    assert_eq!(decision.selected_backend, BackendKind::ZeroShot);
    assert_eq!(decision.confidence_threshold_used, 0.6);
    assert_eq!(decision.attempted, vec![BackendKind::ZeroShot]);
    assert!(router.strategy("zero_shot_first").is_some());
}

#[tokio::test]
async fn test_group_stats_are_recorded() {
    let [rules, zero_shot, heavy] = backends(0.9, 0.9, 0.8);
    let router = router_with(&experiment("\"balanced\"", 100.0), &[&rules, &zero_shot, &heavy]);

    for user in ["a", "b", "c"] {
        router
            .route_and_classify("x", LatencyTier::Standard, 0.7, Some(user))
            .await
            .unwrap();
    }

    let stats = router.get_routing_stats();
    let balanced = &stats.ab_test_groups["balanced"];
    assert_eq!(balanced.count, 3);
    assert!((balanced.avg_confidence - 0.9).abs() < 1e-9);
}
