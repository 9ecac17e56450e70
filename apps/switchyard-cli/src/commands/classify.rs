//! Classify command.

use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use switchyard_abstraction::ClassificationResult;
use switchyard_router::{LatencyTier, RoutingDecision, RoutingStats};

#[derive(Serialize)]
struct ClassifyOutput<'a> {
    result: &'a ClassificationResult,
    decision: &'a RoutingDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<RoutingStats>,
}

/// Execute the classify command.
///
/// Routes `text` through the configured backends and prints the result and
/// routing decision as JSON.
pub async fn execute(
    config: Option<&Path>,
    text: &str,
    tier: LatencyTier,
    min_confidence: f64,
    user: Option<&str>,
    stats: bool,
) -> anyhow::Result<()> {
    let router = super::build_router(config)?;

    let (result, decision) = router
        .route_and_classify(text, tier, min_confidence, user)
        .await
        .context("Classification failed")?;

    let output = ClassifyOutput {
        result: &result,
        decision: &decision,
        stats: stats.then(|| router.get_routing_stats()),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
