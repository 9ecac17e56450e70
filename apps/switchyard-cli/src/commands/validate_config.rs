//! Configuration validation command.

use colored::Colorize;
use std::path::Path;
use switchyard_abstraction::BackendKind;
use switchyard_router::LatencyTier;

/// Execute the validate-config command.
///
/// Loads and validates the file, then prints the resolved settings.
pub fn execute(path: &Path) -> anyhow::Result<()> {
    let config = super::load_config(Some(path))?;
    let thresholds = config.thresholds();

    println!("{} {}", "✓".green(), format!("{} is valid", path.display()).bold());
    println!();

    println!("{}", "Backends".bold().cyan());
    for kind in BackendKind::ALL {
        let backend = config.backend(kind);
        let settings = backend.client_settings(kind);
        println!(
            "  {:<12} threshold {:.2}  timeout {}ms  breaker {}/{}ms  {}",
            kind.as_str(),
            thresholds.get(kind),
            settings.call_timeout.as_millis(),
            settings.breaker.failure_threshold,
            settings.breaker.recovery_timeout.as_millis(),
            backend.url.as_deref().unwrap_or("local")
        );
    }
    println!();

    println!("{}", "Tiers".bold().cyan());
    for tier in LatencyTier::ALL {
        let policy = config.tier_policy(tier);
        let candidates: Vec<_> = policy.candidates.iter().map(|k| k.as_str()).collect();
        println!(
            "  {:<12} budget {}ms  candidates [{}]",
            tier.to_string(),
            policy.budget.as_millis(),
            candidates.join(", ")
        );
    }
    println!();

    let experiment = &config.experiment;
    println!("{}", "Experiment".bold().cyan());
    if experiment.enabled {
        println!(
            "  {} at {:.1}% over [{}]",
            experiment.name,
            experiment.rollout_percentage,
            experiment.strategies.join(", ")
        );
    } else {
        println!("  disabled");
    }
    println!("  max attempts per request: {}", config.max_attempts_per_request);
    Ok(())
}
