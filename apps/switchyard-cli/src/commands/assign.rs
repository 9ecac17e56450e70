//! A/B assignment inspection command.

use colored::Colorize;
use switchyard_router::routing::ab_testing::{assign, bucket};

/// Execute the assign command.
pub fn execute(experiment: &str, user: &str, rollout: f64) -> anyhow::Result<()> {
    if !(0.0..=100.0).contains(&rollout) {
        anyhow::bail!("Rollout percentage must be between 0 and 100, got {}", rollout);
    }

    let matched = assign(experiment, Some(user), rollout);
    let verdict = if matched { "matched".green() } else { "not matched".yellow() };
    println!(
        "{} / {}: {} (bucket {:.2}, rollout {:.2}%)",
        experiment,
        user,
        verdict,
        bucket(experiment, user),
        rollout
    );
    Ok(())
}
