//! Backend health command.

use colored::Colorize;
use std::path::Path;

/// Execute the health command.
///
/// Exits with an error when any registered backend is unhealthy.
pub async fn execute(config: Option<&Path>) -> anyhow::Result<()> {
    let router = super::build_router(config)?;
    let health = router.health().await;

    for (kind, healthy) in &health {
        let status = if *healthy { "healthy".green() } else { "unhealthy".red() };
        println!("  {:<12} {}", kind.as_str(), status);
    }

    let unhealthy: Vec<_> = health.iter().filter(|(_, ok)| !**ok).map(|(kind, _)| kind.as_str()).collect();
    if !unhealthy.is_empty() {
        anyhow::bail!("Unhealthy backends: {}", unhealthy.join(", "));
    }
    Ok(())
}
