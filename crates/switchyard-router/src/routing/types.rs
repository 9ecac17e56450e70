//! Types for the routing system.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use switchyard_abstraction::BackendKind;

/// Default minimum confidence a caller accepts.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

/// Latency tier for a request; bounds total routing time and picks candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyTier {
    /// Interactive paths: cheap backends only.
    Critical,
    /// Default tier.
    Standard,
    /// Batch or offline work: every backend is fair game.
    Relaxed,
}

impl fmt::Display for LatencyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatencyTier::Critical => write!(f, "critical"),
            LatencyTier::Standard => write!(f, "standard"),
            LatencyTier::Relaxed => write!(f, "relaxed"),
        }
    }
}

impl FromStr for LatencyTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(LatencyTier::Critical),
            "standard" => Ok(LatencyTier::Standard),
            "relaxed" => Ok(LatencyTier::Relaxed),
            other => Err(format!(
                "Unknown latency tier '{}'. Valid tiers: critical, standard, relaxed",
                other
            )),
        }
    }
}

impl LatencyTier {
    /// Every tier, tightest budget first.
    pub const ALL: [LatencyTier; 3] = [LatencyTier::Critical, LatencyTier::Standard, LatencyTier::Relaxed];

    /// Dense index for per-tier tables.
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            LatencyTier::Critical => 0,
            LatencyTier::Standard => 1,
            LatencyTier::Relaxed => 2,
        }
    }

    /// Default latency ceiling for the tier.
    #[must_use]
    pub const fn default_budget(&self) -> Duration {
        match self {
            LatencyTier::Critical => Duration::from_millis(100),
            LatencyTier::Standard => Duration::from_millis(500),
            LatencyTier::Relaxed => Duration::from_millis(2000),
        }
    }

    /// Default candidate order for the tier.
    #[must_use]
    pub fn default_candidates(&self) -> Vec<BackendKind> {
        match self {
            LatencyTier::Critical => vec![BackendKind::Rules, BackendKind::ZeroShot],
            LatencyTier::Standard | LatencyTier::Relaxed => {
                vec![BackendKind::Rules, BackendKind::ZeroShot, BackendKind::HeavyModel]
            }
        }
    }
}

/// Resolved routing policy for one latency tier.
#[derive(Debug, Clone, PartialEq)]
pub struct TierPolicy {
    /// Maximum total routing time.
    pub budget: Duration,
    /// Candidate backends in the order they are tried.
    pub candidates: Vec<BackendKind>,
}

impl TierPolicy {
    /// Builds the default policy for a tier.
    #[must_use]
    pub fn default_for(tier: LatencyTier) -> Self {
        Self {
            budget: tier.default_budget(),
            candidates: tier.default_candidates(),
        }
    }
}

/// Per-backend confidence thresholds, replaced wholesale on update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdTable([f64; 3]);

impl ThresholdTable {
    /// Creates a table from one threshold per backend.
    #[must_use]
    pub fn new(rules: f64, zero_shot: f64, heavy_model: f64) -> Self {
        Self([rules, zero_shot, heavy_model])
    }

    /// Threshold for a backend.
    #[must_use]
    pub fn get(&self, kind: BackendKind) -> f64 {
        self.0[kind.index()]
    }

    /// Copy of this table with one threshold replaced.
    #[must_use]
    pub fn with(mut self, kind: BackendKind, value: f64) -> Self {
        self.0[kind.index()] = value;
        self
    }
}

/// Audit record of a routing decision.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    /// Backend whose result was returned.
    pub selected_backend: BackendKind,
    /// Effective acceptance threshold applied to the selected backend.
    pub confidence_threshold_used: f64,
    /// Latency the router expected from the selected backend (P95 or prior).
    pub expected_latency_ms: f64,
    /// Wall-clock time spent routing the request.
    pub actual_latency_ms: f64,
    /// Human-readable trail of every decision point, in order.
    pub reasons: Vec<String>,
    /// A/B group the request was assigned to, when experimentation is on.
    pub ab_group: Option<String>,
    /// Backends actually invoked, in order.
    pub attempted: Vec<BackendKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parsing() {
        assert_eq!("Critical".parse::<LatencyTier>().unwrap(), LatencyTier::Critical);
        assert_eq!("relaxed".parse::<LatencyTier>().unwrap(), LatencyTier::Relaxed);
        assert!("urgent".parse::<LatencyTier>().is_err());
    }

    #[test]
    fn test_critical_tier_excludes_heavy_model() {
        assert!(!LatencyTier::Critical.default_candidates().contains(&BackendKind::HeavyModel));
        assert!(LatencyTier::Critical.default_budget() < LatencyTier::Standard.default_budget());
    }

    #[test]
    fn test_threshold_table_copy_on_write() {
        let table = ThresholdTable::new(0.85, 0.75, 0.65);
        let updated = table.with(BackendKind::ZeroShot, 0.5);
        assert_eq!(table.get(BackendKind::ZeroShot), 0.75);
        assert_eq!(updated.get(BackendKind::ZeroShot), 0.5);
        assert_eq!(updated.get(BackendKind::Rules), 0.85);
    }
}
