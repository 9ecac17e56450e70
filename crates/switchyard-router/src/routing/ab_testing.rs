//! A/B assignment and the routing strategy registry.

use crate::error::{Result, RoutingError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use switchyard_abstraction::BackendKind;

/// Group name used when a request is not enrolled in the experiment.
pub const CONTROL_GROUP: &str = "control";

fn stable_hash(experiment: &str, user_id: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(experiment.as_bytes());
    hasher.update(b":");
    hasher.update(user_id.as_bytes());
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// Deterministic bucket in `[0, 100)` for an experiment and user.
///
/// Stable across processes and platforms.
#[must_use]
pub fn bucket(experiment: &str, user_id: &str) -> f64 {
    (stable_hash(experiment, user_id) % 10_000) as f64 / 100.0
}

/// Whether a request falls inside the rollout.
///
/// Identified users always get the same answer for the same experiment;
/// anonymous requests are sampled at random.
#[must_use]
pub fn assign(experiment: &str, user_id: Option<&str>, rollout_percentage: f64) -> bool {
    if rollout_percentage <= 0.0 {
        return false;
    }
    if rollout_percentage >= 100.0 {
        return true;
    }
    let value = match user_id {
        Some(user) => bucket(experiment, user),
        None => rand::thread_rng().gen_range(0.0..100.0),
    };
    value < rollout_percentage
}

/// Experiment settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Whether requests are enrolled at all.
    pub enabled: bool,
    /// Experiment name, part of the assignment hash.
    pub name: String,
    /// Share of requests enrolled, in percent.
    pub rollout_percentage: f64,
    /// Strategies enrolled requests are spread over.
    pub strategies: Vec<String>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: "routing_v1".to_string(),
            rollout_percentage: 10.0,
            strategies: vec![
                "aggressive_rules".to_string(),
                "balanced".to_string(),
                "quality_first".to_string(),
            ],
        }
    }
}

impl ExperimentConfig {
    /// Resolves the A/B group for a request; `None` when experimentation is off.
    ///
    /// Enrolled users are spread over the variants by a second stable hash,
    /// so both enrollment and variant are fixed per user.
    #[must_use]
    pub fn resolve_group(&self, user_id: Option<&str>) -> Option<String> {
        if !self.enabled {
            return None;
        }
        if self.strategies.is_empty() || !assign(&self.name, user_id, self.rollout_percentage) {
            return Some(CONTROL_GROUP.to_string());
        }
        let len = self.strategies.len();
        let index = match user_id {
            Some(user) => (stable_hash(&format!("{}:variant", self.name), user) % len as u64) as usize,
            None => rand::thread_rng().gen_range(0..len),
        };
        Some(self.strategies[index].clone())
    }
}

/// Named routing policy applied to an A/B group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ABStrategy {
    /// Strategy name, also the group name.
    pub name: String,
    /// Per-backend thresholds replacing the defaults.
    pub threshold_overrides: BTreeMap<BackendKind, f64>,
    /// Backend tried first regardless of tier.
    pub forced_backend: Option<BackendKind>,
}

impl ABStrategy {
    /// A strategy with no overrides.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            threshold_overrides: BTreeMap::new(),
            forced_backend: None,
        }
    }

    /// Adds a threshold override.
    #[must_use]
    pub fn with_threshold(mut self, kind: BackendKind, threshold: f64) -> Self {
        self.threshold_overrides.insert(kind, threshold);
        self
    }

    /// Forces a backend to be tried first.
    #[must_use]
    pub fn with_forced_backend(mut self, kind: BackendKind) -> Self {
        self.forced_backend = Some(kind);
        self
    }

    /// Effective threshold for a backend given its default.
    #[must_use]
    pub fn threshold_for(&self, kind: BackendKind, default: f64) -> f64 {
        self.threshold_overrides.get(&kind).copied().unwrap_or(default)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(RoutingError::Configuration("strategy name must not be empty".to_string()));
        }
        for (kind, value) in &self.threshold_overrides {
            if !(0.0..=1.0).contains(value) {
                return Err(RoutingError::Configuration(format!(
                    "strategy '{}': threshold for {} must be within [0, 1], got {}",
                    self.name, kind, value
                )));
            }
        }
        Ok(())
    }
}

/// Read-only map from group name to strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, ABStrategy>,
}

impl StrategyRegistry {
    /// The four built-in strategies.
    #[must_use]
    pub fn builtin() -> Self {
        let strategies = [
            ABStrategy::new(CONTROL_GROUP),
            // Accept the cheap backend more readily.
            ABStrategy::new("aggressive_rules").with_threshold(BackendKind::Rules, 0.70),
            ABStrategy::new("balanced")
                .with_threshold(BackendKind::Rules, 0.80)
                .with_threshold(BackendKind::ZeroShot, 0.72)
                .with_threshold(BackendKind::HeavyModel, 0.65),
            ABStrategy::new("quality_first").with_forced_backend(BackendKind::HeavyModel),
        ];
        Self {
            strategies: strategies.into_iter().map(|s| (s.name.clone(), s)).collect(),
        }
    }

    /// Adds or replaces a strategy.
    ///
    /// # Errors
    /// Returns `RoutingError::Configuration` for an empty name or an
    /// override outside `[0, 1]`.
    pub fn insert(&mut self, strategy: ABStrategy) -> Result<()> {
        strategy.validate()?;
        self.strategies.insert(strategy.name.clone(), strategy);
        Ok(())
    }

    /// Looks up a strategy by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ABStrategy> {
        self.strategies.get(name)
    }

    /// Whether a strategy is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_range_and_stability() {
        for user in ["alice", "bob", "", "user-with-a-much-longer-identifier"] {
            let b = bucket("routing_v1", user);
            assert!((0.0..100.0).contains(&b));
            assert_eq!(b, bucket("routing_v1", user));
        }
    }

    #[test]
    fn test_bucket_depends_on_experiment() {
        let differs = (0..50)
            .map(|i| format!("user-{i}"))
            .any(|u| bucket("exp_a", &u) != bucket("exp_b", &u));
        assert!(differs);
    }

    #[test]
    fn test_rollout_edges() {
        assert!(!assign("exp", Some("alice"), 0.0));
        assert!(assign("exp", Some("alice"), 100.0));
        assert!(!assign("exp", None, 0.0));
        assert!(assign("exp", None, 100.0));
    }

    #[test]
    fn test_disabled_experiment_has_no_group() {
        let config = ExperimentConfig::default();
        assert_eq!(config.resolve_group(Some("alice")), None);
    }

    #[test]
    fn test_full_rollout_assigns_configured_variant() {
        let config = ExperimentConfig {
            enabled: true,
            rollout_percentage: 100.0,
            strategies: vec!["balanced".to_string()],
            ..ExperimentConfig::default()
        };
        assert_eq!(config.resolve_group(Some("alice")).as_deref(), Some("balanced"));
        assert_eq!(config.resolve_group(None).as_deref(), Some("balanced"));
    }

    #[test]
    fn test_variant_is_stable_per_user() {
        let config = ExperimentConfig {
            enabled: true,
            rollout_percentage: 100.0,
            ..ExperimentConfig::default()
        };
        for i in 0..100 {
            let user = format!("user-{i}");
            let first = config.resolve_group(Some(user.as_str()));
            assert_eq!(first, config.resolve_group(Some(user.as_str())));
            assert!(config.strategies.contains(first.as_ref().unwrap()));
        }
    }

    #[test]
    fn test_builtin_strategies() {
        let registry = StrategyRegistry::builtin();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["aggressive_rules", "balanced", "control", "quality_first"]);

        let control = registry.get("control").unwrap();
        assert!(control.threshold_overrides.is_empty());
        assert_eq!(control.forced_backend, None);

        assert!(registry.get("aggressive_rules").unwrap().threshold_for(BackendKind::Rules, 0.85) < 0.85);
        assert_eq!(
            registry.get("quality_first").unwrap().forced_backend,
            Some(BackendKind::HeavyModel)
        );
        assert_eq!(registry.get("balanced").unwrap().threshold_for(BackendKind::ZeroShot, 0.75), 0.72);
    }

    #[test]
    fn test_insert_validates_overrides() {
        let mut registry = StrategyRegistry::builtin();
        let bad = ABStrategy::new("reckless").with_threshold(BackendKind::Rules, 1.2);
        assert!(registry.insert(bad).is_err());
        assert!(!registry.contains("reckless"));

        registry
            .insert(ABStrategy::new("zero_shot_first").with_forced_backend(BackendKind::ZeroShot))
            .unwrap();
        assert!(registry.contains("zero_shot_first"));
    }
}
