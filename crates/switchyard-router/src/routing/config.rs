//! TOML configuration file support for the router.

use super::ab_testing::{ABStrategy, ExperimentConfig, StrategyRegistry};
use super::circuit_breaker::CircuitBreakerConfig;
use super::client::{ClientSettings, RetryPolicy};
use super::types::{LatencyTier, ThresholdTable, TierPolicy};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use switchyard_abstraction::BackendKind;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the file.
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("Failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error.
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Default acceptance threshold for a backend.
#[must_use]
pub const fn default_confidence_threshold(kind: BackendKind) -> f64 {
    match kind {
        BackendKind::Rules => 0.85,
        BackendKind::ZeroShot => 0.75,
        BackendKind::HeavyModel => 0.65,
    }
}

/// Default accuracy estimate for a backend.
#[must_use]
pub const fn default_accuracy_estimate(kind: BackendKind) -> f64 {
    match kind {
        BackendKind::Rules => 0.70,
        BackendKind::ZeroShot => 0.82,
        BackendKind::HeavyModel => 0.92,
    }
}

/// Router configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Maximum number of backends invoked for one request.
    pub max_attempts_per_request: u32,
    /// Per-backend settings.
    pub backends: BackendsConfig,
    /// Per-tier settings.
    pub tiers: TiersConfig,
    /// A/B experiment settings.
    pub experiment: ExperimentConfig,
    /// Custom strategies, merged over the built-ins.
    pub strategies: Vec<StrategyConfig>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_request: 3,
            backends: BackendsConfig::default(),
            tiers: TiersConfig::default(),
            experiment: ExperimentConfig::default(),
            strategies: Vec::new(),
        }
    }
}

/// `[backends.*]` sections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// Rule engine.
    pub rules: BackendConfig,
    /// Zero-shot model.
    pub zero_shot: BackendConfig,
    /// Heavy model.
    pub heavy_model: BackendConfig,
}

/// Settings for one backend. Unset options fall back to per-kind defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Time the breaker stays open before probing.
    pub recovery_timeout_ms: u64,
    /// Upper bound for one attempt.
    pub call_timeout_ms: Option<u64>,
    /// Attempts per invocation for connection failures.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub retry_backoff_ms: u64,
    /// Acceptance threshold.
    pub confidence_threshold: Option<f64>,
    /// Latency prior used until samples exist.
    pub expected_latency_ms: Option<f64>,
    /// Initial accuracy estimate.
    pub accuracy_estimate: Option<f64>,
    /// Health probe cache lifetime.
    pub health_ttl_ms: u64,
    /// Base URL of a remote inference service.
    pub url: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
            call_timeout_ms: None,
            max_attempts: 2,
            retry_backoff_ms: 50,
            confidence_threshold: None,
            expected_latency_ms: None,
            accuracy_estimate: None,
            health_ttl_ms: 5_000,
            url: None,
        }
    }
}

impl BackendConfig {
    /// Client settings for a backend of the given kind.
    #[must_use]
    pub fn client_settings(&self, kind: BackendKind) -> ClientSettings {
        let defaults = ClientSettings::default_for(kind);
        ClientSettings {
            breaker: CircuitBreakerConfig {
                failure_threshold: self.failure_threshold,
                recovery_timeout: Duration::from_millis(self.recovery_timeout_ms),
            },
            call_timeout: self.call_timeout_ms.map_or(defaults.call_timeout, Duration::from_millis),
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                backoff: Duration::from_millis(self.retry_backoff_ms),
            },
            expected_latency_ms: self.expected_latency_ms.unwrap_or(defaults.expected_latency_ms),
            health_ttl: Duration::from_millis(self.health_ttl_ms),
        }
    }

    /// Acceptance threshold for a backend of the given kind.
    #[must_use]
    pub fn confidence_threshold(&self, kind: BackendKind) -> f64 {
        self.confidence_threshold.unwrap_or_else(|| default_confidence_threshold(kind))
    }

    /// Accuracy estimate for a backend of the given kind.
    #[must_use]
    pub fn accuracy_estimate(&self, kind: BackendKind) -> f64 {
        self.accuracy_estimate.unwrap_or_else(|| default_accuracy_estimate(kind))
    }
}

/// `[tiers.*]` sections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TiersConfig {
    /// Critical tier.
    pub critical: TierConfig,
    /// Standard tier.
    pub standard: TierConfig,
    /// Relaxed tier.
    pub relaxed: TierConfig,
}

/// Overrides for one latency tier.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    /// Latency ceiling.
    pub budget_ms: Option<u64>,
    /// Candidate backends in order.
    pub candidates: Option<Vec<BackendKind>>,
}

/// A custom strategy from `[[strategies]]`.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Strategy name.
    pub name: String,
    /// Threshold overrides keyed by backend name.
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,
    /// Backend tried first.
    #[serde(default)]
    pub forced_backend: Option<BackendKind>,
}

impl StrategyConfig {
    fn to_strategy(&self) -> Result<ABStrategy> {
        let mut strategy = ABStrategy::new(self.name.clone());
        for (key, value) in &self.thresholds {
            let kind = key
                .parse::<BackendKind>()
                .map_err(|e| ConfigError::Validation(format!("Strategy '{}': {}", self.name, e)))?;
            strategy = strategy.with_threshold(kind, *value);
        }
        strategy.forced_backend = self.forced_backend;
        Ok(strategy)
    }
}

impl RouterConfig {
    /// Settings section for a backend.
    #[must_use]
    pub const fn backend(&self, kind: BackendKind) -> &BackendConfig {
        match kind {
            BackendKind::Rules => &self.backends.rules,
            BackendKind::ZeroShot => &self.backends.zero_shot,
            BackendKind::HeavyModel => &self.backends.heavy_model,
        }
    }

    /// Overrides section for a tier.
    #[must_use]
    pub const fn tier(&self, tier: LatencyTier) -> &TierConfig {
        match tier {
            LatencyTier::Critical => &self.tiers.critical,
            LatencyTier::Standard => &self.tiers.standard,
            LatencyTier::Relaxed => &self.tiers.relaxed,
        }
    }

    /// Resolved policy for a tier.
    #[must_use]
    pub fn tier_policy(&self, tier: LatencyTier) -> TierPolicy {
        let overrides = self.tier(tier);
        TierPolicy {
            budget: overrides.budget_ms.map_or_else(|| tier.default_budget(), Duration::from_millis),
            candidates: overrides
                .candidates
                .clone()
                .unwrap_or_else(|| tier.default_candidates()),
        }
    }

    /// Initial threshold table.
    #[must_use]
    pub fn thresholds(&self) -> ThresholdTable {
        ThresholdTable::new(
            self.backends.rules.confidence_threshold(BackendKind::Rules),
            self.backends.zero_shot.confidence_threshold(BackendKind::ZeroShot),
            self.backends.heavy_model.confidence_threshold(BackendKind::HeavyModel),
        )
    }

    /// Built-in strategies with the custom ones merged over them.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` for an invalid custom strategy.
    pub fn strategy_registry(&self) -> Result<StrategyRegistry> {
        let mut registry = StrategyRegistry::builtin();
        for custom in &self.strategies {
            registry
                .insert(custom.to_strategy()?)
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
        }
        Ok(registry)
    }
}

/// Configuration loader for router settings.
pub struct RouterConfigLoader;

impl RouterConfigLoader {
    /// Loads router configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<RouterConfig> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses and validates router configuration from TOML text.
    ///
    /// # Errors
    /// Returns error if the text cannot be parsed or validated.
    pub fn parse(content: &str) -> Result<RouterConfig> {
        let config: RouterConfig = toml::from_str(content)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validates router configuration.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid.
    pub fn validate(config: &RouterConfig) -> Result<()> {
        if config.max_attempts_per_request == 0 {
            return Err(ConfigError::Validation(
                "max_attempts_per_request must be at least 1".to_string(),
            ));
        }

        for kind in BackendKind::ALL {
            Self::validate_backend(kind, config.backend(kind))?;
        }

        for tier in LatencyTier::ALL {
            Self::validate_tier(tier, config.tier(tier))?;
        }

        let experiment = &config.experiment;
        if !(0.0..=100.0).contains(&experiment.rollout_percentage) {
            return Err(ConfigError::Validation(format!(
                "Invalid rollout_percentage: {}. Must be between 0 and 100",
                experiment.rollout_percentage
            )));
        }
        if experiment.name.trim().is_empty() {
            return Err(ConfigError::Validation("Experiment name must not be empty".to_string()));
        }

        let registry = config.strategy_registry()?;
        for name in &experiment.strategies {
            if !registry.contains(name) {
                return Err(ConfigError::Validation(format!(
                    "Unknown strategy '{}'. Known strategies: {}",
                    name,
                    registry.names().collect::<Vec<_>>().join(", ")
                )));
            }
        }

        Ok(())
    }

    fn validate_backend(kind: BackendKind, backend: &BackendConfig) -> Result<()> {
        let unit_interval = [
            ("confidence_threshold", backend.confidence_threshold),
            ("accuracy_estimate", backend.accuracy_estimate),
        ];
        for (field, value) in unit_interval {
            if let Some(value) = value {
                if !(0.0..=1.0).contains(&value) {
                    return Err(ConfigError::Validation(format!(
                        "Invalid {} for {}: {}. Must be between 0.0 and 1.0",
                        field, kind, value
                    )));
                }
            }
        }

        if backend.failure_threshold == 0 {
            return Err(ConfigError::Validation(format!(
                "failure_threshold for {} must be at least 1",
                kind
            )));
        }
        if backend.max_attempts == 0 {
            return Err(ConfigError::Validation(format!("max_attempts for {} must be at least 1", kind)));
        }
        if backend.call_timeout_ms == Some(0) {
            return Err(ConfigError::Validation(format!("call_timeout_ms for {} must be positive", kind)));
        }
        if let Some(latency) = backend.expected_latency_ms {
            if !latency.is_finite() || latency < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "Invalid expected_latency_ms for {}: {}",
                    kind, latency
                )));
            }
        }
        if let Some(url) = &backend.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Validation(format!(
                    "Invalid url for {}: '{}'. Expected http:// or https://",
                    kind, url
                )));
            }
        }
        Ok(())
    }

    fn validate_tier(tier: LatencyTier, overrides: &TierConfig) -> Result<()> {
        if overrides.budget_ms == Some(0) {
            return Err(ConfigError::Validation(format!("budget_ms for tier {} must be positive", tier)));
        }

        let Some(candidates) = &overrides.candidates else {
            return Ok(());
        };
        if candidates.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Tier '{}' must have at least one candidate",
                tier
            )));
        }
        let mut seen = HashSet::new();
        for kind in candidates {
            if !seen.insert(*kind) {
                return Err(ConfigError::Validation(format!(
                    "Tier '{}' lists {} more than once",
                    tier, kind
                )));
            }
        }
        if tier == LatencyTier::Critical && candidates.contains(&BackendKind::HeavyModel) {
            return Err(ConfigError::Validation(
                "Tier 'critical' must not list heavy_model; use a forced strategy to run it there".to_string(),
            ));
        }
        Ok(())
    }
}
