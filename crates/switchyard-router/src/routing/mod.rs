//! Adaptive routing across classification backends.
//!
//! Requests are routed by latency tier, escalated from cheaper to more
//! expensive backends when confidence is insufficient, and protected by a
//! per-backend circuit breaker. A/B strategies can override thresholds or
//! force a backend for a deterministic share of users.

pub mod ab_testing;
pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod metrics;
pub mod router;
pub mod types;

#[cfg(test)]
mod tests;

pub use ab_testing::{ABStrategy, ExperimentConfig, StrategyRegistry};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{BackendClient, ClientSettings, RetryPolicy};
pub use config::{ConfigError, RouterConfig, RouterConfigLoader};
pub use metrics::{GroupStats, MetricsSnapshot, MetricsTracker, Percentiles};
pub use router::{BackendStatus, Router, RouterBuilder, RoutingStats};
pub use types::{LatencyTier, RoutingDecision, ThresholdTable, TierPolicy, DEFAULT_MIN_CONFIDENCE};
