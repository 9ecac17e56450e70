//! Switchyard routing layer.
//!
//! Chooses among heterogeneous intent classifiers per request, escalating
//! when confidence is too low and failing fast around unhealthy backends.

pub mod error;
pub mod routing;

pub use error::{Result, RoutingError};
pub use routing::{
    ABStrategy, ConfigError, ExperimentConfig, LatencyTier, MetricsTracker, Router, RouterBuilder, RouterConfig,
    RouterConfigLoader, RoutingDecision, RoutingStats, StrategyRegistry, DEFAULT_MIN_CONFIDENCE,
};
