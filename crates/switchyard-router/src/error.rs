// Error types for routing

use crate::routing::config::ConfigError;
use switchyard_abstraction::{BackendError, BackendKind};
use thiserror::Error;

/// Result type for routing operations
pub type Result<T> = std::result::Result<T, RoutingError>;

/// Routing errors
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Backend unreachable
    #[error("{backend}: connection error: {message}")]
    Connection {
        /// Backend that failed
        backend: BackendKind,
        /// Failure detail
        message: String,
    },

    /// Backend exceeded its allotted time
    #[error("{backend}: timed out: {message}")]
    Timeout {
        /// Backend that failed
        backend: BackendKind,
        /// Failure detail
        message: String,
    },

    /// Backend produced an invalid or unusable result
    #[error("{backend}: inference error: {message}")]
    Inference {
        /// Backend that failed
        backend: BackendKind,
        /// Failure detail
        message: String,
    },

    /// Circuit breaker rejected the call without invoking the backend
    #[error("{backend}: circuit open")]
    CircuitOpen {
        /// Backend whose breaker is open
        backend: BackendKind,
    },

    /// Invalid runtime configuration value (e.g. a threshold outside [0, 1])
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Configuration file could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Every candidate backend failed; carries the last failure and the audit trail
    #[error("All candidate backends failed (last: {last}); reasons: [{}]", .reasons.join("; "))]
    Exhausted {
        /// Failure of the last attempted candidate
        #[source]
        last: Box<RoutingError>,
        /// Routing audit trail up to the failure
        reasons: Vec<String>,
    },

    /// No registered backend was eligible for the request
    #[error("No eligible backend; reasons: [{}]", .reasons.join("; "))]
    NoEligibleBackend {
        /// Routing audit trail
        reasons: Vec<String>,
    },
}

impl RoutingError {
    /// Wraps a backend failure with the backend it came from.
    #[must_use]
    pub fn from_backend(backend: BackendKind, error: BackendError) -> Self {
        match error {
            BackendError::Connection(message) => RoutingError::Connection { backend, message },
            BackendError::Timeout(message) => RoutingError::Timeout { backend, message },
            BackendError::Inference(message) => RoutingError::Inference { backend, message },
        }
    }

    /// Whether this is a fast-fail from an open circuit breaker.
    #[must_use]
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, RoutingError::CircuitOpen { .. })
    }

    /// Whether this failure was a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, RoutingError::Timeout { .. })
    }

    /// Backend associated with a per-call failure, if any.
    #[must_use]
    pub const fn backend(&self) -> Option<BackendKind> {
        match self {
            RoutingError::Connection { backend, .. }
            | RoutingError::Timeout { backend, .. }
            | RoutingError::Inference { backend, .. }
            | RoutingError::CircuitOpen { backend } => Some(*backend),
            _ => None,
        }
    }

    /// Routing audit trail attached to a terminal failure.
    #[must_use]
    pub fn reasons(&self) -> &[String] {
        match self {
            RoutingError::Exhausted { reasons, .. } | RoutingError::NoEligibleBackend { reasons } => reasons,
            _ => &[],
        }
    }
}
