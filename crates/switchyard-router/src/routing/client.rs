//! Backend client adapter.
//!
//! Wraps one `Classifier` with a circuit breaker, bounded retries and
//! per-attempt timeouts, and reports outcomes to the shared metrics tracker.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use super::metrics::MetricsTracker;
use crate::error::{Result, RoutingError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use switchyard_abstraction::{BackendError, BackendKind, ClassificationResult, Classifier};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Fixed-delay retry policy for connection-class failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per invocation, including the first.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Resolved settings for one backend client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    /// Circuit breaker tuning.
    pub breaker: CircuitBreakerConfig,
    /// Upper bound for a single attempt.
    pub call_timeout: Duration,
    /// Retry policy for connection failures.
    pub retry: RetryPolicy,
    /// Latency assumed before any samples exist.
    pub expected_latency_ms: f64,
    /// How long a health probe result is reused.
    pub health_ttl: Duration,
}

impl ClientSettings {
    /// Defaults for a backend kind.
    #[must_use]
    pub fn default_for(kind: BackendKind) -> Self {
        let (call_timeout_ms, expected_latency_ms) = match kind {
            BackendKind::Rules => (50, 5.0),
            BackendKind::ZeroShot => (300, 80.0),
            BackendKind::HeavyModel => (2000, 300.0),
        };
        Self {
            breaker: CircuitBreakerConfig::default(),
            call_timeout: Duration::from_millis(call_timeout_ms),
            retry: RetryPolicy::default(),
            expected_latency_ms,
            health_ttl: Duration::from_secs(5),
        }
    }
}

/// Resilient, observable handle to one backend.
pub struct BackendClient {
    classifier: Arc<dyn Classifier>,
    kind: BackendKind,
    breaker: CircuitBreaker,
    settings: ClientSettings,
    metrics: Arc<MetricsTracker>,
    health: Mutex<Option<(bool, Instant)>>,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("kind", &self.kind)
            .field("name", &self.classifier.name())
            .field("breaker", &self.breaker)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    /// Wraps a classifier.
    #[must_use]
    pub fn new(classifier: Arc<dyn Classifier>, settings: ClientSettings, metrics: Arc<MetricsTracker>) -> Self {
        let kind = classifier.kind();
        Self {
            breaker: CircuitBreaker::new(kind, settings.breaker),
            classifier,
            kind,
            settings,
            metrics,
            health: Mutex::new(None),
        }
    }

    /// Backend kind served by this client.
    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Resolved settings.
    #[must_use]
    pub const fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Current breaker state.
    #[must_use]
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Consecutive failures seen by the breaker.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.breaker.consecutive_failures()
    }

    /// Whether the breaker would admit a call right now.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.breaker.is_call_permitted()
    }

    /// Observed P95 latency, or the configured prior when there are no samples.
    #[must_use]
    pub fn expected_latency_ms(&self) -> f64 {
        if self.metrics.sample_count(self.kind) == 0 {
            self.settings.expected_latency_ms
        } else {
            self.metrics.percentiles(self.kind).p95
        }
    }

    /// Classifies `text` within `budget`.
    ///
    /// Connection failures are retried per the retry policy while budget
    /// remains; timeouts and inference failures are returned at once.
    ///
    /// # Errors
    /// `CircuitOpen` when the breaker refuses the call, otherwise the
    /// backend's failure mapped to a `RoutingError`.
    pub async fn invoke(&self, text: &str, budget: Duration) -> Result<ClassificationResult> {
        let Some(permit) = self.breaker.try_acquire() else {
            debug!(backend = %self.kind, "Circuit open, failing fast");
            return Err(RoutingError::CircuitOpen { backend: self.kind });
        };

        let start = Instant::now();
        let deadline = start + budget;
        let mut attempt = 0;

        let outcome = loop {
            attempt += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break Err(BackendError::Timeout(format!("no budget left for attempt {}", attempt)));
            }
            let attempt_timeout = self.settings.call_timeout.min(remaining);

            let result = match tokio::time::timeout(attempt_timeout, self.classifier.classify(text)).await {
                Ok(Ok(result)) => result.validate().map(|()| result),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(BackendError::Timeout(format!(
                    "no response within {}ms",
                    attempt_timeout.as_millis()
                ))),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < self.settings.retry.max_attempts => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining <= self.settings.retry.backoff {
                        break Err(e);
                    }
                    debug!(backend = %self.kind, attempt, error = %e, "Retrying after connection failure");
                    tokio::time::sleep(self.settings.retry.backoff).await;
                }
                other => break other,
            }
        };

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        match outcome {
            Ok(result) => {
                permit.success();
                self.metrics.record_latency(self.kind, latency_ms);
                debug!(
                    backend = %self.kind,
                    latency_ms,
                    confidence = result.confidence,
                    attempts = attempt,
                    "Backend call succeeded"
                );
                Ok(result)
            }
            Err(e) => {
                permit.failure();
                self.metrics.record_failure(self.kind);
                warn!(backend = %self.kind, latency_ms, attempts = attempt, error = %e, "Backend call failed");
                Err(RoutingError::from_backend(self.kind, e))
            }
        }
    }

    /// Cached liveness of the backend.
    ///
    /// An open breaker reports unhealthy without probing. Otherwise the
    /// backend is probed at most once per health TTL.
    pub async fn health_check(&self) -> bool {
        if !self.breaker.is_call_permitted() {
            return false;
        }

        {
            let cached = self.health.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((healthy, checked_at)) = *cached {
                if checked_at.elapsed() < self.settings.health_ttl {
                    return healthy;
                }
            }
        }

        let healthy = tokio::time::timeout(self.settings.call_timeout, self.classifier.health_check())
            .await
            .unwrap_or(false);
        *self.health.lock().unwrap_or_else(PoisonError::into_inner) = Some((healthy, Instant::now()));
        debug!(backend = %self.kind, healthy, "Refreshed health status");
        healthy
    }
}
