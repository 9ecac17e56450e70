//! Circuit breaker pattern for backend failure detection.
//!
//! Each backend owns one breaker. Consecutive failures open the circuit;
//! after the recovery timeout exactly one probe call is let through.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use switchyard_abstraction::BackendKind;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state for a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed - normal operation.
    Closed,
    /// Circuit is open - calls fail fast until the recovery timeout expires.
    Open(Instant),
    /// Circuit is half-open - one probe call is testing recovery.
    HalfOpen,
}

impl CircuitState {
    /// Lowercase name for logs and stats.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open(_) => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Breaker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time the circuit stays open before a probe is admitted.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    probe_in_flight: bool,
}

/// Per-backend circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    backend: BackendKind,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(backend: BackendKind, config: CircuitBreakerConfig) -> Self {
        Self {
            backend,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                probe_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Breaker tuning.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Consecutive failures observed while closed.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Whether `try_acquire` would currently admit a call. Does not change state.
    #[must_use]
    pub fn is_call_permitted(&self) -> bool {
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open(opened_at) => {
                opened_at.elapsed() >= self.config.recovery_timeout && !inner.probe_in_flight
            }
            CircuitState::HalfOpen => !inner.probe_in_flight,
        }
    }

    /// Admits a call, or returns `None` when the circuit is open.
    ///
    /// After the recovery timeout the first caller gets the single probe
    /// permit and the circuit moves to half-open.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Some(CallPermit::new(self, false)),
            CircuitState::Open(opened_at) => {
                if opened_at.elapsed() < self.config.recovery_timeout || inner.probe_in_flight {
                    return None;
                }
                inner.state = CircuitState::HalfOpen;
                inner.probe_in_flight = true;
                info!(backend = %self.backend, "Circuit half-open, admitting probe call");
                Some(CallPermit::new(self, true))
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    return None;
                }
                inner.probe_in_flight = true;
                Some(CallPermit::new(self, true))
            }
        }
    }

    fn settle(&self, probe: bool, success: bool) {
        let mut inner = self.lock();

        if probe {
            inner.probe_in_flight = false;
            if success {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                info!(backend = %self.backend, "Probe succeeded, circuit closed");
            } else {
                inner.state = CircuitState::Open(Instant::now());
                warn!(backend = %self.backend, "Probe failed, circuit re-opened");
            }
            return;
        }

        // Outcomes of calls admitted before the circuit opened are ignored.
        if inner.state != CircuitState::Closed {
            debug!(backend = %self.backend, state = inner.state.as_str(), "Ignoring straggler outcome");
            return;
        }

        if success {
            inner.consecutive_failures = 0;
            return;
        }

        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.config.failure_threshold {
            inner.state = CircuitState::Open(Instant::now());
            warn!(
                backend = %self.backend,
                failures = inner.consecutive_failures,
                recovery_ms = self.config.recovery_timeout.as_millis() as u64,
                "Circuit opened"
            );
        }
    }
}

/// Admission to call a backend. Settle with `success` or `failure`;
/// dropping an unsettled permit counts as a failure.
#[derive(Debug)]
#[must_use = "an unsettled permit records a failure when dropped"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
        }
    }

    /// Whether this permit is the half-open probe.
    #[must_use]
    pub const fn is_probe(&self) -> bool {
        self.probe
    }

    /// Records a successful call.
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.settle(self.probe, true);
    }

    /// Records a failed call.
    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.settle(self.probe, false);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.settle(self.probe, false);
        }
    }
}
