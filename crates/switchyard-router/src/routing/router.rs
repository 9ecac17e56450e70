//! Decision engine: picks a backend per request and escalates on low confidence.

use super::ab_testing::{ABStrategy, ExperimentConfig, StrategyRegistry};
use super::circuit_breaker::CircuitState;
use super::client::BackendClient;
use super::config::{RouterConfig, RouterConfigLoader};
use super::metrics::{GroupStats, MetricsTracker, Percentiles};
use super::types::{LatencyTier, RoutingDecision, ThresholdTable, TierPolicy};
use crate::error::{Result, RoutingError};
use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchyard_abstraction::{BackendKind, ClassificationResult, Classifier};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Builder for [`Router`].
pub struct RouterBuilder {
    config: RouterConfig,
    backends: Vec<Arc<dyn Classifier>>,
    metrics: Option<Arc<MetricsTracker>>,
}

impl RouterBuilder {
    /// Registers a backend under its own `kind()`.
    #[must_use]
    pub fn backend(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.backends.push(classifier);
        self
    }

    /// Shares an existing metrics tracker instead of creating one.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<MetricsTracker>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validates the configuration and builds the router.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, no backend was
    /// registered, or two backends share a kind.
    pub fn build(self) -> Result<Router> {
        RouterConfigLoader::validate(&self.config)?;

        if self.backends.is_empty() {
            return Err(RoutingError::Configuration(
                "at least one backend must be registered".to_string(),
            ));
        }

        let metrics = self.metrics.unwrap_or_default();
        for kind in BackendKind::ALL {
            metrics.set_accuracy_estimate(kind, self.config.backend(kind).accuracy_estimate(kind))?;
        }
        let mut clients: [Option<BackendClient>; 3] = [None, None, None];
        for classifier in self.backends {
            let kind = classifier.kind();
            let slot = &mut clients[kind.index()];
            if slot.is_some() {
                return Err(RoutingError::Configuration(format!(
                    "backend {} registered more than once",
                    kind
                )));
            }
            let backend_config = self.config.backend(kind);
            debug!(backend = %kind, name = classifier.name(), "Registered backend");
            *slot = Some(BackendClient::new(
                classifier,
                backend_config.client_settings(kind),
                Arc::clone(&metrics),
            ));
        }

        let strategies = self.config.strategy_registry()?;
        let router = Router {
            clients,
            thresholds: ArcSwap::from_pointee(self.config.thresholds()),
            tiers: LatencyTier::ALL.map(|tier| self.config.tier_policy(tier)),
            experiment: self.config.experiment.clone(),
            strategies,
            max_attempts_per_request: self.config.max_attempts_per_request,
            metrics,
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
        };

        info!(
            backends = ?router.registered_backends(),
            experiment = router.experiment.enabled,
            "Router initialized"
        );
        Ok(router)
    }
}

/// Live view of one backend for operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendStatus {
    /// Whether a backend of this kind is registered.
    pub registered: bool,
    /// Breaker state name.
    pub circuit_state: String,
    /// Consecutive failures seen by the breaker.
    pub consecutive_failures: u32,
    /// Failed invocations so far.
    pub failures: u64,
    /// Current accuracy estimate.
    pub accuracy_estimate: f64,
    /// Current default acceptance threshold.
    pub confidence_threshold: f64,
    /// Latency used for budget decisions.
    pub expected_latency_ms: f64,
}

/// Aggregated routing statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingStats {
    /// Requests routed, successful or not.
    pub total_requests: u64,
    /// Requests that ended in an error.
    pub failed_requests: u64,
    /// Share of served results per backend, in percent.
    pub model_distribution: BTreeMap<BackendKind, f64>,
    /// Latency percentiles per backend.
    pub average_latencies: BTreeMap<BackendKind, Percentiles>,
    /// Aggregates per A/B group.
    pub ab_test_groups: BTreeMap<String, GroupStats>,
    /// Breaker and tuning view per backend.
    pub backends: BTreeMap<BackendKind, BackendStatus>,
}

/// A result that cleared or was kept past its backend's threshold check.
struct Selection {
    result: ClassificationResult,
    backend: BackendKind,
    threshold: f64,
    expected_latency_ms: f64,
}

/// Time left before escalating, when it cannot cover the next candidate.
struct BudgetShortfall {
    next: BackendKind,
    time_left_ms: f64,
    next_expected_ms: f64,
}

impl BudgetShortfall {
    fn reason(&self, kept: &Selection) -> String {
        format!(
            "budget exhausted: {:.0}ms left but {} expects {:.0}ms; keeping {} result at confidence {:.2}",
            self.time_left_ms, self.next, self.next_expected_ms, kept.backend, kept.result.confidence
        )
    }
}

/// Per-request bookkeeping.
struct RouteTrace {
    start: Instant,
    group: Option<String>,
    reasons: Vec<String>,
    attempted: Vec<BackendKind>,
}

/// Adaptive router over the registered backends.
#[derive(Debug)]
pub struct Router {
    /// Clients indexed by `BackendKind::index`.
    clients: [Option<BackendClient>; 3],
    metrics: Arc<MetricsTracker>,
    /// Replaced wholesale on update; each request reads one snapshot.
    thresholds: ArcSwap<ThresholdTable>,
    /// Policies indexed by `LatencyTier::index`.
    tiers: [TierPolicy; 3],
    experiment: ExperimentConfig,
    strategies: StrategyRegistry,
    max_attempts_per_request: u32,
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
}

impl Router {
    /// Starts building a router from configuration.
    #[must_use]
    pub fn builder(config: RouterConfig) -> RouterBuilder {
        RouterBuilder {
            config,
            backends: Vec::new(),
            metrics: None,
        }
    }

    fn client(&self, kind: BackendKind) -> Option<&BackendClient> {
        self.clients[kind.index()].as_ref()
    }

    /// Kinds with a registered backend, cheapest first.
    #[must_use]
    pub fn registered_backends(&self) -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|kind| self.client(*kind).is_some())
            .collect()
    }

    /// First candidate that is registered and admitted by its breaker.
    fn next_eligible(&self, candidates: &[BackendKind]) -> Option<BackendKind> {
        candidates
            .iter()
            .copied()
            .find(|kind| self.client(*kind).is_some_and(BackendClient::is_available))
    }

    /// Compares the time left against `next`'s expected latency.
    fn budget_shortfall(&self, next: BackendKind, budget_remaining: Duration, deadline: Instant) -> Option<BudgetShortfall> {
        let time_left = budget_remaining.min(deadline.saturating_duration_since(Instant::now()));
        let time_left_ms = time_left.as_secs_f64() * 1000.0;
        let next_expected_ms = self.client(next).map_or(0.0, BackendClient::expected_latency_ms);
        (time_left_ms < next_expected_ms).then_some(BudgetShortfall {
            next,
            time_left_ms,
            next_expected_ms,
        })
    }

    fn candidate_order(&self, policy: &TierPolicy, strategy: Option<&ABStrategy>, trace: &mut RouteTrace) -> Vec<BackendKind> {
        let mut order = Vec::with_capacity(policy.candidates.len() + 1);
        if let Some(strategy) = strategy {
            if let Some(forced) = strategy.forced_backend {
                trace
                    .reasons
                    .push(format!("forced {} first by strategy '{}'", forced, strategy.name));
                debug!(backend = %forced, strategy = %strategy.name, "Strategy forces backend");
                order.push(forced);
            }
        }
        for kind in &policy.candidates {
            if !order.contains(kind) {
                order.push(*kind);
            }
        }
        order
    }

    /// Classifies `text`, choosing and escalating between backends.
    ///
    /// Candidates are tried strictly in order. A result is accepted once its
    /// confidence reaches `max(threshold, min_confidence)`; otherwise the
    /// router escalates while the tier budget allows the next candidate's
    /// expected latency.
    ///
    /// # Errors
    /// `Configuration` for a `min_confidence` outside `[0, 1]`.
    /// `Exhausted` when every candidate failed or was skipped by an open
    /// circuit; `last` is the most recent failure, or the first circuit
    /// rejection if nothing was invoked. `NoEligibleBackend` when no
    /// candidate has a registered backend.
    pub async fn route_and_classify(
        &self,
        text: &str,
        tier: LatencyTier,
        min_confidence: f64,
        user_id: Option<&str>,
    ) -> Result<(ClassificationResult, RoutingDecision)> {
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(RoutingError::Configuration(format!(
                "min_confidence must be within [0, 1], got {}",
                min_confidence
            )));
        }
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let mut trace = RouteTrace {
            start: Instant::now(),
            group: self.experiment.resolve_group(user_id),
            reasons: Vec::new(),
            attempted: Vec::new(),
        };
        let policy = &self.tiers[tier.index()];
        let deadline = trace.start + policy.budget;
        // In-flight requests keep the thresholds they started with.
        let thresholds = **self.thresholds.load();

        let strategy = trace.group.as_deref().and_then(|group| self.strategies.get(group));
        if let Some(group) = &trace.group {
            trace.reasons.push(format!("A/B group '{}'", group));
        }
        let candidates = self.candidate_order(policy, strategy, &mut trace);
        debug!(tier = %tier, candidates = ?candidates, group = ?trace.group, "Routing request");

        let mut budget_remaining = policy.budget;
        let mut kept: Option<Selection> = None;
        let mut last_error: Option<RoutingError> = None;

        for (position, &kind) in candidates.iter().enumerate() {
            let Some(client) = self.client(kind) else {
                trace.reasons.push(format!("{} skipped: no backend registered", kind));
                debug!(backend = %kind, "Skipping unregistered backend");
                continue;
            };
            if !client.is_available() {
                trace.reasons.push(format!("{} skipped: circuit open", kind));
                debug!(backend = %kind, "Skipping backend with open circuit");
                if last_error.is_none() {
                    last_error = Some(RoutingError::CircuitOpen { backend: kind });
                }
                continue;
            }
            if trace.attempted.len() >= self.max_attempts_per_request as usize {
                trace.reasons.push(format!(
                    "{} skipped: attempt cap of {} reached",
                    kind, self.max_attempts_per_request
                ));
                break;
            }

            let until_deadline = deadline.saturating_duration_since(Instant::now());
            if until_deadline.is_zero() {
                trace.reasons.push(format!("deadline reached before {}", kind));
                break;
            }

            let base = thresholds.get(kind);
            let threshold = strategy.map_or(base, |s| s.threshold_for(kind, base)).max(min_confidence);
            let expected_latency_ms = client.expected_latency_ms();
            trace.attempted.push(kind);

            let call_start = Instant::now();
            match client.invoke(text, budget_remaining.min(until_deadline)).await {
                Ok(result) => {
                    let confidence = result.confidence;
                    let selection = Selection {
                        result,
                        backend: kind,
                        threshold,
                        expected_latency_ms,
                    };

                    if confidence >= threshold {
                        trace.reasons.push(format!(
                            "{} accepted: confidence {:.2} >= threshold {:.2}",
                            kind, confidence, threshold
                        ));
                        return Ok(self.finalize(trace, selection));
                    }

                    let Some(next) = self.next_eligible(&candidates[position + 1..]) else {
                        trace.reasons.push(format!(
                            "{} final: confidence {:.2} below threshold {:.2}, no further candidates",
                            kind, confidence, threshold
                        ));
                        return Ok(self.finalize(trace, selection));
                    };
                    if trace.attempted.len() >= self.max_attempts_per_request as usize {
                        trace.reasons.push(format!(
                            "{} final: attempt cap of {} reached before {}; keeping {} result at confidence {:.2}",
                            kind, self.max_attempts_per_request, next, kind, confidence
                        ));
                        return Ok(self.finalize(trace, selection));
                    }

                    budget_remaining = budget_remaining.saturating_sub(call_start.elapsed());
                    if let Some(shortfall) = self.budget_shortfall(next, budget_remaining, deadline) {
                        trace.reasons.push(shortfall.reason(&selection));
                        return Ok(self.finalize(trace, selection));
                    }

                    trace.reasons.push(format!(
                        "upgrade: {} confidence {:.2} below threshold {:.2}, escalating to {}",
                        kind, confidence, threshold, next
                    ));
                    debug!(backend = %kind, confidence, threshold, next = %next, "Escalating");
                    kept = Some(selection);
                }
                Err(e) => {
                    trace.reasons.push(format!("{} failed: {}", kind, e));
                    warn!(backend = %kind, error = %e, "Candidate failed");
                    last_error = Some(e);
                    if Instant::now() >= deadline {
                        trace.reasons.push("deadline reached".to_string());
                        break;
                    }
                    // A kept result is only given up for a candidate the time left can cover.
                    let next = if kept.is_some() && trace.attempted.len() < self.max_attempts_per_request as usize {
                        self.next_eligible(&candidates[position + 1..])
                    } else {
                        None
                    };
                    if let Some(shortfall) = next.and_then(|next| self.budget_shortfall(next, budget_remaining, deadline)) {
                        if let Some(selection) = kept.take() {
                            trace.reasons.push(shortfall.reason(&selection));
                            return Ok(self.finalize(trace, selection));
                        }
                    }
                }
            }
        }

        if let Some(selection) = kept {
            trace.reasons.push(format!(
                "final: keeping {} result after later candidates failed",
                selection.backend
            ));
            return Ok(self.finalize(trace, selection));
        }

        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        let error = match last_error {
            Some(last) => RoutingError::Exhausted {
                last: Box::new(last),
                reasons: trace.reasons,
            },
            None => RoutingError::NoEligibleBackend { reasons: trace.reasons },
        };
        warn!(tier = %tier, error = %error, "Routing failed");
        Err(error)
    }

    fn finalize(&self, trace: RouteTrace, selection: Selection) -> (ClassificationResult, RoutingDecision) {
        let actual_latency_ms = trace.start.elapsed().as_secs_f64() * 1000.0;
        self.metrics.record_result(selection.backend);
        if let Some(group) = &trace.group {
            self.metrics
                .record_group(group, actual_latency_ms, selection.result.confidence);
        }

        info!(
            backend = %selection.backend,
            confidence = selection.result.confidence,
            threshold = selection.threshold,
            latency_ms = actual_latency_ms,
            attempts = trace.attempted.len(),
            group = ?trace.group,
            "Routing decision"
        );

        let decision = RoutingDecision {
            selected_backend: selection.backend,
            confidence_threshold_used: selection.threshold,
            expected_latency_ms: selection.expected_latency_ms,
            actual_latency_ms,
            reasons: trace.reasons,
            ab_group: trace.group,
            attempted: trace.attempted,
        };
        (selection.result, decision)
    }

    /// Aggregated statistics across backends and A/B groups.
    #[must_use]
    pub fn get_routing_stats(&self) -> RoutingStats {
        let snapshot = self.metrics.snapshot();
        let thresholds = **self.thresholds.load();

        let mut model_distribution = BTreeMap::new();
        let mut average_latencies = BTreeMap::new();
        let mut backends = BTreeMap::new();
        for (kind, backend) in snapshot.backends {
            model_distribution.insert(kind, backend.share_percent);
            average_latencies.insert(kind, backend.latency);
            let client = self.client(kind);
            backends.insert(
                kind,
                BackendStatus {
                    registered: client.is_some(),
                    circuit_state: client
                        .map_or("unregistered", |c| c.circuit_state().as_str())
                        .to_string(),
                    consecutive_failures: client.map_or(0, BackendClient::consecutive_failures),
                    failures: backend.failures,
                    accuracy_estimate: backend.accuracy_estimate,
                    confidence_threshold: thresholds.get(kind),
                    expected_latency_ms: client.map_or(0.0, BackendClient::expected_latency_ms),
                },
            );
        }

        RoutingStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            model_distribution,
            average_latencies,
            ab_test_groups: snapshot.groups,
            backends,
        }
    }

    /// Replaces a backend's default threshold for subsequent requests.
    ///
    /// # Errors
    /// Returns `RoutingError::Configuration` if `value` is not in `[0, 1]`;
    /// the previous threshold is kept.
    pub fn update_confidence_threshold(&self, kind: BackendKind, value: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&value) {
            return Err(RoutingError::Configuration(format!(
                "confidence threshold for {} must be within [0, 1], got {}",
                kind, value
            )));
        }
        self.thresholds.rcu(|table| table.with(kind, value));
        info!(backend = %kind, threshold = value, "Updated confidence threshold");
        Ok(())
    }

    /// Replaces a backend's accuracy estimate.
    ///
    /// # Errors
    /// Returns `RoutingError::Configuration` if `value` is not in `[0, 1]`.
    pub fn update_accuracy_estimate(&self, kind: BackendKind, value: f64) -> Result<()> {
        self.metrics.set_accuracy_estimate(kind, value)
    }

    /// Current default threshold for a backend.
    #[must_use]
    pub fn confidence_threshold(&self, kind: BackendKind) -> f64 {
        self.thresholds.load().get(kind)
    }

    /// Breaker state of a registered backend.
    #[must_use]
    pub fn circuit_state(&self, kind: BackendKind) -> Option<CircuitState> {
        self.client(kind).map(BackendClient::circuit_state)
    }

    /// Cached health of every registered backend.
    pub async fn health(&self) -> BTreeMap<BackendKind, bool> {
        let mut health = BTreeMap::new();
        for client in self.clients.iter().flatten() {
            health.insert(client.kind(), client.health_check().await);
        }
        health
    }

    /// Shared metrics tracker.
    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsTracker> {
        &self.metrics
    }

    /// Strategy registry.
    #[must_use]
    pub const fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    /// Looks up a strategy by name.
    #[must_use]
    pub fn strategy(&self, name: &str) -> Option<&ABStrategy> {
        self.strategies.get(name)
    }

    /// Experiment settings.
    #[must_use]
    pub const fn experiment(&self) -> &ExperimentConfig {
        &self.experiment
    }

    /// Resolved policy for a tier.
    #[must_use]
    pub fn tier_policy(&self, tier: LatencyTier) -> &TierPolicy {
        &self.tiers[tier.index()]
    }
}
