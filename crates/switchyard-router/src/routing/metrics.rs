//! Metrics tracker for per-backend latency, volume and A/B group statistics.

use crate::error::{Result, RoutingError};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use switchyard_abstraction::BackendKind;
use tracing::debug;

/// Default number of latency samples kept per backend.
pub const DEFAULT_LATENCY_WINDOW: usize = 1000;

/// Latency percentiles in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Percentiles {
    /// Median latency.
    pub p50: f64,
    /// 95th percentile latency.
    pub p95: f64,
    /// 99th percentile latency.
    pub p99: f64,
}

impl Percentiles {
    /// Computes nearest-rank percentiles over a sample set.
    ///
    /// Returns all zeros for an empty sample set.
    #[must_use]
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        Self {
            p50: nearest_rank(&sorted, 50.0),
            p95: nearest_rank(&sorted, 95.0),
            p99: nearest_rank(&sorted, 99.0),
        }
    }
}

fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Metrics for a single backend.
#[derive(Debug)]
struct BackendMetrics {
    /// Results served to callers.
    total_requests: AtomicU64,
    /// Failed invocations.
    failures: AtomicU64,
    /// Rolling latency window, oldest first.
    latencies: Mutex<VecDeque<f64>>,
    /// Accuracy estimate stored as `f64` bits.
    accuracy_bits: AtomicU64,
}

impl BackendMetrics {
    fn new(window: usize, accuracy: f64) -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            latencies: Mutex::new(VecDeque::with_capacity(window)),
            accuracy_bits: AtomicU64::new(accuracy.to_bits()),
        }
    }

    fn latencies(&self) -> MutexGuard<'_, VecDeque<f64>> {
        self.latencies.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Default)]
struct GroupAccumulator {
    count: u64,
    latency_sum_ms: f64,
    confidence_sum: f64,
}

/// Aggregates for one A/B group.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupStats {
    /// Requests served in this group.
    pub count: u64,
    /// Mean end-to-end latency in milliseconds.
    pub avg_latency: f64,
    /// Mean confidence of returned results.
    pub avg_confidence: f64,
}

/// Point-in-time view of one backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendSnapshot {
    /// Results served by this backend.
    pub requests: u64,
    /// Failed invocations.
    pub failures: u64,
    /// Share of all served results (0-100).
    pub share_percent: f64,
    /// Latency percentiles over the current window.
    pub latency: Percentiles,
    /// Samples in the current window.
    pub samples: usize,
    /// Accuracy estimate in `[0, 1]`.
    pub accuracy_estimate: f64,
}

/// Point-in-time view across all backends and groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Results served across all backends.
    pub total_requests: u64,
    /// Per-backend view.
    pub backends: BTreeMap<BackendKind, BackendSnapshot>,
    /// Per-A/B-group aggregates.
    pub groups: BTreeMap<String, GroupStats>,
}

/// Metrics tracker shared by the router and every backend client.
#[derive(Debug)]
pub struct MetricsTracker {
    /// Per-backend metrics, indexed by `BackendKind::index`.
    backends: [BackendMetrics; 3],
    /// Per-group aggregates.
    groups: Mutex<HashMap<String, GroupAccumulator>>,
    /// Maximum latency samples per backend.
    window: usize,
}

impl MetricsTracker {
    /// Creates a tracker with the default window and neutral accuracy estimates.
    #[must_use]
    pub fn new() -> Self {
        Self::with_window(DEFAULT_LATENCY_WINDOW)
    }

    /// Creates a tracker with a custom latency window.
    #[must_use]
    pub fn with_window(window: usize) -> Self {
        let window = window.max(1);
        Self {
            backends: BackendKind::ALL.map(|_| BackendMetrics::new(window, 0.5)),
            groups: Mutex::new(HashMap::new()),
            window,
        }
    }

    fn backend(&self, kind: BackendKind) -> &BackendMetrics {
        &self.backends[kind.index()]
    }

    /// Appends a latency sample, evicting the oldest one on overflow.
    pub fn record_latency(&self, kind: BackendKind, millis: f64) {
        let mut latencies = self.backend(kind).latencies();
        if latencies.len() == self.window {
            latencies.pop_front();
        }
        latencies.push_back(millis);
    }

    /// Latency percentiles over the current window.
    #[must_use]
    pub fn percentiles(&self, kind: BackendKind) -> Percentiles {
        // Copy under the lock, sort outside it.
        let samples: Vec<f64> = self.backend(kind).latencies().iter().copied().collect();
        Percentiles::from_samples(&samples)
    }

    /// Number of samples in the current window.
    #[must_use]
    pub fn sample_count(&self, kind: BackendKind) -> usize {
        self.backend(kind).latencies().len()
    }

    /// Counts a result served by the backend.
    pub fn record_result(&self, kind: BackendKind) {
        self.backend(kind).total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a failed invocation of the backend.
    pub fn record_failure(&self, kind: BackendKind) {
        self.backend(kind).failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Results served by the backend so far.
    #[must_use]
    pub fn total_requests(&self, kind: BackendKind) -> u64 {
        self.backend(kind).total_requests.load(Ordering::Relaxed)
    }

    /// Failed invocations of the backend so far.
    #[must_use]
    pub fn failures(&self, kind: BackendKind) -> u64 {
        self.backend(kind).failures.load(Ordering::Relaxed)
    }

    /// Current accuracy estimate for the backend.
    #[must_use]
    pub fn accuracy_estimate(&self, kind: BackendKind) -> f64 {
        f64::from_bits(self.backend(kind).accuracy_bits.load(Ordering::Relaxed))
    }

    /// Replaces the accuracy estimate for the backend.
    ///
    /// # Errors
    /// Returns `RoutingError::Configuration` if `value` is not in `[0, 1]`;
    /// the previous estimate is kept.
    pub fn set_accuracy_estimate(&self, kind: BackendKind, value: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&value) {
            return Err(RoutingError::Configuration(format!(
                "accuracy estimate for {} must be within [0, 1], got {}",
                kind, value
            )));
        }
        self.backend(kind).accuracy_bits.store(value.to_bits(), Ordering::Relaxed);
        debug!(backend = %kind, accuracy = value, "Updated accuracy estimate");
        Ok(())
    }

    /// Adds one served request to an A/B group's aggregates.
    pub fn record_group(&self, group: &str, latency_ms: f64, confidence: f64) {
        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = groups.entry(group.to_string()).or_default();
        entry.count += 1;
        entry.latency_sum_ms += latency_ms;
        entry.confidence_sum += confidence;
    }

    /// Aggregated view of all backends and groups.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_requests: u64 = BackendKind::ALL.iter().map(|k| self.total_requests(*k)).sum();

        let backends = BackendKind::ALL
            .iter()
            .map(|&kind| {
                let requests = self.total_requests(kind);
                let share_percent = if total_requests == 0 {
                    0.0
                } else {
                    requests as f64 * 100.0 / total_requests as f64
                };
                let samples: Vec<f64> = self.backend(kind).latencies().iter().copied().collect();
                let snapshot = BackendSnapshot {
                    requests,
                    failures: self.failures(kind),
                    share_percent,
                    latency: Percentiles::from_samples(&samples),
                    samples: samples.len(),
                    accuracy_estimate: self.accuracy_estimate(kind),
                };
                (kind, snapshot)
            })
            .collect();

        let groups = {
            let groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
            groups.clone()
        };
        let groups = groups
            .into_iter()
            .map(|(name, acc)| {
                let count = acc.count.max(1) as f64;
                let stats = GroupStats {
                    count: acc.count,
                    avg_latency: acc.latency_sum_ms / count,
                    avg_confidence: acc.confidence_sum / count,
                };
                (name, stats)
            })
            .collect();

        MetricsSnapshot {
            total_requests,
            backends,
            groups,
        }
    }

    /// Clears counters, latency windows and group aggregates.
    ///
    /// Accuracy estimates are configuration, not observations, and are kept.
    pub fn reset(&self) {
        for metrics in &self.backends {
            metrics.total_requests.store(0, Ordering::Relaxed);
            metrics.failures.store(0, Ordering::Relaxed);
            metrics.latencies().clear();
        }
        self.groups.lock().unwrap_or_else(PoisonError::into_inner).clear();
        debug!("Reset routing metrics");
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}
