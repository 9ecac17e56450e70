//! Scripted backend for tests and demos.
//!
//! Plays back a fixed sequence of outcomes, one per call, repeating the last
//! outcome once the script runs out.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use switchyard_abstraction::{BackendError, BackendKind, ClassificationResult, Classifier, Complexity};

#[derive(Debug, Clone)]
struct Step {
    outcome: Result<ClassificationResult, BackendError>,
    delay: Duration,
}

/// A deterministic `Classifier` that replays scripted outcomes.
#[derive(Debug)]
pub struct ScriptedBackend {
    kind: BackendKind,
    steps: Vec<Step>,
    calls: AtomicUsize,
    healthy: AtomicBool,
}

impl ScriptedBackend {
    /// Creates an empty script for the given backend kind.
    #[must_use]
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            steps: Vec::new(),
            calls: AtomicUsize::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    /// Appends a successful outcome.
    #[must_use]
    pub fn respond(self, result: ClassificationResult) -> Self {
        self.push(Ok(result), Duration::ZERO)
    }

    /// Appends a successful outcome with the given intent and confidence.
    #[must_use]
    pub fn respond_with(self, intent: &str, confidence: f64) -> Self {
        self.respond(ClassificationResult::new(intent, confidence, Complexity::Simple))
    }

    /// Appends a successful outcome delivered after `delay`.
    #[must_use]
    pub fn respond_after(self, result: ClassificationResult, delay: Duration) -> Self {
        self.push(Ok(result), delay)
    }

    /// Appends a failing outcome.
    #[must_use]
    pub fn fail(self, error: BackendError) -> Self {
        self.push(Err(error), Duration::ZERO)
    }

    /// Appends a failing outcome delivered after `delay`.
    #[must_use]
    pub fn fail_after(self, error: BackendError, delay: Duration) -> Self {
        self.push(Err(error), delay)
    }

    fn push(mut self, outcome: Result<ClassificationResult, BackendError>, delay: Duration) -> Self {
        self.steps.push(Step { outcome, delay });
        self
    }

    /// Number of times `classify` has been invoked.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Sets the value reported by `health_check`.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl Classifier for ScriptedBackend {
    async fn classify(&self, _text: &str) -> Result<ClassificationResult, BackendError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(step) = self.steps.get(index).or_else(|| self.steps.last()) else {
            return Err(BackendError::Inference("no scripted outcome".to_string()));
        };
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.outcome.clone()
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }
}
