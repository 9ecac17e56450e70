//! Backend abstraction layer for Switchyard.
//!
//! This module defines the core trait and types shared by every intent
//! classification backend, independent of how a backend computes its answer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The closed set of classification backends, ordered by ascending cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Local pattern-based rule engine (cheapest, fastest).
    Rules,
    /// Zero-shot transformer model (medium cost).
    ZeroShot,
    /// Fine-tuned classifier served remotely (most expensive).
    HeavyModel,
}

impl BackendKind {
    /// Every backend kind, cheapest first.
    pub const ALL: [BackendKind; 3] = [BackendKind::Rules, BackendKind::ZeroShot, BackendKind::HeavyModel];

    /// Stable snake_case name used in configuration and telemetry.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Rules => "rules",
            BackendKind::ZeroShot => "zero_shot",
            BackendKind::HeavyModel => "heavy_model",
        }
    }

    /// Position in [`BackendKind::ALL`], usable as a dense array index.
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            BackendKind::Rules => 0,
            BackendKind::ZeroShot => 1,
            BackendKind::HeavyModel => 2,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "rules" => Ok(BackendKind::Rules),
            "zero_shot" | "zeroshot" => Ok(BackendKind::ZeroShot),
            "heavy_model" | "heavy" => Ok(BackendKind::HeavyModel),
            other => Err(format!(
                "Unknown backend '{}'. Valid backends: rules, zero_shot, heavy_model",
                other
            )),
        }
    }
}

/// Coarse complexity bucket attached to every classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// Short, single-step request.
    Simple,
    /// Multi-part request with some structure.
    Moderate,
    /// Open-ended request that needs decomposition or reasoning.
    Complex,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Complexity::Simple => write!(f, "simple"),
            Complexity::Moderate => write!(f, "moderate"),
            Complexity::Complex => write!(f, "complex"),
        }
    }
}

/// The output of a single backend classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Detected intent label.
    pub intent: String,
    /// Backend confidence in `[0, 1]`.
    pub confidence: f64,
    /// Complexity bucket.
    pub complexity: Complexity,
    /// Suggested prompting techniques, most relevant first.
    #[serde(default)]
    pub techniques: Vec<String>,
    /// Backend-specific extra data.
    #[serde(default)]
    pub raw_metadata: HashMap<String, serde_json::Value>,
}

impl ClassificationResult {
    /// Creates a result with no techniques and no metadata.
    #[must_use]
    pub fn new(intent: impl Into<String>, confidence: f64, complexity: Complexity) -> Self {
        Self {
            intent: intent.into(),
            confidence,
            complexity,
            techniques: Vec::new(),
            raw_metadata: HashMap::new(),
        }
    }

    /// Sets the ordered technique list.
    #[must_use]
    pub fn with_techniques<I, S>(mut self, techniques: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.techniques = techniques.into_iter().map(Into::into).collect();
        self
    }

    /// Adds one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.raw_metadata.insert(key.into(), value);
        self
    }

    /// Checks that the result is usable by the router.
    ///
    /// # Errors
    /// Returns `BackendError::Inference` if the intent is empty or the
    /// confidence is not a finite value in `[0, 1]`.
    pub fn validate(&self) -> Result<(), BackendError> {
        if self.intent.trim().is_empty() {
            return Err(BackendError::Inference("empty intent label".to_string()));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(BackendError::Inference(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Represents an error raised by a backend invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendError {
    /// The backend could not be reached (network, refused connection, 5xx).
    #[error("Connection Error: {0}")]
    Connection(String),

    /// The backend did not answer in time.
    #[error("Timeout Error: {0}")]
    Timeout(String),

    /// The backend answered but the result was invalid or unusable.
    #[error("Inference Error: {0}")]
    Inference(String),
}

impl BackendError {
    /// Whether a fresh attempt could plausibly succeed.
    ///
    /// Only connection-class failures qualify; an inference failure is
    /// deterministic and a timeout has already consumed the budget.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Connection(_))
    }
}

/// A trait implemented by every classification backend.
///
/// All backends must be `Send + Sync` to allow concurrent use across tasks.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classifies the given text.
    ///
    /// # Errors
    /// Returns a `BackendError` if the backend is unreachable, times out, or
    /// produces an unusable result.
    async fn classify(&self, text: &str) -> Result<ClassificationResult, BackendError>;

    /// Reports whether the backend is currently able to serve requests.
    async fn health_check(&self) -> bool;

    /// Returns the backend kind this implementation serves.
    fn kind(&self) -> BackendKind;

    /// Human-readable name used in logs.
    fn name(&self) -> &str {
        self.kind().as_str()
    }
}
