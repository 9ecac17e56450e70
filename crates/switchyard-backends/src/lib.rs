//! Backend implementations for Switchyard.
//!
//! This crate provides concrete implementations of the `Classifier` trait.
//!
//! # Supported Backends
//!
//! - **Rules**: Local regex rule engine, no network, always available
//! - **Http**: Remote inference service (zero-shot or fine-tuned model) over JSON
//! - **Scripted**: Deterministic playback for tests and demos

pub mod http;
pub mod rules;
pub mod scripted;

pub use http::HttpBackend;
pub use rules::{IntentRule, RulesBackend};
pub use scripted::ScriptedBackend;
