//! Command implementations for the Switchyard CLI.

pub mod assign;
pub mod classify;
pub mod health;
pub mod validate_config;

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use switchyard_abstraction::BackendKind;
use switchyard_backends::{HttpBackend, RulesBackend};
use switchyard_router::{Router, RouterConfig, RouterConfigLoader};
use tracing::info;

/// Loads configuration from `path`, or the defaults when `None`.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<RouterConfig> {
    match path {
        Some(path) => RouterConfigLoader::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(RouterConfig::default()),
    }
}

/// Builds a router with the local rules engine plus every remote backend
/// that has a `url` configured.
pub fn build_router(path: Option<&Path>) -> anyhow::Result<Router> {
    let config = load_config(path)?;

    let mut builder = Router::builder(config.clone()).backend(Arc::new(
        RulesBackend::new().context("Failed to compile built-in intent rules")?,
    ));

    for kind in [BackendKind::ZeroShot, BackendKind::HeavyModel] {
        if let Some(url) = &config.backend(kind).url {
            let backend = HttpBackend::new(kind, url.as_str())
                .with_context(|| format!("Failed to create {} backend for {}", kind, url))?;
            info!(backend = %kind, url = %url, "Registered remote backend");
            builder = builder.backend(Arc::new(backend));
        }
    }

    builder.build().context("Failed to build router")
}
