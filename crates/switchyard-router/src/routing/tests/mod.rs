//! Router tests driven by scripted backends.

mod escalation_test;
mod strategy_test;

use super::config::{RouterConfig, RouterConfigLoader};
use super::router::Router;
use std::sync::Arc;
use switchyard_backends::ScriptedBackend;

/// Parses `toml` and builds a router over the given scripted backends.
pub(super) fn router_with(toml: &str, backends: &[&Arc<ScriptedBackend>]) -> Router {
    let config: RouterConfig = RouterConfigLoader::parse(toml).unwrap();
    backends
        .iter()
        .fold(Router::builder(config), |builder, backend| {
            let backend: Arc<ScriptedBackend> = Arc::clone(backend);
            builder.backend(backend)
        })
        .build()
        .unwrap()
}
