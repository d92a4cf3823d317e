//! Transient state used by the resolver.
//!
//! This is initialized on startup.

use std::sync::Arc;

use tracing::info_span;

use query_engine_execution::metrics;
use query_engine_metadata::metadata::Registry;
use tsql_graph_configuration::Configuration;

use crate::error::SetupError;

/// State for our resolver.
#[derive(Debug, Clone)]
pub struct State {
    pub metrics: metrics::Metrics,
    /// The entity descriptors, shared by every request.
    pub registry: Arc<Registry>,
}

/// Register the metrics and the entity descriptors of a configuration.
pub fn create_state(
    configuration: &Configuration,
    metrics_registry: &mut prometheus::Registry,
) -> Result<State, SetupError> {
    let metrics = info_span!("Setup metrics")
        .in_scope(|| metrics::initialise_metrics(metrics_registry))?;

    let registry = Arc::new(Registry::from_metadata(&configuration.metadata));

    Ok(State { metrics, registry })
}
