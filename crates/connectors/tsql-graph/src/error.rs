use thiserror::Error;

use query_engine_execution as execution;
use query_engine_translation::translation;

/// Everything that can go wrong while answering a request.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Translation(#[from] translation::error::Error),
    #[error("{0}")]
    Execution(#[from] execution::Error),
}

/// Errors raised while setting up a resolver.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("{0}")]
    ParseConfiguration(#[from] tsql_graph_configuration::error::ParseConfigurationError),
    #[error("{0}")]
    MakeRuntimeConfiguration(
        #[from] tsql_graph_configuration::error::MakeRuntimeConfigurationError,
    ),
    #[error("error initializing metrics: {0}")]
    MetricsError(#[from] prometheus::Error),
    #[error("unable to initialize connection pool: {0}")]
    UnableToCreateProvider(#[source] execution::error::BackendError),
}
