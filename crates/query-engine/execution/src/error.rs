//! Errors raised while running a plan and building its objects.

use thiserror::Error;

/// Whatever a connection provider fails with.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to acquire a connection: {0}")]
    Connection(#[source] BackendError),
    #[error("Failed to execute sql {sql} using arguments {params} => {source}")]
    Backend {
        sql: String,
        /// The bound parameters as JSON.
        params: String,
        #[source]
        source: BackendError,
    },
    #[error(transparent)]
    Materialization(#[from] MaterializationError),
    #[error("Could not read '{entity}' objects: {source}")]
    Deserialize {
        entity: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("The count query returned no '{0}' column.")]
    MissingCount(String),
}

/// A value in a result row that cannot be assigned to its property.
#[derive(Debug, Error, PartialEq)]
#[error("Failed to set property '{property}' of '{entity}': {source}")]
pub struct MaterializationError {
    pub entity: String,
    pub property: String,
    #[source]
    pub source: ConversionError,
}

/// Why a column value does not fit its property.
#[derive(Debug, Error, PartialEq)]
pub enum ConversionError {
    #[error("{value} is not one of the {variants} variants")]
    UnknownDiscriminant {
        value: serde_json::Number,
        variants: usize,
    },
    #[error("'{0}' is not a variant")]
    UnknownVariant(String),
    #[error("expected a variant, found {0}")]
    NotAVariant(serde_json::Value),
    #[error("expected a bit, found {0}")]
    NotABit(serde_json::Value),
}
