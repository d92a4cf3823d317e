//! Query execution against a T-SQL database, and rebuilding objects from the rows.

pub mod connection;
pub mod error;
pub mod materialize;
pub mod metrics;
pub mod query;

pub use error::Error;
