//! Resolve object-graph selections against a SQL Server database.

pub mod connector;
pub mod error;
pub mod explain;
pub mod query;
pub mod state;

pub use connector::{Resolver, ResolverSetup};
pub use error::Error;
