//! Translate an incoming field selection to an execution plan (SQL) to be run against the database.

pub mod error;
pub mod helpers;
pub mod query;
pub mod request;
