//! What the engine needs from the database driver.
//!
//! Connections are blocking. A connection is released when it is dropped, so
//! it goes back to its provider on every exit path of a request.

use indexmap::IndexMap;
use query_engine_sql::sql::string::SQL;

use crate::error::BackendError;

/// A result row, by column name.
pub type Row = IndexMap<String, serde_json::Value>;

/// One result set of a batch of statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    /// Build a result set from positional rows. Extra values in a row are dropped.
    pub fn from_values(columns: &[&str], rows: Vec<Vec<serde_json::Value>>) -> ResultSet {
        let columns: Vec<String> = columns.iter().map(ToString::to_string).collect();
        let rows = rows
            .into_iter()
            .map(|values| columns.iter().cloned().zip(values).collect())
            .collect();
        ResultSet { columns, rows }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column == name)
    }
}

/// The caller's request, as far as the connection provider is concerned.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub request_id: uuid::Uuid,
    /// The user the request runs on behalf of, if known.
    pub user: Option<String>,
}

impl RequestContext {
    pub fn new() -> RequestContext {
        RequestContext {
            request_id: uuid::Uuid::new_v4(),
            user: None,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> RequestContext {
        self.user = Some(user.into());
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

pub trait ConnectionProvider {
    type Connection: Connection;

    fn get_connection(&self, context: &RequestContext) -> Result<Self::Connection, BackendError>;
}

pub trait Connection {
    /// Run a query and read every result set it produces to completion.
    fn query(&mut self, query: &SQL) -> Result<Vec<ResultSet>, BackendError>;
}

impl<P: ConnectionProvider> ConnectionProvider for &P {
    type Connection = P::Connection;

    fn get_connection(&self, context: &RequestContext) -> Result<Self::Connection, BackendError> {
        (*self).get_connection(context)
    }
}
