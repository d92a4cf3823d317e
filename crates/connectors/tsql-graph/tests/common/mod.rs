//! Common functions used across test cases.

use std::sync::{Arc, Mutex, PoisonError};

use query_engine_execution::connection::{
    Connection, ConnectionProvider, RequestContext, ResultSet,
};
use query_engine_execution::error::BackendError;
use query_engine_sql::sql::string::SQL;
use tsql_graph::{Resolver, ResolverSetup};
use tsql_graph_configuration::environment::FixedEnvironment;
use tsql_graph_configuration::DEFAULT_CONNECTION_URI_VARIABLE;

pub const CONFIGURATION_DIRECTORY: &str = "tests/configuration";

/// Hands out connections answering every query with the same result sets.
#[derive(Debug, Clone, Default)]
pub struct CannedDatabase {
    result_sets: Vec<ResultSet>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl CannedDatabase {
    pub fn new(result_sets: Vec<ResultSet>) -> Self {
        Self {
            result_sets,
            queries: Arc::default(),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ConnectionProvider for CannedDatabase {
    type Connection = CannedDatabase;

    fn get_connection(&self, _context: &RequestContext) -> Result<Self::Connection, BackendError> {
        Ok(self.clone())
    }
}

impl Connection for CannedDatabase {
    fn query(&mut self, query: &SQL) -> Result<Vec<ResultSet>, BackendError> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.sql.clone());
        Ok(self.result_sets.clone())
    }
}

pub fn environment() -> FixedEnvironment {
    FixedEnvironment::from([(
        DEFAULT_CONNECTION_URI_VARIABLE.into(),
        "Server=localhost;Database=todo".to_string(),
    )])
}

/// A resolver over the test configuration, answering from the given result sets.
pub async fn resolver(result_sets: Vec<ResultSet>) -> Resolver<CannedDatabase> {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = ResolverSetup::new(environment());
    let configuration = setup
        .parse_configuration(CONFIGURATION_DIRECTORY)
        .await
        .unwrap();
    setup
        .try_init(configuration, &mut prometheus::Registry::new(), |_, _| {
            Ok(CannedDatabase::new(result_sets))
        })
        .unwrap()
}
