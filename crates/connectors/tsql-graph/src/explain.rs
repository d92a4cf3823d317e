//! Show the SQL a request compiles to, without running it.

use std::collections::BTreeMap;

use query_engine_translation::translation::request::QueryRequest;
use serde::Serialize;

use crate::error::Error;
use crate::query::plan_query;
use crate::state::State;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainResponse {
    pub details: BTreeMap<String, String>,
}

/// Explain a query by creating an execution plan.
pub fn explain(state: &State, request: &QueryRequest) -> Result<ExplainResponse, Error> {
    let plan = plan_query(state, request)?;
    let query = plan.query_sql();

    let pretty = sqlformat::format(
        &query.sql,
        &sqlformat::QueryParams::None,
        sqlformat::FormatOptions::default(),
    );

    let details = BTreeMap::from_iter([
        ("SQL Query".into(), pretty),
        ("Parameters".into(), query.declarations().join("\n")),
    ]);

    Ok(ExplainResponse { details })
}
