//! Execute an execution plan against the database.

use tracing::info_span;

use query_engine_sql::sql;
use query_engine_translation::translation::query::count::COUNT_COLUMN;
use query_engine_translation::translation::query::{CountPlan, ExecutionPlan};

use crate::connection::{Connection, ConnectionProvider, RequestContext, ResultSet};
use crate::error::Error;
use crate::materialize::{build_objects, Object};
use crate::metrics::{self, Phase};

/// Run a plan and build the objects of its root batch.
///
/// The connection is released before the objects are built, whether the
/// query succeeded or not.
pub fn execute<P: ConnectionProvider>(
    provider: &P,
    context: &RequestContext,
    metrics: &metrics::Metrics,
    plan: &ExecutionPlan,
) -> Result<Vec<Object>, Error> {
    let query = plan.query_sql();

    let result_sets = info_span!("Execute query", request_id = %context.request_id)
        .in_scope(|| {
            let _timer = metrics.time_phase(Phase::Execute);
            run(provider, context, &query)
        })
        .map_err(|error| {
            metrics.error_total.inc();
            error
        })?;

    let objects = info_span!("Build objects", request_id = %context.request_id)
        .in_scope(|| {
            let _timer = metrics.time_phase(Phase::Materialize);
            build_objects(&result_sets, &plan.root, plan.mode)
        })
        .map_err(|error| {
            metrics.error_total.inc();
            Error::from(error)
        })?;

    metrics.query_total.inc();
    Ok(objects)
}

/// Run a count plan and read the single number it returns.
pub fn execute_count<P: ConnectionProvider>(
    provider: &P,
    context: &RequestContext,
    metrics: &metrics::Metrics,
    plan: &CountPlan,
) -> Result<u64, Error> {
    let query = plan.query_sql();

    let result_sets = info_span!("Execute query", request_id = %context.request_id)
        .in_scope(|| {
            let _timer = metrics.time_phase(Phase::Execute);
            run(provider, context, &query)
        })
        .map_err(|error| {
            metrics.error_total.inc();
            error
        })?;

    // An empty result set counts nothing.
    let count = match result_sets.first().and_then(|result_set| result_set.rows.first()) {
        None => 0,
        Some(row) => row
            .get(COUNT_COLUMN)
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| {
                metrics.error_total.inc();
                Error::MissingCount(COUNT_COLUMN.to_string())
            })?,
    };

    metrics.count_total.inc();
    Ok(count)
}

/// Acquire a connection, run the query and read every result set.
fn run<P: ConnectionProvider>(
    provider: &P,
    context: &RequestContext,
    query: &sql::string::SQL,
) -> Result<Vec<ResultSet>, Error> {
    tracing::debug!(
        generated_sql = %query.sql,
        params = ?&query.params,
        "executing query"
    );

    let mut connection = provider
        .get_connection(context)
        .map_err(Error::Connection)?;

    connection.query(query).map_err(|source| {
        let params = serde_json::to_string(&query.params).unwrap_or_default();
        tracing::error!(sql = %query.sql, params = %params, error = %source, "query failed");
        Error::Backend {
            sql: query.sql.clone(),
            params,
            source,
        }
    })
}
