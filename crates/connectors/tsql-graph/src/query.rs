//! Plan and run read requests.

use tracing::info_span;

use query_engine_execution::connection::{ConnectionProvider, RequestContext};
use query_engine_execution::materialize::Object;
use query_engine_execution::metrics::Phase;
use query_engine_execution::query::{execute, execute_count};
use query_engine_translation::translation::query::{
    translate, translate_count, CountPlan, CountRequest, ExecutionPlan,
};
use query_engine_translation::translation::request::QueryRequest;

use crate::error::Error;
use crate::state::State;

/// Read the objects a request selects.
pub fn query<P: ConnectionProvider>(
    state: &State,
    provider: &P,
    context: &RequestContext,
    request: &QueryRequest,
) -> Result<Vec<Object>, Error> {
    let plan = plan_query(state, request)?;
    Ok(execute(provider, context, &state.metrics, &plan)?)
}

/// Count the objects the sibling of a count field would return.
pub fn count<P: ConnectionProvider>(
    state: &State,
    provider: &P,
    context: &RequestContext,
    request: &CountRequest,
) -> Result<u64, Error> {
    let plan = plan_count(state, request)?;
    Ok(execute_count(provider, context, &state.metrics, &plan)?)
}

pub fn plan_query(state: &State, request: &QueryRequest) -> Result<ExecutionPlan, Error> {
    info_span!("Plan query").in_scope(|| {
        let _timer = state.metrics.time_phase(Phase::Build);
        let plan = translate(&state.registry, request)?;
        let query = plan.query_sql();
        tracing::debug!(generated_sql = %query.sql, params = ?&query.params, "planned query");
        Ok(plan)
    })
}

pub fn plan_count(state: &State, request: &CountRequest) -> Result<CountPlan, Error> {
    info_span!("Plan query").in_scope(|| {
        let _timer = state.metrics.time_phase(Phase::Build);
        let plan = translate_count(&state.registry, request)?;
        let query = plan.query_sql();
        tracing::debug!(generated_sql = %query.sql, params = ?&query.params, "planned count");
        Ok(plan)
    })
}
