//! Translate a selection tree into the statements that read it.

pub mod aggregation;
pub mod aliases;
pub mod batch;
pub mod count;
pub mod fields;
pub mod filtering;
pub mod standard;
pub mod values;

use serde::{Deserialize, Serialize};

use query_engine_metadata::metadata::Registry;
use query_engine_sql::sql;

use super::error::Error;
use super::helpers::Env;
use super::request::{QueryRequest, Selection, Variables};
use batch::BatchItem;

/// How the statements of a plan relate to the batch tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One result set per statement, rows joined by keys.
    Standard,
    /// A single grouped result set ranked by `ROW_NUM`.
    Aggregation,
}

/// Definition of an execution plan to be run against the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    /// The batch tree, with aliases assigned, used to build objects from the rows.
    pub root: BatchItem,
    pub mode: Mode,
    pub statements: sql::ast::Statements,
}

impl ExecutionPlan {
    /// Extract the query component as SQL.
    pub fn query_sql(&self) -> sql::string::SQL {
        self.statements.query_sql()
    }
}

/// A request for the total number of objects a sibling list field would return.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountRequest {
    /// The entity of the sibling list.
    pub entity: String,
    /// The selection holding both the count field and its sibling.
    pub parent: Selection,
    pub count_field: String,
    #[serde(default)]
    pub variables: Variables,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountPlan {
    pub statement: sql::ast::Select,
}

impl CountPlan {
    pub fn query_sql(&self) -> sql::string::SQL {
        let mut sql = sql::string::SQL::new();
        self.statement.to_sql(&mut sql);
        sql
    }
}

/// Translate a request into an execution plan.
pub fn translate(registry: &Registry, request: &QueryRequest) -> Result<ExecutionPlan, Error> {
    let env = Env::new(registry, &request.variables);
    let entity = env.lookup_entity(&request.entity)?;
    let mut root = batch::build_batch(&env, &entity, &request.selection)?;

    let mode = if root.has_aggregation() {
        aggregation::strip_identifiers(&mut root);
        Mode::Aggregation
    } else {
        batch::reject_aggregate_order(&root)?;
        Mode::Standard
    };

    aliases::assign_aliases(&mut root)?;

    let statements = match mode {
        Mode::Standard => standard::build_statements(&root),
        Mode::Aggregation => sql::ast::Statements(vec![aggregation::build_select(&root)]),
    };

    tracing::debug!(
        entity = %request.entity,
        mode = ?mode,
        statements = statements.0.len(),
        "translated request"
    );

    Ok(ExecutionPlan {
        root,
        mode,
        statements,
    })
}

/// Translate a count field into a query counting what its one sibling list
/// would return, ignoring the sibling's window.
pub fn translate_count(registry: &Registry, request: &CountRequest) -> Result<CountPlan, Error> {
    let siblings: Vec<&Selection> = request
        .parent
        .selections
        .iter()
        .filter(|selection| !selection.name.eq_ignore_ascii_case(&request.count_field))
        .collect();
    let sibling = match siblings.as_slice() {
        [] => return Err(Error::MissingCountSibling(request.count_field.clone())),
        [sibling] => *sibling,
        _ => return Err(Error::AmbiguousCountSibling(request.count_field.clone())),
    };

    let mut selection = sibling.clone();
    selection
        .arguments
        .retain(|name, _| name != batch::OFFSET && name != batch::FETCH_COUNT);

    let env = Env::new(registry, &request.variables);
    let entity = env.lookup_entity(&request.entity)?;
    let mut root = batch::build_batch(&env, &entity, &selection)?;
    if root.has_aggregation() {
        aggregation::strip_identifiers(&mut root);
    } else {
        root.children.clear();
    }
    aliases::assign_aliases(&mut root)?;

    Ok(CountPlan {
        statement: count::build_count(&root),
    })
}
