//! A to-do model and an in-memory database to run plans against.

use std::sync::{Arc, Mutex, PoisonError};

use query_engine_execution::connection::{
    Connection, ConnectionProvider, RequestContext, ResultSet,
};
use query_engine_execution::error::BackendError;
use query_engine_execution::metrics::{initialise_metrics, Metrics};
use query_engine_metadata::metadata::{
    Cardinality, EntityDescriptor, FieldDescriptor, JoinTable, Registry, RelationshipDescriptor,
    ValueType,
};
use query_engine_sql::sql::string::SQL;
use query_engine_translation::translation::query::{translate, ExecutionPlan};
use query_engine_translation::translation::request::{QueryRequest, Selection, Variables};

fn relationship(property: &str, target: &str, local: &str, foreign: &str) -> RelationshipDescriptor {
    RelationshipDescriptor {
        property: property.to_string(),
        target: target.to_string(),
        cardinality: Cardinality::Many,
        local_property: local.to_string(),
        foreign_property: foreign.to_string(),
        join_table: None,
    }
}

fn entity(name: &str, fields: Vec<FieldDescriptor>, relationships: Vec<RelationshipDescriptor>) -> EntityDescriptor {
    EntityDescriptor {
        name: name.to_string(),
        table: name.to_string(),
        primary_property: "Id".to_string(),
        default_order: "Id".to_string(),
        extra_criteria: None,
        fields,
        relationships,
    }
}

pub fn registry() -> Registry {
    let _ = env_logger::builder().is_test(true).try_init();

    let registry = Registry::new();
    registry.insert(entity(
        "ToDo",
        vec![
            FieldDescriptor::new("Id", ValueType::Guid),
            FieldDescriptor::new("Text", ValueType::String),
            FieldDescriptor::new("Completed", ValueType::Bool),
            FieldDescriptor::new("Priority", ValueType::Enum)
                .with_enum_variants(["Low", "Medium", "High"]),
            FieldDescriptor::new("OwnerId", ValueType::Guid),
        ],
        vec![
            relationship("Tags", "Tag", "Id", "ToDoId"),
            RelationshipDescriptor {
                join_table: Some(JoinTable {
                    table: "ToDoLabel".to_string(),
                    local_join_column: "ToDoId".to_string(),
                    foreign_join_column: "LabelId".to_string(),
                }),
                ..relationship("Labels", "Label", "Id", "Id")
            },
            RelationshipDescriptor {
                cardinality: Cardinality::One,
                ..relationship("Owner", "User", "OwnerId", "Id")
            },
        ],
    ));
    registry.insert(entity(
        "Tag",
        vec![
            FieldDescriptor::new("Id", ValueType::Int),
            FieldDescriptor::new("Name", ValueType::String),
            FieldDescriptor::new("ToDoId", ValueType::Guid),
        ],
        vec![],
    ));
    registry.insert(entity(
        "Label",
        vec![
            FieldDescriptor::new("Id", ValueType::Int),
            FieldDescriptor::new("Title", ValueType::String),
        ],
        vec![],
    ));
    registry.insert(entity(
        "User",
        vec![
            FieldDescriptor::new("Id", ValueType::Guid),
            FieldDescriptor::new("Name", ValueType::String),
        ],
        vec![relationship("ToDos", "ToDo", "Id", "OwnerId")],
    ));
    registry
}

pub fn plan(selection: Selection) -> ExecutionPlan {
    let request = QueryRequest {
        entity: "ToDo".to_string(),
        selection,
        variables: Variables::new(),
    };
    translate(&registry(), &request).unwrap()
}

pub fn metrics() -> Metrics {
    initialise_metrics(&mut prometheus::Registry::new()).unwrap()
}

#[derive(Debug, Default)]
struct State {
    result_sets: Vec<ResultSet>,
    failure: Option<String>,
    open_connections: usize,
    queries: Vec<String>,
}

/// Answers every query with the same result sets, or with the same failure.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
}

impl MemoryDatabase {
    pub fn new(result_sets: Vec<ResultSet>) -> MemoryDatabase {
        MemoryDatabase {
            state: Arc::new(Mutex::new(State {
                result_sets,
                ..State::default()
            })),
        }
    }

    pub fn failing(message: &str) -> MemoryDatabase {
        MemoryDatabase {
            state: Arc::new(Mutex::new(State {
                failure: Some(message.to_string()),
                ..State::default()
            })),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn open_connections(&self) -> usize {
        self.with_state(|state| state.open_connections)
    }

    pub fn queries(&self) -> Vec<String> {
        self.with_state(|state| state.queries.clone())
    }
}

pub struct MemoryConnection {
    database: MemoryDatabase,
}

impl ConnectionProvider for MemoryDatabase {
    type Connection = MemoryConnection;

    fn get_connection(&self, _context: &RequestContext) -> Result<MemoryConnection, BackendError> {
        self.with_state(|state| state.open_connections += 1);
        Ok(MemoryConnection {
            database: self.clone(),
        })
    }
}

impl Connection for MemoryConnection {
    fn query(&mut self, query: &SQL) -> Result<Vec<ResultSet>, BackendError> {
        self.database.with_state(|state| {
            state.queries.push(query.sql.clone());
            match &state.failure {
                Some(message) => Err(message.clone().into()),
                None => Ok(state.result_sets.clone()),
            }
        })
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.database
            .with_state(|state| state.open_connections -= 1);
    }
}
