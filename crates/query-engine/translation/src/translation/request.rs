//! The inbound request: a tree of selected fields with their arguments.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Bound request variables by name.
pub type Variables = BTreeMap<String, serde_json::Value>;

/// A selected field, its arguments and the fields selected below it.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Selection {
    pub name: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub arguments: IndexMap<String, InputValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selections: Vec<Selection>,
}

impl Selection {
    pub fn new(name: impl Into<String>) -> Selection {
        Selection {
            name: name.into(),
            ..Selection::default()
        }
    }

    /// Select a sub-field.
    #[must_use]
    pub fn field(mut self, selection: impl Into<Selection>) -> Selection {
        self.selections.push(selection.into());
        self
    }

    /// Add a literal argument.
    #[must_use]
    pub fn argument(mut self, name: impl Into<String>, value: serde_json::Value) -> Selection {
        self.arguments
            .insert(name.into(), InputValue::Literal(value));
        self
    }

    /// Add an argument bound to a request variable.
    #[must_use]
    pub fn variable_argument(
        mut self,
        name: impl Into<String>,
        variable: impl Into<String>,
    ) -> Selection {
        self.arguments.insert(
            name.into(),
            InputValue::Variable {
                variable: variable.into(),
            },
        );
        self
    }
}

impl From<&str> for Selection {
    fn from(name: &str) -> Selection {
        Selection::new(name)
    }
}

/// An argument value: either a literal or a reference to a request variable.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum InputValue {
    Variable {
        #[serde(rename = "$variable")]
        variable: String,
    },
    Literal(serde_json::Value),
}

impl InputValue {
    /// The literal value, looking variables up in the bindings. Unbound variables are null.
    pub fn resolve(&self, variables: &Variables) -> serde_json::Value {
        match self {
            InputValue::Literal(value) => value.clone(),
            InputValue::Variable { variable } => variables
                .get(variable)
                .cloned()
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

/// A request for the objects of one entity.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueryRequest {
    /// The entity the top-level field returns.
    pub entity: String,
    pub selection: Selection,
    #[serde(default)]
    pub variables: Variables,
}
