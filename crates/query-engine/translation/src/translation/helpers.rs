//! Helpers for processing the request and building SQL.

use std::sync::Arc;

use query_engine_metadata::metadata::{EntityDescriptor, Registry};

use super::error::Error;
use super::request::{InputValue, Variables};

/// Static information from the request and metadata.
pub struct Env<'a> {
    registry: &'a Registry,
    variables: &'a Variables,
}

impl<'a> Env<'a> {
    /// Create a new Env by supplying the registry and the request variables.
    pub fn new(registry: &'a Registry, variables: &'a Variables) -> Env<'a> {
        Env {
            registry,
            variables,
        }
    }

    /// Lookup an entity's descriptor in the registry.
    pub fn lookup_entity(&self, name: &str) -> Result<Arc<EntityDescriptor>, Error> {
        self.registry
            .lookup(name)
            .ok_or_else(|| Error::EntityNotFound(name.to_string()))
    }

    /// Resolve an argument against the request variables.
    pub fn resolve(&self, value: &InputValue) -> serde_json::Value {
        value.resolve(self.variables)
    }
}
