//! The resolver handed to a request pipeline: one call per field resolution.

use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{info_span, Instrument};

use query_engine_execution::connection::{ConnectionProvider, RequestContext};
use query_engine_execution::error::BackendError;
use query_engine_execution::materialize::{deserialize_objects, Object};
use query_engine_translation::translation::query::CountRequest;
use query_engine_translation::translation::request::{QueryRequest, Selection, Variables};
use tsql_graph_configuration as configuration;
use tsql_graph_configuration::environment::Environment;
use tsql_graph_configuration::values::PoolSettings;

use crate::error::{Error, SetupError};
use crate::explain::{self, ExplainResponse};
use crate::query;
use crate::state::{self, State};

/// Answers selections over the configured entities using connections from a provider.
pub struct Resolver<P> {
    configuration: Arc<configuration::Configuration>,
    state: Arc<State>,
    provider: P,
}

fn log_error(name: &str, error: &Error) {
    tracing::error!(
        meta.signal_type = "log",
        event.domain = "tsql-graph",
        event.name = name,
        name = name,
        body = %error,
        error = true,
    );
}

impl<P: ConnectionProvider> Resolver<P> {
    pub fn new(
        configuration: Arc<configuration::Configuration>,
        state: Arc<State>,
        provider: P,
    ) -> Self {
        Self {
            configuration,
            state,
            provider,
        }
    }

    pub fn configuration(&self) -> &configuration::Configuration {
        &self.configuration
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Read the objects of an entity a selection asks for.
    pub fn query(
        &self,
        context: &RequestContext,
        entity: &str,
        selection: &Selection,
        variables: &Variables,
    ) -> Result<Vec<Object>, Error> {
        let request = QueryRequest {
            entity: entity.to_string(),
            selection: selection.clone(),
            variables: variables.clone(),
        };
        query::query(&self.state, &self.provider, context, &request).map_err(|err| {
            log_error("Query error", &err);
            err
        })
    }

    /// As `query`, deserializing every object into `T`.
    pub fn query_as<T: DeserializeOwned>(
        &self,
        context: &RequestContext,
        entity: &str,
        selection: &Selection,
        variables: &Variables,
    ) -> Result<Vec<T>, Error> {
        let objects = self.query(context, entity, selection, variables)?;
        deserialize_objects(entity, objects)
            .map_err(Error::from)
            .map_err(|err| {
                log_error("Query error", &err);
                err
            })
    }

    /// The total behind a count field: how many objects its one sibling
    /// list would return without paging.
    pub fn count(
        &self,
        context: &RequestContext,
        entity: &str,
        parent: &Selection,
        count_field: &str,
        variables: &Variables,
    ) -> Result<u64, Error> {
        let request = CountRequest {
            entity: entity.to_string(),
            parent: parent.clone(),
            count_field: count_field.to_string(),
            variables: variables.clone(),
        };
        query::count(&self.state, &self.provider, context, &request).map_err(|err| {
            log_error("Count error", &err);
            err
        })
    }

    /// Explain a query by creating an execution plan.
    pub fn explain(
        &self,
        entity: &str,
        selection: &Selection,
        variables: &Variables,
    ) -> Result<ExplainResponse, Error> {
        let request = QueryRequest {
            entity: entity.to_string(),
            selection: selection.clone(),
            variables: variables.clone(),
        };
        explain::explain(&self.state, &request).map_err(|err| {
            log_error("Explain error", &err);
            err
        })
    }
}

/// Reads the configuration and builds resolvers.
pub struct ResolverSetup<Env: Environment> {
    environment: Env,
}

impl<Env: Environment> ResolverSetup<Env> {
    pub fn new(environment: Env) -> Self {
        Self { environment }
    }

    /// Validate the configuration directory and resolve its secrets.
    pub async fn parse_configuration(
        &self,
        configuration_dir: impl AsRef<Path>,
    ) -> Result<configuration::Configuration, SetupError> {
        // Validation errors are part of normal operation, so they are not logged here.
        let parsed_configuration = configuration::parse_configuration(configuration_dir)
            .instrument(info_span!("parse configuration"))
            .await?;

        Ok(configuration::make_runtime_configuration(
            parsed_configuration,
            &self.environment,
        )?)
    }

    /// Build a resolver over a parsed configuration, registering its metrics.
    /// `connect` creates the connection provider from the configured
    /// connection string and pool settings.
    pub fn try_init<P, F>(
        &self,
        configuration: configuration::Configuration,
        metrics: &mut prometheus::Registry,
        connect: F,
    ) -> Result<Resolver<P>, SetupError>
    where
        P: ConnectionProvider,
        F: FnOnce(&str, &PoolSettings) -> Result<P, BackendError>,
    {
        let initialise = || -> Result<(State, P), SetupError> {
            let state = info_span!("Initialise state")
                .in_scope(|| state::create_state(&configuration, metrics))?;
            let provider = info_span!("Create connection provider")
                .in_scope(|| connect(&configuration.connection_uri, &configuration.pool_settings))
                .map_err(SetupError::UnableToCreateProvider)?;
            Ok((state, provider))
        };
        let (state, provider) = initialise().map_err(|err| {
            tracing::error!(
                meta.signal_type = "log",
                event.domain = "tsql-graph",
                event.name = "Initialization error",
                name = "Initialization error",
                body = %err,
                error = true,
            );
            err
        })?;

        tracing::info!(
            max_connections = configuration.pool_settings.max_connections,
            "resolver initialised"
        );

        Ok(Resolver::new(
            Arc::new(configuration),
            Arc::new(state),
            provider,
        ))
    }
}
