//! Errors for query translation.

use thiserror::Error;

/// A type for translation errors. All of them are configuration or validation
/// problems, surfaced before anything is sent to the database.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("Entity '{0}' is not registered.")]
    EntityNotFound(String),
    #[error("Invalid primary property '{property}' set on '{entity}'.")]
    InvalidPrimaryProperty { entity: String, property: String },
    #[error("Invalid {side} property '{property}' set on relationship '{entity}.{relationship}'.")]
    InvalidRelationshipProperty {
        entity: String,
        relationship: String,
        side: &'static str,
        property: String,
    },
    #[error("You cannot query the same property more than once: '{0}'.")]
    DuplicateRelationship(String),
    #[error("You must supply exactly one of {expected} for '{field}'.")]
    InvalidFilter { field: String, expected: String },
    #[error("You cannot search like null, use equals or not equals ('{0}').")]
    LikeNull(String),
    #[error("'{field}' expects {expected}.")]
    InvalidFilterValue { field: String, expected: String },
    #[error("Invalid value for argument '{argument}': {message}.")]
    InvalidArgument { argument: String, message: String },
    #[error("Unknown field '{field}' in _orderBy of '{entity}'.")]
    UnknownOrderField { entity: String, field: String },
    #[error("Cannot order '{entity}' by the aggregate '{field}' unless an aggregate is read.")]
    AggregateOrderField { entity: String, field: String },
    #[error("No sibling found for '{0}'.")]
    MissingCountSibling(String),
    #[error("Multiple siblings found, '{0}' only works with one sibling.")]
    AmbiguousCountSibling(String),
}
