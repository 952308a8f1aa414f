//! Error types for trove-core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Schema conflict: type '{0}' is already registered with a different declaration")]
    SchemaConflict(String),

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Unknown property '{property}' on type '{type_name}'")]
    UnknownProperty { type_name: String, property: String },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Type mismatch for '{property}': expected {expected}, got {got}")]
    TypeMismatch {
        property: String,
        expected: String,
        got: String,
    },

    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),
}

impl Error {
    pub(crate) fn unknown_property(type_name: impl Into<String>, property: impl Into<String>) -> Self {
        Error::UnknownProperty {
            type_name: type_name.into(),
            property: property.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
