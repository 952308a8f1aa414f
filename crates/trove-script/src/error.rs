//! Error types for trove-script

use thiserror::Error;

/// Script loading error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("Duplicate definition: {0}")]
    DuplicateDefinition(String),

    #[error("Unresolved fixture label: {0}")]
    UnresolvedLabel(String),

    #[error("Link property {property} takes exactly one label, got {count}")]
    LinkArity { property: String, count: usize },

    #[error("Store error: {0}")]
    Store(#[from] trove_store::Error),
}

impl From<trove_core::Error> for Error {
    fn from(err: trove_core::Error) -> Self {
        Error::Store(err.into())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
