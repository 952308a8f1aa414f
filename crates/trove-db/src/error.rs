//! Error types for archive operations.

use thiserror::Error;

/// Errors that can occur while saving or restoring an archive.
#[derive(Debug, Error)]
pub enum Error {
    /// Native DB error.
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The archived data could not be rebuilt into a store.
    #[error("Store error: {0}")]
    Store(#[from] trove_store::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<native_db::db_type::Error> for Error {
    fn from(err: native_db::db_type::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;
