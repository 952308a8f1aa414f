//! Error types for trove-store

use thiserror::Error;

/// Result type for trove-store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in trove-store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Schema, value or predicate error from trove-core
    #[error("core error: {0}")]
    Core(#[from] trove_core::Error),

    /// A second live record would hold the same primary-key value
    ///
    /// The write is rejected before any change and the enclosing
    /// transaction is aborted.
    #[error("duplicate key {key} for {type_name}.{property}")]
    DuplicateKey {
        type_name: String,
        property: String,
        key: String,
    },

    /// A record that must exist does not
    #[error("record {0} not found")]
    NotFound(String),

    /// Another transaction holds the writer slot
    #[error("a write transaction is already in progress on store '{0}'")]
    WriteInProgress(String),

    /// A link was assigned a record of the wrong type
    #[error("relationship '{property}' expects {expected}, got {got}")]
    RelationshipTypeMismatch {
        property: String,
        expected: String,
        got: String,
    },

    /// A relationship operation was used on a property that is not a link
    #[error("property '{0}' is not a relationship")]
    NotARelationship(String),

    /// A list operation was used on a property that is not a list
    #[error("property '{0}' is not a list")]
    NotAList(String),

    /// List position past the end
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// The transaction was aborted by an earlier failure
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    /// Store configuration could not be loaded
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Check whether this is a primary-key violation
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Error::DuplicateKey { .. })
    }

    /// Check whether this is writer-slot contention
    pub fn is_write_in_progress(&self) -> bool {
        matches!(self, Error::WriteInProgress(_))
    }

    /// Get the core error, if this wraps one
    pub fn core(&self) -> Option<&trove_core::Error> {
        match self {
            Error::Core(e) => Some(e),
            _ => None,
        }
    }
}

// Compile-time check that Error is Send + Sync for thread-safe error propagation.
fn _assert_error_send_sync<T: Send + Sync>() {}
fn _error_is_send_sync() {
    _assert_error_send_sync::<Error>();
}
