//! Trove DB - archive layer using native_db
//!
//! Provides persistent storage for:
//! - Record type declarations and their id counters
//! - Live records of every type
//! - The committed version the archive was taken at

mod archive;
mod error;
mod models;
mod queries;

pub use archive::Archive;
pub use error::{Error, Result};
pub use models::{StoredMeta, StoredRecord, StoredRecordType};
