//! Schema and bookkeeping models for database storage.

use crate::error::Result;
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};
use trove_core::RecordType;
use trove_store::TypeTable;

/// Stored record type declaration with its table counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 2, version = 1)]
#[native_db]
pub struct StoredRecordType {
    /// Primary key - type name.
    #[primary_key]
    pub name: String,
    /// Registration order.
    pub position: u32,
    /// Serialized declaration.
    pub declaration: Vec<u8>,
    /// Id high-water mark.
    pub next_id: u64,
    /// Lifetime tombstone count.
    pub tombstones: u64,
}

impl StoredRecordType {
    /// Create from a declaration and its table, if one exists yet.
    pub fn new(position: u32, record_type: &RecordType, table: Option<&TypeTable>) -> Result<Self> {
        Ok(Self {
            name: record_type.name.as_str().to_string(),
            position,
            declaration: bincode::serialize(record_type)?,
            next_id: table.map_or(0, TypeTable::next_id),
            tombstones: table.map_or(0, TypeTable::tombstones),
        })
    }

    /// Decode the declaration.
    pub fn to_record_type(&self) -> Result<RecordType> {
        Ok(bincode::deserialize(&self.declaration)?)
    }
}

/// Stored archive metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 3, version = 1)]
#[native_db]
pub struct StoredMeta {
    /// Always "meta" - single row.
    #[primary_key]
    pub id: String,
    /// Name of the store that was saved.
    pub store_name: String,
    /// Committed version of the saved snapshot.
    pub version: u64,
    /// Save time in milliseconds since the Unix epoch.
    pub saved_at: i64,
}

impl StoredMeta {
    /// Key of the single metadata row.
    pub const KEY: &'static str = "meta";

    /// Create metadata for a save happening now.
    pub fn new(store_name: &str, version: u64) -> Self {
        Self {
            id: Self::KEY.to_string(),
            store_name: store_name.to_string(),
            version,
            saved_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}
