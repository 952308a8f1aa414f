//! Record models for database storage.

use crate::error::Result;
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};
use trove_core::{ObjectId, Record, ValueMap};

/// Stored record in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct StoredRecord {
    /// Primary key - type name and zero-padded id.
    #[primary_key]
    pub key: String,
    /// Record type name.
    #[secondary_key]
    pub type_name: String,
    /// Engine-assigned id.
    pub id: u64,
    /// Serialized property values.
    pub values: Vec<u8>,
}

impl StoredRecord {
    /// Primary key for a record of `type_name` with `id`.
    pub fn key_for(type_name: &str, id: u64) -> String {
        format!("{}#{:020}", type_name, id)
    }

    /// Create from a trove Record.
    pub fn from_record(record: &Record) -> Result<Self> {
        let values = bincode::serialize(&record.values)?;
        Ok(Self {
            key: Self::key_for(record.type_name.as_str(), record.id.raw()),
            type_name: record.type_name.as_str().to_string(),
            id: record.id.raw(),
            values,
        })
    }

    /// Convert to a trove Record.
    pub fn to_record(&self) -> Result<Record> {
        let values: ValueMap = bincode::deserialize(&self.values)?;
        Ok(Record::with_values(
            self.type_name.clone(),
            ObjectId::new(self.id),
            values,
        ))
    }
}
