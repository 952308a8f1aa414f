//! Common query patterns for the archive.

use crate::archive::Archive;
use crate::error::{Error, Result};
use crate::models::*;
use trove_core::Record;

impl Archive {
    /// Get all archived records of a specific type, in id order.
    pub fn records_by_type(&self, type_name: &str) -> Result<Vec<Record>> {
        let r = self.db.r_transaction()?;
        let scan = r
            .scan()
            .secondary::<StoredRecord>(StoredRecordKey::type_name)?;
        let iter = scan.start_with(type_name)?;
        let stored: std::result::Result<Vec<StoredRecord>, _> = iter.collect();
        let mut stored = stored.map_err(|e| Error::Database(e.to_string()))?;
        // start_with also matches longer names sharing the prefix
        stored.retain(|s| s.type_name == type_name);
        stored.sort_by_key(|s| s.id);
        stored.iter().map(StoredRecord::to_record).collect()
    }

    /// Count archived records of a specific type.
    pub fn count_records_by_type(&self, type_name: &str) -> Result<usize> {
        let r = self.db.r_transaction()?;
        let scan = r
            .scan()
            .secondary::<StoredRecord>(StoredRecordKey::type_name)?;
        let iter = scan.start_with(type_name)?;
        let mut count = 0;
        for stored in iter {
            let stored = stored.map_err(|e| Error::Database(e.to_string()))?;
            if stored.type_name == type_name {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Get all archived type declarations, in registration order.
    pub fn stored_types(&self) -> Result<Vec<StoredRecordType>> {
        let mut types: Vec<StoredRecordType> = self.all()?;
        types.sort_by_key(|t| t.position);
        Ok(types)
    }
}
