//! Per-type record storage
//!
//! A [`TypeTable`] holds the live records of one record type in allocation
//! order, the type's id high-water mark, its tombstone count and its
//! indexes. Tables are immutable once published in a snapshot; a
//! transaction copies a table on its first write to it.

use crate::error::{Error, Result};
use crate::index::{IndexKey, IndexSet};
use std::collections::BTreeMap;
use std::sync::Arc;
use trove_core::{ObjectId, ObjectRef, Record, RecordType, RecordTypeHandle, Value, ValueMap};

/// Storage for all records of one type
#[derive(Debug, Clone)]
pub struct TypeTable {
    record_type: RecordTypeHandle,
    records: BTreeMap<ObjectId, Arc<Record>>,
    next_id: u64,
    tombstones: u64,
    indexes: IndexSet,
}

impl TypeTable {
    /// Create an empty table
    pub fn new(record_type: RecordTypeHandle) -> Self {
        let indexes = IndexSet::for_type(&record_type);
        Self {
            record_type,
            records: BTreeMap::new(),
            next_id: 0,
            tombstones: 0,
            indexes,
        }
    }

    /// Rebuild a table from archived parts
    ///
    /// The high-water mark is raised past the largest restored id so ids are
    /// never handed out twice.
    pub fn restore(
        record_type: RecordTypeHandle,
        next_id: u64,
        tombstones: u64,
        records: impl IntoIterator<Item = Record>,
    ) -> Result<Self> {
        let mut table = Self::new(record_type);
        table.next_id = next_id;
        table.tombstones = tombstones;
        for record in records {
            let values = table.record_type.normalize(record.values)?;
            table.next_id = table.next_id.max(record.id.raw() + 1);
            table.put(record.id, values)?;
        }
        Ok(table)
    }

    /// The record type stored in this table
    pub fn record_type(&self) -> &RecordTypeHandle {
        &self.record_type
    }

    /// Reserve a fresh id
    pub fn allocate(&mut self) -> ObjectId {
        let id = ObjectId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Look up a live record
    pub fn get(&self, id: ObjectId) -> Option<&Arc<Record>> {
        self.records.get(&id)
    }

    /// Check whether a live record has this id
    pub fn contains(&self, id: ObjectId) -> bool {
        self.records.contains_key(&id)
    }

    /// Write a record's full, already validated value set
    ///
    /// Index maintenance runs first; a key collision leaves the table and
    /// its indexes unchanged. Returns the previous version of the record.
    pub fn put(&mut self, id: ObjectId, values: ValueMap) -> Result<Option<Arc<Record>>> {
        if id.raw() >= self.next_id {
            return Err(Error::NotFound(
                ObjectRef::new(self.record_type.name.clone(), id).to_string(),
            ));
        }
        match self.records.get(&id) {
            Some(old) => self.indexes.on_update(id, &old.values, &values)?,
            None => self.indexes.on_insert(id, &values)?,
        }
        let record = Record::with_values(self.record_type.name.clone(), id, values);
        Ok(self.records.insert(id, Arc::new(record)))
    }

    /// Remove a record, leaving a tombstone
    pub fn delete(&mut self, id: ObjectId) -> Option<Arc<Record>> {
        let old = self.records.remove(&id)?;
        self.indexes.on_delete(id, &old.values);
        self.tombstones += 1;
        Some(old)
    }

    /// Find the record holding a primary-key value
    pub fn lookup_by_key(&self, key: &Value) -> Option<&Arc<Record>> {
        self.indexes
            .lookup_by_key(key)
            .and_then(|id| self.records.get(&id))
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if there are no live records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Live records in allocation order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.records.values()
    }

    /// Live record ids in allocation order
    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.records.keys().copied()
    }

    /// The next id `allocate` will return
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Number of records deleted over the table's lifetime
    pub fn tombstones(&self) -> u64 {
        self.tombstones
    }

    /// The table's indexes
    pub fn indexes(&self) -> &IndexSet {
        &self.indexes
    }

    /// Verify that no two live records share a primary-key value
    pub fn validate_keys(&self) -> Result<()> {
        let Some(property) = self.indexes.primary_property() else {
            return Ok(());
        };
        if self.indexes.primary_len() == self.records.len() {
            return Ok(());
        }
        let mut seen = BTreeMap::new();
        for record in self.records.values() {
            let key = IndexKey(record.get_or_null(property).clone());
            if seen.insert(key.clone(), record.id).is_some() {
                return Err(Error::DuplicateKey {
                    type_name: self.record_type.name.to_string(),
                    property: property.to_string(),
                    key: key.0.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Everything needed to rebuild a table, as read back from an archive
#[derive(Debug, Clone)]
pub struct TableImage {
    /// Declaration of the stored type
    pub record_type: RecordType,
    /// Id high-water mark
    pub next_id: u64,
    /// Lifetime tombstone count
    pub tombstones: u64,
    /// Live records
    pub records: Vec<Record>,
}
