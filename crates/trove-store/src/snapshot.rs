//! Snapshot - immutable view of committed state
//!
//! A snapshot is a version number plus `Arc`-shared type tables. Taking one
//! is an `Arc` clone; it never changes afterwards, no matter what later
//! transactions commit. Transactions expose their uncommitted working state
//! through the same [`ReadView`] trait, so relationship resolution and
//! queries work identically on both.

use crate::error::{Error, Result};
use crate::results::ResultSet;
use crate::table::TypeTable;
use indexmap::IndexMap;
use std::sync::Arc;
use trove_core::{LinkResolver, ObjectRef, Record, SchemaRegistry, TypeName, Value};

/// Type tables keyed by type name
pub(crate) type Tables = IndexMap<TypeName, Arc<TypeTable>>;

/// Read access shared by snapshots and transactions
pub trait ReadView: LinkResolver {
    /// The schema registry of the owning store
    fn registry(&self) -> &SchemaRegistry;

    /// The table for a type; `None` if nothing was ever stored for it
    fn table(&self, type_name: &str) -> Option<&TypeTable>;

    /// Committed version this view is based on
    fn version(&self) -> u64;

    /// Look up a record by handle
    fn get(&self, object: &ObjectRef) -> Option<Arc<Record>> {
        self.table(object.type_name.as_str())
            .and_then(|t| t.get(object.id))
            .cloned()
    }

    /// Number of live records of a type
    fn count(&self, type_name: &str) -> usize {
        self.table(type_name).map(TypeTable::len).unwrap_or(0)
    }

    /// Find the record of `type_name` whose primary key equals `key`
    fn object_for_primary_key(&self, type_name: &str, key: &Value) -> Result<Option<Arc<Record>>> {
        let record_type = self.registry().resolve(type_name)?;
        if record_type.primary_key.is_none() {
            return Err(Error::Core(trove_core::Error::InvalidSchema(format!(
                "{} has no primary key",
                type_name
            ))));
        }
        Ok(self
            .table(type_name)
            .and_then(|t| t.lookup_by_key(key))
            .cloned())
    }
}

/// An immutable view of the store at one committed version
///
/// `Snapshot` is `Send + Sync` and cheap to clone.
#[derive(Debug, Clone)]
pub struct Snapshot {
    version: u64,
    tables: Arc<Tables>,
    registry: Arc<SchemaRegistry>,
}

impl Snapshot {
    pub(crate) fn new(version: u64, tables: Arc<Tables>, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            version,
            tables,
            registry,
        }
    }

    pub(crate) fn empty(registry: Arc<SchemaRegistry>) -> Self {
        Self::new(0, Arc::new(Tables::new()), registry)
    }

    /// All live records of a type, in allocation order
    pub fn objects(&self, type_name: &str) -> Result<ResultSet> {
        ResultSet::new(self.clone(), type_name)
    }

    /// Records of a type matching a textual predicate
    pub fn filter(&self, type_name: &str, predicate: &str, params: &[Value]) -> Result<ResultSet> {
        self.objects(type_name)?.filter_str(predicate, params)
    }

    /// Tables with stored records, in first-write order
    pub fn tables(&self) -> impl Iterator<Item = &TypeTable> {
        self.tables.values().map(|t| t.as_ref())
    }

    /// Shared handle to the schema registry
    pub fn registry_handle(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub(crate) fn table_map(&self) -> &Tables {
        &self.tables
    }
}

impl ReadView for Snapshot {
    fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    fn table(&self, type_name: &str) -> Option<&TypeTable> {
        self.tables.get(type_name).map(|t| t.as_ref())
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl LinkResolver for Snapshot {
    fn resolve_ref(&self, object: &ObjectRef) -> Option<Arc<Record>> {
        self.get(object)
    }
}
