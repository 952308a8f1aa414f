//! Commit results and change notifications
//!
//! Every commit reports which records were inserted, modified and deleted,
//! per record type. A record created and then changed in the same
//! transaction counts as inserted only; one created and deleted again does
//! not appear at all.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use trove_core::{ObjectId, TypeName};

/// Changes to the records of one type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeChanges {
    /// Records created by the transaction
    pub inserted: BTreeSet<ObjectId>,
    /// Pre-existing records whose values changed
    pub modified: BTreeSet<ObjectId>,
    /// Pre-existing records that were deleted
    pub deleted: BTreeSet<ObjectId>,
}

impl TypeChanges {
    /// Check if nothing changed
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Changes made by one transaction, keyed by record type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    types: IndexMap<TypeName, TypeChanges>,
}

impl ChangeSet {
    /// Create an empty change set
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_insert(&mut self, type_name: &TypeName, id: ObjectId) {
        self.entry(type_name).inserted.insert(id);
    }

    pub(crate) fn record_modify(&mut self, type_name: &TypeName, id: ObjectId) {
        let changes = self.entry(type_name);
        if !changes.inserted.contains(&id) {
            changes.modified.insert(id);
        }
    }

    pub(crate) fn record_delete(&mut self, type_name: &TypeName, id: ObjectId) {
        let changes = self.entry(type_name);
        if !changes.inserted.remove(&id) {
            changes.modified.remove(&id);
            changes.deleted.insert(id);
        }
    }

    fn entry(&mut self, type_name: &TypeName) -> &mut TypeChanges {
        self.types.entry(type_name.clone()).or_default()
    }

    /// Changes for one type
    pub fn get(&self, type_name: &str) -> Option<&TypeChanges> {
        self.types.get(type_name)
    }

    /// Types with at least one change
    pub fn types(&self) -> impl Iterator<Item = &TypeName> {
        self.types
            .iter()
            .filter(|(_, c)| !c.is_empty())
            .map(|(name, _)| name)
    }

    /// Iterate over per-type changes, skipping types left unchanged
    pub fn iter(&self) -> impl Iterator<Item = (&TypeName, &TypeChanges)> {
        self.types.iter().filter(|(_, c)| !c.is_empty())
    }

    /// Check if the transaction changed nothing
    pub fn is_empty(&self) -> bool {
        self.types.values().all(TypeChanges::is_empty)
    }
}

/// Result of a successful commit
#[derive(Debug, Clone)]
pub struct CommitResult {
    /// The committed version; unchanged for an empty transaction
    pub version: u64,
    /// Per-type inserted, modified and deleted ids
    pub changes: ChangeSet,
    /// When the commit was published
    pub committed_at: DateTime<Utc>,
}

impl CommitResult {
    pub(crate) fn new(version: u64, changes: ChangeSet) -> Self {
        Self {
            version,
            changes,
            committed_at: Utc::now(),
        }
    }
}

/// Handle returned by [`Store::observe`](crate::Store::observe)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_then_modify_is_insert() {
        let person = TypeName::new("Person");
        let mut changes = ChangeSet::new();
        changes.record_insert(&person, ObjectId(0));
        changes.record_modify(&person, ObjectId(0));

        let c = changes.get("Person").unwrap();
        assert!(c.inserted.contains(&ObjectId(0)));
        assert!(c.modified.is_empty());
    }

    #[test]
    fn test_insert_then_delete_cancels_out() {
        let person = TypeName::new("Person");
        let mut changes = ChangeSet::new();
        changes.record_insert(&person, ObjectId(0));
        changes.record_delete(&person, ObjectId(0));
        assert!(changes.is_empty());
        assert_eq!(changes.types().count(), 0);
    }

    #[test]
    fn test_modify_then_delete_is_delete() {
        let car = TypeName::new("Car");
        let mut changes = ChangeSet::new();
        changes.record_modify(&car, ObjectId(3));
        changes.record_delete(&car, ObjectId(3));

        let c = changes.get("Car").unwrap();
        assert!(c.modified.is_empty());
        assert_eq!(c.deleted.iter().copied().collect::<Vec<_>>(), vec![ObjectId(3)]);
    }
}
