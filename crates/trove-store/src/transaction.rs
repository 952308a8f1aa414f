//! Write transactions
//!
//! A [`Transaction`] holds the store's writer slot and a private working
//! copy of the type tables. Tables are shared with the snapshot the
//! transaction started from and copied on first write. Nothing it does is
//! visible to other readers until [`Transaction::commit`] publishes the
//! working tables as the next version.
//!
//! A primary-key collision aborts the transaction: the failing write is
//! rejected, every later operation fails with `TransactionAborted`, and
//! `commit` reports the original `DuplicateKey`.

use crate::changes::{ChangeSet, CommitResult};
use crate::config::WriterWait;
use crate::error::{Error, Result};
use crate::relationship::check_links;
use crate::results::ResultSet;
use crate::snapshot::{ReadView, Snapshot, Tables};
use crate::store::StoreShared;
use crate::table::TypeTable;
use std::fmt;
use std::sync::Arc;
use trove_core::{
    values, LinkResolver, ObjectRef, Record, RecordTypeHandle, SchemaRegistry, Value, ValueMap,
};

/// An open write transaction
pub struct Transaction {
    shared: Arc<StoreShared>,
    base_version: u64,
    tables: Tables,
    changes: ChangeSet,
    aborted: Option<Error>,
    finished: bool,
}

impl Transaction {
    pub(crate) fn begin(shared: Arc<StoreShared>, wait: WriterWait) -> Result<Self> {
        shared.writer.acquire(wait, shared.config.name())?;
        let base = shared.snapshot();
        tracing::debug!(
            target: "trove::txn",
            store = shared.config.name(),
            version = base.version(),
            "Transaction started"
        );
        Ok(Self {
            base_version: base.version(),
            tables: base.table_map().clone(),
            shared,
            changes: ChangeSet::new(),
            aborted: None,
            finished: false,
        })
    }

    /// Check whether a key collision aborted this transaction
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// Changes made so far
    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    fn ensure_active(&self) -> Result<()> {
        match &self.aborted {
            Some(cause) => Err(Error::TransactionAborted(cause.to_string())),
            None => Ok(()),
        }
    }

    /// Record a key collision as the abort cause
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_duplicate_key() && self.aborted.is_none() {
                tracing::warn!(
                    target: "trove::txn",
                    store = self.shared.config.name(),
                    error = %e,
                    "Transaction aborted"
                );
                self.aborted = Some(e.clone());
            }
        }
        result
    }

    fn resolve(&self, type_name: &str) -> Result<RecordTypeHandle> {
        Ok(self.shared.registry.resolve(type_name)?)
    }

    fn existing(&self, object: &ObjectRef) -> Result<Arc<Record>> {
        self.get(object)
            .ok_or_else(|| Error::NotFound(object.to_string()))
    }

    fn table_mut(&mut self, record_type: &RecordTypeHandle) -> &mut TypeTable {
        let table = self
            .tables
            .entry(record_type.name.clone())
            .or_insert_with(|| Arc::new(TypeTable::new(Arc::clone(record_type))));
        Arc::make_mut(table)
    }

    /// Create a record
    ///
    /// Undeclared properties are rejected, missing ones take their default
    /// and link targets must exist in this transaction's view.
    pub fn create(&mut self, type_name: &str, values: ValueMap) -> Result<ObjectRef> {
        self.ensure_active()?;
        let record_type = self.resolve(type_name)?;
        let values = record_type.normalize(values)?;
        check_links(&*self, &record_type, &values, None)?;

        let checked = self
            .tables
            .get(type_name)
            .map_or(Ok(()), |t| t.indexes().check_key(None, &values));
        self.guard(checked)?;

        let table = self.table_mut(&record_type);
        let id = table.allocate();
        table.put(id, values)?;
        self.changes.record_insert(&record_type.name, id);
        tracing::trace!(target: "trove::txn", type_name, id = id.raw(), "Record created");
        Ok(ObjectRef::new(record_type.name.clone(), id))
    }

    /// Update the record with the same primary key, or create one
    pub fn upsert(&mut self, type_name: &str, values: ValueMap) -> Result<ObjectRef> {
        self.ensure_active()?;
        let record_type = self.resolve(type_name)?;
        let Some(primary_key) = record_type.primary_key.as_deref() else {
            return Err(Error::Core(trove_core::Error::InvalidSchema(format!(
                "{} has no primary key",
                type_name
            ))));
        };
        let key = values.get(primary_key).cloned().unwrap_or_default();
        let key = record_type.check_value(primary_key, key)?;
        let existing = self
            .table(type_name)
            .and_then(|t| t.lookup_by_key(&key))
            .map(|r| r.object_ref());
        match existing {
            Some(object) => {
                self.update(&object, values)?;
                Ok(object)
            }
            None => self.create(type_name, values),
        }
    }

    /// Change some properties of a record
    pub fn update(&mut self, object: &ObjectRef, values: ValueMap) -> Result<()> {
        self.ensure_active()?;
        let record_type = self.resolve(object.type_name.as_str())?;
        let existing = self.existing(object)?;

        let mut checked = ValueMap::with_capacity(values.len());
        for (name, value) in values {
            let value = record_type.check_value(&name, value)?;
            checked.insert(name, value);
        }
        check_links(&*self, &record_type, &checked, Some(existing.as_ref()))?;

        let mut merged = existing.values.clone();
        merged.extend(checked);
        if merged == existing.values {
            return Ok(());
        }

        let written = self.table_mut(&record_type).put(object.id, merged);
        self.guard(written)?;
        self.changes.record_modify(&object.type_name, object.id);
        Ok(())
    }

    /// Change one property of a record
    pub fn set(&mut self, object: &ObjectRef, property: &str, value: impl Into<Value>) -> Result<()> {
        let value: Value = value.into();
        self.update(object, values! { property => value })
    }

    /// Delete a record; returns false if it did not exist
    ///
    /// Links pointing at the record are left in place and resolve to `None`.
    pub fn delete(&mut self, object: &ObjectRef) -> Result<bool> {
        self.ensure_active()?;
        let record_type = self.resolve(object.type_name.as_str())?;
        if self.get(object).is_none() {
            return Ok(false);
        }
        self.table_mut(&record_type).delete(object.id);
        self.changes.record_delete(&object.type_name, object.id);
        tracing::trace!(target: "trove::txn", object = %object, "Record deleted");
        Ok(true)
    }

    /// Point a to-one relationship at `target`, or clear it with `None`
    pub fn set_link(
        &mut self,
        object: &ObjectRef,
        property: &str,
        target: Option<&ObjectRef>,
    ) -> Result<()> {
        let record_type = self.resolve(object.type_name.as_str())?;
        let prop = record_type.require_property(property)?;
        if prop.property_type.link_target().is_none() {
            return Err(Error::NotARelationship(property.to_string()));
        }
        self.set(object, property, target)
    }

    /// Append a record to a to-many relationship
    ///
    /// The same record may appear any number of times.
    pub fn append_link(&mut self, object: &ObjectRef, property: &str, target: &ObjectRef) -> Result<()> {
        self.append_links(object, property, std::slice::from_ref(target))
    }

    /// Append several records to a to-many relationship
    pub fn append_links(
        &mut self,
        object: &ObjectRef,
        property: &str,
        targets: &[ObjectRef],
    ) -> Result<()> {
        let record_type = self.resolve(object.type_name.as_str())?;
        let prop = record_type.require_property(property)?;
        if prop.property_type.list_target().is_none() {
            return Err(Error::NotARelationship(property.to_string()));
        }
        self.modify_list(object, property, |items| {
            items.extend(targets.iter().map(Value::from));
            Ok(())
        })
    }

    /// Append a value to a list of primitive values
    pub fn append_value(
        &mut self,
        object: &ObjectRef,
        property: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let value = value.into();
        self.modify_list(object, property, |items| {
            items.push(value);
            Ok(())
        })
    }

    /// Remove the list entry at `index`, returning it
    pub fn remove_at(&mut self, object: &ObjectRef, property: &str, index: usize) -> Result<Value> {
        self.modify_list(object, property, |items| {
            if index >= items.len() {
                return Err(Error::IndexOutOfBounds {
                    index,
                    len: items.len(),
                });
            }
            Ok(items.remove(index))
        })
    }

    fn modify_list<T>(
        &mut self,
        object: &ObjectRef,
        property: &str,
        f: impl FnOnce(&mut Vec<Value>) -> Result<T>,
    ) -> Result<T> {
        self.ensure_active()?;
        let record_type = self.resolve(object.type_name.as_str())?;
        let prop = record_type.require_property(property)?;
        if prop.property_type.list_element().is_none() {
            return Err(Error::NotAList(property.to_string()));
        }
        let existing = self.existing(object)?;
        let mut items = existing
            .get_or_null(property)
            .as_list()
            .unwrap_or_default()
            .to_vec();
        let out = f(&mut items)?;
        self.set(object, property, Value::List(items))?;
        Ok(out)
    }

    /// Working state as a snapshot, including this transaction's writes
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(
            self.base_version,
            Arc::new(self.tables.clone()),
            Arc::clone(&self.shared.registry),
        )
    }

    /// All records of a type, including this transaction's writes
    pub fn objects(&self, type_name: &str) -> Result<ResultSet> {
        self.snapshot().objects(type_name)
    }

    /// Records of a type matching a textual predicate, including this
    /// transaction's writes
    pub fn filter(&self, type_name: &str, predicate: &str, params: &[Value]) -> Result<ResultSet> {
        self.snapshot().filter(type_name, predicate, params)
    }

    /// Publish this transaction's writes as the next version
    ///
    /// Fails with the recorded `DuplicateKey` if the transaction was
    /// aborted. A transaction that changed nothing commits without bumping
    /// the version. One whose only effect is reserving ids (a record created
    /// and deleted again) still publishes the advanced id counters as the
    /// next version, so those ids are never handed out twice. Observers are
    /// only notified of non-empty change sets.
    pub fn commit(mut self) -> Result<CommitResult> {
        if let Some(cause) = self.aborted.take() {
            self.finish();
            return Err(cause);
        }

        let validated = self
            .changes
            .types()
            .filter_map(|name| self.tables.get(name))
            .try_for_each(|table| table.validate_keys());
        if let Err(e) = validated {
            self.finish();
            return Err(e);
        }

        let changes = std::mem::take(&mut self.changes);
        if changes.is_empty() && !self.counters_moved() {
            self.finish();
            tracing::debug!(
                target: "trove::txn",
                store = self.shared.config.name(),
                version = self.base_version,
                "Committed empty transaction"
            );
            return Ok(CommitResult::new(self.base_version, changes));
        }

        let version = self.base_version + 1;
        let tables = std::mem::take(&mut self.tables);
        self.shared.publish(Snapshot::new(
            version,
            Arc::new(tables),
            Arc::clone(&self.shared.registry),
        ));
        self.finish();

        tracing::debug!(
            target: "trove::txn",
            store = self.shared.config.name(),
            version,
            types = changes.types().count(),
            "Transaction committed"
        );
        let result = CommitResult::new(version, changes);
        if !result.changes.is_empty() {
            self.shared.notify(&result);
        }
        Ok(result)
    }

    /// Check whether any working table reserved ids or left tombstones
    /// beyond the published snapshot
    fn counters_moved(&self) -> bool {
        let base = self.shared.snapshot();
        self.tables.iter().any(|(name, table)| {
            let (next_id, tombstones) = base
                .table(name.as_str())
                .map_or((0, 0), |t| (t.next_id(), t.tombstones()));
            table.next_id() != next_id || table.tombstones() != tombstones
        })
    }

    /// Discard every pending write and release the writer slot
    pub fn cancel(mut self) {
        self.finish();
        tracing::debug!(
            target: "trove::txn",
            store = self.shared.config.name(),
            "Transaction cancelled"
        );
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.shared.writer.release();
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                target: "trove::txn",
                store = self.shared.config.name(),
                "Transaction dropped without commit"
            );
            self.finish();
        }
    }
}

impl ReadView for Transaction {
    fn registry(&self) -> &SchemaRegistry {
        &self.shared.registry
    }

    fn table(&self, type_name: &str) -> Option<&TypeTable> {
        self.tables.get(type_name).map(|t| t.as_ref())
    }

    fn version(&self) -> u64 {
        self.base_version
    }
}

impl LinkResolver for Transaction {
    fn resolve_ref(&self, object: &ObjectRef) -> Option<Arc<Record>> {
        self.get(object)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("store", &self.shared.config.name())
            .field("base_version", &self.base_version)
            .field("aborted", &self.aborted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use trove_core::{PropertyDef, RecordType};

    fn store() -> Store {
        let store = Store::new();
        store
            .register(
                RecordType::new("Person")
                    .with_property(PropertyDef::int("id"))
                    .with_property(PropertyDef::string("name"))
                    .with_primary_key("id")
                    .with_indexed(["name"]),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_reads_own_writes_isolated_from_store() {
        let store = store();
        let mut txn = store.begin().unwrap();
        let ann = txn.create("Person", values! { "id" => 1, "name" => "Ann" }).unwrap();

        assert_eq!(txn.get(&ann).unwrap().get_str("name"), Some("Ann"));
        assert_eq!(txn.objects("Person").unwrap().len(), 1);
        assert!(store.get(&ann).is_none());

        let result = txn.commit().unwrap();
        assert_eq!(result.version, 1);
        assert_eq!(store.get(&ann).unwrap().get_str("name"), Some("Ann"));
    }

    #[test]
    fn test_snapshot_taken_before_commit_is_unchanged() {
        let store = store();
        let before = store.snapshot();
        store
            .write(|txn| txn.create("Person", values! { "id" => 1 }).map(|_| ()))
            .unwrap();
        assert_eq!(before.count("Person"), 0);
        assert_eq!(store.snapshot().count("Person"), 1);
    }

    #[test]
    fn test_duplicate_key_aborts() {
        let store = store();
        let mut txn = store.begin().unwrap();
        txn.create("Person", values! { "id" => 1, "name" => "Ann" }).unwrap();
        let err = txn
            .create("Person", values! { "id" => 1, "name" => "Bob" })
            .unwrap_err();
        assert!(err.is_duplicate_key());
        assert!(txn.is_aborted());

        assert!(matches!(
            txn.create("Person", values! { "id" => 2 }),
            Err(Error::TransactionAborted(_))
        ));
        assert!(txn.commit().unwrap_err().is_duplicate_key());
        assert_eq!(store.version(), 0);
        assert!(!store.is_write_in_progress());
    }

    #[test]
    fn test_update_into_existing_key_aborts() {
        let store = store();
        let (ann, _) = store
            .write(|txn| {
                let ann = txn.create("Person", values! { "id" => 1 })?;
                let bob = txn.create("Person", values! { "id" => 2 })?;
                Ok::<_, Error>((ann, bob))
            })
            .unwrap();

        let mut txn = store.begin().unwrap();
        assert!(txn.set(&ann, "id", 2).unwrap_err().is_duplicate_key());
        assert!(txn.commit().is_err());
        assert_eq!(store.get(&ann).unwrap().get_int("id"), Some(1));
    }

    #[test]
    fn test_changing_own_key_is_allowed() {
        let store = store();
        let ann = store
            .write(|txn| txn.create("Person", values! { "id" => 1 }))
            .unwrap();
        store.write(|txn| txn.set(&ann, "id", 10)).unwrap();
        assert_eq!(
            store.object_for_primary_key("Person", 10).unwrap().unwrap().id,
            ann.id
        );
        assert!(store.object_for_primary_key("Person", 1).unwrap().is_none());
    }

    #[test]
    fn test_upsert() {
        let store = store();
        let first = store
            .write(|txn| txn.upsert("Person", values! { "id" => 1, "name" => "Ann" }))
            .unwrap();
        let second = store
            .write(|txn| txn.upsert("Person", values! { "id" => 1, "name" => "Anna" }))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(store.objects("Person").unwrap().len(), 1);
        assert_eq!(store.get(&first).unwrap().get_str("name"), Some("Anna"));
    }

    #[test]
    fn test_value_errors_leave_transaction_usable() {
        let store = store();
        let mut txn = store.begin().unwrap();
        assert!(matches!(
            txn.create("Person", values! { "id" => "one" }),
            Err(Error::Core(trove_core::Error::TypeMismatch { .. }))
        ));
        assert!(matches!(
            txn.create("Person", values! { "age" => 3 }),
            Err(Error::Core(trove_core::Error::UnknownProperty { .. }))
        ));
        assert!(matches!(
            txn.create("Robot", values! {}),
            Err(Error::Core(trove_core::Error::UnknownType(_)))
        ));
        assert!(!txn.is_aborted());
        txn.create("Person", values! { "id" => 1 }).unwrap();
        assert_eq!(txn.commit().unwrap().version, 1);
    }

    #[test]
    fn test_delete_and_change_set() {
        let store = store();
        let (ann, bob) = store
            .write(|txn| {
                let ann = txn.create("Person", values! { "id" => 1 })?;
                let bob = txn.create("Person", values! { "id" => 2 })?;
                Ok::<_, Error>((ann, bob))
            })
            .unwrap();

        let mut txn = store.begin().unwrap();
        assert!(txn.delete(&ann).unwrap());
        assert!(!txn.delete(&ann).unwrap());
        txn.set(&bob, "name", "Bob").unwrap();
        let carl = txn.create("Person", values! { "id" => 3 }).unwrap();
        let result = txn.commit().unwrap();

        let changes = result.changes.get("Person").unwrap();
        assert!(changes.deleted.contains(&ann.id));
        assert!(changes.modified.contains(&bob.id));
        assert!(changes.inserted.contains(&carl.id));
        assert!(store.get(&ann).is_none());

        // The deleted record's id is never handed out again
        let dave = store
            .write(|txn| txn.create("Person", values! { "id" => 1 }))
            .unwrap();
        assert!(dave.id > carl.id);
    }

    #[test]
    fn test_noop_update_is_empty_commit() {
        let store = store();
        let ann = store
            .write(|txn| txn.create("Person", values! { "id" => 1, "name" => "Ann" }))
            .unwrap();
        let mut txn = store.begin().unwrap();
        txn.set(&ann, "name", "Ann").unwrap();
        let result = txn.commit().unwrap();
        assert!(result.changes.is_empty());
        assert_eq!(result.version, 1);
    }

    #[test]
    fn test_create_then_delete_keeps_id_reserved() {
        let store = store();
        let notified = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        store.observe(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        let mut txn = store.begin().unwrap();
        let rex = txn.create("Person", values! { "id" => 1, "name" => "Rex" }).unwrap();
        txn.delete(&rex).unwrap();
        let result = txn.commit().unwrap();
        assert!(result.changes.is_empty());
        assert_eq!(result.version, 1);
        assert_eq!(store.version(), 1);
        assert_eq!(notified.load(std::sync::atomic::Ordering::SeqCst), 0);

        let fido = store
            .write(|txn| txn.create("Person", values! { "id" => 2, "name" => "Fido" }))
            .unwrap();
        assert_ne!(rex, fido);
        assert!(store.get(&rex).is_none());
        assert_eq!(store.get(&fido).unwrap().get_str("name"), Some("Fido"));

        let snapshot = store.snapshot();
        let table = snapshot.table("Person").unwrap();
        assert_eq!(table.next_id(), 2);
        assert_eq!(table.tombstones(), 1);
    }

    #[test]
    fn test_update_missing_record() {
        let store = store();
        let ghost = ObjectRef::new("Person", trove_core::ObjectId(42));
        let mut txn = store.begin().unwrap();
        assert!(matches!(txn.set(&ghost, "name", "x"), Err(Error::NotFound(_))));
    }
}
