//! Store - the handle every operation goes through
//!
//! A store owns a schema registry, the latest committed [`Snapshot`] and a
//! single writer slot. Readers clone the current snapshot and never wait;
//! writers take the slot through [`Store::begin`] and publish a new snapshot
//! on commit. `Store` is a cheap, cloneable handle; clones share state.

use crate::changes::{CommitResult, ObserverId};
use crate::config::{StoreConfig, WriterWait};
use crate::error::{Error, Result};
use crate::results::ResultSet;
use crate::snapshot::{ReadView, Snapshot, Tables};
use crate::table::{TableImage, TypeTable};
use crate::transaction::Transaction;
use parking_lot::{Condvar, Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use trove_core::{ObjectRef, Record, RecordType, RecordTypeHandle, SchemaRegistry, Value};

type Observer = Arc<dyn Fn(&CommitResult) + Send + Sync>;

/// The single writer slot of a store
#[derive(Debug, Default)]
pub(crate) struct WriterSlot {
    busy: Mutex<bool>,
    released: Condvar,
}

impl WriterSlot {
    pub(crate) fn acquire(&self, wait: WriterWait, store: &str) -> Result<()> {
        let mut busy = self.busy.lock();
        match wait {
            WriterWait::FailFast => {
                if *busy {
                    tracing::warn!(target: "trove::txn", store, "Writer slot is taken");
                    return Err(Error::WriteInProgress(store.to_string()));
                }
            }
            WriterWait::Block => {
                while *busy {
                    self.released.wait(&mut busy);
                }
            }
            WriterWait::Timeout(ms) => {
                let deadline = Instant::now() + std::time::Duration::from_millis(ms);
                while *busy {
                    if self.released.wait_until(&mut busy, deadline).timed_out() && *busy {
                        tracing::warn!(
                            target: "trove::txn",
                            store,
                            timeout_ms = ms,
                            "Timed out waiting for the writer slot"
                        );
                        return Err(Error::WriteInProgress(store.to_string()));
                    }
                }
            }
        }
        *busy = true;
        Ok(())
    }

    pub(crate) fn release(&self) {
        let mut busy = self.busy.lock();
        *busy = false;
        self.released.notify_one();
    }

    fn is_busy(&self) -> bool {
        *self.busy.lock()
    }
}

/// State shared by a store's handles and its open transaction
pub(crate) struct StoreShared {
    pub(crate) config: StoreConfig,
    pub(crate) registry: Arc<SchemaRegistry>,
    current: RwLock<Snapshot>,
    pub(crate) writer: WriterSlot,
    observers: Mutex<Vec<(ObserverId, Observer)>>,
    next_observer: AtomicU64,
}

impl StoreShared {
    fn new(config: StoreConfig, registry: Arc<SchemaRegistry>, current: Snapshot) -> Self {
        Self {
            config,
            registry,
            current: RwLock::new(current),
            writer: WriterSlot::default(),
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(0),
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        self.current.read().clone()
    }

    pub(crate) fn publish(&self, snapshot: Snapshot) {
        *self.current.write() = snapshot;
    }

    /// Run observers with no store lock held
    pub(crate) fn notify(&self, result: &CommitResult) {
        let observers: Vec<Observer> = self
            .observers
            .lock()
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        for observer in observers {
            observer(result);
        }
    }
}

/// An embedded, snapshot-isolated object store
///
/// # Example
///
/// ```
/// use trove_core::{values, PropertyDef, RecordType, Value};
/// use trove_store::Store;
///
/// let store = Store::new();
/// store
///     .register(
///         RecordType::new("Car")
///             .with_property(PropertyDef::string("brand"))
///             .with_property(PropertyDef::int("year")),
///     )
///     .unwrap();
///
/// store
///     .write(|txn| {
///         txn.create("Car", values! { "brand" => "BMW", "year" => 1980 })?;
///         Ok::<_, trove_store::Error>(())
///     })
///     .unwrap();
///
/// let old = store.filter("Car", "year < %d", &[Value::Int(1990)]).unwrap();
/// assert_eq!(old.len(), 1);
/// ```
#[derive(Clone)]
pub struct Store {
    shared: Arc<StoreShared>,
}

impl Store {
    /// Create an empty store with the default configuration
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create an empty store
    pub fn with_config(config: StoreConfig) -> Self {
        let registry = Arc::new(SchemaRegistry::new());
        let current = Snapshot::empty(Arc::clone(&registry));
        Self {
            shared: Arc::new(StoreShared::new(config, registry, current)),
        }
    }

    /// Rebuild a store from archived tables
    ///
    /// Types are registered in image order, records keep their ids and the
    /// indexes are rebuilt. The store starts at `version`.
    pub fn restore(
        config: StoreConfig,
        version: u64,
        images: impl IntoIterator<Item = TableImage>,
    ) -> Result<Self> {
        let registry = Arc::new(SchemaRegistry::new());
        let mut tables = Tables::new();
        for image in images {
            let record_type = registry.register(image.record_type)?;
            let table =
                TypeTable::restore(record_type, image.next_id, image.tombstones, image.records)?;
            table.validate_keys()?;
            tables.insert(table.record_type().name.clone(), Arc::new(table));
        }
        tracing::debug!(
            target: "trove::txn",
            store = config.name(),
            version,
            types = tables.len(),
            "Store restored"
        );
        let current = Snapshot::new(version, Arc::new(tables), Arc::clone(&registry));
        Ok(Self {
            shared: Arc::new(StoreShared::new(config, registry, current)),
        })
    }

    /// Store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Store name
    pub fn name(&self) -> &str {
        self.shared.config.name()
    }

    /// The schema registry
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.shared.registry
    }

    /// Register a record type
    pub fn register(&self, record_type: RecordType) -> Result<RecordTypeHandle> {
        Ok(self.shared.registry.register(record_type)?)
    }

    /// Look up a registered record type
    pub fn resolve(&self, type_name: &str) -> Result<RecordTypeHandle> {
        Ok(self.shared.registry.resolve(type_name)?)
    }

    /// The latest committed snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.shared.snapshot()
    }

    /// The latest committed version
    pub fn version(&self) -> u64 {
        self.shared.snapshot().version()
    }

    /// Start a write transaction using the configured writer wait
    pub fn begin(&self) -> Result<Transaction> {
        self.begin_with(self.shared.config.writer_wait())
    }

    /// Start a write transaction with an explicit writer wait
    pub fn begin_with(&self, wait: WriterWait) -> Result<Transaction> {
        Transaction::begin(Arc::clone(&self.shared), wait)
    }

    /// Run `f` in a transaction, committing on `Ok` and cancelling on `Err`
    pub fn write<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Transaction) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut txn = self.begin()?;
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                txn.cancel();
                Err(e)
            }
        }
    }

    /// Check whether a transaction holds the writer slot
    pub fn is_write_in_progress(&self) -> bool {
        self.shared.writer.is_busy()
    }

    /// All records of a type in the latest snapshot
    pub fn objects(&self, type_name: &str) -> Result<ResultSet> {
        self.snapshot().objects(type_name)
    }

    /// Records of a type matching a textual predicate in the latest snapshot
    pub fn filter(&self, type_name: &str, predicate: &str, params: &[Value]) -> Result<ResultSet> {
        self.snapshot().filter(type_name, predicate, params)
    }

    /// Look up a record in the latest snapshot
    pub fn get(&self, object: &ObjectRef) -> Option<Arc<Record>> {
        self.snapshot().get(object)
    }

    /// Find a record by primary key in the latest snapshot
    pub fn object_for_primary_key(
        &self,
        type_name: &str,
        key: impl Into<Value>,
    ) -> Result<Option<Arc<Record>>> {
        self.snapshot().object_for_primary_key(type_name, &key.into())
    }

    /// Call `f` after every commit that changed something
    pub fn observe<F>(&self, f: F) -> ObserverId
    where
        F: Fn(&CommitResult) + Send + Sync + 'static,
    {
        let id = ObserverId(self.shared.next_observer.fetch_add(1, Ordering::Relaxed));
        self.shared.observers.lock().push((id, Arc::new(f)));
        id
    }

    /// Stop calling an observer; returns false if it was not registered
    pub fn unobserve(&self, id: ObserverId) -> bool {
        let mut observers = self.shared.observers.lock();
        let before = observers.len();
        observers.retain(|(other, _)| *other != id);
        observers.len() != before
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name())
            .field("version", &self.version())
            .field("types", &self.shared.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;
    use trove_core::{values, PropertyDef};

    fn store(wait: WriterWait) -> Store {
        let store = Store::with_config(StoreConfig::new("test").with_writer_wait(wait));
        store
            .register(RecordType::new("Dog").with_property(PropertyDef::string("name")))
            .unwrap();
        store
    }

    #[test]
    fn test_fail_fast_contention() {
        let store = store(WriterWait::FailFast);
        let txn = store.begin().unwrap();
        assert!(store.is_write_in_progress());
        assert!(store.begin().unwrap_err().is_write_in_progress());
        txn.cancel();
        assert!(!store.is_write_in_progress());
        assert!(store.begin().is_ok());
    }

    #[test]
    fn test_timeout_contention() {
        let store = store(WriterWait::FailFast);
        let _txn = store.begin().unwrap();
        let started = Instant::now();
        let err = store.begin_with(WriterWait::Timeout(20)).unwrap_err();
        assert!(err.is_write_in_progress());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_block_waits_for_release() {
        let store = store(WriterWait::Block);
        let txn = store.begin().unwrap();

        let other = store.clone();
        let waiter = thread::spawn(move || {
            let mut txn = other.begin().unwrap();
            txn.create("Dog", values! { "name" => "Rex" }).unwrap();
            txn.commit().unwrap().version
        });

        thread::sleep(Duration::from_millis(20));
        txn.cancel();
        assert_eq!(waiter.join().unwrap(), 1);
        assert_eq!(store.objects("Dog").unwrap().len(), 1);
    }

    #[test]
    fn test_dropping_transaction_releases_slot() {
        let store = store(WriterWait::FailFast);
        {
            let mut txn = store.begin().unwrap();
            txn.create("Dog", values! { "name" => "Rex" }).unwrap();
        }
        assert!(!store.is_write_in_progress());
        assert_eq!(store.version(), 0);
        assert!(store.objects("Dog").unwrap().is_empty());
    }

    #[test]
    fn test_write_cancels_on_error() {
        let store = store(WriterWait::FailFast);
        let result: Result<()> = store.write(|txn| {
            txn.create("Dog", values! { "name" => "Rex" })?;
            Err(Error::NotFound("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.version(), 0);
        assert!(!store.is_write_in_progress());
    }

    #[test]
    fn test_observers() {
        let store = store(WriterWait::FailFast);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let id = store.observe(move |result| {
            assert_eq!(result.changes.get("Dog").unwrap().inserted.len(), 1);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let create = |store: &Store| {
            store
                .write(|txn| txn.create("Dog", values! { "name" => "Rex" }).map(|_| ()))
                .unwrap()
        };
        create(&store);
        // Empty commits notify nobody
        store.begin().unwrap().commit().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(store.unobserve(id));
        assert!(!store.unobserve(id));
        create(&store);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_may_read_store() {
        let store = store(WriterWait::FailFast);
        let reader = store.clone();
        let counts = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&counts);
        store.observe(move |_| {
            sink.lock().push(reader.objects("Dog").unwrap().len());
        });
        store
            .write(|txn| txn.create("Dog", values! { "name" => "Rex" }).map(|_| ()))
            .unwrap();
        assert_eq!(*counts.lock(), vec![1]);
    }

    #[test]
    fn test_store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Store>();
    }
}
