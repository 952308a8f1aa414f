//! Archive wrapper around a native_db database.

use crate::error::{Error, Result};
use crate::models::*;
use native_db::*;
use std::path::Path;
use std::sync::LazyLock;
use trove_store::{ReadView, Snapshot, Store, StoreConfig, TableImage};

// Static models for the database
static MODELS: LazyLock<Models> = LazyLock::new(|| {
    let mut models = Models::new();
    models.define::<StoredRecord>().unwrap();
    models.define::<StoredRecordType>().unwrap();
    models.define::<StoredMeta>().unwrap();
    models
});

/// Durable copy of a store's committed state.
///
/// An archive holds at most one snapshot; every `save` replaces the
/// previous contents in a single database transaction.
pub struct Archive {
    pub(crate) db: Database<'static>,
}

impl Archive {
    /// Open or create an archive at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Builder::new()
            .create(&MODELS, path)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(Self { db })
    }

    /// Create an in-memory archive.
    pub fn in_memory() -> Result<Self> {
        let db = Builder::new()
            .create_in_memory(&MODELS)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(Self { db })
    }

    /// Save a snapshot, replacing whatever the archive held before.
    pub fn save(&self, snapshot: &Snapshot, store_name: &str) -> Result<()> {
        let stale_records: Vec<StoredRecord> = self.all()?;
        let stale_types: Vec<StoredRecordType> = self.all()?;

        let rw = self.db.rw_transaction()?;
        for record in stale_records {
            rw.remove(record)?;
        }
        for record_type in stale_types {
            rw.remove(record_type)?;
        }

        let mut saved = 0usize;
        for (position, record_type) in snapshot.registry().types().iter().enumerate() {
            let table = snapshot.table(record_type.name.as_str());
            rw.upsert(StoredRecordType::new(position as u32, record_type, table)?)?;
            for record in table.into_iter().flat_map(|t| t.iter()) {
                rw.upsert(StoredRecord::from_record(record)?)?;
                saved += 1;
            }
        }
        rw.upsert(StoredMeta::new(store_name, snapshot.version()))?;
        rw.commit()?;

        tracing::info!(
            target: "trove::db",
            store = store_name,
            version = snapshot.version(),
            records = saved,
            "Archive saved"
        );
        Ok(())
    }

    /// Save the store's current snapshot.
    pub fn save_store(&self, store: &Store) -> Result<()> {
        self.save(&store.snapshot(), store.name())
    }

    /// Rebuild a store from the archive.
    ///
    /// An empty archive yields an empty store at version 0.
    pub fn restore(&self, config: StoreConfig) -> Result<Store> {
        let version = self.saved_version()?.unwrap_or(0);
        let mut images = Vec::new();
        for stored in self.stored_types()? {
            images.push(TableImage {
                record_type: stored.to_record_type()?,
                next_id: stored.next_id,
                tombstones: stored.tombstones,
                records: self.records_by_type(&stored.name)?,
            });
        }
        let store = Store::restore(config, version, images)?;

        tracing::info!(
            target: "trove::db",
            store = store.name(),
            version,
            types = store.registry().len(),
            "Archive restored"
        );
        Ok(store)
    }

    /// Version of the saved snapshot, if anything was saved.
    pub fn saved_version(&self) -> Result<Option<u64>> {
        Ok(self.meta()?.map(|m| m.version))
    }

    /// Metadata row of the last save.
    pub fn meta(&self) -> Result<Option<StoredMeta>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredMeta> = r.get().primary(StoredMeta::KEY.to_string())?;
        Ok(stored)
    }

    /// Remove everything from the archive.
    pub fn clear(&self) -> Result<()> {
        let records: Vec<StoredRecord> = self.all()?;
        let types: Vec<StoredRecordType> = self.all()?;

        let rw = self.db.rw_transaction()?;
        for record in records {
            rw.remove(record)?;
        }
        for record_type in types {
            rw.remove(record_type)?;
        }
        if let Some(meta) = rw.get().primary::<StoredMeta>(StoredMeta::KEY.to_string())? {
            rw.remove(meta)?;
        }
        rw.commit()?;
        Ok(())
    }

    pub(crate) fn all<T: ToInput>(&self) -> Result<Vec<T>> {
        let r = self.db.r_transaction()?;
        let scan = r.scan().primary::<T>()?;
        let iter = scan.all()?;
        let items: std::result::Result<Vec<T>, _> = iter.collect();
        items.map_err(|e| Error::Database(e.to_string()))
    }
}
