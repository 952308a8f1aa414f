//! RON script loader

use crate::error::{Error, Result};
use crate::fixture::FixtureRecord;
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use trove_core::{ObjectRef, RecordType, RecordTypeHandle, TypeName};
use trove_store::Store;

/// Loaded declarations and fixtures
#[derive(Debug, Default)]
pub struct Definitions {
    /// Record types by name, in load order
    pub types: IndexMap<TypeName, RecordType>,
    /// Fixture records in load order
    pub fixtures: Vec<FixtureRecord>,
}

impl Definitions {
    /// Create empty definitions
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a record type declaration
    pub fn get_type(&self, name: &str) -> Option<&RecordType> {
        self.types.get(name)
    }

    /// Register every loaded type on `store`, in load order
    ///
    /// Every declaration is validated and checked against the store's
    /// registry first; on any failure nothing is registered.
    pub fn register(&self, store: &Store) -> Result<Vec<RecordTypeHandle>> {
        for record_type in self.types.values() {
            record_type.validate()?;
            if let Some(existing) = store.registry().get(record_type.name.as_str()) {
                if *existing != *record_type {
                    return Err(
                        trove_core::Error::SchemaConflict(record_type.name.to_string()).into(),
                    );
                }
            }
        }

        let mut handles = Vec::with_capacity(self.types.len());
        for record_type in self.types.values() {
            handles.push(store.register(record_type.clone())?);
        }
        Ok(handles)
    }

    /// Insert every fixture in one transaction
    ///
    /// Records are created first and linked afterwards, so fixtures may
    /// refer to labels defined later in the list. Returns the created
    /// records by label.
    pub fn insert_fixtures(&self, store: &Store) -> Result<IndexMap<String, ObjectRef>> {
        let labels = store.write(|txn| {
            let mut labels = IndexMap::new();
            let mut created = Vec::with_capacity(self.fixtures.len());
            for fixture in &self.fixtures {
                let object = txn.create(&fixture.type_name, fixture.values.clone())?;
                if let Some(label) = &fixture.label {
                    labels.insert(label.clone(), object.clone());
                }
                created.push(object);
            }

            for (fixture, object) in self.fixtures.iter().zip(&created) {
                let record_type = store.resolve(&fixture.type_name)?;
                for (property, targets) in &fixture.links {
                    let targets = targets
                        .iter()
                        .map(|label| {
                            labels
                                .get(label)
                                .cloned()
                                .ok_or_else(|| Error::UnresolvedLabel(label.clone()))
                        })
                        .collect::<Result<Vec<_>>>()?;
                    let prop = record_type.require_property(property)?;
                    if prop.property_type.list_target().is_some() {
                        txn.append_links(object, property, &targets)?;
                    } else {
                        let [target] = targets.as_slice() else {
                            return Err(Error::LinkArity {
                                property: property.clone(),
                                count: targets.len(),
                            });
                        };
                        txn.set_link(object, property, Some(target))?;
                    }
                }
            }
            Ok::<_, Error>(labels)
        })?;

        tracing::info!(
            target: "trove::script",
            store = store.name(),
            records = self.fixtures.len(),
            "Fixtures inserted"
        );
        Ok(labels)
    }

    /// Register all types, then insert all fixtures
    pub fn apply(&self, store: &Store) -> Result<IndexMap<String, ObjectRef>> {
        self.register(store)?;
        self.insert_fixtures(store)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptFile {
    #[serde(default)]
    types: Vec<RecordType>,
    #[serde(default)]
    records: Vec<FixtureRecord>,
}

/// Loader for RON store scripts
pub struct Loader {
    defs: Definitions,
    labels: HashSet<String>,
}

impl Loader {
    /// Create a new loader
    pub fn new() -> Self {
        Self {
            defs: Definitions::new(),
            labels: HashSet::new(),
        }
    }

    /// Load a single RON file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        self.load_str(&content)?;
        tracing::debug!(target: "trove::script", path = %path.display(), "Loaded script");
        Ok(())
    }

    /// Load types and fixtures from a RON string
    ///
    /// Either section may be omitted.
    pub fn load_str(&mut self, content: &str) -> Result<()> {
        let file: ScriptFile = ron::from_str(content)?;
        self.add_types(file.types)?;
        self.add_fixtures(file.records)
    }

    /// Load record types from a RON string
    pub fn load_types_str(&mut self, content: &str) -> Result<()> {
        #[derive(Deserialize)]
        struct TypeFile {
            types: Vec<RecordType>,
        }

        let file: TypeFile = ron::from_str(content)?;
        self.add_types(file.types)
    }

    /// Load fixture records from a RON string
    pub fn load_fixtures_str(&mut self, content: &str) -> Result<()> {
        #[derive(Deserialize)]
        struct FixtureFile {
            records: Vec<FixtureRecord>,
        }

        let file: FixtureFile = ron::from_str(content)?;
        self.add_fixtures(file.records)
    }

    fn add_types(&mut self, types: Vec<RecordType>) -> Result<()> {
        for record_type in types {
            let name = record_type.name.clone();
            if self.defs.types.contains_key(&name) {
                return Err(Error::DuplicateDefinition(name.to_string()));
            }
            self.defs.types.insert(name, record_type);
        }
        Ok(())
    }

    fn add_fixtures(&mut self, records: Vec<FixtureRecord>) -> Result<()> {
        for record in records {
            if let Some(label) = &record.label {
                if !self.labels.insert(label.clone()) {
                    return Err(Error::DuplicateDefinition(label.clone()));
                }
            }
            self.defs.fixtures.push(record);
        }
        Ok(())
    }

    /// Load all RON files from a directory
    ///
    /// Files are read in name order so fixtures keep a stable order.
    pub fn load_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if !path.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Not a directory: {:?}", path),
            )));
        }

        let mut entries = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort();

        for file_path in entries {
            if file_path.extension().map(|e| e == "ron").unwrap_or(false) {
                self.load_file(&file_path)?;
            } else if file_path.is_dir() {
                self.load_directory(&file_path)?;
            }
        }

        Ok(())
    }

    /// Finish loading and return the definitions
    pub fn finish(self) -> Definitions {
        self.defs
    }

    /// Get the current definitions (for inspection during loading)
    pub fn defs(&self) -> &Definitions {
        &self.defs
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}
