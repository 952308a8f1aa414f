//! Trove Store - snapshot-isolated storage engine
//!
//! Provides:
//! - Per-type tables with monotonic ids and primary-key/secondary indexes
//! - Immutable snapshots readers can hold across commits
//! - Single-writer transactions with atomic commit and change sets
//! - To-one and to-many relationships with weak links
//! - Lazy, index-assisted query results with sorting and aggregates
//!
//! ```
//! use trove_store::{Store, Error};
//! use trove_core::{values, PropertyDef, RecordType};
//!
//! let store = Store::new();
//! store
//!     .register(
//!         RecordType::new("Person")
//!             .with_property(PropertyDef::int("id"))
//!             .with_property(PropertyDef::string("name"))
//!             .with_primary_key("id"),
//!     )
//!     .unwrap();
//!
//! store
//!     .write(|txn| {
//!         txn.create("Person", values! { "id" => 1, "name" => "Ada" })?;
//!         txn.create("Person", values! { "id" => 2, "name" => "Bob" })?;
//!         Ok::<_, Error>(())
//!     })
//!     .unwrap();
//!
//! let people = store.filter("Person", "id < 2", &[]).unwrap();
//! assert_eq!(people.len(), 1);
//! ```

pub mod aggregate;
mod changes;
mod config;
mod error;
mod index;
pub mod relationship;
mod results;
mod snapshot;
mod store;
mod table;
mod transaction;

pub use changes::{ChangeSet, CommitResult, ObserverId, TypeChanges};
pub use config::{StoreConfig, WriterWait};
pub use error::{Error, Result};
pub use index::{IndexKey, IndexSet};
pub use relationship::{link_list, resolve_link, value_list, LinkList, ValueList};
pub use results::ResultSet;
pub use snapshot::{ReadView, Snapshot};
pub use store::Store;
pub use table::{TableImage, TypeTable};
pub use transaction::Transaction;
