//! Trove Core - data model for the trove object store
//!
//! This crate provides the types every other trove crate builds on:
//! - Dynamic property values (`Value`, `ValueMap`)
//! - Record identity (`ObjectId`, `TypeName`, `ObjectRef`) and `Record`
//! - Record type declarations and the `SchemaRegistry`
//! - The predicate language used to filter query results
//!
//! Storage, indexes and transactions live in `trove-store`.

mod error;
mod identity;
pub mod predicate;
mod record;
pub mod schema;
mod value;

pub use error::{Error, Result};
pub use identity::{ObjectId, ObjectRef, TypeName};
pub use predicate::{CompareOp, LinkResolver, NoLinks, Predicate};
pub use record::Record;
pub use schema::{PropertyDef, PropertyType, RecordType, RecordTypeHandle, SchemaRegistry};
pub use value::{Value, ValueMap};
