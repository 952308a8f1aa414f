//! Database models for archived stores.

mod record;
mod schema;

pub use record::*;
pub use schema::*;
