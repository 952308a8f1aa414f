//! Trove Script - RON loader for schemas and fixtures
//!
//! Loads store content from RON files:
//! - Record type declarations
//! - Fixture records, with links between them by label

mod error;
mod fixture;
mod loader;

pub use error::{Error, Result};
pub use fixture::FixtureRecord;
pub use loader::{Definitions, Loader};
