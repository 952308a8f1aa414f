//! Fixture records

use indexmap::IndexMap;
use serde::Deserialize;
use trove_core::ValueMap;

/// One record to insert when fixtures are applied
///
/// ```ron
/// (
///     type_name: "Car",
///     label: Some("bmw"),
///     values: { "brand": String("BMW") },
///     links: { "owner": ["marin"] },
/// )
/// ```
///
/// `links` maps relationship properties to fixture labels: exactly one for
/// a to-one relationship, any number for a to-many one.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FixtureRecord {
    /// Record type to create
    pub type_name: String,
    /// Name other fixtures use to link to this record
    #[serde(default)]
    pub label: Option<String>,
    /// Property values
    #[serde(default)]
    pub values: ValueMap,
    /// Relationship targets by label
    #[serde(default)]
    pub links: IndexMap<String, Vec<String>>,
}
