//! Identity types for records and record types

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Engine-assigned identifier of a record within its type's storage
///
/// Ids are allocated monotonically per record type and are never reused,
/// not even after the record they named has been deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// Create a new object ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Name of a registered record type (e.g. "Person", "Car")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeName(pub String);

impl TypeName {
    /// Create a new type name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TypeName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TypeName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for TypeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Handle to a record: its type plus its internal id
///
/// This is also the stored form of relationship values, so a link always
/// carries the type of the record it points at.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Type of the referenced record
    pub type_name: TypeName,
    /// Internal id of the referenced record
    pub id: ObjectId,
}

impl ObjectRef {
    /// Create a new object reference
    pub fn new(type_name: impl Into<TypeName>, id: ObjectId) -> Self {
        Self {
            type_name: type_name.into(),
            id,
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.type_name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn test_object_id() {
        let id = ObjectId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(format!("{}", id), "#42");
        assert!(ObjectId::new(1) < ObjectId::new(2));
    }

    #[test]
    fn test_type_name_borrow_lookup() {
        let mut map: IndexMap<TypeName, u32> = IndexMap::new();
        map.insert(TypeName::new("Person"), 1);
        assert_eq!(map.get("Person"), Some(&1));
        assert_eq!(map.get("Car"), None);
    }

    #[test]
    fn test_object_ref_display() {
        let r = ObjectRef::new("Car", ObjectId::new(3));
        assert_eq!(format!("{}", r), "Car#3");
    }
}
