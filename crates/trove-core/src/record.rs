//! Record instances

use crate::{ObjectId, ObjectRef, TypeName, Value, ValueMap};
use serde::{Deserialize, Serialize};

/// A stored instance of a record type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Internal id, stable for the record's lifetime
    pub id: ObjectId,
    /// The record type this record belongs to
    pub type_name: TypeName,
    /// Property values in declaration order
    pub values: ValueMap,
}

impl Record {
    /// Create an empty record
    pub fn new(type_name: impl Into<TypeName>, id: ObjectId) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            values: ValueMap::new(),
        }
    }

    /// Create a record with the given property values
    pub fn with_values(type_name: impl Into<TypeName>, id: ObjectId, values: ValueMap) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            values,
        }
    }

    /// Handle to this record
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.type_name.clone(), self.id)
    }

    /// Get a property value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a property value, treating a missing property as nil
    pub fn get_or_null(&self, key: &str) -> &Value {
        self.values.get(key).unwrap_or(&Value::Null)
    }

    /// Set a property value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Get a string property
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    /// Get an integer property
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_int())
    }

    /// Get a numeric property as f64
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_float())
    }

    /// Get a to-one link property
    pub fn get_link(&self, key: &str) -> Option<&ObjectRef> {
        self.get(key).and_then(|v| v.as_link())
    }

    /// Check whether this record is the one a reference points at
    pub fn is(&self, object: &ObjectRef) -> bool {
        self.id == object.id && self.type_name == object.type_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record() {
        let mut record = Record::new("Car", ObjectId::new(1));
        record.set("brand", "BMW");
        record.set("year", 1980);

        assert_eq!(record.get_str("brand"), Some("BMW"));
        assert_eq!(record.get_int("year"), Some(1980));
        assert_eq!(record.get_number("year"), Some(1980.0));
        assert!(record.get_or_null("owner").is_null());
    }

    #[test]
    fn test_record_object_ref() {
        let record = Record::new("Person", ObjectId::new(7));
        let handle = record.object_ref();
        assert!(record.is(&handle));
        assert!(!record.is(&ObjectRef::new("Car", ObjectId::new(7))));
    }
}
