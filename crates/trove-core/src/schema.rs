//! Record type declarations and the schema registry
//!
//! A [`RecordType`] is an explicit, static descriptor: ordered properties,
//! an optional primary key and a set of indexed properties. Declarations are
//! checked once, when they are registered, and never change afterwards.

use crate::error::{Error, Result};
use crate::{TypeName, Value, ValueMap};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Semantic type of a property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    Bool,
    Int,
    Float,
    String,
    Date,
    Data,
    /// To-one relationship to a record of the named type
    Link(TypeName),
    /// Ordered list; `List(Link(T))` is a to-many relationship
    List(Box<PropertyType>),
}

impl PropertyType {
    /// Whether an index can be declared on a property of this type
    pub fn is_indexable(&self) -> bool {
        matches!(
            self,
            PropertyType::Bool | PropertyType::Int | PropertyType::String | PropertyType::Date
        )
    }

    /// Target type of a to-one relationship
    pub fn link_target(&self) -> Option<&TypeName> {
        match self {
            PropertyType::Link(target) => Some(target),
            _ => None,
        }
    }

    /// Element type of a list property
    pub fn list_element(&self) -> Option<&PropertyType> {
        match self {
            PropertyType::List(element) => Some(element),
            _ => None,
        }
    }

    /// Target type of a to-many relationship
    pub fn list_target(&self) -> Option<&TypeName> {
        self.list_element().and_then(|e| e.link_target())
    }

    /// Value a non-nullable property takes when none is supplied
    pub fn zero_value(&self) -> Value {
        match self {
            PropertyType::Bool => Value::Bool(false),
            PropertyType::Int => Value::Int(0),
            PropertyType::Float => Value::Float(0.0),
            PropertyType::String => Value::String(String::new()),
            PropertyType::Date => Value::Date(DateTime::<Utc>::default()),
            PropertyType::Data => Value::Data(Vec::new()),
            PropertyType::Link(_) => Value::Null,
            PropertyType::List(_) => Value::List(Vec::new()),
        }
    }

    /// Convert a non-null value into this type, widening ints to floats
    ///
    /// Returns `None` if the value does not fit. Link targets are not checked
    /// here; that is the relationship layer's job.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (PropertyType::Bool, v @ Value::Bool(_)) => Some(v),
            (PropertyType::Int, v @ Value::Int(_)) => Some(v),
            (PropertyType::Float, Value::Int(i)) => Some(Value::Float(i as f64)),
            (PropertyType::Float, v @ Value::Float(_)) => Some(v),
            (PropertyType::String, v @ Value::String(_)) => Some(v),
            (PropertyType::Date, v @ Value::Date(_)) => Some(v),
            (PropertyType::Data, v @ Value::Data(_)) => Some(v),
            (PropertyType::Link(_), v @ Value::Link(_)) => Some(v),
            (PropertyType::List(element), Value::List(items)) => items
                .into_iter()
                .map(|item| {
                    if item.is_null() {
                        None
                    } else {
                        element.coerce(item)
                    }
                })
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyType::Bool => write!(f, "bool"),
            PropertyType::Int => write!(f, "int"),
            PropertyType::Float => write!(f, "float"),
            PropertyType::String => write!(f, "string"),
            PropertyType::Date => write!(f, "date"),
            PropertyType::Data => write!(f, "data"),
            PropertyType::Link(target) => write!(f, "link<{}>", target),
            PropertyType::List(element) => write!(f, "list<{}>", element),
        }
    }
}

/// Declaration of one property on a record type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    /// Property name
    pub name: String,
    /// Property type
    pub property_type: PropertyType,
    /// Whether the property may hold nil (links always may)
    #[serde(default)]
    pub nullable: bool,
    /// Value used when a record is created without this property
    #[serde(default)]
    pub default: Option<Value>,
}

impl PropertyDef {
    /// Create a property of the given type
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            nullable: false,
            default: None,
        }
    }

    /// Create a bool property
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Bool)
    }

    /// Create an int property
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Int)
    }

    /// Create a float property
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Float)
    }

    /// Create a string property
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::String)
    }

    /// Create a date property
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Date)
    }

    /// Create a binary data property
    pub fn data(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Data)
    }

    /// Create a to-one relationship to `target`
    pub fn link(name: impl Into<String>, target: impl Into<TypeName>) -> Self {
        Self::new(name, PropertyType::Link(target.into()))
    }

    /// Create a to-many relationship to `target`
    pub fn to_many(name: impl Into<String>, target: impl Into<TypeName>) -> Self {
        Self::list(name, PropertyType::Link(target.into()))
    }

    /// Create a list of primitive values
    pub fn list(name: impl Into<String>, element: PropertyType) -> Self {
        Self::new(name, PropertyType::List(Box::new(element)))
    }

    /// Allow nil values
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Set a default value
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Whether this property accepts nil
    pub fn is_nullable(&self) -> bool {
        self.nullable || matches!(self.property_type, PropertyType::Link(_))
    }

    /// Value a new record gets when none is supplied
    pub fn default_value(&self) -> Value {
        match &self.default {
            Some(value) => value.clone(),
            None if self.is_nullable() => Value::Null,
            None => self.property_type.zero_value(),
        }
    }

    /// Check a value against this declaration, returning the stored form
    pub fn check(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return if self.is_nullable() {
                Ok(Value::Null)
            } else {
                Err(Error::TypeMismatch {
                    property: self.name.clone(),
                    expected: self.property_type.to_string(),
                    got: "nil".to_string(),
                })
            };
        }
        let got = value.type_name();
        self.property_type
            .coerce(value)
            .ok_or_else(|| Error::TypeMismatch {
                property: self.name.clone(),
                expected: self.property_type.to_string(),
                got: got.to_string(),
            })
    }
}

/// Declaration of a record type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordType {
    /// Unique type name
    pub name: TypeName,
    /// Properties in declaration order
    pub properties: Vec<PropertyDef>,
    /// Name of the primary-key property
    #[serde(default)]
    pub primary_key: Option<String>,
    /// Names of properties with a secondary index
    #[serde(default)]
    pub indexed: Vec<String>,
}

/// Shared handle to a registered record type
pub type RecordTypeHandle = Arc<RecordType>;

impl RecordType {
    /// Create a new record type with no properties
    pub fn new(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            primary_key: None,
            indexed: Vec::new(),
        }
    }

    /// Add a property declaration
    pub fn with_property(mut self, prop: PropertyDef) -> Self {
        self.properties.push(prop);
        self
    }

    /// Declare the primary-key property
    pub fn with_primary_key(mut self, property: impl Into<String>) -> Self {
        self.primary_key = Some(property.into());
        self
    }

    /// Declare secondary indexes
    pub fn with_indexed<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexed.extend(properties.into_iter().map(Into::into));
        self
    }

    /// Look up a property declaration
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Look up a property declaration, failing with `UnknownProperty`
    pub fn require_property(&self, name: &str) -> Result<&PropertyDef> {
        self.property(name)
            .ok_or_else(|| Error::unknown_property(self.name.as_str(), name))
    }

    /// Whether a secondary index is declared on `property`
    pub fn is_indexed(&self, property: &str) -> bool {
        self.indexed.iter().any(|p| p == property)
    }

    /// Whether `property` is the primary key
    pub fn is_primary_key(&self, property: &str) -> bool {
        self.primary_key.as_deref() == Some(property)
    }

    /// Check the declaration for internal consistency
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidSchema(format!("{}: {}", self.name, msg)));

        if self.name.as_str().is_empty() {
            return Err(Error::InvalidSchema("type name is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for prop in &self.properties {
            if prop.name.is_empty() || prop.name.contains('.') {
                return invalid(format!("invalid property name '{}'", prop.name));
            }
            if !seen.insert(prop.name.as_str()) {
                return invalid(format!("property '{}' declared twice", prop.name));
            }
            if let PropertyType::List(element) = &prop.property_type {
                if prop.nullable {
                    return invalid(format!("list property '{}' cannot be nullable", prop.name));
                }
                if matches!(**element, PropertyType::List(_)) {
                    return invalid(format!("nested list property '{}'", prop.name));
                }
            }
            if let Some(default) = &prop.default {
                prop.check(default.clone())?;
            }
        }

        if let Some(key) = &self.primary_key {
            let Some(prop) = self.property(key) else {
                return invalid(format!("primary key '{}' is not a declared property", key));
            };
            if !matches!(prop.property_type, PropertyType::Int | PropertyType::String) {
                return invalid(format!(
                    "primary key '{}' must be int or string, not {}",
                    key, prop.property_type
                ));
            }
            if prop.nullable {
                return invalid(format!("primary key '{}' cannot be nullable", key));
            }
        }

        let mut indexed = HashSet::new();
        for name in &self.indexed {
            let Some(prop) = self.property(name) else {
                return invalid(format!("indexed property '{}' is not declared", name));
            };
            if !prop.property_type.is_indexable() {
                return invalid(format!(
                    "property '{}' of type {} cannot be indexed",
                    name, prop.property_type
                ));
            }
            if !indexed.insert(name.as_str()) {
                return invalid(format!("property '{}' indexed twice", name));
            }
        }

        Ok(())
    }

    /// Check a full set of values for a new record
    ///
    /// Rejects undeclared properties, checks every supplied value and fills
    /// the rest with defaults. The result is in declaration order.
    pub fn normalize(&self, mut values: ValueMap) -> Result<ValueMap> {
        if let Some(unknown) = values.keys().find(|k| self.property(k).is_none()) {
            return Err(Error::unknown_property(self.name.as_str(), unknown.as_str()));
        }
        let mut out = ValueMap::with_capacity(self.properties.len());
        for prop in &self.properties {
            let value = match values.shift_remove(&prop.name) {
                Some(v) => prop.check(v)?,
                None => prop.default_value(),
            };
            out.insert(prop.name.clone(), value);
        }
        Ok(out)
    }

    /// Check a single property assignment
    pub fn check_value(&self, property: &str, value: Value) -> Result<Value> {
        self.require_property(property)?.check(value)
    }
}

/// Catalog of registered record types
///
/// Append-only: once registered, a type's declaration never changes, so it
/// is safe to share between the store, its snapshots and transactions.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    types: RwLock<IndexMap<TypeName, RecordTypeHandle>>,
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record type
    ///
    /// Registering an identical declaration again returns the existing
    /// handle; a different declaration under the same name is a
    /// `SchemaConflict`.
    pub fn register(&self, record_type: RecordType) -> Result<RecordTypeHandle> {
        record_type.validate()?;

        let mut types = self.types.write();
        if let Some(existing) = types.get(&record_type.name) {
            if **existing == record_type {
                return Ok(Arc::clone(existing));
            }
            return Err(Error::SchemaConflict(record_type.name.to_string()));
        }

        tracing::info!(
            target: "trove::schema",
            type_name = %record_type.name,
            properties = record_type.properties.len(),
            primary_key = ?record_type.primary_key,
            "Registered record type"
        );
        let handle = Arc::new(record_type);
        types.insert(handle.name.clone(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Resolve a type by name, failing with `UnknownType`
    pub fn resolve(&self, name: &str) -> Result<RecordTypeHandle> {
        self.get(name)
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    /// Look up a type by name
    pub fn get(&self, name: &str) -> Option<RecordTypeHandle> {
        self.types.read().get(name).cloned()
    }

    /// Check if a type is registered
    pub fn contains(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }

    /// All registered types in registration order
    pub fn types(&self) -> Vec<RecordTypeHandle> {
        self.types.read().values().cloned().collect()
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    /// Check if no type is registered
    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}
