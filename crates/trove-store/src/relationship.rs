//! Relationship layer
//!
//! To-one relationships are `Link(T)` properties holding a
//! [`Value::Link`] or nil. To-many relationships are `List(Link(T))`
//! properties holding an ordered list of links. Links are weak: deleting
//! the target leaves the reference in place and it resolves to `None`.
//! Targets are checked once, when a link is assigned.

use crate::aggregate;
use crate::error::{Error, Result};
use crate::snapshot::ReadView;
use std::sync::Arc;
use trove_core::{
    ObjectRef, PropertyDef, PropertyType, Record, RecordType, RecordTypeHandle, Value, ValueMap,
};

/// Follow a to-one relationship
///
/// Returns `None` for a nil link and for a link whose target was deleted.
pub fn resolve_link<V: ReadView + ?Sized>(
    view: &V,
    record: &Record,
    property: &str,
) -> Result<Option<Arc<Record>>> {
    let record_type = view.registry().resolve(record.type_name.as_str())?;
    let prop = record_type.require_property(property)?;
    if prop.property_type.link_target().is_none() {
        return Err(Error::NotARelationship(property.to_string()));
    }
    Ok(record.get_link(property).and_then(|target| view.get(target)))
}

/// Open a to-many relationship for reading
pub fn link_list<'a, V: ReadView + ?Sized>(
    view: &'a V,
    record: &Record,
    property: &str,
) -> Result<LinkList<'a, V>> {
    let record_type = view.registry().resolve(record.type_name.as_str())?;
    let prop = record_type.require_property(property)?;
    let target = prop
        .property_type
        .list_target()
        .ok_or_else(|| Error::NotARelationship(property.to_string()))?;
    let target = view.registry().resolve(target.as_str())?;
    let refs = record
        .get_or_null(property)
        .as_list()
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.as_link().cloned())
        .collect();
    Ok(LinkList { view, target, refs })
}

/// Open a list property of primitive values for reading
pub fn value_list<V: ReadView + ?Sized>(
    view: &V,
    record: &Record,
    property: &str,
) -> Result<ValueList> {
    let record_type = view.registry().resolve(record.type_name.as_str())?;
    let prop = record_type.require_property(property)?;
    if prop.property_type.list_element().is_none() {
        return Err(Error::NotAList(property.to_string()));
    }
    let values = record
        .get_or_null(property)
        .as_list()
        .unwrap_or_default()
        .to_vec();
    Ok(ValueList { values })
}

/// An ordered to-many relationship read through a view
///
/// Entries are kept even when their target has been deleted; `len` counts
/// them, while `iter` and the aggregates skip them.
pub struct LinkList<'a, V: ReadView + ?Sized> {
    view: &'a V,
    target: RecordTypeHandle,
    refs: Vec<ObjectRef>,
}

impl<'a, V: ReadView + ?Sized> LinkList<'a, V> {
    /// Number of entries, including repeated and dangling ones
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Check if the list has no entries
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// The raw references in list order
    pub fn refs(&self) -> &[ObjectRef] {
        &self.refs
    }

    /// Resolve the entry at `index`; `None` past the end or if dangling
    pub fn get(&self, index: usize) -> Option<Arc<Record>> {
        self.refs.get(index).and_then(|r| self.view.get(r))
    }

    /// Resolved records in list order, skipping dangling entries
    pub fn iter(&self) -> impl Iterator<Item = Arc<Record>> + '_ {
        self.refs.iter().filter_map(|r| self.view.get(r))
    }

    /// Position of the first entry pointing at `object`
    pub fn index_of(&self, object: &ObjectRef) -> Option<usize> {
        self.refs.iter().position(|r| r == object)
    }

    /// Smallest value of `property` over the resolved records
    pub fn min(&self, property: &str) -> Result<Option<Value>> {
        aggregate::comparable(&self.target, property)?;
        let records: Vec<_> = self.iter().collect();
        Ok(aggregate::min(records.iter().map(|r| r.get_or_null(property))))
    }

    /// Largest value of `property` over the resolved records
    pub fn max(&self, property: &str) -> Result<Option<Value>> {
        aggregate::comparable(&self.target, property)?;
        let records: Vec<_> = self.iter().collect();
        Ok(aggregate::max(records.iter().map(|r| r.get_or_null(property))))
    }

    /// Sum of `property` over the resolved records
    pub fn sum(&self, property: &str) -> Result<Value> {
        aggregate::numeric(&self.target, property)?;
        let records: Vec<_> = self.iter().collect();
        Ok(aggregate::sum(records.iter().map(|r| r.get_or_null(property))))
    }

    /// Mean of `property` over the resolved records
    pub fn average(&self, property: &str) -> Result<Option<f64>> {
        aggregate::numeric(&self.target, property)?;
        let records: Vec<_> = self.iter().collect();
        Ok(aggregate::average(records.iter().map(|r| r.get_or_null(property))))
    }
}

/// A list of primitive values (plates, checkup dates, sticker ids)
#[derive(Debug, Clone, PartialEq)]
pub struct ValueList {
    values: Vec<Value>,
}

impl ValueList {
    /// Number of elements
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Element at `index`
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// First element
    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }

    /// Last element
    pub fn last(&self) -> Option<&Value> {
        self.values.last()
    }

    /// Smallest element
    pub fn min(&self) -> Option<Value> {
        aggregate::min(&self.values)
    }

    /// Largest element
    pub fn max(&self) -> Option<Value> {
        aggregate::max(&self.values)
    }

    /// Elements in order
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    /// Elements as a slice
    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }
}

/// Check that `target` may be stored in relationship `prop`
pub(crate) fn check_link_target<V: ReadView + ?Sized>(
    view: &V,
    prop: &PropertyDef,
    target: &ObjectRef,
) -> Result<()> {
    let expected = prop
        .property_type
        .link_target()
        .or_else(|| prop.property_type.list_target())
        .ok_or_else(|| Error::NotARelationship(prop.name.clone()))?;
    if target.type_name != *expected {
        return Err(Error::RelationshipTypeMismatch {
            property: prop.name.clone(),
            expected: expected.to_string(),
            got: target.type_name.to_string(),
        });
    }
    if view.get(target).is_none() {
        return Err(Error::NotFound(target.to_string()));
    }
    Ok(())
}

/// Check the links among `values` against their declared relationships
///
/// Only newly assigned targets are checked: a link equal to the one in
/// `previous`, or a list entry already present there, may dangle.
pub(crate) fn check_links<V: ReadView + ?Sized>(
    view: &V,
    record_type: &RecordType,
    values: &ValueMap,
    previous: Option<&Record>,
) -> Result<()> {
    for (name, value) in values {
        let Some(prop) = record_type.property(name) else {
            continue;
        };
        let before = previous.map(|r| r.get_or_null(name));
        match (&prop.property_type, value) {
            (PropertyType::Link(_), Value::Link(target)) => {
                if before != Some(value) {
                    check_link_target(view, prop, target)?;
                }
            }
            (PropertyType::List(element), Value::List(items))
                if matches!(**element, PropertyType::Link(_)) =>
            {
                let kept = before.and_then(Value::as_list).unwrap_or_default();
                for target in items.iter().filter_map(Value::as_link) {
                    if !kept.iter().any(|v| v.as_link() == Some(target)) {
                        check_link_target(view, prop, target)?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}
