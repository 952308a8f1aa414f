//! Primary-key and secondary indexes
//!
//! Each type table owns one [`IndexSet`]. Indexes are ordered maps keyed by
//! [`IndexKey`] (a value under its total order) and are maintained
//! incrementally by the table on every insert, update and delete, so a
//! committed snapshot always carries indexes that match its records exactly.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use trove_core::{CompareOp, ObjectId, Predicate, RecordType, TypeName, Value, ValueMap};

/// A value ordered by [`Value::total_cmp`]
#[derive(Debug, Clone)]
pub struct IndexKey(pub Value);

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone)]
struct PrimaryIndex {
    property: String,
    keys: BTreeMap<IndexKey, ObjectId>,
}

type SecondaryIndex = BTreeMap<IndexKey, BTreeSet<ObjectId>>;

fn key_of(values: &ValueMap, property: &str) -> IndexKey {
    IndexKey(values.get(property).cloned().unwrap_or(Value::Null))
}

/// All indexes of one record type
#[derive(Debug, Clone)]
pub struct IndexSet {
    type_name: TypeName,
    primary: Option<PrimaryIndex>,
    secondary: IndexMap<String, SecondaryIndex>,
}

impl IndexSet {
    /// Create empty indexes for a record type's declared keys
    pub fn for_type(record_type: &RecordType) -> Self {
        Self {
            type_name: record_type.name.clone(),
            primary: record_type.primary_key.as_ref().map(|property| PrimaryIndex {
                property: property.clone(),
                keys: BTreeMap::new(),
            }),
            secondary: record_type
                .indexed
                .iter()
                .map(|p| (p.clone(), SecondaryIndex::new()))
                .collect(),
        }
    }

    /// Name of the primary-key property
    pub fn primary_property(&self) -> Option<&str> {
        self.primary.as_ref().map(|p| p.property.as_str())
    }

    /// Whether `property` has a primary or secondary index
    pub fn has_index(&self, property: &str) -> bool {
        self.primary_property() == Some(property) || self.secondary.contains_key(property)
    }

    /// Number of keys in the primary-key index
    pub fn primary_len(&self) -> usize {
        self.primary.as_ref().map(|p| p.keys.len()).unwrap_or(0)
    }

    /// Check that `values` can be stored under `id` without a key collision
    ///
    /// Pass `None` for a record that has no id yet.
    pub fn check_key(&self, id: Option<ObjectId>, values: &ValueMap) -> Result<()> {
        let Some(primary) = &self.primary else {
            return Ok(());
        };
        let key = key_of(values, &primary.property);
        match primary.keys.get(&key) {
            Some(holder) if Some(*holder) != id => Err(Error::DuplicateKey {
                type_name: self.type_name.to_string(),
                property: primary.property.clone(),
                key: key.0.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Index a new record
    pub fn on_insert(&mut self, id: ObjectId, values: &ValueMap) -> Result<()> {
        self.check_key(Some(id), values)?;
        if let Some(primary) = &mut self.primary {
            primary.keys.insert(key_of(values, &primary.property), id);
        }
        for (property, index) in &mut self.secondary {
            index.entry(key_of(values, property)).or_default().insert(id);
        }
        Ok(())
    }

    /// Re-index a record whose values changed from `old` to `new`
    pub fn on_update(&mut self, id: ObjectId, old: &ValueMap, new: &ValueMap) -> Result<()> {
        self.check_key(Some(id), new)?;
        if let Some(primary) = &mut self.primary {
            let old_key = key_of(old, &primary.property);
            let new_key = key_of(new, &primary.property);
            if old_key != new_key {
                primary.keys.remove(&old_key);
                primary.keys.insert(new_key, id);
            }
        }
        for (property, index) in &mut self.secondary {
            let old_key = key_of(old, property);
            let new_key = key_of(new, property);
            if old_key != new_key {
                remove_from(index, &old_key, id);
                index.entry(new_key).or_default().insert(id);
            }
        }
        Ok(())
    }

    /// Drop a deleted record from every index
    pub fn on_delete(&mut self, id: ObjectId, old: &ValueMap) {
        if let Some(primary) = &mut self.primary {
            let key = key_of(old, &primary.property);
            if primary.keys.get(&key) == Some(&id) {
                primary.keys.remove(&key);
            }
        }
        for (property, index) in &mut self.secondary {
            remove_from(index, &key_of(old, property), id);
        }
    }

    /// Find the record holding a primary-key value
    pub fn lookup_by_key(&self, key: &Value) -> Option<ObjectId> {
        let primary = self.primary.as_ref()?;
        primary.keys.get(&IndexKey(key.clone())).copied()
    }

    /// Candidate ids for a comparison on one indexed property
    ///
    /// Answers `=`, `<`, `<=`, `>`, `>=` and `IN` on a primary-key or
    /// secondary index, ordered by key value then id. Returns `None` when the
    /// predicate cannot be answered from an index; the caller then scans.
    /// The result holds exactly the ids a full scan would match.
    pub fn range_scan(&self, predicate: &Predicate) -> Option<Vec<ObjectId>> {
        let mut ids = Vec::new();
        match predicate {
            Predicate::Compare {
                path,
                op,
                value,
                case_insensitive: false,
            } if op.is_range() => {
                let index = self.index_for(path)?;
                let (lower, upper) = bounds(*op, value);
                index.collect(lower, upper, |k| op.matches(k, value, false), &mut ids);
            }
            Predicate::In { path, values } => {
                let index = self.index_for(path)?;
                let mut wanted: Vec<&Value> = values.iter().collect();
                wanted.sort_by(|a, b| a.total_cmp(b));
                wanted.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
                for v in wanted {
                    let key = IndexKey(v.clone());
                    index.collect(
                        Bound::Included(key.clone()),
                        Bound::Included(key),
                        |k| CompareOp::Eq.matches(k, v, false),
                        &mut ids,
                    );
                }
            }
            _ => return None,
        }
        Some(ids)
    }

    fn index_for(&self, property: &str) -> Option<IndexRef<'_>> {
        if let Some(index) = self.secondary.get(property) {
            return Some(IndexRef::Secondary(index));
        }
        self.primary
            .as_ref()
            .filter(|p| p.property == property)
            .map(|p| IndexRef::Primary(&p.keys))
    }
}

enum IndexRef<'a> {
    Primary(&'a BTreeMap<IndexKey, ObjectId>),
    Secondary(&'a SecondaryIndex),
}

impl IndexRef<'_> {
    fn collect(
        &self,
        lower: Bound<IndexKey>,
        upper: Bound<IndexKey>,
        keep: impl Fn(&Value) -> bool,
        out: &mut Vec<ObjectId>,
    ) {
        match self {
            IndexRef::Primary(keys) => out.extend(
                keys.range((lower, upper))
                    .filter(|(k, _)| keep(&k.0))
                    .map(|(_, id)| *id),
            ),
            IndexRef::Secondary(index) => out.extend(
                index
                    .range((lower, upper))
                    .filter(|(k, _)| keep(&k.0))
                    .flat_map(|(_, ids)| ids.iter().copied()),
            ),
        }
    }
}

fn bounds(op: CompareOp, value: &Value) -> (Bound<IndexKey>, Bound<IndexKey>) {
    let key = IndexKey(value.clone());
    match op {
        CompareOp::Eq => (Bound::Included(key.clone()), Bound::Included(key)),
        CompareOp::Lt => (Bound::Unbounded, Bound::Excluded(key)),
        CompareOp::Le => (Bound::Unbounded, Bound::Included(key)),
        CompareOp::Gt => (Bound::Excluded(key), Bound::Unbounded),
        CompareOp::Ge => (Bound::Included(key), Bound::Unbounded),
        _ => (Bound::Unbounded, Bound::Unbounded),
    }
}

fn remove_from(index: &mut SecondaryIndex, key: &IndexKey, id: ObjectId) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(&id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trove_core::{values, PropertyDef};

    fn person() -> RecordType {
        RecordType::new("Person")
            .with_property(PropertyDef::int("id"))
            .with_property(PropertyDef::string("firstName"))
            .with_property(PropertyDef::string("lastName").nullable())
            .with_primary_key("id")
            .with_indexed(["firstName", "lastName"])
    }

    fn indexed() -> IndexSet {
        let mut set = IndexSet::for_type(&person());
        set.on_insert(ObjectId(0), &values! { "id" => 1, "firstName" => "John", "lastName" => "Smith" })
            .unwrap();
        set.on_insert(ObjectId(1), &values! { "id" => 2, "firstName" => "Jane", "lastName" => Value::Null })
            .unwrap();
        set.on_insert(ObjectId(2), &values! { "id" => 3, "firstName" => "John", "lastName" => "Doe" })
            .unwrap();
        set
    }

    #[test]
    fn test_lookup_by_key() {
        let set = indexed();
        assert_eq!(set.lookup_by_key(&Value::Int(2)), Some(ObjectId(1)));
        assert_eq!(set.lookup_by_key(&Value::Int(9)), None);
        assert_eq!(set.primary_len(), 3);
    }

    #[test]
    fn test_duplicate_key_leaves_indexes_untouched() {
        let mut set = indexed();
        let err = set
            .on_insert(ObjectId(3), &values! { "id" => 1, "firstName" => "Mallory" })
            .unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(set.lookup_by_key(&Value::Int(1)), Some(ObjectId(0)));
        assert_eq!(
            set.range_scan(&Predicate::eq("firstName", "Mallory")),
            Some(vec![])
        );
    }

    #[test]
    fn test_update_moves_keys() {
        let mut set = indexed();
        let old = values! { "id" => 1, "firstName" => "John", "lastName" => "Smith" };
        let new = values! { "id" => 10, "firstName" => "Johnny", "lastName" => "Smith" };
        set.on_update(ObjectId(0), &old, &new).unwrap();

        assert_eq!(set.lookup_by_key(&Value::Int(1)), None);
        assert_eq!(set.lookup_by_key(&Value::Int(10)), Some(ObjectId(0)));
        assert_eq!(
            set.range_scan(&Predicate::eq("firstName", "John")),
            Some(vec![ObjectId(2)])
        );

        // Keeping its own key is not a collision
        set.on_update(ObjectId(0), &new, &new).unwrap();
        // Taking another record's key is
        let stolen = values! { "id" => 2, "firstName" => "Johnny" };
        assert!(set.on_update(ObjectId(0), &new, &stolen).is_err());
    }

    #[test]
    fn test_delete() {
        let mut set = indexed();
        set.on_delete(ObjectId(0), &values! { "id" => 1, "firstName" => "John", "lastName" => "Smith" });
        assert_eq!(set.lookup_by_key(&Value::Int(1)), None);
        assert_eq!(
            set.range_scan(&Predicate::eq("firstName", "John")),
            Some(vec![ObjectId(2)])
        );
    }

    #[test]
    fn test_range_scan_ops() {
        let set = indexed();
        assert_eq!(
            set.range_scan(&Predicate::lt("id", 3)),
            Some(vec![ObjectId(0), ObjectId(1)])
        );
        assert_eq!(
            set.range_scan(&Predicate::ge("id", 2.5)),
            Some(vec![ObjectId(2)])
        );
        assert_eq!(
            set.range_scan(&Predicate::in_list("id", [3, 1, 3])),
            Some(vec![ObjectId(0), ObjectId(2)])
        );
        // Nil keys sit below every string but never satisfy an ordering
        assert_eq!(
            set.range_scan(&Predicate::lt("lastName", "Z")),
            Some(vec![ObjectId(2), ObjectId(0)])
        );
        assert_eq!(
            set.range_scan(&Predicate::is_nil("lastName")),
            Some(vec![ObjectId(1)])
        );
    }

    #[test]
    fn test_range_scan_declines_unindexed() {
        let set = indexed();
        assert_eq!(set.range_scan(&Predicate::eq("born", 1)), None);
        assert_eq!(set.range_scan(&Predicate::ne("id", 1)), None);
        assert_eq!(
            set.range_scan(&Predicate::eq("firstName", "john").ignoring_case()),
            None
        );
        assert_eq!(
            set.range_scan(&Predicate::compare("firstName", CompareOp::BeginsWith, "J")),
            None
        );
    }
}
