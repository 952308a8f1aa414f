//! Lazy, snapshot-bound query results
//!
//! A [`ResultSet`] is a record type, an optional predicate and an optional
//! sort order bound to one [`Snapshot`]. Nothing is evaluated until an
//! element, the count or an aggregate is first requested, and evaluation
//! then happens once. Later commits are never visible through it; call
//! [`ResultSet::rebind`] to re-run the same query against the latest state.

use crate::aggregate;
use crate::error::Result;
use crate::snapshot::{ReadView, Snapshot};
use crate::store::Store;
use crate::table::TypeTable;
use std::sync::{Arc, OnceLock};
use trove_core::{ObjectRef, Predicate, Record, RecordTypeHandle, Value};

#[derive(Debug, Clone, PartialEq)]
struct SortKey {
    property: String,
    ascending: bool,
}

/// Records of one type matching a predicate, as of one snapshot
#[derive(Debug, Clone)]
pub struct ResultSet {
    snapshot: Snapshot,
    record_type: RecordTypeHandle,
    predicate: Option<Predicate>,
    sort: Option<SortKey>,
    matched: OnceLock<Vec<Arc<Record>>>,
}

impl ResultSet {
    /// All records of `type_name` in `snapshot`
    pub fn new(snapshot: Snapshot, type_name: &str) -> Result<Self> {
        let record_type = snapshot.registry().resolve(type_name)?;
        Ok(Self {
            snapshot,
            record_type,
            predicate: None,
            sort: None,
            matched: OnceLock::new(),
        })
    }

    fn derive(&self, predicate: Option<Predicate>, sort: Option<SortKey>) -> Self {
        Self {
            snapshot: self.snapshot.clone(),
            record_type: Arc::clone(&self.record_type),
            predicate,
            sort,
            matched: OnceLock::new(),
        }
    }

    /// Narrow the results; predicates combine with AND
    ///
    /// Key paths are checked against the schema here, so an unknown
    /// property fails when the filter is built rather than when it runs.
    pub fn filter(&self, predicate: Predicate) -> Result<ResultSet> {
        predicate.validate(&self.record_type, self.snapshot.registry())?;
        let combined = match &self.predicate {
            Some(existing) => existing.clone().and(predicate),
            None => predicate,
        };
        Ok(self.derive(Some(combined), self.sort.clone()))
    }

    /// Narrow the results with a textual predicate
    pub fn filter_str(&self, predicate: &str, params: &[Value]) -> Result<ResultSet> {
        self.filter(Predicate::parse(predicate, params)?)
    }

    /// Order the results by a property; ties keep allocation order
    pub fn sorted(&self, property: &str, ascending: bool) -> Result<ResultSet> {
        self.record_type.require_property(property)?;
        let sort = SortKey {
            property: property.to_string(),
            ascending,
        };
        Ok(self.derive(self.predicate.clone(), Some(sort)))
    }

    /// The same query against the store's latest snapshot
    pub fn rebind(&self, store: &Store) -> Result<ResultSet> {
        let mut rebound = ResultSet::new(store.snapshot(), self.record_type.name.as_str())?;
        rebound.predicate = self.predicate.clone();
        rebound.sort = self.sort.clone();
        Ok(rebound)
    }

    /// Version of the snapshot these results are bound to
    pub fn version(&self) -> u64 {
        self.snapshot.version()
    }

    /// The snapshot these results are bound to
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// The record type being queried
    pub fn record_type(&self) -> &RecordTypeHandle {
        &self.record_type
    }

    /// The combined predicate, if any
    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// Whether the query has run yet
    pub fn is_evaluated(&self) -> bool {
        self.matched.get().is_some()
    }

    fn records(&self) -> &[Arc<Record>] {
        self.matched.get_or_init(|| self.evaluate())
    }

    fn evaluate(&self) -> Vec<Arc<Record>> {
        let Some(table) = self.snapshot.table(self.record_type.name.as_str()) else {
            return Vec::new();
        };
        let mut records = match &self.predicate {
            None => table.iter().cloned().collect(),
            Some(predicate) => self.matching(table, predicate),
        };
        if let Some(sort) = &self.sort {
            records.sort_by(|a, b| {
                let ord = a
                    .get_or_null(&sort.property)
                    .total_cmp(b.get_or_null(&sort.property));
                if sort.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        tracing::trace!(
            target: "trove::query",
            type_name = %self.record_type.name,
            version = self.snapshot.version(),
            matched = records.len(),
            "Evaluated result set"
        );
        records
    }

    fn matching(&self, table: &TypeTable, predicate: &Predicate) -> Vec<Arc<Record>> {
        let candidates = predicate
            .leading_comparison()
            .and_then(|leading| table.indexes().range_scan(leading));
        match candidates {
            Some(mut ids) => {
                ids.sort_unstable();
                ids.dedup();
                ids.into_iter()
                    .filter_map(|id| table.get(id))
                    .filter(|r| predicate.evaluate(r, &self.snapshot))
                    .cloned()
                    .collect()
            }
            None => table
                .iter()
                .filter(|r| predicate.evaluate(r, &self.snapshot))
                .cloned()
                .collect(),
        }
    }

    /// Number of matching records
    pub fn len(&self) -> usize {
        self.records().len()
    }

    /// Check if nothing matches
    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    /// Record at `index`
    pub fn get(&self, index: usize) -> Option<Arc<Record>> {
        self.records().get(index).cloned()
    }

    /// First record
    pub fn first(&self) -> Option<Arc<Record>> {
        self.records().first().cloned()
    }

    /// Last record
    pub fn last(&self) -> Option<Arc<Record>> {
        self.records().last().cloned()
    }

    /// Iterate over matching records
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Record>> {
        self.records().iter()
    }

    /// Copy the matching records out
    pub fn to_vec(&self) -> Vec<Arc<Record>> {
        self.records().to_vec()
    }

    /// Handles of the matching records
    pub fn refs(&self) -> Vec<ObjectRef> {
        self.records().iter().map(|r| r.object_ref()).collect()
    }

    /// Position of a record
    pub fn index_of(&self, object: &ObjectRef) -> Option<usize> {
        self.records().iter().position(|r| r.is(object))
    }

    /// Position of the first record for which `f` returns true
    pub fn index_where<F>(&self, mut f: F) -> Option<usize>
    where
        F: FnMut(&Record) -> bool,
    {
        self.records().iter().position(|r| f(r))
    }

    /// Position of the first record matching a textual predicate
    pub fn index_matching(&self, predicate: &str, params: &[Value]) -> Result<Option<usize>> {
        let predicate = Predicate::parse(predicate, params)?;
        predicate.validate(&self.record_type, self.snapshot.registry())?;
        Ok(self
            .records()
            .iter()
            .position(|r| predicate.evaluate(r, &self.snapshot)))
    }

    /// Smallest value of an int, float or date property
    pub fn min(&self, property: &str) -> Result<Option<Value>> {
        aggregate::comparable(&self.record_type, property)?;
        Ok(aggregate::min(self.values_of(property)))
    }

    /// Largest value of an int, float or date property
    pub fn max(&self, property: &str) -> Result<Option<Value>> {
        aggregate::comparable(&self.record_type, property)?;
        Ok(aggregate::max(self.values_of(property)))
    }

    /// Sum of an int or float property
    pub fn sum(&self, property: &str) -> Result<Value> {
        aggregate::numeric(&self.record_type, property)?;
        Ok(aggregate::sum(self.values_of(property)))
    }

    /// Mean of an int or float property
    pub fn average(&self, property: &str) -> Result<Option<f64>> {
        aggregate::numeric(&self.record_type, property)?;
        Ok(aggregate::average(self.values_of(property)))
    }

    fn values_of<'a>(&'a self, property: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.records().iter().map(move |r| r.get_or_null(property))
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Arc<Record>;
    type IntoIter = std::slice::Iter<'a, Arc<Record>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use trove_core::{values, PropertyDef, RecordType};

    fn store() -> Store {
        let store = Store::new();
        store
            .register(
                RecordType::new("Person")
                    .with_property(PropertyDef::int("id"))
                    .with_property(PropertyDef::string("firstName"))
                    .with_property(PropertyDef::int("hairCount"))
                    .with_property(PropertyDef::date("deceased").nullable())
                    .with_primary_key("id")
                    .with_indexed(["firstName"]),
            )
            .unwrap();
        store
            .write(|txn| {
                for (id, name, hair) in [(1, "John", 900), (2, "Jane", 12000), (3, "Marin", 40)] {
                    txn.create(
                        "Person",
                        values! { "id" => id, "firstName" => name, "hairCount" => hair },
                    )?;
                }
                Ok::<_, Error>(())
            })
            .unwrap();
        store
    }

    #[test]
    fn test_objects_in_allocation_order() {
        let store = store();
        let people = store.objects("Person").unwrap();
        let names: Vec<_> = people.iter().filter_map(|r| r.get_str("firstName")).collect();
        assert_eq!(names, vec!["John", "Jane", "Marin"]);
    }

    #[test]
    fn test_lazy_evaluation() {
        let store = store();
        let people = store.filter("Person", "id < 3", &[]).unwrap();
        assert!(!people.is_evaluated());
        assert_eq!(people.len(), 2);
        assert!(people.is_evaluated());
    }

    #[test]
    fn test_filters_combine_with_and() {
        let store = store();
        let people = store
            .filter("Person", "hairCount > 100", &[])
            .unwrap()
            .filter_str("firstName BEGINSWITH %s", &[Value::from("J")])
            .unwrap()
            .filter(Predicate::ne("id", 1))
            .unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people.first().unwrap().get_str("firstName"), Some("Jane"));
    }

    #[test]
    fn test_indexed_filter_keeps_allocation_order() {
        let store = store();
        let people = store
            .filter("Person", "firstName IN {'Marin', 'John'}", &[])
            .unwrap();
        let ids: Vec<_> = people.iter().filter_map(|r| r.get_int("id")).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_unknown_property_fails_at_build_time() {
        let store = store();
        let err = store.filter("Person", "shoeSize = 3", &[]).unwrap_err();
        assert!(matches!(
            err,
            Error::Core(trove_core::Error::UnknownProperty { .. })
        ));
    }

    #[test]
    fn test_nil_filter() {
        let store = store();
        assert_eq!(store.filter("Person", "deceased = nil", &[]).unwrap().len(), 3);
        assert!(store.filter("Person", "deceased != nil", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_positions() {
        let store = store();
        let people = store.objects("Person").unwrap();
        let marin = people.get(2).unwrap().object_ref();
        assert_eq!(people.index_of(&marin), Some(2));
        assert_eq!(
            people.index_where(|r| r.get_str("firstName") == Some("Jane")),
            Some(1)
        );
        assert_eq!(
            people
                .index_matching("hairCount < %d", &[Value::Int(1000)])
                .unwrap(),
            Some(0)
        );
        assert_eq!(
            people
                .index_matching("hairCount < %d", &[Value::Int(10)])
                .unwrap(),
            None
        );
        assert_eq!(people.last().unwrap().object_ref(), marin);
        assert!(people.get(3).is_none());
    }

    #[test]
    fn test_aggregates() {
        let store = store();
        let people = store.objects("Person").unwrap();
        assert_eq!(people.min("hairCount").unwrap(), Some(Value::Int(40)));
        assert_eq!(people.max("hairCount").unwrap(), Some(Value::Int(12000)));
        assert_eq!(people.sum("hairCount").unwrap(), Value::Int(12940));
        assert_eq!(people.min("deceased").unwrap(), None);
        assert!(people.sum("firstName").is_err());

        let empty = store.filter("Person", "FALSEPREDICATE", &[]).unwrap();
        assert_eq!(empty.average("hairCount").unwrap(), None);
    }

    #[test]
    fn test_sorted() {
        let store = store();
        let people = store.objects("Person").unwrap().sorted("hairCount", false).unwrap();
        let ids: Vec<_> = people.iter().filter_map(|r| r.get_int("id")).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert!(store.objects("Person").unwrap().sorted("age", true).is_err());
    }

    #[test]
    fn test_bound_to_snapshot_until_rebind() {
        let store = store();
        let people = store.objects("Person").unwrap();
        let version = people.version();

        store
            .write(|txn| {
                txn.create("Person", values! { "id" => 4, "firstName" => "Ann" })?;
                Ok::<_, Error>(())
            })
            .unwrap();

        assert_eq!(people.len(), 3);
        assert_eq!(people.version(), version);

        let rebound = people.rebind(&store).unwrap();
        assert_eq!(rebound.len(), 4);
        assert_eq!(rebound.version(), version + 1);
    }

    #[test]
    fn test_result_set_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ResultSet>();
    }
}
