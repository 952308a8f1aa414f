//! End-to-end tests for the storage engine

use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use trove_core::{values, CompareOp, ObjectId, Predicate, PropertyDef, RecordType, Value};
use trove_store::{Error, ReadView, Store, TypeTable, WriterWait};

fn person_store() -> Store {
    let store = Store::new();
    store
        .register(
            RecordType::new("Person")
                .with_property(PropertyDef::int("id"))
                .with_property(PropertyDef::string("name"))
                .with_property(PropertyDef::int("age"))
                .with_property(PropertyDef::int("shadowAge"))
                .with_primary_key("id")
                .with_indexed(["age", "name"]),
        )
        .unwrap();
    store
}

fn scan_matching(table: &TypeTable, property: &str, keep: impl Fn(&Value) -> bool) -> Vec<ObjectId> {
    table
        .iter()
        .filter(|record| keep(record.get_or_null(property)))
        .map(|record| record.id)
        .collect()
}

fn add_person(store: &Store, id: i64, name: &str, age: i64) -> Result<(), Error> {
    store.write(|txn| {
        txn.create(
            "Person",
            values! { "id" => id, "name" => name, "age" => age, "shadowAge" => age },
        )
        .map(|_| ())
    })
}

#[test]
fn test_person_scenario() {
    let store = person_store();
    add_person(&store, 1, "Ada", 36).unwrap();
    add_person(&store, 2, "Bob", 41).unwrap();
    add_person(&store, 3, "Cy", 29).unwrap();
    assert_eq!(store.version(), 3);

    let young_ids = store.filter("Person", "id < 3", &[]).unwrap();
    assert_eq!(young_ids.len(), 2);

    let err = add_person(&store, 1, "Dup", 50).unwrap_err();
    assert!(err.is_duplicate_key());
    assert_eq!(store.objects("Person").unwrap().len(), 3);
    assert_eq!(store.version(), 3);

    let bob = store.object_for_primary_key("Person", 2).unwrap().unwrap();
    assert_eq!(bob.get_str("name"), Some("Bob"));
}

#[test]
fn test_duplicate_key_aborts_whole_transaction() {
    let store = person_store();
    let mut txn = store.begin().unwrap();
    txn.create("Person", values! { "id" => 1, "name" => "Ada", "age" => 1, "shadowAge" => 1 })
        .unwrap();
    let dup = txn.create("Person", values! { "id" => 1, "name" => "Eve", "age" => 2, "shadowAge" => 2 });
    assert!(dup.unwrap_err().is_duplicate_key());
    assert!(txn.is_aborted());
    assert!(matches!(
        txn.create("Person", values! { "id" => 2, "name" => "Bob", "age" => 3, "shadowAge" => 3 }),
        Err(Error::TransactionAborted(_))
    ));
    assert!(txn.commit().unwrap_err().is_duplicate_key());

    assert_eq!(store.version(), 0);
    assert!(store.objects("Person").unwrap().is_empty());
    assert!(!store.is_write_in_progress());
}

#[test]
fn test_readers_keep_their_snapshot_across_threads() {
    let store = person_store();
    add_person(&store, 1, "Ada", 36).unwrap();
    let before = store.snapshot();

    let writers: Vec<_> = (2..6)
        .map(|id| {
            let store = store.clone();
            thread::spawn(move || {
                let wait = WriterWait::Block;
                let mut txn = store.begin_with(wait).unwrap();
                txn.create(
                    "Person",
                    values! { "id" => id, "name" => "Worker", "age" => id, "shadowAge" => id },
                )
                .unwrap();
                txn.commit().unwrap().version
            })
        })
        .collect();
    let mut versions: Vec<u64> = writers.into_iter().map(|h| h.join().unwrap()).collect();
    versions.sort_unstable();

    assert_eq!(versions, vec![2, 3, 4, 5]);
    assert_eq!(before.version(), 1);
    assert_eq!(before.count("Person"), 1);
    assert_eq!(store.snapshot().count("Person"), 5);
}

#[test]
fn test_results_are_pinned_until_rebound() {
    let store = person_store();
    add_person(&store, 1, "Ada", 36).unwrap();
    let adults = store.filter("Person", "age >= 18", &[]).unwrap();

    add_person(&store, 2, "Bob", 41).unwrap();
    assert_eq!(adults.len(), 1);

    let rebound = adults.rebind(&store).unwrap();
    assert_eq!(rebound.len(), 2);
    assert_eq!(rebound.version(), store.version());
}

#[test]
fn test_observer_sees_commit() {
    let store = person_store();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let id = store.observe(move |result| {
        if let Some(changes) = result.changes.get("Person") {
            counter.fetch_add(changes.inserted.len(), Ordering::SeqCst);
        }
    });

    add_person(&store, 1, "Ada", 36).unwrap();
    add_person(&store, 2, "Bob", 41).unwrap();
    assert!(store.unobserve(id));
    add_person(&store, 3, "Cy", 29).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

proptest! {
    #[test]
    fn prop_primary_keys_stay_unique(ids in prop::collection::vec(0i64..20, 1..40)) {
        let store = person_store();
        let mut accepted = std::collections::BTreeSet::new();
        for id in ids {
            let result = add_person(&store, id, "P", id);
            if accepted.insert(id) {
                prop_assert!(result.is_ok());
            } else {
                prop_assert!(result.unwrap_err().is_duplicate_key());
            }
        }
        prop_assert_eq!(store.objects("Person").unwrap().len(), accepted.len());
        prop_assert_eq!(store.version() as usize, accepted.len());
    }

    #[test]
    fn prop_index_matches_full_scan(
        ages in prop::collection::vec(0i64..100, 0..30),
        bound in 0i64..100,
    ) {
        let store = person_store();
        for (id, age) in ages.iter().enumerate() {
            add_person(&store, id as i64, "P", *age).unwrap();
        }
        for op in ["<", "<=", "=", ">=", ">"] {
            let indexed = store
                .filter("Person", &format!("age {} %d", op), &[Value::Int(bound)])
                .unwrap()
                .refs();
            let scanned = store
                .filter("Person", &format!("shadowAge {} %d", op), &[Value::Int(bound)])
                .unwrap()
                .refs();
            prop_assert_eq!(indexed, scanned);
        }

        let wanted = Value::List(vec![Value::Int(bound), Value::Int(bound / 2), Value::Int(-1)]);
        let indexed = store
            .filter("Person", "age IN %@", std::slice::from_ref(&wanted))
            .unwrap()
            .refs();
        let scanned = store
            .filter("Person", "shadowAge IN %@", std::slice::from_ref(&wanted))
            .unwrap()
            .refs();
        prop_assert_eq!(indexed, scanned);
    }

    #[test]
    fn prop_range_scan_matches_full_scan(
        people in prop::collection::vec((0i64..50, "[a-d]{0,2}"), 1..30),
        bound in 0i64..50,
        name_bound in "[a-d]{0,2}",
        wanted in prop::collection::vec(0i64..50, 0..5),
    ) {
        let store = person_store();
        for (id, (age, name)) in people.iter().enumerate() {
            add_person(&store, id as i64, name, *age).unwrap();
        }
        let snapshot = store.snapshot();
        let table = snapshot.table("Person").unwrap();
        let indexes = table.indexes();

        let operands = [
            ("age", Value::Int(bound)),
            ("id", Value::Int(bound)),
            ("name", Value::from(name_bound.as_str())),
        ];
        for op in [CompareOp::Lt, CompareOp::Le, CompareOp::Eq, CompareOp::Ge, CompareOp::Gt] {
            for (property, operand) in &operands {
                let predicate = Predicate::compare(*property, op, operand.clone());
                let mut found = indexes.range_scan(&predicate).unwrap();
                found.sort_unstable();
                let expected = scan_matching(table, property, |v| op.matches(v, operand, false));
                prop_assert_eq!(found, expected, "{} {:?} {}", property, op, operand);
            }
        }

        let ages: Vec<Value> = wanted.iter().copied().map(Value::Int).collect();
        let mut names: Vec<Value> = people
            .iter()
            .take(2)
            .map(|(_, name)| Value::from(name.as_str()))
            .collect();
        names.push(Value::from("zz"));
        for (property, values) in [("age", ages), ("name", names)] {
            let predicate = Predicate::in_list(property, values.clone());
            let mut found = indexes.range_scan(&predicate).unwrap();
            found.sort_unstable();
            let expected = scan_matching(table, property, |v| {
                values.iter().any(|w| CompareOp::Eq.matches(v, w, false))
            });
            prop_assert_eq!(found, expected, "{} IN {:?}", property, values);
        }
    }

    #[test]
    fn prop_written_values_read_back(name in "[a-zA-Z ]{0,12}", age in any::<i64>()) {
        let store = person_store();
        add_person(&store, 7, &name, age).unwrap();
        let person = store.object_for_primary_key("Person", 7).unwrap().unwrap();
        prop_assert_eq!(person.get_str("name"), Some(name.as_str()));
        prop_assert_eq!(person.get_int("age"), Some(age));
    }
}
