//! Playground Example
//!
//! Demonstrates trove with the cars, people, repairs and stickers data set.
//! Types and fixtures are loaded from RON files, then each scenario reads
//! or writes the store and prints what it sees.

use chrono::{Duration, Utc};
use std::error::Error;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use trove_core::{values, Record, Value};
use trove_db::Archive;
use trove_script::Loader;
use trove_store::{link_list, resolve_link, value_list, ReadView, Store, StoreConfig};

type DemoResult = Result<(), Box<dyn Error>>;

fn example(title: &str, f: impl FnOnce() -> DemoResult) -> DemoResult {
    println!("\n=== {} ===", title);
    f()
}

fn full_name(person: &Record) -> String {
    let first = person.get_str("firstName").unwrap_or_default();
    match person.get_str("lastName") {
        Some(last) => format!("{} {}", first, last),
        None => first.to_string(),
    }
}

fn main() -> DemoResult {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    println!("=== Trove Playground ===");

    let data_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data"));

    tracing::info!(path = %data_dir.display(), "Loading playground scripts");
    let mut loader = Loader::new();
    loader.load_directory(&data_dir)?;
    let defs = loader.finish();

    let store = Store::with_config(StoreConfig::in_memory("TemporaryStore"));
    let labels = defs.apply(&store)?;
    println!("Ready to play... (version {})", store.version());

    example("Getting All Objects", || {
        let people = store.objects("Person")?;
        let articles = store.objects("Article")?;
        println!("{} people and {} articles", people.len(), articles.len());
        Ok(())
    })?;

    example("Getting an Object by Primary Key", || {
        match store.object_for_primary_key("Person", "test-key")? {
            Some(person) => println!(
                "Person with primary key 'test-key': {}",
                person.get_str("firstName").unwrap_or_default()
            ),
            None => println!("Not found"),
        }
        Ok(())
    })?;

    example("Accessing Results", || {
        let people = store.objects("Person")?;
        println!("Store contains {} people", people.len());
        if let (Some(first), Some(second), Some(last)) =
            (people.first(), people.get(1), people.last())
        {
            println!("First person is: {}", full_name(&first));
            println!("Second person is: {}", full_name(&second));
            println!("Last person is: {}", full_name(&last));
        }

        let first_names: Vec<&str> = people
            .iter()
            .filter_map(|p| p.get_str("firstName"))
            .collect();
        println!("First names of all people are: {}", first_names.join(", "));

        let names_and_ids: Vec<String> = people
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{}: {}", i, p.get_str("firstName").unwrap_or_default()))
            .collect();
        println!("People and indexes: {}", names_and_ids.join(", "));
        Ok(())
    })?;

    example("Results Indexes", || {
        let people = store.objects("Person")?;
        if let Some(person) = people.get(1) {
            if let Some(index) = people.index_of(&person.object_ref()) {
                println!("{} is at index {}", full_name(&person), index);
            }
        }
        if let Some(index) = people.index_where(|p| {
            p.get_str("firstName")
                .is_some_and(|name| name.starts_with('F'))
        }) {
            println!("Name starts with F at index {}", index);
        }
        if let Some(index) = people.index_matching("hairCount < %d", &[Value::Int(10_000)])? {
            println!("Person with less than 10,000 hairs at index {}", index);
        }
        Ok(())
    })?;

    example("Filtering", || {
        let people = store.objects("Person")?;
        println!("All people: {}", people.len());

        let living = store.filter("Person", "deceased = nil", &[])?;
        println!("Living people: {}", living.len());

        let famous = store.filter(
            "Person",
            "hairCount > %d AND firstName BEGINSWITH[c] %s",
            &[Value::Int(50_000), Value::from("f")],
        )?;
        println!("Hairy people whose name starts with f: {}", famous.len());

        let by_name = living.sorted("firstName", true)?;
        let names: Vec<&str> = by_name
            .iter()
            .filter_map(|p| p.get_str("firstName"))
            .collect();
        println!("Living people by name: {}", names.join(", "));
        println!(
            "Average hair count: {:.0}",
            people.average("hairCount")?.unwrap_or_default()
        );
        Ok(())
    })?;

    let car = labels
        .get("bmw")
        .cloned()
        .ok_or("fixture 'bmw' missing")?;
    let jack = labels
        .get("jack")
        .cloned()
        .ok_or("fixture 'jack' missing")?;

    example("Object relationships", || {
        let snapshot = store.snapshot();
        let record = snapshot.get(&car).ok_or("car missing")?;
        let shop = resolve_link(&snapshot, &record, "shop")?.ok_or("shop missing")?;
        let owner = resolve_link(&snapshot, &record, "owner")?.ok_or("owner missing")?;
        println!(
            "{} {} is serviced at {} and owned by {}",
            record.get_str("brand").unwrap_or_default(),
            record.get_int("year").unwrap_or_default(),
            shop.get_str("name").unwrap_or_default(),
            full_name(&owner)
        );
        Ok(())
    })?;

    example("Adding Pointer to the Same Object", || {
        let now = Utc::now();
        store.write(|txn| {
            let repair = txn.create("Repair", values! { "date" => now, "person" => &jack })?;
            for _ in 0..4 {
                txn.append_link(&car, "repairs", &repair)?;
            }
            let earlier = txn.create(
                "Repair",
                values! { "date" => now - Duration::days(30), "person" => &jack },
            )?;
            txn.append_link(&car, "repairs", &earlier)
        })?;

        let snapshot = store.snapshot();
        let record = snapshot.get(&car).ok_or("car missing")?;
        let repairs = link_list(&snapshot, &record, "repairs")?;
        println!("Car has {} repairs", repairs.len());
        if let (Some(first), Some(last)) = (repairs.min("date")?, repairs.max("date")?) {
            println!("First repair: {}, last repair: {}", first, last);
        }
        Ok(())
    })?;

    example("Adding Primitive types to Lists", || {
        let now = Utc::now();
        store.write(|txn| {
            txn.append_value(&car, "plates", "WYZ 201 Q")?;
            txn.append_value(&car, "plates", "2MNYC0DZ")?;
            txn.append_value(&car, "checkups", now - Duration::days(365))?;
            txn.append_value(&car, "checkups", now)
        })?;

        let snapshot = store.snapshot();
        let record = snapshot.get(&car).ok_or("car missing")?;
        let plates = value_list(&snapshot, &record, "plates")?;
        if let Some(current) = plates.last() {
            println!("Current registration: {}", current);
        }
        let checkups = value_list(&snapshot, &record, "checkups")?;
        if let (Some(first), Some(latest)) = (checkups.first(), checkups.max()) {
            println!("First checkup: {}, latest checkup: {}", first, latest);
        }
        Ok(())
    })?;

    example("Referencing objects by id", || {
        let sticker_id = "sticker-1";
        store.write(|txn| {
            txn.create(
                "Sticker",
                values! { "id" => sticker_id, "text" => "Rust is my life" },
            )?;
            txn.append_value(&car, "stickers", sticker_id)
        })?;

        let snapshot = store.snapshot();
        let record = snapshot.get(&car).ok_or("car missing")?;
        let stickers = value_list(&snapshot, &record, "stickers")?;
        let linked = snapshot.filter("Sticker", "id IN %@", &[Value::List(stickers.as_slice().to_vec())])?;
        println!("Linked stickers:");
        for sticker in &linked {
            println!("  {}", sticker.get_str("text").unwrap_or_default());
        }
        Ok(())
    })?;

    example("Archiving", || {
        let archive = Archive::in_memory()?;
        archive.save_store(&store)?;
        let restored = archive.restore(StoreConfig::in_memory("Restored"))?;
        println!(
            "Restored version {} with {} cars and {} people",
            restored.version(),
            restored.objects("Car")?.len(),
            restored.objects("Person")?.len()
        );
        Ok(())
    })?;

    println!("\n=== Playground Complete ===");
    Ok(())
}
