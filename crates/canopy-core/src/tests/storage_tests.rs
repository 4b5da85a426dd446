use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::*;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Settings {
    theme: String,
    font_size: u8,
}

#[test]
fn typed_round_trip() {
    let storage = MemoryStorage::new();
    let settings = Settings {
        theme: "dark".into(),
        font_size: 14,
    };

    storage.set("settings", &settings).unwrap();

    assert_eq!(storage.get::<Settings>("settings").unwrap(), Some(settings));
    assert_eq!(
        storage.get_json("settings").as_deref(),
        Some(r#"{"theme":"dark","font_size":14}"#)
    );
}

#[test]
fn missing_key_is_not_an_error() {
    let storage = MemoryStorage::new();
    assert_eq!(storage.get::<Settings>("nope").unwrap(), None);
}

#[test]
fn keys_are_listed_in_order() {
    let storage = MemoryStorage::new();
    for key in ["b", "c", "a"] {
        storage.set(key, &key).unwrap();
    }

    assert_eq!(storage.len(), 3);
    assert_eq!(storage.key(0).unwrap(), "a");
    assert_eq!(storage.key(2).unwrap(), "c");
    assert!(matches!(
        storage.key(3),
        Err(StorageError::IndexOutOfRange { index: 3, len: 3 })
    ));
}

#[test]
fn del_and_clear() {
    let storage = MemoryStorage::new();
    storage.set("a", &1).unwrap();
    storage.set("b", &2).unwrap();

    storage.del("a");
    storage.del("missing");
    assert_eq!(storage.len(), 1);
    assert_eq!(storage.get::<i32>("a").unwrap(), None);

    storage.clear();
    assert!(storage.is_empty());
}

#[test]
fn decoding_mismatch_is_reported() {
    let storage = MemoryStorage::new();
    storage.set("obj", &Settings {
        theme: "light".into(),
        font_size: 12,
    })
    .unwrap();

    assert!(matches!(
        storage.get::<Vec<u32>>("obj"),
        Err(StorageError::Json(_))
    ));
}

#[test]
fn encoding_failure_stores_nothing() {
    let storage = MemoryStorage::new();
    let mut grid = BTreeMap::new();
    grid.insert((0_u8, 1_u8), 1_u8);

    assert!(matches!(storage.set("grid", &grid), Err(StorageError::Json(_))));
    assert!(storage.is_empty());
}

#[test]
fn works_behind_a_trait_object() {
    let storage: Box<dyn BrowserStorage> = Box::new(MemoryStorage::new());
    storage.set("n", &5_u64).unwrap();
    assert_eq!(storage.get::<u64>("n").unwrap(), Some(5));
}
