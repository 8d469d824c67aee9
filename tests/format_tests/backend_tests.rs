//! Tests for BinaryBackend
//!
//! These tests verify:
//! - save → load round trip of rows, schema and index contents
//! - Every column type surviving the file
//! - Atomic replace (no leftover temp file)
//! - Fail-closed loading of damaged files
//! - Lazy loading
//! - probe / metadata

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use chrono::{Duration, NaiveDate};
use tempfile::TempDir;
use tuckdb::{
    record, BinaryBackend, Column, ColumnType, IndexKind, Table, Tables, Timestamp, TuckError,
    Value,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_file() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store.tuck");
    (temp_dir, path)
}

fn sample_tables() -> Tables {
    let mut people = Table::new(
        "people",
        vec![
            Column::new("id", ColumnType::Int).primary_key(),
            Column::new("name", ColumnType::Str)
                .nullable(false)
                .index(IndexKind::Hash)
                .comment("display name"),
            Column::new("age", ColumnType::Int).index(IndexKind::Sorted),
            Column::new("score", ColumnType::Float),
        ],
    )
    .unwrap()
    .with_comment("everyone");
    people.insert(record! { "name" => "ann", "age" => 31, "score" => 1.5 }).unwrap();
    people.insert(record! { "name" => "bob", "age" => 25 }).unwrap();
    people.insert(record! { "name" => "cy", "age" => 31, "score" => -2.0 }).unwrap();

    let mut notes = Table::new(
        "notes",
        vec![Column::new("text", ColumnType::Str)],
    )
    .unwrap();
    notes.insert(record! { "text" => "no primary key here" }).unwrap();

    let mut tables = Tables::new();
    tables.insert("people".to_string(), people);
    tables.insert("notes".to_string(), notes);
    tables
}

fn index_snapshot(table: &Table, column: &str) -> Vec<(Value, Vec<Value>)> {
    table
        .index(column)
        .unwrap()
        .entries()
        .into_iter()
        .map(|(v, ids)| (v.clone(), ids.into_iter().cloned().collect()))
        .collect()
}

fn assert_same_tables(a: &Tables, b: &Tables) {
    assert_eq!(a.keys().collect::<Vec<_>>(), b.keys().collect::<Vec<_>>());
    for (name, left) in a {
        let right = &b[name];
        assert_eq!(left.columns(), right.columns(), "columns of {}", name);
        assert_eq!(left.primary_key(), right.primary_key());
        assert_eq!(left.comment(), right.comment());
        assert_eq!(left.next_id(), right.next_id());
        let l: Vec<_> = left.scan().unwrap().into_iter().map(|(i, r)| (i, r.into_owned())).collect();
        let r: Vec<_> = right.scan().unwrap().into_iter().map(|(i, r)| (i, r.into_owned())).collect();
        assert_eq!(l, r, "rows of {}", name);
        for column in left.indexes().keys() {
            assert_eq!(index_snapshot(left, column), index_snapshot(right, column));
        }
    }
}

// =============================================================================
// Round-Trip Tests
// =============================================================================

#[test]
fn test_save_load_round_trip() {
    let (_temp, path) = setup_temp_file();
    let backend = BinaryBackend::new(&path);
    let tables = sample_tables();

    backend.save(&tables).unwrap();
    let loaded = backend.load().unwrap();

    assert_same_tables(&tables, &loaded);
}

#[test]
fn test_every_column_type_round_trips() {
    let (_temp, path) = setup_temp_file();
    let columns = vec![
        Column::new("id", ColumnType::Str).primary_key(),
        Column::new("i", ColumnType::Int),
        Column::new("f", ColumnType::Float),
        Column::new("b", ColumnType::Bool),
        Column::new("raw", ColumnType::Bytes),
        Column::new("ts", ColumnType::Timestamp),
        Column::new("d", ColumnType::Date),
        Column::new("dur", ColumnType::Duration),
        Column::new("l", ColumnType::List),
        Column::new("m", ColumnType::Map),
    ];
    let mut table = Table::new("all", columns).unwrap();
    let mut map = BTreeMap::new();
    map.insert("k".to_string(), Value::from(vec![Value::Int(1), Value::Null]));
    table
        .insert(record! {
            "id" => "row-1",
            "i" => i64::MIN,
            "f" => f64::MAX,
            "b" => true,
            "raw" => vec![0u8, 255, 7],
            "ts" => Timestamp::from_micros(1_700_000_000_123_456, Some(-300)),
            "d" => NaiveDate::from_ymd_opt(1969, 7, 20).unwrap(),
            "dur" => Duration::milliseconds(90_500),
            "l" => vec![Value::from("x"), Value::Float(0.25)],
            "m" => map,
        })
        .unwrap();
    table.insert(record! { "id" => "row-2" }).unwrap();
    let mut tables = Tables::new();
    tables.insert("all".to_string(), table);

    let backend = BinaryBackend::new(&path);
    backend.save(&tables).unwrap();
    let loaded = backend.load().unwrap();

    assert_same_tables(&tables, &loaded);
    let empty = loaded["all"].get(&Value::from("row-2")).unwrap().unwrap();
    assert!(empty.iter().filter(|(k, _)| k.as_str() != "id").all(|(_, v)| v.is_null()));
}

#[test]
fn test_save_replaces_without_temp_leftover() {
    let (temp, path) = setup_temp_file();
    let backend = BinaryBackend::new(&path);
    let mut tables = sample_tables();
    backend.save(&tables).unwrap();

    tables.remove("notes");
    backend.save(&tables).unwrap();

    let loaded = backend.load().unwrap();
    assert_eq!(loaded.len(), 1);
    let leftovers: Vec<_> = fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers.len(), 1);
}

#[test]
fn test_empty_store_round_trips() {
    let (_temp, path) = setup_temp_file();
    let backend = BinaryBackend::new(&path);

    backend.save(&Tables::new()).unwrap();

    assert!(backend.load().unwrap().is_empty());
}

#[test]
fn test_exists_and_delete() {
    let (_temp, path) = setup_temp_file();
    let backend = BinaryBackend::new(&path);
    assert!(!backend.exists());

    backend.save(&sample_tables()).unwrap();
    assert!(backend.exists());

    backend.delete().unwrap();
    assert!(!backend.exists());
    assert!(matches!(backend.load(), Err(TuckError::Io(_))));
}

// =============================================================================
// Fail-Closed Tests
// =============================================================================

#[test]
fn test_wrong_magic_rejected() {
    let (_temp, path) = setup_temp_file();
    fs::write(&path, vec![b'x'; 1024]).unwrap();

    let err = BinaryBackend::new(&path).load().unwrap_err();
    assert!(matches!(err, TuckError::Format(_)));
}

#[test]
fn test_too_small_file_rejected() {
    let (_temp, path) = setup_temp_file();
    fs::write(&path, b"TUK4").unwrap();

    let err = BinaryBackend::new(&path).load().unwrap_err();
    assert!(matches!(err, TuckError::Format(_)));
}

#[test]
fn test_truncated_regions_rejected() {
    let (_temp, path) = setup_temp_file();
    let backend = BinaryBackend::new(&path).with_wal(false);
    backend.save(&sample_tables()).unwrap();
    let len = fs::metadata(&path).unwrap().len();
    fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(len - 10)
        .unwrap();

    let err = backend.load().unwrap_err();
    assert!(matches!(err, TuckError::Format(_)));
}

#[test]
fn test_corrupt_schema_region_fails() {
    let (_temp, path) = setup_temp_file();
    let backend = BinaryBackend::new(&path);
    backend.save(&sample_tables()).unwrap();
    let mut bytes = fs::read(&path).unwrap();
    // First bytes of the schema region: the first table name's length
    bytes[256] = 0xFF;
    bytes[257] = 0xFF;
    fs::write(&path, &bytes).unwrap();

    assert!(backend.load().is_err());
}

// =============================================================================
// Lazy Loading Tests
// =============================================================================

#[test]
fn test_lazy_load_reads_rows_on_demand() {
    let (_temp, path) = setup_temp_file();
    let tables = sample_tables();
    BinaryBackend::new(&path).save(&tables).unwrap();

    let loaded = BinaryBackend::new(&path).with_lazy_load(true).load().unwrap();

    let people = &loaded["people"];
    assert!(people.is_lazy());
    assert_eq!(people.len(), 3);
    let bob = people.get(&Value::Int(2)).unwrap().unwrap();
    assert_eq!(bob["name"], Value::from("bob"));
    assert_same_tables(&tables, &loaded);
}

#[test]
fn test_lazy_row_materializes_on_update() {
    let (_temp, path) = setup_temp_file();
    BinaryBackend::new(&path).save(&sample_tables()).unwrap();
    let mut loaded = BinaryBackend::new(&path).with_lazy_load(true).load().unwrap();

    let people = loaded.get_mut("people").unwrap();
    people.update(&Value::Int(1), record! { "age" => 32 }).unwrap();

    assert_eq!(people.get(&Value::Int(1)).unwrap().unwrap()["age"], Value::Int(32));
    assert_eq!(people.index("age").unwrap().lookup(&Value::Int(31)).len(), 1);
    assert_eq!(people.len(), 3);
}

// =============================================================================
// Probe / Metadata Tests
// =============================================================================

#[test]
fn test_probe_recognizes_own_files() {
    let (_temp, path) = setup_temp_file();
    BinaryBackend::new(&path).save(&sample_tables()).unwrap();

    let (recognized, summary) = BinaryBackend::probe(&path).unwrap();

    assert!(recognized);
    let summary = summary.unwrap();
    assert_eq!(summary.table_count, 2);
    assert_eq!(summary.generation, 1);
    assert!(summary.wal_active);
    assert!(summary.encryption.is_none());
    assert_eq!(summary.file_size, fs::metadata(&path).unwrap().len());
}

#[test]
fn test_probe_rejects_foreign_files() {
    let (_temp, path) = setup_temp_file();
    fs::write(&path, "id,name\n1,ann\n".repeat(40)).unwrap();

    assert_eq!(BinaryBackend::probe(&path).unwrap().0, false);

    let missing = path.with_file_name("missing.tuck");
    let (recognized, summary) = BinaryBackend::probe(&missing).unwrap();
    assert!(!recognized);
    assert!(summary.is_none());
}

#[test]
fn test_metadata() {
    let (_temp, path) = setup_temp_file();
    let backend = BinaryBackend::new(&path);
    backend.save(&sample_tables()).unwrap();

    let meta = backend.metadata().unwrap();
    assert_eq!(meta.file_size, fs::metadata(&path).unwrap().len());
    assert!(meta.modified.is_some());
}
