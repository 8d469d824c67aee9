//! Tests for WAL Recovery
//!
//! These tests verify:
//! - Recovery from a clean WAL
//! - Skipping entries already covered by the checkpoint
//! - Truncated tail and CRC mismatch handling (lenient and strict)
//! - Physical truncation of a torn tail
//! - Replay into tables

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use tempfile::TempDir;
use tuckdb::wal::{Operation, WalEntry, WalRecovery};
use tuckdb::{record, Column, ColumnType, Table, Tables, TuckError, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn users() -> Table {
    Table::new(
        "users",
        vec![
            Column::new("id", ColumnType::Int).primary_key(),
            Column::new("name", ColumnType::Str),
        ],
    )
    .unwrap()
}

fn insert_entry(table: &Table, lsn: u64, id: i64, name: &str) -> WalEntry {
    let mut entry = WalEntry::insert(
        table,
        &Value::Int(id),
        &record! { "id" => id, "name" => name },
    )
    .unwrap();
    entry.lsn = lsn;
    entry
}

/// Write raw serialized entries directly to a file (for crafting corruption)
fn write_raw_entries(path: &PathBuf, entries: &[WalEntry]) -> Vec<usize> {
    let mut file = File::create(path).unwrap();
    let mut sizes = Vec::new();
    for entry in entries {
        let bytes = entry.serialize(None).unwrap();
        sizes.push(bytes.len());
        file.write_all(&bytes).unwrap();
    }
    file.sync_all().unwrap();
    sizes
}

fn three_inserts(table: &Table) -> Vec<WalEntry> {
    vec![
        insert_entry(table, 1, 1, "ann"),
        insert_entry(table, 2, 2, "bob"),
        insert_entry(table, 3, 3, "cy"),
    ]
}

// =============================================================================
// Clean WAL Tests
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::new(&wal_path, 0).recover().unwrap();

    assert!(entries.is_empty());
    assert_eq!(result.entries_recovered, 0);
    assert_eq!(result.last_lsn, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_all_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    let table = users();
    write_raw_entries(&wal_path, &three_inserts(&table));

    let (entries, result) = WalRecovery::new(&wal_path, 0).recover().unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(result.entries_recovered, 3);
    assert_eq!(result.last_lsn, 3);
    assert_eq!(result.valid_len, fs::metadata(&wal_path).unwrap().len());
}

#[test]
fn test_checkpoint_lsn_skips_covered_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    let table = users();
    write_raw_entries(&wal_path, &three_inserts(&table));

    let (entries, result) = WalRecovery::new(&wal_path, 0)
        .checkpoint_lsn(2)
        .recover()
        .unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].lsn, 3);
    assert_eq!(result.entries_skipped, 2);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_truncated_tail_stops_replay() {
    let (_temp, wal_path) = setup_temp_wal();
    let table = users();
    let sizes = write_raw_entries(&wal_path, &three_inserts(&table));
    let full = fs::metadata(&wal_path).unwrap().len();
    let file = fs::OpenOptions::new().write(true).open(&wal_path).unwrap();
    file.set_len(full - 3).unwrap();

    let (entries, result) = WalRecovery::new(&wal_path, 0).recover().unwrap();

    assert_eq!(entries.len(), 2);
    assert!(result.was_truncated);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.valid_len, (sizes[0] + sizes[1]) as u64);
}

#[test]
fn test_crc_mismatch_mid_log_stops_replay() {
    let (_temp, wal_path) = setup_temp_wal();
    let table = users();
    let sizes = write_raw_entries(&wal_path, &three_inserts(&table));
    let mut bytes = fs::read(&wal_path).unwrap();
    bytes[sizes[0] + 14] ^= 0x55;
    fs::write(&wal_path, &bytes).unwrap();

    let (entries, result) = WalRecovery::new(&wal_path, 0).recover().unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(result.last_lsn, 1);
    assert!(result.was_truncated);
}

#[test]
fn test_strict_mode_fails_on_corruption() {
    let (_temp, wal_path) = setup_temp_wal();
    let table = users();
    write_raw_entries(&wal_path, &three_inserts(&table));
    let mut bytes = fs::read(&wal_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&wal_path, &bytes).unwrap();

    let err = WalRecovery::new(&wal_path, 0).strict(true).recover().unwrap_err();
    assert!(matches!(err, TuckError::WalCorruption(_)));
}

#[test]
fn test_non_increasing_lsn_treated_as_corruption() {
    let (_temp, wal_path) = setup_temp_wal();
    let table = users();
    write_raw_entries(
        &wal_path,
        &[
            insert_entry(&table, 5, 1, "ann"),
            insert_entry(&table, 5, 2, "bob"),
        ],
    );

    let (entries, result) = WalRecovery::new(&wal_path, 0).recover().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(result.was_truncated);
}

#[test]
fn test_truncate_tail_cuts_file() {
    let (_temp, wal_path) = setup_temp_wal();
    let table = users();
    let sizes = write_raw_entries(&wal_path, &three_inserts(&table));
    let mut file = fs::OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[0xDE, 0xAD, 0xBE]).unwrap();
    drop(file);

    let recovery = WalRecovery::new(&wal_path, 0);
    let (_, result) = recovery.recover().unwrap();
    recovery.truncate_tail(&result).unwrap();

    let expected: usize = sizes.iter().sum();
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), expected as u64);
    let (_, again) = recovery.recover().unwrap();
    assert!(!again.was_truncated);
}

// =============================================================================
// Replay Tests
// =============================================================================

#[test]
fn test_replay_applies_insert_update_delete() {
    let table = users();
    let mut update = WalEntry::update(&table, &Value::Int(1), &record! { "name" => "ANN" }).unwrap();
    update.lsn = 4;
    let mut delete = WalEntry::delete(&table, &Value::Int(2)).unwrap();
    delete.lsn = 5;
    let mut entries = three_inserts(&table);
    entries.push(update);
    entries.push(delete);

    let mut tables = Tables::new();
    tables.insert("users".to_string(), table);
    let applied = WalRecovery::replay(&mut tables, &entries).unwrap();

    assert_eq!(applied, 5);
    let users = &tables["users"];
    assert_eq!(users.len(), 2);
    let ann = users.get(&Value::Int(1)).unwrap().unwrap();
    assert_eq!(ann["name"], Value::from("ANN"));
    assert!(users.get(&Value::Int(2)).unwrap().is_none());
    assert_eq!(users.next_id(), 4);
}

#[test]
fn test_replay_unknown_table_fails() {
    let table = users();
    let entries = three_inserts(&table);
    let mut tables = Tables::new();

    let err = WalRecovery::replay(&mut tables, &entries).unwrap_err();
    assert!(matches!(err, TuckError::TableNotFound(_)));
}

#[test]
fn test_recover_wal_inside_larger_file() {
    let (_temp, wal_path) = setup_temp_wal();
    let table = users();
    let mut bytes = vec![0u8; 512];
    for e in three_inserts(&table) {
        bytes.extend(e.serialize(None).unwrap());
    }
    fs::write(&wal_path, &bytes).unwrap();

    let (entries, _) = WalRecovery::new(&wal_path, 512).recover().unwrap();
    assert_eq!(entries.len(), 3);
}
