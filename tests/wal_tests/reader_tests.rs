//! Tests for WAL Reader
//!
//! These tests verify:
//! - Reading an empty log
//! - Reading a log that starts inside a larger file
//! - Stopping at a torn frame

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use tempfile::TempDir;
use tuckdb::wal::{Operation, WalEntry, WalReader};
use tuckdb::TuckError;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn frame(lsn: u64) -> Vec<u8> {
    WalEntry::new(lsn, Operation::Delete, "t", vec![lsn as u8], Vec::new())
        .serialize(None)
        .unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_empty_log() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(reader.is_empty());
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn test_open_at_skips_prefix() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut file = File::create(&wal_path).unwrap();
    file.write_all(&[0xAB; 300]).unwrap();
    file.write_all(&frame(1)).unwrap();
    file.write_all(&frame(2)).unwrap();
    drop(file);

    let lsns: Vec<u64> = WalReader::open_at(&wal_path, 300)
        .unwrap()
        .map(|e| e.unwrap().lsn)
        .collect();
    assert_eq!(lsns, vec![1, 2]);
}

#[test]
fn test_offset_past_end_is_empty() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap().write_all(&[1, 2, 3]).unwrap();

    let reader = WalReader::open_at(&wal_path, 10).unwrap();
    assert!(reader.is_empty());
}

#[test]
fn test_torn_frame_stops_iteration() {
    let (_temp, wal_path) = setup_temp_wal();
    let first = frame(1);
    let second = frame(2);
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&wal_path)
            .unwrap();
        file.write_all(&first).unwrap();
        file.write_all(&second[..second.len() / 2]).unwrap();
    }

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert_eq!(reader.next().unwrap().unwrap().lsn, 1);
    assert_eq!(reader.position(), first.len());
    assert!(matches!(reader.next(), Some(Err(TuckError::WalCorruption(_)))));
    assert!(reader.next().is_none());
    assert_eq!(reader.position(), first.len());
}
