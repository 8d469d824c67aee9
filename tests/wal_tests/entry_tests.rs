//! Tests for WAL Entry framing
//!
//! These tests verify:
//! - Frame round-trip for every operation
//! - CRC32 corruption detection
//! - Partial frames and oversized length fields
//! - Encrypted payloads

use tuckdb::crypto::{Cipher, EncryptionLevel};
use tuckdb::wal::{Operation, WalEntry, FRAME_OVERHEAD, HEADER_SIZE};
use tuckdb::{record, Column, ColumnType, Table, TuckError, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn users() -> Table {
    Table::new(
        "users",
        vec![
            Column::new("id", ColumnType::Int).primary_key(),
            Column::new("name", ColumnType::Str),
            Column::new("score", ColumnType::Float),
        ],
    )
    .unwrap()
}

// =============================================================================
// Round-Trip Tests
// =============================================================================

#[test]
fn test_frame_round_trip() {
    let entry = WalEntry::new(7, Operation::Insert, "users", vec![1, 2, 3], vec![9, 9]);
    let bytes = entry.serialize(None).unwrap();

    let (decoded, used) = WalEntry::deserialize(&bytes, None).unwrap();

    assert_eq!(decoded, entry);
    assert_eq!(used, bytes.len());
}

#[test]
fn test_frame_size_is_overhead_plus_payload() {
    let entry = WalEntry::new(1, Operation::Delete, "t", vec![0], Vec::new());
    let bytes = entry.serialize(None).unwrap();

    let declared = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    assert_eq!(bytes.len(), FRAME_OVERHEAD + declared);
    assert_eq!(
        u64::from_le_bytes(bytes[4..HEADER_SIZE].try_into().unwrap()),
        1
    );
}

#[test]
fn test_table_mutation_entries_decode() {
    let table = users();
    let record = record! { "id" => 4, "name" => "ann", "score" => 2.5 };

    let insert = WalEntry::insert(&table, &Value::Int(4), &record).unwrap();
    assert_eq!(insert.operation, Operation::Insert);
    assert_eq!(insert.row_id().unwrap(), Value::Int(4));
    assert_eq!(insert.fields(&table).unwrap(), record);

    let changes = record! { "score" => 3.0 };
    let update = WalEntry::update(&table, &Value::Int(4), &changes).unwrap();
    assert_eq!(update.fields(&table).unwrap(), changes);

    let delete = WalEntry::delete(&table, &Value::Int(4)).unwrap();
    assert!(delete.fields(&table).unwrap().is_empty());
}

#[test]
fn test_encrypted_payload_round_trip() {
    let (cipher, _) = Cipher::create(EncryptionLevel::High, "secret").unwrap();
    let entry = WalEntry::new(3, Operation::Update, "users", b"key".to_vec(), b"users-record".to_vec());

    let bytes = entry.serialize(Some(&cipher)).unwrap();
    assert!(!bytes.windows(5).any(|w| w == b"users"));

    let (decoded, _) = WalEntry::deserialize(&bytes, Some(&cipher)).unwrap();
    assert_eq!(decoded, entry);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_crc_mismatch_detected() {
    let entry = WalEntry::new(1, Operation::Insert, "users", vec![1], vec![2]);
    let mut bytes = entry.serialize(None).unwrap();
    let mid = HEADER_SIZE + 2;
    bytes[mid] ^= 0xFF;

    let err = WalEntry::deserialize(&bytes, None).unwrap_err();
    assert!(matches!(err, TuckError::WalCorruption(_)));
}

#[test]
fn test_partial_frame_detected() {
    let entry = WalEntry::new(1, Operation::Insert, "users", vec![1], vec![2]);
    let bytes = entry.serialize(None).unwrap();

    for cut in [0, 3, HEADER_SIZE, bytes.len() - 1] {
        let err = WalEntry::deserialize(&bytes[..cut], None).unwrap_err();
        assert!(matches!(err, TuckError::WalCorruption(_)), "cut at {}", cut);
    }
}

#[test]
fn test_oversized_length_rejected() {
    let mut bytes = vec![0xFF, 0xFF, 0xFF, 0xFF];
    bytes.extend_from_slice(&[0u8; 32]);

    let err = WalEntry::deserialize(&bytes, None).unwrap_err();
    assert!(matches!(err, TuckError::WalCorruption(_)));
}
