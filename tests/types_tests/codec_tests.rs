//! Tests for the value codec
//!
//! These tests verify:
//! - decode(encode(v)) == v for every column type, including edge values
//! - Consumed length equals the encoded length
//! - Null handling in tagged form
//! - Oversized strings and malformed input

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tuckdb::types::codec;
use tuckdb::{ColumnType, Timestamp, TuckError, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn assert_round_trip(ty: ColumnType, value: Value) {
    let bytes = codec::encode(ty, &value).unwrap();
    let (decoded, used) = codec::decode(ty, &bytes).unwrap();
    assert_eq!(decoded, value, "{} value {:?}", ty, value);
    assert_eq!(used, bytes.len());

    let tagged = codec::encode_tagged(&value).unwrap();
    let (decoded, used) = codec::decode_tagged(&tagged).unwrap();
    assert_eq!(decoded, value);
    assert_eq!(used, tagged.len());
}

// =============================================================================
// Round-Trip Tests
// =============================================================================

#[test]
fn test_scalar_round_trips() {
    for i in [0, 1, -1, i64::MIN, i64::MAX] {
        assert_round_trip(ColumnType::Int, Value::Int(i));
    }
    for f in [0.0, -0.5, f64::MIN_POSITIVE, f64::MAX, f64::INFINITY] {
        assert_round_trip(ColumnType::Float, Value::Float(f));
    }
    assert_round_trip(ColumnType::Bool, Value::Bool(true));
    assert_round_trip(ColumnType::Bool, Value::Bool(false));
    assert_round_trip(ColumnType::Str, Value::from(""));
    assert_round_trip(ColumnType::Str, Value::from("héllo wörld ✓"));
    assert_round_trip(ColumnType::Bytes, Value::Bytes(Vec::new()));
    assert_round_trip(ColumnType::Bytes, Value::Bytes((0..=255).collect()));
}

#[test]
fn test_temporal_round_trips() {
    let dt = NaiveDateTime::parse_from_str("2024-02-29 23:59:59.999999", "%Y-%m-%d %H:%M:%S%.f").unwrap();
    assert_round_trip(ColumnType::Timestamp, Value::Timestamp(Timestamp::from_naive(&dt)));
    assert_round_trip(
        ColumnType::Timestamp,
        Value::Timestamp(Timestamp::from_micros(-1, Some(330))),
    );
    for date in [
        NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(1, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(9999, 12, 31).unwrap(),
    ] {
        assert_round_trip(ColumnType::Date, Value::Date(date));
    }
    for d in [Duration::zero(), Duration::microseconds(-7), Duration::days(400)] {
        assert_round_trip(ColumnType::Duration, Value::Duration(d));
    }
}

#[test]
fn test_container_round_trips() {
    let mut inner = BTreeMap::new();
    inner.insert("n".to_string(), Value::Null);
    inner.insert("d".to_string(), Value::Date(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()));
    let list = Value::List(vec![
        Value::Int(1),
        Value::Null,
        Value::from("two"),
        Value::Map(inner.clone()),
        Value::List(vec![]),
    ]);
    assert_round_trip(ColumnType::List, list.clone());

    let mut outer = BTreeMap::new();
    outer.insert("list".to_string(), list);
    outer.insert("map".to_string(), Value::Map(inner));
    assert_round_trip(ColumnType::Map, Value::Map(outer));
}

#[test]
fn test_null_tagged_form() {
    let bytes = codec::encode_tagged(&Value::Null).unwrap();
    assert_eq!(bytes, vec![tuckdb::types::NULL_TAG]);
    assert_eq!(codec::decode_tagged(&bytes).unwrap(), (Value::Null, 1));
}

#[test]
fn test_int_widens_into_float_column() {
    let bytes = codec::encode(ColumnType::Float, &Value::Int(3)).unwrap();
    assert_eq!(codec::decode(ColumnType::Float, &bytes).unwrap().0, Value::Float(3.0));
}

// =============================================================================
// Error Tests
// =============================================================================

#[test]
fn test_string_longer_than_u16_rejected() {
    let long = "x".repeat(u16::MAX as usize + 1);
    let err = codec::encode(ColumnType::Str, &Value::from(long)).unwrap_err();
    assert!(matches!(err, TuckError::Validation(_)));

    let max = "y".repeat(u16::MAX as usize);
    assert_round_trip(ColumnType::Str, Value::from(max));
}

#[test]
fn test_mismatched_type_rejected() {
    let err = codec::encode(ColumnType::Int, &Value::from("1")).unwrap_err();
    assert!(matches!(err, TuckError::Validation(_)));
}

#[test]
fn test_truncated_input_is_decode_error() {
    let bytes = codec::encode(ColumnType::Str, &Value::from("truncate me")).unwrap();
    let err = codec::decode(ColumnType::Str, &bytes[..bytes.len() - 1]).unwrap_err();
    assert!(matches!(err, TuckError::Decode(_)));
}

#[test]
fn test_unknown_tag_is_decode_error() {
    let err = codec::decode_tagged(&[0x42, 0, 0]).unwrap_err();
    assert!(matches!(err, TuckError::Decode(_)));
}
