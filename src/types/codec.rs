//! Value codec
//!
//! Canonical byte encodings for every [`ColumnType`]. Dispatch is a plain
//! `match` on the closed type enum; adding a type means adding a variant.
//!
//! Two layers:
//! - [`encode`] / [`decode`]: the untagged payload for a declared type
//! - [`encode_tagged`] / [`decode_tagged`]: tag byte + payload, with
//!   [`NULL_TAG`] for null. Used for list/map elements and by callers that
//!   need self-describing bytes.

use std::collections::BTreeMap;

use bytes::BufMut;
use chrono::{Datelike, NaiveDate};

use super::{ColumnType, SliceReader, Timestamp, Value, NULL_TAG};
use crate::error::{Result, TuckError};

/// Days from 0001-01-01 (CE) to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Guard against unbounded recursion on hostile list/map input
const MAX_NESTING: usize = 64;

// =============================================================================
// Encoding
// =============================================================================

/// Encode a value as the payload of `ty`.
///
/// Null encodes to an empty payload; record and element framing mark nulls
/// with [`NULL_TAG`] instead.
pub fn encode(ty: ColumnType, value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_into(ty, value, &mut buf)?;
    Ok(buf)
}

/// Encode `value` as the payload of `ty`, appending to `buf`
pub fn encode_into<B: BufMut>(ty: ColumnType, value: &Value, buf: &mut B) -> Result<()> {
    encode_at(ty, value, buf, 0)
}

fn encode_at<B: BufMut>(ty: ColumnType, value: &Value, buf: &mut B, depth: usize) -> Result<()> {
    check_depth(depth)?;
    match (ty, value) {
        (_, Value::Null) => {}
        (ColumnType::Int, Value::Int(i)) => buf.put_i64_le(*i),
        (ColumnType::Float, Value::Float(f)) => buf.put_f64_le(*f),
        (ColumnType::Float, Value::Int(i)) => buf.put_f64_le(*i as f64),
        (ColumnType::Bool, Value::Bool(b)) => buf.put_u8(u8::from(*b)),
        (ColumnType::Str, Value::Str(s)) => put_str16(buf, s, "str")?,
        (ColumnType::Bytes, Value::Bytes(b)) => {
            buf.put_u32_le(bytes_len(b)?);
            buf.put_slice(b);
        }
        (ColumnType::Timestamp, Value::Timestamp(t)) => {
            let offset = timestamp_offset(t)?;
            buf.put_i64_le(t.micros);
            buf.put_i16_le(offset);
        }
        (ColumnType::Date, Value::Date(d)) => {
            buf.put_i32_le(d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
        }
        (ColumnType::Duration, Value::Duration(d)) => {
            buf.put_f64_le(duration_micros(d)? as f64 / 1_000_000.0);
        }
        (ColumnType::List, Value::List(items)) => {
            buf.put_u32_le(len_u32(items.len(), "list")?);
            for item in items {
                encode_tagged_at(item, buf, depth + 1)?;
            }
        }
        (ColumnType::Map, Value::Map(map)) => {
            buf.put_u32_le(len_u32(map.len(), "map")?);
            for (key, item) in map {
                put_str16(buf, key, "map key")?;
                encode_tagged_at(item, buf, depth + 1)?;
            }
        }
        (ty, value) => return Err(mismatch(ty, value)),
    }
    Ok(())
}

/// Encode with a leading tag byte (its own type, or [`NULL_TAG`])
pub fn encode_tagged(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_tagged_into(value, &mut buf)?;
    Ok(buf)
}

pub fn encode_tagged_into<B: BufMut>(value: &Value, buf: &mut B) -> Result<()> {
    encode_tagged_at(value, buf, 0)
}

fn encode_tagged_at<B: BufMut>(value: &Value, buf: &mut B, depth: usize) -> Result<()> {
    match value.column_type() {
        None => {
            buf.put_u8(NULL_TAG);
            Ok(())
        }
        Some(ty) => {
            buf.put_u8(ty.tag());
            encode_at(ty, value, buf, depth)
        }
    }
}

// =============================================================================
// Sizing
// =============================================================================

/// Number of bytes [`encode`] produces for `value` as `ty`.
///
/// Fails exactly where `encode` would, without allocating, so values can be
/// checked before they are stored.
pub fn encoded_len(ty: ColumnType, value: &Value) -> Result<usize> {
    len_at(ty, value, 0)
}

fn len_at(ty: ColumnType, value: &Value, depth: usize) -> Result<usize> {
    check_depth(depth)?;
    Ok(match (ty, value) {
        (_, Value::Null) => 0,
        (ColumnType::Int, Value::Int(_))
        | (ColumnType::Float, Value::Float(_))
        | (ColumnType::Float, Value::Int(_)) => 8,
        (ColumnType::Bool, Value::Bool(_)) => 1,
        (ColumnType::Str, Value::Str(s)) => 2 + str16_len(s, "str")?,
        (ColumnType::Bytes, Value::Bytes(b)) => 4 + bytes_len(b)? as usize,
        (ColumnType::Timestamp, Value::Timestamp(t)) => {
            timestamp_offset(t)?;
            10
        }
        (ColumnType::Date, Value::Date(_)) => 4,
        (ColumnType::Duration, Value::Duration(d)) => {
            duration_micros(d)?;
            8
        }
        (ColumnType::List, Value::List(items)) => {
            len_u32(items.len(), "list")?;
            let mut len = 4;
            for item in items {
                len += tagged_len_at(item, depth + 1)?;
            }
            len
        }
        (ColumnType::Map, Value::Map(map)) => {
            len_u32(map.len(), "map")?;
            let mut len = 4;
            for (key, item) in map {
                len += 2 + str16_len(key, "map key")? + tagged_len_at(item, depth + 1)?;
            }
            len
        }
        (ty, value) => return Err(mismatch(ty, value)),
    })
}

fn tagged_len_at(value: &Value, depth: usize) -> Result<usize> {
    match value.column_type() {
        None => Ok(1),
        Some(ty) => Ok(1 + len_at(ty, value, depth)?),
    }
}

// =============================================================================
// Shared Checks
// =============================================================================

fn check_depth(depth: usize) -> Result<()> {
    if depth > MAX_NESTING {
        return Err(TuckError::validation(format!(
            "list/map nesting deeper than {}",
            MAX_NESTING
        )));
    }
    Ok(())
}

fn mismatch(ty: ColumnType, value: &Value) -> TuckError {
    TuckError::validation(format!("Expected {}, got {}", ty.name(), value.type_name()))
}

fn str16_len(s: &str, what: &str) -> Result<usize> {
    u16::try_from(s.len()).map_err(|_| {
        TuckError::validation(format!("{} longer than 65535 bytes ({})", what, s.len()))
    })?;
    Ok(s.len())
}

fn put_str16<B: BufMut>(buf: &mut B, s: &str, what: &str) -> Result<()> {
    buf.put_u16_le(str16_len(s, what)? as u16);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn bytes_len(b: &[u8]) -> Result<u32> {
    u32::try_from(b.len()).map_err(|_| TuckError::validation("bytes value exceeds 4 GiB"))
}

fn timestamp_offset(t: &Timestamp) -> Result<i16> {
    match t.offset_minutes {
        Some(Timestamp::NAIVE_OFFSET) => Err(TuckError::validation(
            "timestamp offset collides with the naive sentinel",
        )),
        Some(minutes) => Ok(minutes),
        None => Ok(Timestamp::NAIVE_OFFSET),
    }
}

fn duration_micros(d: &chrono::Duration) -> Result<i64> {
    d.num_microseconds()
        .ok_or_else(|| TuckError::validation("duration out of microsecond range"))
}

fn len_u32(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| TuckError::validation(format!("{} has too many elements", what)))
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a payload of `ty`, returning the value and bytes consumed
pub fn decode(ty: ColumnType, data: &[u8]) -> Result<(Value, usize)> {
    let mut reader = SliceReader::new(data);
    let value = decode_from(ty, &mut reader, 0)?;
    Ok((value, reader.position()))
}

/// Decode a tagged value, returning the value and bytes consumed
pub fn decode_tagged(data: &[u8]) -> Result<(Value, usize)> {
    let mut reader = SliceReader::new(data);
    let value = decode_tagged_from(&mut reader, 0)?;
    Ok((value, reader.position()))
}

pub(crate) fn decode_from(ty: ColumnType, r: &mut SliceReader<'_>, depth: usize) -> Result<Value> {
    if depth > MAX_NESTING {
        return Err(TuckError::decode("list/map nesting too deep"));
    }
    Ok(match ty {
        ColumnType::Int => Value::Int(r.i64("int")?),
        ColumnType::Float => Value::Float(r.f64("float")?),
        ColumnType::Bool => match r.u8("bool")? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            other => return Err(TuckError::decode(format!("Invalid bool byte: {}", other))),
        },
        ColumnType::Str => Value::Str(r.str16("str")?),
        ColumnType::Bytes => {
            let len = r.u32("bytes length")? as usize;
            Value::Bytes(r.bytes(len, "bytes")?.to_vec())
        }
        ColumnType::Timestamp => {
            let micros = r.i64("timestamp")?;
            let offset = r.i16("timestamp offset")?;
            let offset_minutes = (offset != Timestamp::NAIVE_OFFSET).then_some(offset);
            Value::Timestamp(Timestamp::from_micros(micros, offset_minutes))
        }
        ColumnType::Date => {
            let days = r.i32("date")?;
            let date = days
                .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .ok_or_else(|| TuckError::decode(format!("Date out of range: {} days", days)))?;
            Value::Date(date)
        }
        ColumnType::Duration => {
            let secs = r.f64("duration")?;
            if !secs.is_finite() {
                return Err(TuckError::decode("Non-finite duration"));
            }
            let micros = (secs * 1_000_000.0).round();
            if micros.abs() >= i64::MAX as f64 {
                return Err(TuckError::decode("Duration out of range"));
            }
            Value::Duration(chrono::Duration::microseconds(micros as i64))
        }
        ColumnType::List => {
            let count = r.u32("list length")? as usize;
            // Each element needs at least its tag byte
            if count > r.remaining() {
                return Err(TuckError::decode(format!(
                    "List claims {} elements but only {} bytes remain",
                    count,
                    r.remaining()
                )));
            }
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_tagged_from(r, depth + 1)?);
            }
            Value::List(items)
        }
        ColumnType::Map => {
            let count = r.u32("map length")? as usize;
            if count > r.remaining() {
                return Err(TuckError::decode(format!(
                    "Map claims {} entries but only {} bytes remain",
                    count,
                    r.remaining()
                )));
            }
            let mut map = BTreeMap::new();
            for _ in 0..count {
                let key = r.str16("map key")?;
                let item = decode_tagged_from(r, depth + 1)?;
                map.insert(key, item);
            }
            Value::Map(map)
        }
    })
}

pub(crate) fn decode_tagged_from(r: &mut SliceReader<'_>, depth: usize) -> Result<Value> {
    let tag = r.u8("type tag")?;
    if tag == NULL_TAG {
        return Ok(Value::Null);
    }
    decode_from(ColumnType::from_tag(tag)?, r, depth)
}
