//! Data region and row records
//!
//! ```text
//! per table:  row count u32
//! per row:    record length u32 | record
//! record:     row id (codec of the id type) | field count u16 | fields
//! field:      column index u16 | type tag u8 | length u32 | value bytes
//! null field: column index u16 | 0xFF | 0x00
//! ```
//!
//! WAL entries reuse the field list (without the id) for their record
//! bytes.

use std::collections::BTreeMap;

use bytes::BufMut;

use crate::error::{Result, TuckError};
use crate::table::{Column, Table};
use crate::types::{codec, ColumnType, Record, RowId, SliceReader, Value, NULL_TAG};

/// Row id → absolute file offset of its record length prefix
pub(crate) type RowOffsets = BTreeMap<RowId, u64>;

/// Largest record accepted on write or read. Leaves room for a whole
/// record inside one WAL frame.
pub(crate) const MAX_RECORD_LEN: usize = 48 * 1024 * 1024;

// =============================================================================
// Field Lists
// =============================================================================

/// Encode the fields present in `record`
pub(crate) fn encode_fields(columns: &[Column], record: &Record) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    put_fields(&mut buf, columns, record)?;
    Ok(buf)
}

fn put_fields(buf: &mut Vec<u8>, columns: &[Column], record: &Record) -> Result<()> {
    buf.put_u16_le(field_count(record)?);

    for (name, value) in record {
        let position = field_position(columns, name)?;
        buf.put_u16_le(position as u16);

        if value.is_null() {
            buf.put_u8(NULL_TAG);
            buf.put_u8(0);
            continue;
        }
        let ty = columns[position].column_type;
        let payload = codec::encode(ty, value)?;
        let len = u32::try_from(payload.len())
            .map_err(|_| TuckError::validation(format!("Value of '{}' exceeds 4 GiB", name)))?;
        buf.put_u8(ty.tag());
        buf.put_u32_le(len);
        buf.put_slice(&payload);
    }
    Ok(())
}

fn field_count(record: &Record) -> Result<u16> {
    u16::try_from(record.len()).map_err(|_| TuckError::validation("Record has too many fields"))
}

fn field_position(columns: &[Column], name: &str) -> Result<usize> {
    columns
        .iter()
        .position(|c| c.name == name)
        .filter(|position| *position <= u16::MAX as usize)
        .ok_or_else(|| TuckError::validation(format!("Unknown column '{}'", name)))
}

/// Decode a field list; only the fields that were written are returned
pub(crate) fn decode_fields(bytes: &[u8], columns: &[Column]) -> Result<Record> {
    let mut r = SliceReader::new(bytes);
    let record = get_fields(&mut r, columns)?;
    expect_consumed(&r, "field list")?;
    Ok(record)
}

fn get_fields(r: &mut SliceReader<'_>, columns: &[Column]) -> Result<Record> {
    let count = r.u16("field count")?;
    let mut record = Record::new();
    for _ in 0..count {
        let position = r.u16("column index")? as usize;
        let column = columns.get(position).ok_or_else(|| {
            TuckError::decode(format!(
                "Column index {} out of range ({} columns)",
                position,
                columns.len()
            ))
        })?;

        let tag = r.u8("field type")?;
        if tag == NULL_TAG {
            r.u8("null marker")?;
            record.insert(column.name.clone(), Value::Null);
            continue;
        }
        if tag != column.column_type.tag() {
            return Err(TuckError::decode(format!(
                "Field '{}' tagged 0x{:02x} but column is {}",
                column.name, tag, column.column_type
            )));
        }
        let len = r.u32("field length")? as usize;
        let payload = r.bytes(len, "field value")?;
        let (value, used) = codec::decode(column.column_type, payload)?;
        if used != len {
            return Err(TuckError::decode(format!(
                "Field '{}' declared {} bytes but decoded {}",
                column.name, len, used
            )));
        }
        record.insert(column.name.clone(), value);
    }
    Ok(record)
}

// =============================================================================
// Rows
// =============================================================================

pub(crate) fn encode_row(
    columns: &[Column],
    id_type: ColumnType,
    id: &RowId,
    record: &Record,
) -> Result<Vec<u8>> {
    let mut buf = codec::encode(id_type, id)?;
    put_fields(&mut buf, columns, record)?;
    Ok(buf)
}

/// Size of the record [`encode_row`] would produce, checked against
/// [`MAX_RECORD_LEN`]
pub(crate) fn record_len(
    columns: &[Column],
    id_type: ColumnType,
    id: &RowId,
    record: &Record,
) -> Result<usize> {
    field_count(record)?;
    let mut len = codec::encoded_len(id_type, id)? + 2;
    for (name, value) in record {
        let position = field_position(columns, name)?;
        len += 2;
        len += if value.is_null() {
            2
        } else {
            1 + 4 + codec::encoded_len(columns[position].column_type, value)?
        };
    }
    check_record_len(len)?;
    Ok(len)
}

/// Length prefix for a record, or a validation error past [`MAX_RECORD_LEN`]
pub(crate) fn check_record_len(len: usize) -> Result<u32> {
    if len > MAX_RECORD_LEN {
        return Err(TuckError::validation(format!(
            "Record of {} bytes exceeds the {} byte limit",
            len, MAX_RECORD_LEN
        )));
    }
    u32::try_from(len).map_err(|_| TuckError::validation("Record length exceeds u32"))
}

/// Decode one record; columns it does not mention come back as null
pub(crate) fn decode_row(
    bytes: &[u8],
    columns: &[Column],
    id_type: ColumnType,
) -> Result<(RowId, Record)> {
    let mut r = SliceReader::new(bytes);
    let id = codec::decode_from(id_type, &mut r, 0)?;
    let mut record = get_fields(&mut r, columns)?;
    expect_consumed(&r, "record")?;
    for column in columns {
        record.entry(column.name.clone()).or_insert(Value::Null);
    }
    Ok((id, record))
}

// =============================================================================
// Region
// =============================================================================

/// Encode every table's rows. `base_offset` is where the region will start
/// in the file, so the returned offsets are absolute.
pub(crate) fn encode_region<'a>(
    tables: impl IntoIterator<Item = &'a Table>,
    base_offset: u64,
) -> Result<(Vec<u8>, Vec<RowOffsets>)> {
    let mut buf = Vec::new();
    let mut all_offsets = Vec::new();

    for table in tables {
        let rows = table.scan()?;
        let count = u32::try_from(rows.len()).map_err(|_| {
            TuckError::validation(format!("Table '{}' has too many rows", table.name()))
        })?;
        buf.put_u32_le(count);

        let mut offsets = RowOffsets::new();
        for (id, record) in rows {
            let bytes = encode_row(table.columns(), table.id_type(), &id, &record)?;
            offsets.insert(id, base_offset + buf.len() as u64);
            buf.put_u32_le(check_record_len(bytes.len())?);
            buf.put_slice(&bytes);
        }
        all_offsets.push(offsets);
    }
    Ok((buf, all_offsets))
}

/// Load every table's rows from a decoded region
pub(crate) fn decode_region(bytes: &[u8], tables: &mut [Table]) -> Result<()> {
    let mut r = SliceReader::new(bytes);
    for table in tables.iter_mut() {
        let count = r.u32("row count")?;
        let id_type = table.id_type();
        for _ in 0..count {
            let len = r.u32("record length")? as usize;
            if len > MAX_RECORD_LEN {
                return Err(TuckError::decode(format!("Record claims {} bytes", len)));
            }
            let record_bytes = r.bytes(len, "record")?;
            let (id, record) = decode_row(record_bytes, table.columns(), id_type)?;
            table.put_loaded_row(id, record);
        }
    }
    expect_consumed(&r, "data region")
}

fn expect_consumed(r: &SliceReader<'_>, what: &str) -> Result<()> {
    if r.is_empty() {
        Ok(())
    } else {
        Err(TuckError::decode(format!(
            "{} trailing bytes after {}",
            r.remaining(),
            what
        )))
    }
}
