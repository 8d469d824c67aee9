//! Schema region
//!
//! Per table, in name order:
//! ```text
//! name (u16 + UTF-8) | primary key (u16 + UTF-8, empty = none)
//! comment (u16 + UTF-8, empty = none) | column count u16 | next_id i64
//! columns: name (u16 + UTF-8) | type tag u8 | flags u8 | comment (u16 + UTF-8)
//! ```

use bytes::BufMut;

use crate::error::{Result, TuckError};
use crate::table::{Column, Table};
use crate::types::{ColumnType, SliceReader};

pub(crate) fn encode<'a>(tables: impl IntoIterator<Item = &'a Table>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for table in tables {
        put_str16(&mut buf, table.name())?;
        put_str16(&mut buf, table.primary_key().unwrap_or(""))?;
        put_str16(&mut buf, table.comment().unwrap_or(""))?;
        let count = u16::try_from(table.columns().len()).map_err(|_| {
            TuckError::validation(format!("Table '{}' has too many columns", table.name()))
        })?;
        buf.put_u16_le(count);
        buf.put_i64_le(table.next_id());
        for column in table.columns() {
            put_str16(&mut buf, &column.name)?;
            buf.put_u8(column.column_type.tag());
            buf.put_u8(column.flags());
            put_str16(&mut buf, column.comment.as_deref().unwrap_or(""))?;
        }
    }
    Ok(buf)
}

pub(crate) fn decode(bytes: &[u8], table_count: u32) -> Result<Vec<Table>> {
    let mut r = SliceReader::new(bytes);
    let mut tables = Vec::with_capacity(table_count as usize);
    for _ in 0..table_count {
        let name = r.str16("table name")?;
        let primary_key = non_empty(r.str16("primary key name")?);
        let comment = non_empty(r.str16("table comment")?);
        let column_count = r.u16("column count")?;
        let next_id = r.i64("next id")?;

        let mut columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let column_name = r.str16("column name")?;
            let ty = ColumnType::from_tag(r.u8("column type")?)?;
            let flags = r.u8("column flags")?;
            let column_comment = non_empty(r.str16("column comment")?);
            columns.push(Column::from_parts(column_name, ty, flags, column_comment)?);
        }

        let table = Table::from_parts(name, comment, columns, next_id)?;
        if table.primary_key() != primary_key.as_deref() {
            return Err(TuckError::decode(format!(
                "Table '{}' primary key {:?} disagrees with its column flags",
                table.name(),
                primary_key
            )));
        }
        tables.push(table);
    }
    if !r.is_empty() {
        return Err(TuckError::decode(format!(
            "{} trailing bytes after schema region",
            r.remaining()
        )));
    }
    Ok(tables)
}

fn put_str16(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| TuckError::validation(format!("Name or comment too long: {} bytes", s.len())))?;
    buf.put_u16_le(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}
