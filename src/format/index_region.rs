//! Index region
//!
//! ```text
//! format version u16 (= 2) | table count varint
//! per table:
//!   name (varint + UTF-8)
//!   row offset count varint | (compact id, offset varint)*
//!   index count varint
//!   per index:
//!     column (varint + UTF-8) | kind u8 | entry count varint
//!     per entry: compact value | id count varint | compact id*
//! ```
//!
//! Sorted indexes are written in value order with ids in insertion order,
//! so reloading reproduces tie order exactly.

use bytes::BufMut;

use super::compact;
use super::data::RowOffsets;
use super::varint::{get_len, get_str, get_varint, put_str, put_varint};
use crate::error::{Result, TuckError};
use crate::index::{Index, IndexKind};
use crate::table::Table;
use crate::types::SliceReader;

pub(crate) const INDEX_FORMAT_VERSION: u16 = 2;

/// Everything the index region stores about one table
#[derive(Debug)]
pub(crate) struct TableIndexes {
    pub name: String,
    pub offsets: RowOffsets,
    pub indexes: Vec<(String, Index)>,
}

pub(crate) fn encode<'a>(
    tables: impl IntoIterator<Item = &'a Table>,
    offsets: &[RowOffsets],
) -> Result<Vec<u8>> {
    let tables: Vec<&Table> = tables.into_iter().collect();
    if tables.len() != offsets.len() {
        return Err(TuckError::format(format!(
            "{} tables but {} offset maps",
            tables.len(),
            offsets.len()
        )));
    }

    let mut buf = Vec::new();
    buf.put_u16_le(INDEX_FORMAT_VERSION);
    put_varint(&mut buf, tables.len() as u64);

    for (table, row_offsets) in tables.iter().zip(offsets) {
        put_str(&mut buf, table.name());

        put_varint(&mut buf, row_offsets.len() as u64);
        for (id, offset) in row_offsets {
            compact::put_value(&mut buf, id)?;
            put_varint(&mut buf, *offset);
        }

        put_varint(&mut buf, table.indexes().len() as u64);
        for (column, index) in table.indexes() {
            put_str(&mut buf, column);
            buf.put_u8(index.kind().tag());
            let entries = index.entries();
            put_varint(&mut buf, entries.len() as u64);
            for (value, ids) in entries {
                compact::put_value(&mut buf, value)?;
                put_varint(&mut buf, ids.len() as u64);
                for id in ids {
                    compact::put_value(&mut buf, id)?;
                }
            }
        }
    }
    Ok(buf)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Vec<TableIndexes>> {
    let mut r = SliceReader::new(bytes);
    let version = r.u16("index format version")?;
    if version != INDEX_FORMAT_VERSION {
        return Err(TuckError::format(format!(
            "Unsupported index region version: {}",
            version
        )));
    }

    let table_count = get_len(&mut r, "index table count")?;
    let mut out = Vec::with_capacity(table_count.min(r.remaining()));
    for _ in 0..table_count {
        let name = get_str(&mut r, "index table name")?;

        let offset_count = get_len(&mut r, "row offset count")?;
        let mut offsets = RowOffsets::new();
        for _ in 0..offset_count {
            let id = compact::get_value(&mut r)?;
            let offset = get_varint(&mut r, "row offset")?;
            offsets.insert(id, offset);
        }

        let index_count = get_len(&mut r, "index count")?;
        let mut indexes = Vec::with_capacity(index_count.min(r.remaining()));
        for _ in 0..index_count {
            let column = get_str(&mut r, "index column")?;
            let kind = IndexKind::from_tag(r.u8("index kind")?)?;
            let mut index = Index::new(kind).ok_or_else(|| {
                TuckError::decode(format!("Index on '{}' has kind none", column))
            })?;
            let entry_count = get_len(&mut r, "index entry count")?;
            for _ in 0..entry_count {
                let value = compact::get_value(&mut r)?;
                let id_count = get_len(&mut r, "index id count")?;
                for _ in 0..id_count {
                    let id = compact::get_value(&mut r)?;
                    index.insert(&value, &id);
                }
            }
            indexes.push((column, index));
        }

        out.push(TableIndexes {
            name,
            offsets,
            indexes,
        });
    }

    if !r.is_empty() {
        return Err(TuckError::decode(format!(
            "{} trailing bytes after index region",
            r.remaining()
        )));
    }
    Ok(out)
}
