//! Lazy row storage
//!
//! Rows of a lazily loaded table stay on disk until first touched. Each
//! row keeps the absolute file offset of its length-prefixed record; the
//! file handle is shared by every table of the same open file.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use parking_lot::Mutex;

use super::Column;
use crate::error::{Result, TuckError};
use crate::format::data;
use crate::types::{ColumnType, Record, RowId};

#[derive(Debug, Clone)]
pub(crate) struct LazyRows {
    file: Arc<Mutex<File>>,
    offsets: BTreeMap<RowId, u64>,
}

impl LazyRows {
    pub(crate) fn new(file: Arc<Mutex<File>>, offsets: BTreeMap<RowId, u64>) -> Self {
        Self { file, offsets }
    }

    pub(crate) fn contains(&self, id: &RowId) -> bool {
        self.offsets.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.offsets.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = &RowId> {
        self.offsets.keys()
    }

    /// Forget a row (after it has been materialized or deleted)
    pub(crate) fn forget(&mut self, id: &RowId) -> Option<u64> {
        self.offsets.remove(id)
    }

    /// Read and decode one row from disk
    pub(crate) fn read(
        &self,
        id: &RowId,
        columns: &[Column],
        id_type: ColumnType,
    ) -> Result<Option<Record>> {
        let Some(&offset) = self.offsets.get(id) else {
            return Ok(None);
        };

        let bytes = {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            let mut len_buf = [0u8; 4];
            file.read_exact(&mut len_buf)?;
            let len = u32::from_le_bytes(len_buf);
            if len as usize > data::MAX_RECORD_LEN {
                return Err(TuckError::format(format!(
                    "Record at offset {} claims {} bytes",
                    offset, len
                )));
            }
            let mut bytes = vec![0u8; len as usize];
            file.read_exact(&mut bytes)?;
            bytes
        };

        let (stored_id, record) = data::decode_row(&bytes, columns, id_type)?;
        if &stored_id != id {
            return Err(TuckError::format(format!(
                "Row offset for {} points at row {}",
                id, stored_id
            )));
        }
        Ok(Some(record))
    }
}
