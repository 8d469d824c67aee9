//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their framing.

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::crypto::Cipher;
use crate::error::{Result, TuckError};
use crate::format::{compact, data};
use crate::table::Table;
use crate::types::{Record, RowId, SliceReader};

/// Frame bytes around the payload: length (4) + LSN (8) + CRC (4)
pub const HEADER_SIZE: usize = 4 + 8;
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + 4;

/// Largest payload a frame may declare
pub const MAX_PAYLOAD: u32 = 64 * 1024 * 1024;

/// Mutations that can be logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing across checkpoints
    pub lsn: u64,

    pub operation: Operation,

    pub table: String,

    /// Row id in the compact index encoding
    pub key: Vec<u8>,

    /// Field list (full record for insert, changed fields for update,
    /// empty for delete)
    pub record: Vec<u8>,
}

/// Serialized payload; borrowed on the way out, owned on the way in
#[derive(Serialize)]
struct PayloadRef<'a> {
    operation: Operation,
    table: &'a str,
    key: &'a [u8],
    record: &'a [u8],
}

#[derive(Deserialize)]
struct Payload {
    operation: Operation,
    table: String,
    key: Vec<u8>,
    record: Vec<u8>,
}

impl WalEntry {
    pub fn new(
        lsn: u64,
        operation: Operation,
        table: impl Into<String>,
        key: Vec<u8>,
        record: Vec<u8>,
    ) -> Self {
        Self {
            lsn,
            operation,
            table: table.into(),
            key,
            record,
        }
    }

    // -------------------------------------------------------------------------
    // Construction from table mutations (LSN assigned by the writer)
    // -------------------------------------------------------------------------

    pub fn insert(table: &Table, id: &RowId, record: &Record) -> Result<Self> {
        Self::build(Operation::Insert, table, id, Some(record))
    }

    pub fn update(table: &Table, id: &RowId, changes: &Record) -> Result<Self> {
        Self::build(Operation::Update, table, id, Some(changes))
    }

    pub fn delete(table: &Table, id: &RowId) -> Result<Self> {
        Self::build(Operation::Delete, table, id, None)
    }

    fn build(
        operation: Operation,
        table: &Table,
        id: &RowId,
        record: Option<&Record>,
    ) -> Result<Self> {
        let mut key = Vec::new();
        compact::put_value(&mut key, id)?;
        let record = match record {
            Some(record) => data::encode_fields(table.columns(), record)?,
            None => Vec::new(),
        };
        Ok(Self::new(0, operation, table.name(), key, record))
    }

    /// Decode the row id
    pub fn row_id(&self) -> Result<RowId> {
        let mut r = SliceReader::new(&self.key);
        let id = compact::get_value(&mut r)?;
        if !r.is_empty() {
            return Err(TuckError::decode("Trailing bytes after WAL key"));
        }
        Ok(id)
    }

    /// Decode the field list against the table's columns
    pub fn fields(&self, table: &Table) -> Result<Record> {
        if self.record.is_empty() {
            return Ok(Record::new());
        }
        data::decode_fields(&self.record, table.columns())
    }

    // -------------------------------------------------------------------------
    // Framing
    // -------------------------------------------------------------------------

    /// Frame layout:
    /// `[payload len u32][lsn u64][payload][crc32 of everything before]`.
    /// The payload is encrypted with the LSN as nonce when a cipher is given.
    pub fn serialize(&self, cipher: Option<&Cipher>) -> Result<Vec<u8>> {
        let mut payload = bincode::serialize(&PayloadRef {
            operation: self.operation,
            table: &self.table,
            key: &self.key,
            record: &self.record,
        })?;
        if let Some(cipher) = cipher {
            cipher.apply(Cipher::wal_nonce(self.lsn), &mut payload);
        }
        let len = u32::try_from(payload.len())
            .ok()
            .filter(|len| *len <= MAX_PAYLOAD)
            .ok_or_else(|| TuckError::validation("WAL entry too large"))?;

        let mut buf = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
        buf.put_u32_le(len);
        buf.put_u64_le(self.lsn);
        buf.put_slice(&payload);
        let crc = crc32fast::hash(&buf);
        buf.put_u32_le(crc);
        Ok(buf)
    }

    /// Parse one frame from the front of `buf`, returning the entry and the
    /// frame length. Short input and checksum mismatches are
    /// `WalCorruption`.
    pub fn deserialize(buf: &[u8], cipher: Option<&Cipher>) -> Result<(Self, usize)> {
        if buf.len() < FRAME_OVERHEAD {
            return Err(TuckError::WalCorruption(format!(
                "partial frame header ({} bytes)",
                buf.len()
            )));
        }
        let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if len > MAX_PAYLOAD {
            return Err(TuckError::WalCorruption(format!(
                "frame declares {} byte payload",
                len
            )));
        }
        let total = FRAME_OVERHEAD + len as usize;
        if buf.len() < total {
            return Err(TuckError::WalCorruption(format!(
                "partial frame ({} of {} bytes)",
                buf.len(),
                total
            )));
        }

        let crc_at = total - 4;
        let stored = u32::from_le_bytes([
            buf[crc_at],
            buf[crc_at + 1],
            buf[crc_at + 2],
            buf[crc_at + 3],
        ]);
        let actual = crc32fast::hash(&buf[..crc_at]);
        if stored != actual {
            return Err(TuckError::WalCorruption(format!(
                "CRC mismatch: stored {:08x}, computed {:08x}",
                stored, actual
            )));
        }

        let mut lsn_bytes = [0u8; 8];
        lsn_bytes.copy_from_slice(&buf[4..HEADER_SIZE]);
        let lsn = u64::from_le_bytes(lsn_bytes);

        let mut payload = buf[HEADER_SIZE..crc_at].to_vec();
        if let Some(cipher) = cipher {
            cipher.apply(Cipher::wal_nonce(lsn), &mut payload);
        }
        let payload: Payload = bincode::deserialize(&payload).map_err(|e| {
            TuckError::WalCorruption(format!("undecodable payload at LSN {}: {}", lsn, e))
        })?;

        Ok((
            Self {
                lsn,
                operation: payload.operation,
                table: payload.table,
                key: payload.key,
                record: payload.record,
            },
            total,
        ))
    }
}
