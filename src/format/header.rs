//! File header and dual-slot recovery
//!
//! ```text
//! ┌────────┬──────┬──────────────────────────────────────────┐
//! │ Offset │ Size │ Field                                    │
//! ├────────┼──────┼──────────────────────────────────────────┤
//! │ 0      │ 4    │ magic "TUK4"                             │
//! │ 4      │ 2    │ format version                           │
//! │ 6      │ 2    │ flags (0x0001 = WAL region active)       │
//! │ 8      │ 8    │ generation                               │
//! │ 16     │ 64   │ schema/data/index/wal (offset, size) u64 │
//! │ 80     │ 8    │ checkpoint LSN                           │
//! │ 88     │ 4    │ table count                              │
//! │ 92     │ 1    │ encryption level (0 = none)              │
//! │ 93     │ 16   │ salt                                     │
//! │ 109    │ 4    │ key check                                │
//! │ 113    │ 11   │ reserved (zero)                          │
//! │ 124    │ 4    │ CRC32 of bytes 0..124                    │
//! └────────┴──────┴──────────────────────────────────────────┘
//! ```
//!
//! Two copies live at offsets 0 (slot A) and 128 (slot B). The valid copy
//! with the higher generation wins; equal generations pick slot A.

use bytes::BufMut;

use crate::crypto::{EncryptionLevel, KeyDescriptor, KEY_CHECK_LEN, SALT_LEN};
use crate::error::{Result, TuckError};
use crate::types::SliceReader;

pub const MAGIC: &[u8; 4] = b"TUK4";
pub const FORMAT_VERSION: u16 = 4;
pub const HEADER_SIZE: usize = 128;
/// Offset of slot B
pub const SLOT_B_OFFSET: u64 = HEADER_SIZE as u64;
/// First byte after both header slots
pub const REGIONS_START: u64 = 2 * HEADER_SIZE as u64;

pub const FLAG_WAL: u16 = 0x0001;

const CRC_OFFSET: usize = HEADER_SIZE - 4;

/// A contiguous byte range within the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub offset: u64,
    pub size: u64,
}

impl Region {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// One past the last byte
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

/// Decoded header contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u16,
    pub flags: u16,
    pub generation: u64,
    pub schema: Region,
    pub data: Region,
    pub index: Region,
    /// Start of the WAL. The WAL runs to end of file; `size` is what was
    /// there when the header was written.
    pub wal: Region,
    pub checkpoint_lsn: u64,
    pub table_count: u32,
    pub encryption: Option<KeyDescriptor>,
}

impl FileHeader {
    pub fn wal_active(&self) -> bool {
        self.flags & FLAG_WAL != 0
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        buf.put_slice(MAGIC);
        buf.put_u16_le(self.version);
        buf.put_u16_le(self.flags);
        buf.put_u64_le(self.generation);
        for region in [self.schema, self.data, self.index, self.wal] {
            buf.put_u64_le(region.offset);
            buf.put_u64_le(region.size);
        }
        buf.put_u64_le(self.checkpoint_lsn);
        buf.put_u32_le(self.table_count);
        match &self.encryption {
            Some(desc) => {
                buf.put_u8(desc.level.tag());
                buf.put_slice(&desc.salt);
                buf.put_slice(&desc.key_check);
            }
            None => buf.put_bytes(0, 1 + SALT_LEN + KEY_CHECK_LEN),
        }
        buf.resize(CRC_OFFSET, 0);
        let crc = crc32fast::hash(&buf);
        buf.put_u32_le(crc);

        let mut out = [0u8; HEADER_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    /// Parse one slot. Never fails; the outcome is tagged.
    pub fn parse(bytes: &[u8]) -> HeaderSlot {
        if bytes.len() < HEADER_SIZE || &bytes[..4] != MAGIC {
            return HeaderSlot::Corrupt;
        }
        let stored_crc = u32::from_le_bytes([
            bytes[CRC_OFFSET],
            bytes[CRC_OFFSET + 1],
            bytes[CRC_OFFSET + 2],
            bytes[CRC_OFFSET + 3],
        ]);
        if crc32fast::hash(&bytes[..CRC_OFFSET]) != stored_crc {
            return HeaderSlot::Corrupt;
        }
        match Self::parse_fields(&bytes[..CRC_OFFSET]) {
            Ok(ParsedFields::Header(header)) => HeaderSlot::Valid(header),
            Ok(ParsedFields::Version(v)) => HeaderSlot::UnsupportedVersion(v),
            Err(_) => HeaderSlot::Corrupt,
        }
    }

    fn parse_fields(bytes: &[u8]) -> Result<ParsedFields> {
        let mut r = SliceReader::new(bytes);
        r.bytes(4, "magic")?;
        let version = r.u16("version")?;
        if version != FORMAT_VERSION {
            return Ok(ParsedFields::Version(version));
        }
        let flags = r.u16("flags")?;
        let generation = r.u64("generation")?;
        let mut regions = [Region::default(); 4];
        for region in regions.iter_mut() {
            *region = Region::new(r.u64("region offset")?, r.u64("region size")?);
        }
        let checkpoint_lsn = r.u64("checkpoint lsn")?;
        let table_count = r.u32("table count")?;
        let level = EncryptionLevel::from_tag(r.u8("encryption level")?)?;
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(r.bytes(SALT_LEN, "salt")?);
        let mut key_check = [0u8; KEY_CHECK_LEN];
        key_check.copy_from_slice(r.bytes(KEY_CHECK_LEN, "key check")?);

        let [schema, data, index, wal] = regions;
        Ok(ParsedFields::Header(FileHeader {
            version,
            flags,
            generation,
            schema,
            data,
            index,
            wal,
            checkpoint_lsn,
            table_count,
            encryption: level.map(|level| KeyDescriptor {
                level,
                salt,
                key_check,
            }),
        }))
    }

    /// Reject regions that overlap the header slots or run past the file
    pub fn check_bounds(&self, file_len: u64) -> Result<()> {
        let named = [
            ("schema", self.schema),
            ("data", self.data),
            ("index", self.index),
        ];
        for (name, region) in named {
            if region.offset < REGIONS_START || region.end() > file_len {
                return Err(TuckError::format(format!(
                    "{} region {}..{} outside file of {} bytes",
                    name,
                    region.offset,
                    region.end(),
                    file_len
                )));
            }
        }
        if self.wal_active() && (self.wal.offset < self.index.end() || self.wal.offset > file_len)
        {
            return Err(TuckError::format(format!(
                "WAL offset {} outside file of {} bytes",
                self.wal.offset, file_len
            )));
        }
        Ok(())
    }
}

enum ParsedFields {
    Header(FileHeader),
    Version(u16),
}

/// Outcome of parsing one header slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderSlot {
    Valid(FileHeader),
    UnsupportedVersion(u16),
    Corrupt,
}

/// Which physical slot a header came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub fn offset(self) -> u64 {
        match self {
            Slot::A => 0,
            Slot::B => SLOT_B_OFFSET,
        }
    }

    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }
}

/// Pick the authoritative header from both slots
pub fn select(a: HeaderSlot, b: HeaderSlot) -> Result<(Slot, FileHeader)> {
    match (a, b) {
        (HeaderSlot::Valid(a), HeaderSlot::Valid(b)) => {
            if b.generation > a.generation {
                Ok((Slot::B, b))
            } else {
                Ok((Slot::A, a))
            }
        }
        (HeaderSlot::Valid(a), other) => {
            tracing::warn!("Header slot B unusable ({}), using slot A", slot_kind(&other));
            Ok((Slot::A, a))
        }
        (other, HeaderSlot::Valid(b)) => {
            tracing::warn!("Header slot A unusable ({}), using slot B", slot_kind(&other));
            Ok((Slot::B, b))
        }
        (HeaderSlot::UnsupportedVersion(v), _) | (_, HeaderSlot::UnsupportedVersion(v)) => Err(
            TuckError::format(format!("Unsupported format version: {}", v)),
        ),
        (HeaderSlot::Corrupt, HeaderSlot::Corrupt) => Err(TuckError::format(
            "Both header slots are corrupt",
        )),
    }
}

fn slot_kind(slot: &HeaderSlot) -> &'static str {
    match slot {
        HeaderSlot::Valid(_) => "valid",
        HeaderSlot::UnsupportedVersion(_) => "unsupported version",
        HeaderSlot::Corrupt => "corrupt",
    }
}
