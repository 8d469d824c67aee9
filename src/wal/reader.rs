//! WAL Reader
//!
//! Reads entries sequentially from the start of the WAL to end of file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use super::WalEntry;
use crate::crypto::Cipher;
use crate::error::Result;

/// Sequential reader over WAL frames
pub struct WalReader {
    buf: Vec<u8>,
    pos: usize,
    cipher: Option<Cipher>,
    /// Set once iteration has hit a bad frame
    failed: bool,
}

impl WalReader {
    /// Read a whole standalone WAL file
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_at(path, 0)
    }

    /// Read the WAL that starts at `offset` and runs to end of file
    pub fn open_at(path: &Path, offset: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        let mut buf = Vec::new();
        if offset < len {
            file.seek(SeekFrom::Start(offset))?;
            buf.reserve((len - offset) as usize);
            file.read_to_end(&mut buf)?;
        }
        Ok(Self::from_bytes(buf))
    }

    pub fn from_bytes(buf: Vec<u8>) -> Self {
        Self {
            buf,
            pos: 0,
            cipher: None,
            failed: false,
        }
    }

    /// Decrypt entry payloads
    pub fn with_cipher(mut self, cipher: Option<Cipher>) -> Self {
        self.cipher = cipher;
        self
    }

    /// Next entry; `Ok(None)` at a clean end of log.
    ///
    /// A torn or corrupt frame is `WalCorruption`; the position stays at the
    /// start of that frame.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        let (entry, used) = WalEntry::deserialize(&self.buf[self.pos..], self.cipher.as_ref())?;
        self.pos += used;
        Ok(Some(entry))
    }

    /// Bytes of valid frames read so far
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total bytes in the log
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Iterator for WalReader {
    type Item = Result<WalEntry>;

    /// Stops after the first error
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
