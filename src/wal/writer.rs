//! WAL Writer
//!
//! Handles appending entries to the WAL, which is the tail of the database
//! file (or a standalone file).

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use super::WalEntry;
use crate::config::WalSyncStrategy;
use crate::crypto::Cipher;
use crate::error::Result;

/// Appends entries to the WAL
pub struct WalWriter {
    writer: BufWriter<File>,
    /// LSN the next append receives
    next_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries appended since the last sync
    uncommitted: usize,
    cipher: Option<Cipher>,
}

impl WalWriter {
    /// Open or create a WAL file for appending. LSNs start at 1.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            next_lsn: 1,
            sync_strategy,
            uncommitted: 0,
            cipher: None,
        })
    }

    /// Continue numbering after `last_lsn`
    pub fn with_last_lsn(mut self, last_lsn: u64) -> Self {
        self.next_lsn = last_lsn + 1;
        self
    }

    /// Encrypt entry payloads
    pub fn with_cipher(mut self, cipher: Option<Cipher>) -> Self {
        self.cipher = cipher;
        self
    }

    /// Append an entry, assigning it the next LSN. Returns that LSN.
    pub fn append(&mut self, entry: WalEntry) -> Result<u64> {
        self.append_batch(vec![entry])
    }

    /// Append entries with consecutive LSNs and return the last one.
    ///
    /// Every frame is serialized before the first byte is written, so an
    /// entry that cannot be framed leaves the WAL untouched.
    pub fn append_batch(&mut self, entries: Vec<WalEntry>) -> Result<u64> {
        let mut lsn = self.next_lsn - 1;
        let mut frames = Vec::new();
        for mut entry in entries {
            lsn += 1;
            entry.lsn = lsn;
            frames.extend_from_slice(&entry.serialize(self.cipher.as_ref())?);
        }
        let count = (lsn + 1 - self.next_lsn) as usize;
        if count == 0 {
            return Ok(lsn);
        }

        self.writer.write_all(&frames)?;
        self.next_lsn = lsn + 1;
        self.uncommitted += count;

        match self.sync_strategy {
            WalSyncStrategy::EveryWrite => self.sync()?,
            WalSyncStrategy::EveryNEntries { count } => {
                if self.uncommitted >= count.max(1) {
                    self.sync()?;
                }
            }
        }
        Ok(lsn)
    }

    /// Force buffered entries to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// LSN the next append will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// LSN of the last appended entry (0 when none)
    pub fn last_lsn(&self) -> u64 {
        self.next_lsn - 1
    }

    /// Entries written but not yet synced
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    /// Sync and release the file
    pub fn close(mut self) -> Result<()> {
        self.sync()
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        if self.uncommitted > 0 {
            if let Err(e) = self.sync() {
                tracing::warn!("Failed to sync WAL on drop: {}", e);
            }
        }
    }
}
