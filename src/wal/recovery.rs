//! WAL Recovery
//!
//! Reads the log after a restart and re-applies it to the loaded tables.
//!
//! Replay stops at the first bad frame: a torn tail is an incomplete write,
//! not a fatal error. In strict mode the same frame fails the open instead.

use std::fs::OpenOptions;
use std::path::PathBuf;

use super::{Operation, WalEntry, WalReader};
use crate::crypto::Cipher;
use crate::error::{Result, TuckError};
use crate::table::Tables;

/// Handles WAL recovery after a crash or restart
pub struct WalRecovery {
    path: PathBuf,
    /// Where the WAL starts in the file
    offset: u64,
    /// Entries at or below this LSN are already in the base regions
    checkpoint_lsn: u64,
    cipher: Option<Cipher>,
    strict: bool,
}

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries returned for replay
    pub entries_recovered: u64,

    /// Entries skipped because the checkpoint already covers them
    pub entries_skipped: u64,

    /// Number of corrupted frames hit (0 or 1; reading stops there)
    pub entries_corrupted: u64,

    /// Last valid LSN (the checkpoint LSN when nothing newer was found)
    pub last_lsn: u64,

    /// Whether a corrupt or partial tail was found after the valid entries
    pub was_truncated: bool,

    /// Length in bytes of the valid prefix of the log
    pub valid_len: u64,
}

impl WalRecovery {
    /// Recover a WAL that starts at `offset` in `path`
    pub fn new(path: impl Into<PathBuf>, offset: u64) -> Self {
        Self {
            path: path.into(),
            offset,
            checkpoint_lsn: 0,
            cipher: None,
            strict: false,
        }
    }

    pub fn checkpoint_lsn(mut self, lsn: u64) -> Self {
        self.checkpoint_lsn = lsn;
        self
    }

    pub fn cipher(mut self, cipher: Option<Cipher>) -> Self {
        self.cipher = cipher;
        self
    }

    /// Fail with `WalCorruption` instead of truncating at a bad frame
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Read every valid entry newer than the checkpoint.
    ///
    /// This will:
    /// 1. Read frames in order
    /// 2. Skip entries the checkpoint already covers
    /// 3. Stop at the first torn or corrupt frame (or fail, when strict)
    /// 4. Return the remaining entries in LSN order
    pub fn recover(&self) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let mut reader =
            WalReader::open_at(&self.path, self.offset)?.with_cipher(self.cipher.clone());
        let mut entries = Vec::new();
        let mut result = RecoveryResult {
            last_lsn: self.checkpoint_lsn,
            ..RecoveryResult::default()
        };
        let mut previous_lsn = 0u64;

        loop {
            let frame_start = reader.position();
            match reader.next_entry() {
                Ok(None) => break,
                Ok(Some(entry)) => {
                    if entry.lsn <= previous_lsn {
                        let err = TuckError::WalCorruption(format!(
                            "LSN {} after {} at WAL byte {}",
                            entry.lsn, previous_lsn, frame_start
                        ));
                        if self.strict {
                            return Err(err);
                        }
                        tracing::warn!("Stopping WAL replay: {}", err);
                        result.entries_corrupted += 1;
                        result.was_truncated = true;
                        result.valid_len = frame_start as u64;
                        break;
                    }
                    previous_lsn = entry.lsn;
                    result.valid_len = reader.position() as u64;

                    if entry.lsn <= self.checkpoint_lsn {
                        result.entries_skipped += 1;
                        continue;
                    }
                    result.entries_recovered += 1;
                    result.last_lsn = entry.lsn;
                    entries.push(entry);
                }
                Err(e) => {
                    if self.strict {
                        return Err(e);
                    }
                    tracing::warn!(
                        "Stopping WAL replay at byte {} of {}: {}",
                        frame_start,
                        reader.len(),
                        e
                    );
                    result.entries_corrupted += 1;
                    result.was_truncated = true;
                    result.valid_len = frame_start as u64;
                    break;
                }
            }
        }

        Ok((entries, result))
    }

    /// Verify integrity of the log without returning entries
    pub fn verify(&self) -> Result<RecoveryResult> {
        self.recover().map(|(_, result)| result)
    }

    /// Cut a torn tail off the file so new appends follow the valid prefix
    pub fn truncate_tail(&self, result: &RecoveryResult) -> Result<()> {
        if !result.was_truncated {
            return Ok(());
        }
        let end = self.offset + result.valid_len;
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(end)?;
        file.sync_all()?;
        tracing::info!("Truncated WAL tail at byte {}", end);
        Ok(())
    }

    /// Apply recovered entries to `tables` in order. Returns the count.
    pub fn replay(tables: &mut Tables, entries: &[WalEntry]) -> Result<usize> {
        for entry in entries {
            let table = tables
                .get_mut(&entry.table)
                .ok_or_else(|| TuckError::TableNotFound(entry.table.clone()))?;
            let id = entry.row_id()?;
            match entry.operation {
                Operation::Insert => {
                    let record = entry.fields(table)?;
                    table.insert_with_id(id, record)?;
                }
                Operation::Update => {
                    let changes = entry.fields(table)?;
                    table.update(&id, changes)?;
                }
                Operation::Delete => {
                    table.delete(&id)?;
                }
            }
        }
        Ok(entries.len())
    }
}
