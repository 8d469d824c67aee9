//! Single-level transactions.
//!
//! `begin` snapshots every table. Entries logged while the transaction is
//! open are held back; `commit` hands them to the WAL (or rewrites the
//! file), `rollback` restores the snapshot and drops them.
//!
//! The snapshot is a deep clone of the table set. An undo log of
//! `(table, id, previous row)` would make `begin` cheaper for large stores.

use super::Storage;
use crate::error::{Result, TuckError};
use crate::table::Tables;
use crate::wal::WalEntry;

/// State of the open transaction
pub(super) struct Transaction {
    snapshot: Tables,
    held: Vec<WalEntry>,
}

impl Transaction {
    fn new(snapshot: Tables) -> Self {
        Self {
            snapshot,
            held: Vec::new(),
        }
    }

    /// Hold an entry until commit
    pub(super) fn hold(&mut self, entry: WalEntry) {
        self.held.push(entry);
    }
}

impl Storage {
    /// Start a transaction. Fails if one is already open.
    pub fn begin(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(TuckError::Transaction(
                "A transaction is already open".to_string(),
            ));
        }
        self.transaction = Some(Transaction::new(self.tables.clone()));
        tracing::debug!("Transaction started");
        Ok(())
    }

    /// Make the open transaction's changes durable.
    ///
    /// If the entries cannot be written the snapshot is restored, as with
    /// `rollback`. With `auto_flush` a checkpoint follows.
    pub fn commit(&mut self) -> Result<()> {
        let Some(tx) = self.transaction.take() else {
            return Err(TuckError::Transaction("No open transaction".to_string()));
        };
        let count = tx.held.len();
        if let Err(e) = self.persist(tx.held) {
            tracing::warn!("Commit of {} changes failed, rolling back: {}", count, e);
            self.tables = tx.snapshot;
            return Err(e);
        }
        self.settle()?;
        if self.config.auto_flush && self.wal_entries > 0 {
            self.checkpoint()?;
        }
        tracing::debug!("Transaction committed ({} changes)", count);
        Ok(())
    }

    /// Restore every table to its state at `begin`
    pub fn rollback(&mut self) -> Result<()> {
        let Some(tx) = self.transaction.take() else {
            return Err(TuckError::Transaction("No open transaction".to_string()));
        };
        self.tables = tx.snapshot;
        tracing::debug!("Transaction rolled back ({} changes dropped)", tx.held.len());
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back and return
    /// the error on `Err`
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Storage) -> Result<T>,
    {
        self.begin()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback() {
                    tracing::warn!("Rollback after failed transaction: {}", rollback);
                }
                Err(e)
            }
        }
    }
}
