//! Storage Module
//!
//! The orchestrator: owns the tables of one store and decides when and how
//! changes reach the file.
//!
//! ## Responsibilities
//! - Open a file: pick the header, unlock, load, replay the WAL
//! - Route row mutations through the table and into the WAL
//! - Checkpoint on threshold, on DDL, on request and on close
//! - Single-level transactions with snapshot rollback
//! - Schema evolution (add/drop columns, renames, comments)
//! - Index-aware queries
//!
//! ## Write Path
//! ```text
//! insert/update/delete
//!        │
//!        ▼
//!   Table (validate, index) ──▶ WalEntry
//!                                  │
//!            ┌─────────────────────┼──────────────────────┐
//!            ▼                     ▼                      ▼
//!     in transaction          WAL active               no WAL
//!     (held until commit)     (append; checkpoint      (full rewrite)
//!                              past threshold)
//! ```
//!
//! A row change whose entry cannot be written is undone in the table
//! before the error is returned.

mod query;
mod schema;
mod transaction;

pub use query::{Condition, Query};
pub use schema::{SyncOptions, SyncResult};

use std::borrow::Cow;
use std::path::Path;

use crate::config::Config;
use crate::error::{Result, TuckError};
use crate::format::{schema as schema_region, BinaryBackend, FileState};
use crate::index::IndexKind;
use crate::table::{Column, Table, Tables};
use crate::types::{ColumnType, Record, RowId};
use crate::wal::{WalEntry, WalRecovery, WalState, WalWriter};
use transaction::Transaction;

/// Name of the primary key added to tables declared without one
pub const AUTO_PRIMARY_KEY: &str = "id";

/// An open store
///
/// All mutating methods take `&mut self`: one writer per instance, and no
/// coordination with other processes touching the same file.
pub struct Storage {
    config: Config,

    /// `None` for in-memory stores
    backend: Option<BinaryBackend>,

    tables: Tables,

    /// Header and keys of the file as last read or written
    file: Option<FileState>,

    /// Open while the file advertises a WAL region
    wal: Option<WalWriter>,

    wal_state: WalState,

    /// WAL entries appended since the last checkpoint
    wal_entries: usize,

    /// LSN of the newest entry ever logged to this file
    last_lsn: u64,

    transaction: Option<Transaction>,
}

impl Storage {
    /// Open or create a store
    ///
    /// On startup:
    /// 1. Validate the config
    /// 2. In-memory: start empty
    /// 3. New file: write an empty checkpoint
    /// 4. Existing file: read header, unlock, load tables, replay the WAL
    ///    and cut off any torn tail
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Reject configs that cannot work
        if config.wal_checkpoint_threshold == 0 {
            return Err(TuckError::Config(
                "wal_checkpoint_threshold must be at least 1".to_string(),
            ));
        }
        if let Some(enc) = &config.encryption {
            if enc.password.is_empty() {
                return Err(TuckError::Config(
                    "Encryption password must not be empty".to_string(),
                ));
            }
        }

        let backend = BinaryBackend::from_config(&config);
        let mut storage = Self {
            config,
            backend,
            tables: Tables::new(),
            file: None,
            wal: None,
            wal_state: WalState::NoWal,
            wal_entries: 0,
            last_lsn: 0,
            transaction: None,
        };

        // Step 2: In-memory
        let Some(backend) = storage.backend.as_ref() else {
            tracing::debug!("Opened in-memory store");
            return Ok(storage);
        };

        // Step 3: New file
        if !backend.exists() {
            tracing::info!("Creating {}", backend.path().display());
            storage.checkpoint()?;
            return Ok(storage);
        }

        // Step 4: Existing file
        let state = backend.read_state()?;
        let mut tables = backend.read_tables(&state)?;
        let recovery = backend
            .recovery(&state)
            .strict(storage.config.strict_wal_replay);
        let (entries, result) = recovery.recover()?;
        recovery.truncate_tail(&result)?;
        let replayed = WalRecovery::replay(&mut tables, &entries)?;

        if replayed > 0 || result.was_truncated {
            tracing::info!(
                "WAL recovery: {} entries replayed, {} skipped, {} corrupted, last LSN {}",
                replayed,
                result.entries_skipped,
                result.entries_corrupted,
                result.last_lsn
            );
        }

        storage.last_lsn = result.last_lsn;
        if state.header.wal_active() {
            storage.wal = Some(open_wal(backend.path(), &storage.config, &state, result.last_lsn)?);
            storage.wal_state = WalState::Active;
            storage.wal_entries = replayed;
        }
        tracing::info!(
            "Opened {} ({} tables, generation {}, {:?})",
            backend.path().display(),
            tables.len(),
            state.header.generation,
            storage.wal_state
        );
        storage.tables = tables;
        storage.file = Some(state);

        if storage.wal_entries >= storage.config.wal_checkpoint_threshold {
            storage.checkpoint()?;
        }
        Ok(storage)
    }

    /// Open the file at `path` with default settings
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(Config::builder().path(path.as_ref()).build())
    }

    /// Open an empty in-memory store
    pub fn in_memory() -> Result<Self> {
        Self::open(Config::default())
    }

    // =========================================================================
    // Tables (DDL)
    // =========================================================================

    /// Create a table.
    ///
    /// Without a declared primary key and with `auto_primary_key` set, an
    /// integer `id` primary key is prepended (unless a column already uses
    /// that name, in which case rows get synthetic ids).
    pub fn create_table(&mut self, name: &str, columns: Vec<Column>) -> Result<()> {
        let mut columns = columns;
        let has_pk = columns.iter().any(|c| c.primary_key);
        let name_taken = columns.iter().any(|c| c.name == AUTO_PRIMARY_KEY);
        if !has_pk && !name_taken && self.config.auto_primary_key {
            columns.insert(0, Column::new(AUTO_PRIMARY_KEY, ColumnType::Int).primary_key());
        }

        self.schema_change("create_table", |tables| {
            if tables.contains_key(name) {
                return Err(TuckError::validation(format!(
                    "Table '{}' already exists",
                    name
                )));
            }
            tables.insert(name.to_string(), Table::new(name, columns)?);
            Ok(())
        })?;
        tracing::debug!("Created table '{}'", name);
        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        self.schema_change("drop_table", |tables| {
            tables
                .remove(name)
                .map(drop)
                .ok_or_else(|| TuckError::TableNotFound(name.to_string()))
        })?;
        tracing::debug!("Dropped table '{}'", name);
        Ok(())
    }

    /// Add, change or remove (`IndexKind::None`) the index on a column
    pub fn set_index(&mut self, table: &str, column: &str, kind: IndexKind) -> Result<()> {
        self.schema_change("set_index", |tables| {
            get_table(tables, table)?.set_index_kind(column, kind)
        })
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| TuckError::TableNotFound(name.to_string()))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    // =========================================================================
    // Rows
    // =========================================================================

    /// Insert a record and return its row id
    pub fn insert(&mut self, table: &str, record: Record) -> Result<RowId> {
        let t = self.table_mut(table)?;
        let next_id = t.next_id();
        let id = t.insert(record)?;
        let entry = insert_entry(t, &id);
        self.record_change(table, entry, Undo::Insert { id: id.clone(), next_id })?;
        Ok(id)
    }

    /// Apply a partial update to row `id`
    pub fn update(&mut self, table: &str, id: &RowId, changes: Record) -> Result<()> {
        let t = self.table_mut(table)?;
        let Some(previous) = t.get(id)?.map(Cow::into_owned) else {
            return Err(TuckError::RecordNotFound {
                table: table.to_string(),
                key: id.to_string(),
            });
        };
        let changes = t.update(id, changes)?;
        let entry = WalEntry::update(t, id, &changes);
        self.record_change(table, entry, Undo::Update { id: id.clone(), previous })
    }

    /// Remove row `id` and return it
    pub fn delete(&mut self, table: &str, id: &RowId) -> Result<Record> {
        let t = self.table_mut(table)?;
        let record = t.delete(id)?;
        let entry = WalEntry::delete(t, id);
        self.record_change(
            table,
            entry,
            Undo::Delete {
                id: id.clone(),
                record: record.clone(),
            },
        )?;
        Ok(record)
    }

    /// Fetch one row by id
    pub fn select(&self, table: &str, id: &RowId) -> Result<Option<Record>> {
        Ok(self.table(table)?.get(id)?.map(|r| r.into_owned()))
    }

    /// Every row of a table in id order
    pub fn scan(&self, table: &str) -> Result<Vec<(RowId, Record)>> {
        Ok(self
            .table(table)?
            .scan()?
            .into_iter()
            .map(|(id, r)| (id, r.into_owned()))
            .collect())
    }

    pub fn count(&self, table: &str) -> Result<usize> {
        Ok(self.table(table)?.len())
    }

    pub fn query(&self, table: &str, query: &Query) -> Result<Vec<(RowId, Record)>> {
        query.execute(self.table(table)?)
    }

    // =========================================================================
    // Durability
    // =========================================================================

    /// Force buffered WAL entries to disk
    pub fn flush(&mut self) -> Result<()> {
        if let Some(wal) = self.wal.as_mut() {
            wal.sync()?;
        }
        Ok(())
    }

    /// Consolidate the WAL into a fresh file and advance the checkpoint LSN.
    ///
    /// No-op for in-memory stores.
    pub fn checkpoint(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(TuckError::Transaction(
                "Cannot checkpoint inside a transaction".to_string(),
            ));
        }
        let Some(backend) = self.backend.as_ref() else {
            return Ok(());
        };

        let previous = self.wal_state;
        if let Some(wal) = self.wal.as_mut() {
            wal.sync()?;
            self.wal_state = WalState::Checkpointing;
        }

        let written = self
            .tables
            .values_mut()
            .try_for_each(Table::materialize_all)
            .and_then(|()| backend.write(&self.tables, self.file.as_ref(), self.last_lsn));
        let state = match written {
            Ok(state) => state,
            Err(e) => {
                // The old file is untouched; keep appending to it
                self.wal_state = previous;
                return Err(e);
            }
        };

        // The old writer points at the replaced file
        self.wal = None;
        if state.header.wal_active() {
            self.wal = Some(open_wal(backend.path(), &self.config, &state, self.last_lsn)?);
            self.wal_state = WalState::Active;
        } else {
            self.wal_state = WalState::NoWal;
        }

        tracing::info!(
            "Checkpoint: generation {}, {} WAL entries consolidated, LSN {}",
            state.header.generation,
            self.wal_entries,
            self.last_lsn
        );
        self.wal_entries = 0;
        self.file = Some(state);
        Ok(())
    }

    /// Roll back any open transaction, checkpoint and release the file
    pub fn close(mut self) -> Result<()> {
        if self.transaction.is_some() {
            tracing::warn!("Closing with an open transaction; rolling back");
            self.rollback()?;
        }
        if self.wal_entries > 0 {
            self.checkpoint()?;
        }
        if let Some(wal) = self.wal.take() {
            wal.close()?;
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn path(&self) -> Option<&Path> {
        self.backend.as_ref().map(BinaryBackend::path)
    }

    pub fn wal_state(&self) -> WalState {
        self.wal_state
    }

    /// WAL entries appended since the last checkpoint
    pub fn wal_entry_count(&self) -> usize {
        self.wal_entries
    }

    /// Generation of the file header (0 for in-memory stores)
    pub fn generation(&self) -> u64 {
        self.file.as_ref().map_or(0, |f| f.header.generation)
    }

    pub fn last_lsn(&self) -> u64 {
        self.last_lsn
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        get_table(&mut self.tables, name)
    }

    /// Log a change already applied to `table`, undoing it when the entry
    /// cannot be built or written
    fn record_change(&mut self, table: &str, entry: Result<WalEntry>, undo: Undo) -> Result<()> {
        if let Err(e) = entry.and_then(|entry| self.log(entry)) {
            let reverted = self.table_mut(table).and_then(|t| undo.apply(t));
            if let Err(undo_err) = reverted {
                tracing::warn!("Could not revert change to '{}': {}", table, undo_err);
            }
            return Err(e);
        }
        self.settle()
    }

    /// Route an entry to the open transaction or straight to the file
    fn log(&mut self, entry: WalEntry) -> Result<()> {
        match self.transaction.as_mut() {
            Some(tx) => {
                tx.hold(entry);
                Ok(())
            }
            None => self.persist(vec![entry]),
        }
    }

    /// Write committed entries to the WAL, or rewrite the file when there
    /// is none. Nothing reaches the file when this fails.
    fn persist(&mut self, entries: Vec<WalEntry>) -> Result<()> {
        if entries.is_empty() || self.backend.is_none() {
            return Ok(());
        }

        let Some(wal) = self.wal.as_mut() else {
            // No WAL region: every change is a full rewrite
            return self.checkpoint();
        };
        let count = entries.len();
        match wal.append_batch(entries) {
            Ok(lsn) => {
                self.last_lsn = lsn;
                self.wal_entries += count;
                Ok(())
            }
            Err(TuckError::Io(e)) => {
                // The tail may be torn; the next change rewrites the file
                tracing::warn!("WAL append failed, dropping writer: {}", e);
                self.wal = None;
                Err(TuckError::Io(e))
            }
            Err(e) => Err(e),
        }
    }

    /// Sync and checkpoint past the threshold, outside transactions
    fn settle(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Ok(());
        }
        if self.config.auto_flush {
            if let Some(wal) = self.wal.as_mut() {
                wal.sync()?;
            }
        }
        if self.wal_entries >= self.config.wal_checkpoint_threshold {
            tracing::debug!(
                "WAL reached {} entries (threshold {}), checkpointing",
                self.wal_entries,
                self.config.wal_checkpoint_threshold
            );
            self.checkpoint()?;
        }
        Ok(())
    }

    /// Apply a schema change to a copy of the tables and persist it.
    /// On any failure the previous tables are kept.
    fn schema_change<T>(
        &mut self,
        what: &str,
        change: impl FnOnce(&mut Tables) -> Result<T>,
    ) -> Result<T> {
        self.reject_ddl_in_transaction(what)?;
        let previous = self.tables.clone();
        let result = change(&mut self.tables)
            .and_then(|value| {
                // Must still fit the schema region
                schema_region::encode(self.tables.values())?;
                Ok(value)
            })
            .and_then(|value| self.checkpoint_if_persistent().map(|()| value));
        if result.is_err() {
            self.tables = previous;
        }
        result
    }

    fn checkpoint_if_persistent(&mut self) -> Result<()> {
        if self.backend.is_some() {
            self.checkpoint()?;
        }
        Ok(())
    }

    fn reject_ddl_in_transaction(&self, what: &str) -> Result<()> {
        if self.transaction.is_some() {
            return Err(TuckError::Transaction(format!(
                "{} is not allowed inside a transaction",
                what
            )));
        }
        Ok(())
    }
}

/// Reverse of a row change whose entry never reached the file
enum Undo {
    Insert { id: RowId, next_id: i64 },
    Update { id: RowId, previous: Record },
    Delete { id: RowId, record: Record },
}

impl Undo {
    fn apply(self, table: &mut Table) -> Result<()> {
        match self {
            Undo::Insert { id, next_id } => table.revert_insert(&id, next_id),
            Undo::Update { id, previous } => table.restore_row(id, previous),
            Undo::Delete { id, record } => table.restore_row(id, record),
        }
    }
}

fn insert_entry(table: &Table, id: &RowId) -> Result<WalEntry> {
    let stored = table.get(id)?.ok_or_else(|| TuckError::RecordNotFound {
        table: table.name().to_string(),
        key: id.to_string(),
    })?;
    WalEntry::insert(table, id, &stored)
}

fn get_table<'a>(tables: &'a mut Tables, name: &str) -> Result<&'a mut Table> {
    tables
        .get_mut(name)
        .ok_or_else(|| TuckError::TableNotFound(name.to_string()))
}

/// WAL writer appending to the tail of `path`, numbering after `last_lsn`
fn open_wal(path: &Path, config: &Config, state: &FileState, last_lsn: u64) -> Result<WalWriter> {
    Ok(WalWriter::open(path, config.wal_sync_strategy)?
        .with_last_lsn(last_lsn)
        .with_cipher(state.cipher().cloned()))
}
