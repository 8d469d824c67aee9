//! # tuckdb
//!
//! An embedded, single-file typed record store with:
//! - Tables of named, typed columns with hash or sorted secondary indexes
//! - Write-Ahead Logging (WAL) inside the data file for durability
//! - Dual redundant headers for crash-safe checkpoints
//! - Optional password-based encryption of the file regions
//! - Single-level transactions with snapshot rollback
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Storage                              │
//! │        (DDL, row API, queries, transactions, checkpoint)     │
//! └──────────────┬───────────────────────────────┬──────────────┘
//!                │                               │
//!                ▼                               ▼
//!         ┌─────────────┐                 ┌─────────────┐
//!         │    Table    │                 │     WAL     │
//!         │ rows+indexes│                 │  (append)   │
//!         └──────┬──────┘                 └──────┬──────┘
//!                │                               │
//!                ▼                               ▼
//!         ┌─────────────────────────────────────────────┐
//!         │        BinaryBackend (file format)          │
//!         │ header A | header B | schema | data | index │
//!         │                                 | WAL tail  │
//!         └──────────────────────┬──────────────────────┘
//!                                ▼
//!                        ┌─────────────┐
//!                        │   Cipher    │ (optional)
//!                        └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use tuckdb::{record, Column, ColumnType, Condition, Config, IndexKind, Query, Storage};
//!
//! # fn main() -> tuckdb::Result<()> {
//! let mut db = Storage::open(Config::builder().path("people.tuck").build())?;
//! db.create_table(
//!     "people",
//!     vec![
//!         Column::new("name", ColumnType::Str).nullable(false),
//!         Column::new("age", ColumnType::Int).index(IndexKind::Sorted),
//!     ],
//! )?;
//! db.insert("people", record! { "name" => "Ada", "age" => 36 })?;
//! let adults = db.query("people", &Query::new().filter(Condition::ge("age", 18)))?;
//! assert_eq!(adults.len(), 1);
//! db.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod crypto;
pub mod format;
pub mod index;
pub mod storage;
pub mod table;
pub mod types;
pub mod wal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, WalSyncStrategy};
pub use crypto::EncryptionLevel;
pub use error::{Result, TuckError};
pub use format::BinaryBackend;
pub use index::IndexKind;
pub use storage::{Condition, Query, Storage, SyncOptions, SyncResult};
pub use table::{Column, Table, Tables};
pub use types::{ColumnType, Record, RowId, Timestamp, Value};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of tuckdb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
