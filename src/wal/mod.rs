//! Write-Ahead Log (WAL) Module
//!
//! Provides durability between checkpoints through append-only logging.
//!
//! ## Responsibilities
//! - Append one entry per row mutation
//! - CRC32 checksums for corruption detection
//! - Log Sequence Numbers (LSN) for ordering, increasing across checkpoints
//! - Replay after restart, stopping at a torn tail
//!
//! ## States
//! ```text
//!   NoWal ──first checkpoint──▶ Active ──threshold / explicit──▶ Checkpointing
//!                                 ▲                                   │
//!                                 └────── rewrite + new header ───────┘
//! ```
//!
//! ## Frame Format
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │ Entry 1                                         │
//! │ ┌─────────┬─────────┬─────────────────┬───────┐ │
//! │ │ Len (4) │ LSN (8) │ Payload (Len)   │CRC (4)│ │
//! │ └─────────┴─────────┴─────────────────┴───────┘ │
//! ├─────────────────────────────────────────────────┤
//! │ Entry 2 ...                                     │
//! └─────────────────────────────────────────────────┘
//! Payload = bincode(operation, table, key, record), encrypted when the
//! file is. CRC covers Len, LSN and Payload.
//! ```

mod entry;
mod reader;
mod recovery;
mod writer;

pub use entry::{Operation, WalEntry, FRAME_OVERHEAD, HEADER_SIZE, MAX_PAYLOAD};
pub use reader::WalReader;
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;

/// Where an open file is in the WAL lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalState {
    /// Mutations are only persisted by a full rewrite
    NoWal,
    /// Mutations append to the log
    Active,
    /// A full rewrite is consolidating the log
    Checkpointing,
}
