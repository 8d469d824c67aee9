//! Error types for tuckdb
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using TuckError
pub type Result<T> = std::result::Result<T, TuckError>;

/// Unified error type for tuckdb operations
#[derive(Debug, Error)]
pub enum TuckError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Format Errors (fail closed, never substitute defaults)
    // -------------------------------------------------------------------------
    #[error("Format error: {0}")]
    Format(String),

    #[error("Decode error: {0}")]
    Decode(String),

    // -------------------------------------------------------------------------
    // Authentication Errors
    // -------------------------------------------------------------------------
    #[error("Authentication failed: {0}")]
    Authentication(String),

    // -------------------------------------------------------------------------
    // Data Integrity Errors
    // -------------------------------------------------------------------------
    #[error("Duplicate primary key {key} in table '{table}'")]
    DuplicateKey { table: String, key: String },

    #[error("Record with primary key {key} not found in table '{table}'")]
    RecordNotFound { table: String, key: String },

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    // -------------------------------------------------------------------------
    // Validation Errors
    // -------------------------------------------------------------------------
    #[error("Validation error: {0}")]
    Validation(String),

    // -------------------------------------------------------------------------
    // Transaction Errors
    // -------------------------------------------------------------------------
    #[error("Transaction error: {0}")]
    Transaction(String),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for TuckError {
    fn from(err: bincode::Error) -> Self {
        TuckError::Serialization(err.to_string())
    }
}

impl TuckError {
    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        TuckError::Decode(msg.into())
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        TuckError::Format(msg.into())
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        TuckError::Validation(msg.into())
    }
}
