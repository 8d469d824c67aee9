//! Configuration for tuckdb
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::crypto::EncryptionLevel;

/// Main configuration for a tuckdb `Storage` instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Database file. `None` keeps everything in memory.
    /// Internal structure of the file:
    ///   header slot A | header slot B | schema | data | index | wal (tail)
    pub path: Option<PathBuf>,

    /// Sync the WAL after every mutation and checkpoint after every
    /// committed transaction
    pub auto_flush: bool,

    /// Load only schema and indexes at open; rows are read from the file
    /// on demand. Ignored for encrypted files.
    pub lazy_load: bool,

    /// Add an auto-increment `id` column to tables declared without a
    /// primary key. When false such tables use synthetic row ids.
    pub auto_primary_key: bool,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Advertise a WAL region once the file exists; mutations then append
    /// to the log instead of rewriting the file
    pub wal_enabled: bool,

    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    /// Number of WAL entries after which a checkpoint runs automatically
    pub wal_checkpoint_threshold: usize,

    /// Fail the open on a corrupt WAL frame instead of truncating replay
    pub strict_wal_replay: bool,

    // -------------------------------------------------------------------------
    // Encryption Configuration
    // -------------------------------------------------------------------------
    /// Encryption for newly written files, and the password used to open
    /// existing encrypted files
    pub encryption: Option<EncryptionConfig>,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N buffered entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

/// Encryption settings
#[derive(Clone)]
pub struct EncryptionConfig {
    pub level: EncryptionLevel,
    pub password: String,
}

impl std::fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("level", &self.level)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: None,
            auto_flush: false,
            lazy_load: false,
            auto_primary_key: true,
            wal_enabled: true,
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            wal_checkpoint_threshold: 1000,
            strict_wal_replay: false,
            encryption: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Whether this config describes a purely in-memory store
    pub fn in_memory(&self) -> bool {
        self.path.is_none()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the database file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = Some(path.into());
        self
    }

    /// Keep everything in memory (no backing file)
    pub fn in_memory(mut self) -> Self {
        self.config.path = None;
        self
    }

    /// Enable or disable auto-flush
    pub fn auto_flush(mut self, enabled: bool) -> Self {
        self.config.auto_flush = enabled;
        self
    }

    /// Enable or disable lazy row loading
    pub fn lazy_load(mut self, enabled: bool) -> Self {
        self.config.lazy_load = enabled;
        self
    }

    /// Enable or disable the implicit `id` primary key
    pub fn auto_primary_key(mut self, enabled: bool) -> Self {
        self.config.auto_primary_key = enabled;
        self
    }

    /// Enable or disable WAL mode
    pub fn wal_enabled(mut self, enabled: bool) -> Self {
        self.config.wal_enabled = enabled;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the number of WAL entries that triggers a checkpoint
    pub fn wal_checkpoint_threshold(mut self, entries: usize) -> Self {
        self.config.wal_checkpoint_threshold = entries;
        self
    }

    /// Fail loudly on WAL corruption during replay
    pub fn strict_wal_replay(mut self, strict: bool) -> Self {
        self.config.strict_wal_replay = strict;
        self
    }

    /// Encrypt the file with the given level and password
    pub fn encryption(mut self, level: EncryptionLevel, password: impl Into<String>) -> Self {
        self.config.encryption = Some(EncryptionConfig {
            level,
            password: password.into(),
        });
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
