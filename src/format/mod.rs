//! Binary File Format
//!
//! One file holds the whole store.
//!
//! ## File Layout
//! ```text
//! ┌──────────────────────────┐ 0
//! │ Header slot A (128)      │
//! ├──────────────────────────┤ 128
//! │ Header slot B (128)      │
//! ├──────────────────────────┤ 256
//! │ Schema region            │ tables, columns, next ids
//! ├──────────────────────────┤
//! │ Data region              │ length-prefixed row records
//! ├──────────────────────────┤
//! │ Index region             │ row offsets + index contents
//! ├──────────────────────────┤
//! │ WAL region (tail)        │ grows by appends until checkpoint
//! └──────────────────────────┘ EOF
//! ```
//!
//! ## Guarantees
//! - `save` writes `<path>.tmp` and renames it over the target, so readers
//!   never see a half-written file
//! - Header slots are written inactive first, synced, then active
//! - `load` checks magic, version, header CRC and region bounds before
//!   trusting any offset; any mismatch is an error, never partial data
//! - Encrypted files are authenticated before any region is read

pub(crate) mod compact;
pub(crate) mod data;
pub mod header;
pub(crate) mod index_region;
pub(crate) mod schema;
pub(crate) mod varint;

pub use header::{FileHeader, HeaderSlot, Region, Slot};

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::{Config, EncryptionConfig};
use crate::crypto::{Cipher, EncryptionLevel, KeyDescriptor};
use crate::error::{Result, TuckError};
use crate::index::IndexKind;
use crate::table::{LazyRows, Table, Tables};
use crate::wal::WalRecovery;
use header::{FLAG_WAL, FORMAT_VERSION, HEADER_SIZE, MAGIC, REGIONS_START};

/// Region ids, mixed into the encryption nonce
const SCHEMA_REGION: u8 = 1;
const DATA_REGION: u8 = 2;
const INDEX_REGION: u8 = 3;

const ENGINE: &str = "tuckdb-binary";

/// Key material of an encrypted file
#[derive(Debug, Clone)]
pub(crate) struct Keys {
    pub cipher: Cipher,
    pub descriptor: KeyDescriptor,
}

impl Keys {
    fn create(level: EncryptionLevel, password: &str) -> Result<Self> {
        let (cipher, descriptor) = Cipher::create(level, password)?;
        Ok(Self { cipher, descriptor })
    }
}

/// Header and keys of an open file
#[derive(Debug, Clone)]
pub(crate) struct FileState {
    pub header: FileHeader,
    /// Slot that held the authoritative header
    pub slot: Slot,
    pub keys: Option<Keys>,
}

impl FileState {
    pub fn cipher(&self) -> Option<&Cipher> {
        self.keys.as_ref().map(|k| &k.cipher)
    }
}

/// Result of a cheap header-only probe
#[derive(Debug, Clone, Serialize)]
pub struct ProbeSummary {
    pub engine: &'static str,
    pub format_version: u16,
    pub generation: u64,
    pub table_count: u32,
    pub wal_active: bool,
    pub checkpoint_lsn: u64,
    pub encryption: Option<String>,
    pub file_size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// File-system level metadata
#[derive(Debug, Clone, Serialize)]
pub struct FileMetadata {
    pub engine: &'static str,
    pub file_size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Reads and writes the single-file format
#[derive(Debug, Clone)]
pub struct BinaryBackend {
    path: PathBuf,
    encryption: Option<EncryptionConfig>,
    lazy_load: bool,
    wal_enabled: bool,
}

impl BinaryBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            encryption: None,
            lazy_load: false,
            wal_enabled: true,
        }
    }

    /// Backend for a file-backed config; `None` when the config is in-memory
    pub fn from_config(config: &Config) -> Option<Self> {
        let path = config.path.clone()?;
        Some(Self {
            path,
            encryption: config.encryption.clone(),
            lazy_load: config.lazy_load,
            wal_enabled: config.wal_enabled,
        })
    }

    /// Encrypt written files; also supplies the password for reading
    pub fn with_encryption(mut self, level: EncryptionLevel, password: impl Into<String>) -> Self {
        self.encryption = Some(EncryptionConfig {
            level,
            password: password.into(),
        });
        self
    }

    pub fn with_lazy_load(mut self, lazy: bool) -> Self {
        self.lazy_load = lazy;
        self
    }

    pub fn with_wal(mut self, enabled: bool) -> Self {
        self.wal_enabled = enabled;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn delete(&self) -> Result<()> {
        if self.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    // =========================================================================
    // Whole-store API
    // =========================================================================

    /// Write `tables` as a fresh checkpoint of the file
    pub fn save(&self, tables: &Tables) -> Result<()> {
        let prev = if self.exists() {
            Some(self.read_state()?)
        } else {
            None
        };
        let checkpoint_lsn = match &prev {
            Some(state) => self.recovery(state).verify()?.last_lsn,
            None => 0,
        };
        self.write(tables, prev.as_ref(), checkpoint_lsn)?;
        Ok(())
    }

    /// Read every table, replaying any WAL entries after the checkpoint
    pub fn load(&self) -> Result<Tables> {
        if !self.exists() {
            return Err(TuckError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", self.path.display()),
            )));
        }
        let state = self.read_state()?;
        let mut tables = self.read_tables(&state)?;
        let (entries, _) = self.recovery(&state).recover()?;
        WalRecovery::replay(&mut tables, &entries)?;
        Ok(tables)
    }

    /// Identify a file from its header alone.
    ///
    /// Returns `(false, None)` for files of another format, `(true, None)`
    /// when the magic matches but no header slot is usable.
    pub fn probe(path: impl AsRef<Path>) -> Result<(bool, Option<ProbeSummary>)> {
        let path = path.as_ref();
        let meta = match fs::metadata(path) {
            Ok(meta) if meta.is_file() => meta,
            _ => return Ok((false, None)),
        };
        if meta.len() < REGIONS_START {
            return Ok((false, None));
        }

        let mut slots = [0u8; 2 * HEADER_SIZE];
        File::open(path)?.read_exact(&mut slots)?;
        let (a, b) = slots.split_at(HEADER_SIZE);
        if &a[..4] != MAGIC && &b[..4] != MAGIC {
            return Ok((false, None));
        }

        let header = match header::select(FileHeader::parse(a), FileHeader::parse(b)) {
            Ok((_, header)) => header,
            Err(_) => return Ok((true, None)),
        };
        Ok((
            true,
            Some(ProbeSummary {
                engine: ENGINE,
                format_version: header.version,
                generation: header.generation,
                table_count: header.table_count,
                wal_active: header.wal_active(),
                checkpoint_lsn: header.checkpoint_lsn,
                encryption: header.encryption.map(|d| d.level.to_string()),
                file_size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            }),
        ))
    }

    pub fn metadata(&self) -> Result<FileMetadata> {
        let meta = fs::metadata(&self.path)?;
        Ok(FileMetadata {
            engine: ENGINE,
            file_size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    // =========================================================================
    // Building Blocks (used by Storage)
    // =========================================================================

    /// Read both header slots, pick one, and unlock the file
    pub(crate) fn read_state(&self) -> Result<FileState> {
        let mut file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();
        if file_len < REGIONS_START {
            return Err(TuckError::format(format!(
                "File too small for a header: {} bytes",
                file_len
            )));
        }

        let mut slots = [0u8; 2 * HEADER_SIZE];
        file.read_exact(&mut slots)?;
        let (a, b) = slots.split_at(HEADER_SIZE);
        let (slot, header) = header::select(FileHeader::parse(a), FileHeader::parse(b))?;
        header.check_bounds(file_len)?;

        let keys = match header.encryption {
            Some(descriptor) => {
                let password = self.encryption.as_ref().map(|e| e.password.as_str());
                let cipher = Cipher::unlock(&descriptor, password)?;
                Some(Keys { cipher, descriptor })
            }
            None => {
                if self.encryption.is_some() {
                    tracing::debug!(
                        "{} is not encrypted; it will be encrypted at the next checkpoint",
                        self.path.display()
                    );
                }
                None
            }
        };

        tracing::debug!(
            "Header from slot {:?}: generation {}, {} tables, checkpoint LSN {}",
            slot,
            header.generation,
            header.table_count,
            header.checkpoint_lsn
        );
        Ok(FileState { header, slot, keys })
    }

    /// Read schema, index and (unless lazy) data regions
    pub(crate) fn read_tables(&self, state: &FileState) -> Result<Tables> {
        let header = &state.header;
        let mut file = File::open(&self.path)?;

        let schema_bytes = read_region(&mut file, header.schema, SCHEMA_REGION, state)?;
        let mut tables = schema::decode(&schema_bytes, header.table_count)?;

        let index_bytes = read_region(&mut file, header.index, INDEX_REGION, state)?;
        let mut stored: HashMap<String, index_region::TableIndexes> = index_region::decode(&index_bytes)?
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();

        let lazy = self.lazy_load && state.keys.is_none();
        if lazy {
            let handle = Arc::new(Mutex::new(file));
            for table in tables.iter_mut() {
                let offsets = stored
                    .get_mut(table.name())
                    .map(|t| std::mem::take(&mut t.offsets))
                    .ok_or_else(|| {
                        TuckError::format(format!("No row offsets for table '{}'", table.name()))
                    })?;
                table.set_lazy(LazyRows::new(Arc::clone(&handle), offsets));
            }
        } else {
            let data_bytes = read_region(&mut file, header.data, DATA_REGION, state)?;
            data::decode_region(&data_bytes, &mut tables)?;
        }

        let mut by_name = Tables::new();
        for mut table in tables {
            let mut loaded = HashSet::new();
            if let Some(entry) = stored.remove(table.name()) {
                for (column, index) in entry.indexes {
                    table.put_loaded_index(&column, index)?;
                    loaded.insert(column);
                }
            }
            rebuild_unloaded_indexes(&mut table, &loaded)?;
            let name = table.name().to_string();
            if by_name.insert(name.clone(), table).is_some() {
                return Err(TuckError::format(format!("Duplicate table '{}'", name)));
            }
        }

        tracing::debug!(
            "Loaded {} tables from {} ({})",
            by_name.len(),
            self.path.display(),
            if lazy { "lazy" } else { "eager" }
        );
        Ok(by_name)
    }

    /// WAL recovery for the file described by `state`
    pub(crate) fn recovery(&self, state: &FileState) -> WalRecovery {
        WalRecovery::new(&self.path, state.header.wal.offset)
            .checkpoint_lsn(state.header.checkpoint_lsn)
            .cipher(state.cipher().cloned())
    }

    /// Write a complete new file and swap it in
    pub(crate) fn write(
        &self,
        tables: &Tables,
        prev: Option<&FileState>,
        checkpoint_lsn: u64,
    ) -> Result<FileState> {
        let generation = prev.map_or(1, |p| p.header.generation + 1);
        let keys = self.keys_for_write(prev)?;

        let mut schema_bytes = schema::encode(tables.values())?;
        let schema_region = Region::new(REGIONS_START, schema_bytes.len() as u64);
        let (mut data_bytes, offsets) = data::encode_region(tables.values(), schema_region.end())?;
        let data_region = Region::new(schema_region.end(), data_bytes.len() as u64);
        let mut index_bytes = index_region::encode(tables.values(), &offsets)?;
        let index_region = Region::new(data_region.end(), index_bytes.len() as u64);

        if let Some(keys) = &keys {
            let cipher = &keys.cipher;
            cipher.apply(Cipher::region_nonce(generation, SCHEMA_REGION), &mut schema_bytes);
            cipher.apply(Cipher::region_nonce(generation, DATA_REGION), &mut data_bytes);
            cipher.apply(Cipher::region_nonce(generation, INDEX_REGION), &mut index_bytes);
        }

        let table_count = u32::try_from(tables.len())
            .map_err(|_| TuckError::validation("Too many tables"))?;
        let header = FileHeader {
            version: FORMAT_VERSION,
            flags: if self.wal_enabled { FLAG_WAL } else { 0 },
            generation,
            schema: schema_region,
            data: data_region,
            index: index_region,
            wal: Region::new(index_region.end(), 0),
            checkpoint_lsn,
            table_count,
            encryption: keys.as_ref().map(|k| k.descriptor),
        };

        let active = prev.map_or(Slot::A, |p| p.slot);
        let tmp = tmp_path(&self.path);
        let written = write_file(
            &tmp,
            &header,
            [&schema_bytes[..], &data_bytes[..], &index_bytes[..]],
            active,
        );
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                tracing::debug!("Could not remove {}: {}", tmp.display(), cleanup);
            }
            return Err(e);
        }
        fs::rename(&tmp, &self.path)?;

        tracing::debug!(
            "Wrote {} (generation {}, {} bytes, checkpoint LSN {})",
            self.path.display(),
            generation,
            index_region.end(),
            checkpoint_lsn
        );
        Ok(FileState {
            header,
            slot: active,
            keys,
        })
    }

    fn keys_for_write(&self, prev: Option<&FileState>) -> Result<Option<Keys>> {
        let existing = prev.and_then(|p| p.keys.clone());
        Ok(match (&self.encryption, existing) {
            (Some(enc), Some(keys)) if keys.descriptor.level == enc.level => Some(keys),
            (Some(enc), _) => Some(Keys::create(enc.level, &enc.password)?),
            (None, keys) => keys,
        })
    }
}

/// Write regions, then the header into the inactive slot, sync, then the
/// active slot
fn write_file(path: &Path, header: &FileHeader, regions: [&[u8]; 3], active: Slot) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    file.write_all(&[0u8; REGIONS_START as usize])?;
    for region in regions {
        file.write_all(region)?;
    }
    file.sync_data()?;

    let bytes = header.to_bytes();
    file.seek(SeekFrom::Start(active.other().offset()))?;
    file.write_all(&bytes)?;
    file.sync_data()?;
    file.seek(SeekFrom::Start(active.offset()))?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    Ok(())
}

fn read_region(file: &mut File, region: Region, id: u8, state: &FileState) -> Result<Vec<u8>> {
    let len = usize::try_from(region.size)
        .map_err(|_| TuckError::format(format!("Region of {} bytes", region.size)))?;
    let mut bytes = vec![0u8; len];
    file.seek(SeekFrom::Start(region.offset))?;
    file.read_exact(&mut bytes)?;
    if let Some(cipher) = state.cipher() {
        cipher.apply(Cipher::region_nonce(state.header.generation, id), &mut bytes);
    }
    Ok(bytes)
}

/// Columns declared indexed but absent from the index region are rebuilt
/// from the rows
fn rebuild_unloaded_indexes(table: &mut Table, loaded: &HashSet<String>) -> Result<()> {
    let missing: Vec<String> = table
        .columns()
        .iter()
        .filter(|c| c.index != IndexKind::None && !loaded.contains(&c.name))
        .map(|c| c.name.clone())
        .collect();
    for column in missing {
        tracing::warn!(
            "Index on '{}.{}' missing from file, rebuilding",
            table.name(),
            column
        );
        table.build_index(&column)?;
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
