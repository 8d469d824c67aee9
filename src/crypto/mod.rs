//! Encryption Filter
//!
//! Symmetric keystream ciphers applied to region bytes on their way to
//! and from disk.
//!
//! ## Invariants
//! - The password never touches disk; only a random salt and a 4-byte
//!   key-check tag are stored in the header
//! - Keys come from Argon2id over the password and that salt
//! - The key check is compared in constant time
//! - A wrong or missing password fails with `Authentication` before any
//!   region is decrypted
//!
//! ## Levels
//! ```text
//! ┌────────┬──────────────────────────────┬─────────────────────┐
//! │ Level  │ Keystream                    │ Use                 │
//! ├────────┼──────────────────────────────┼─────────────────────┤
//! │ Low    │ key ⊕ nonce byte cycling     │ casual obfuscation  │
//! │ Medium │ 64-bit LCG seeded from key   │ light protection    │
//! │ High   │ ChaCha20 (key, stream=nonce) │ real confidentiality│
//! └────────┴──────────────────────────────┴─────────────────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use argon2::Argon2;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{Result, TuckError};

/// Domain label mixed into the key-check hash
const KEY_CHECK_LABEL: &[u8] = b"tuckdb/key-check/v1";

pub const SALT_LEN: usize = 16;
pub const KEY_CHECK_LEN: usize = 4;

/// LCG constants (Knuth MMIX)
const LCG_MUL: u64 = 6_364_136_223_846_793_005;
const LCG_INC: u64 = 1_442_695_040_888_963_407;

/// Nonce namespace bit separating WAL frames from file regions
const WAL_NONCE_BIT: u64 = 1 << 63;

/// Encryption strength tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionLevel {
    Low,
    Medium,
    High,
}

impl EncryptionLevel {
    /// Header byte (0 is reserved for "not encrypted")
    pub fn tag(self) -> u8 {
        match self {
            EncryptionLevel::Low => 1,
            EncryptionLevel::Medium => 2,
            EncryptionLevel::High => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Option<Self>> {
        match tag {
            0 => Ok(None),
            1 => Ok(Some(EncryptionLevel::Low)),
            2 => Ok(Some(EncryptionLevel::Medium)),
            3 => Ok(Some(EncryptionLevel::High)),
            other => Err(TuckError::format(format!(
                "Unknown encryption level: {}",
                other
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EncryptionLevel::Low => "low",
            EncryptionLevel::Medium => "medium",
            EncryptionLevel::High => "high",
        }
    }
}

impl fmt::Display for EncryptionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EncryptionLevel {
    type Err = TuckError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(EncryptionLevel::Low),
            "medium" => Ok(EncryptionLevel::Medium),
            "high" => Ok(EncryptionLevel::High),
            other => Err(TuckError::Config(format!(
                "Unknown encryption level '{}' (expected low, medium or high)",
                other
            ))),
        }
    }
}

/// What the header stores about the key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDescriptor {
    pub level: EncryptionLevel,
    pub salt: [u8; SALT_LEN],
    pub key_check: [u8; KEY_CHECK_LEN],
}

/// A derived key bound to a level
#[derive(Clone)]
pub struct Cipher {
    level: EncryptionLevel,
    key: [u8; 32],
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher")
            .field("level", &self.level)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl Cipher {
    /// Derive a key under a fresh random salt
    pub fn create(level: EncryptionLevel, password: &str) -> Result<(Self, KeyDescriptor)> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let key = derive_key(password, &salt)?;
        let descriptor = KeyDescriptor {
            level,
            salt,
            key_check: key_check(&key),
        };
        Ok((Self { level, key }, descriptor))
    }

    /// Re-derive the key for an existing file and verify it
    pub fn unlock(descriptor: &KeyDescriptor, password: Option<&str>) -> Result<Self> {
        let password = password.ok_or_else(|| {
            TuckError::Authentication("file is encrypted but no password was given".into())
        })?;
        let key = derive_key(password, &descriptor.salt)?;
        let check = key_check(&key);
        if !bool::from(check[..].ct_eq(&descriptor.key_check[..])) {
            return Err(TuckError::Authentication("wrong password".into()));
        }
        Ok(Self {
            level: descriptor.level,
            key,
        })
    }

    pub fn level(&self) -> EncryptionLevel {
        self.level
    }

    /// Nonce for one file region, unique per (generation, region)
    pub fn region_nonce(generation: u64, region_id: u8) -> u64 {
        ((generation << 8) | u64::from(region_id)) & !WAL_NONCE_BIT
    }

    /// Nonce for one WAL frame
    pub fn wal_nonce(lsn: u64) -> u64 {
        WAL_NONCE_BIT | lsn
    }

    /// XOR `data` with the keystream for `nonce` (encrypts and decrypts)
    pub fn apply(&self, nonce: u64, data: &mut [u8]) {
        match self.level {
            EncryptionLevel::Low => self.apply_xor(nonce, data),
            EncryptionLevel::Medium => self.apply_lcg(nonce, data),
            EncryptionLevel::High => self.apply_chacha(nonce, data),
        }
    }

    fn apply_xor(&self, nonce: u64, data: &mut [u8]) {
        let nonce = nonce.to_le_bytes();
        for (i, byte) in data.iter_mut().enumerate() {
            *byte ^= self.key[i % 32] ^ nonce[i % 8] ^ (i / 32) as u8;
        }
    }

    fn apply_lcg(&self, nonce: u64, data: &mut [u8]) {
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&self.key[..8]);
        let mut state = u64::from_le_bytes(seed) ^ nonce;
        for chunk in data.chunks_mut(8) {
            state = state.wrapping_mul(LCG_MUL).wrapping_add(LCG_INC);
            let stream = (state ^ (state >> 29)).to_le_bytes();
            for (byte, k) in chunk.iter_mut().zip(stream) {
                *byte ^= k;
            }
        }
    }

    fn apply_chacha(&self, nonce: u64, data: &mut [u8]) {
        let mut rng = ChaCha20Rng::from_seed(self.key);
        rng.set_stream(nonce);
        let mut block = [0u8; 64];
        for chunk in data.chunks_mut(64) {
            rng.fill_bytes(&mut block[..chunk.len()]);
            for (byte, k) in chunk.iter_mut().zip(block) {
                *byte ^= k;
            }
        }
    }
}

/// Argon2id (default parameters) over password and salt
fn derive_key(password: &str, salt: &[u8; SALT_LEN]) -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| TuckError::Authentication(format!("key derivation failed: {}", e)))?;
    Ok(key)
}

fn key_check(key: &[u8; 32]) -> [u8; KEY_CHECK_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(KEY_CHECK_LABEL);
    hasher.update(key);
    let digest = hasher.finalize();
    let mut check = [0u8; KEY_CHECK_LEN];
    check.copy_from_slice(&digest[..KEY_CHECK_LEN]);
    check
}
