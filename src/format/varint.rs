//! Variable-length integers
//!
//! 7 payload bits per byte, high bit set on every byte but the last.
//! Values below 256 come from a precomputed table.

use bytes::BufMut;

use crate::error::{Result, TuckError};
use crate::types::SliceReader;

/// Longest encoding of a u64
const MAX_VARINT_LEN: usize = 10;

/// Encodings of 0..=255: one byte below 128, two bytes above
const SMALL: [[u8; 2]; 256] = build_small_table();

const fn build_small_table() -> [[u8; 2]; 256] {
    let mut table = [[0u8; 2]; 256];
    let mut i = 0;
    while i < 256 {
        if i < 128 {
            table[i] = [i as u8, 0];
        } else {
            table[i] = [((i & 0x7F) | 0x80) as u8, (i >> 7) as u8];
        }
        i += 1;
    }
    table
}

pub(crate) fn put_varint<B: BufMut>(buf: &mut B, mut n: u64) {
    if n < 256 {
        let entry = &SMALL[n as usize];
        let len = if n < 128 { 1 } else { 2 };
        buf.put_slice(&entry[..len]);
        return;
    }
    while n >= 0x80 {
        buf.put_u8((n as u8 & 0x7F) | 0x80);
        n >>= 7;
    }
    buf.put_u8(n as u8);
}

pub(crate) fn get_varint(r: &mut SliceReader<'_>, what: &str) -> Result<u64> {
    let mut result: u64 = 0;
    for i in 0..MAX_VARINT_LEN {
        let byte = r.u8(what)?;
        let bits = u64::from(byte & 0x7F);
        if i == MAX_VARINT_LEN - 1 && bits > 1 {
            return Err(TuckError::decode(format!("Varint overflow in {}", what)));
        }
        result |= bits << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(TuckError::decode(format!("Varint too long in {}", what)))
}

/// Varint read as a count or length that must fit in memory
pub(crate) fn get_len(r: &mut SliceReader<'_>, what: &str) -> Result<usize> {
    let n = get_varint(r, what)?;
    usize::try_from(n).map_err(|_| TuckError::decode(format!("{} too large: {}", what, n)))
}

/// Varint length-prefixed UTF-8
pub(crate) fn put_str<B: BufMut>(buf: &mut B, s: &str) {
    put_varint(buf, s.len() as u64);
    buf.put_slice(s.as_bytes());
}

pub(crate) fn get_str(r: &mut SliceReader<'_>, what: &str) -> Result<String> {
    let len = get_len(r, what)?;
    r.utf8(len, what)
}
