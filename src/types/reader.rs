//! Bounds-checked little-endian reader over a byte slice.
//!
//! Every read checks the remaining length first and reports a decode
//! error instead of panicking, so truncated input always fails closed.

use bytes::Buf;

use crate::error::{Result, TuckError};

pub(crate) struct SliceReader<'a> {
    buf: &'a [u8],
    start_len: usize,
}

impl<'a> SliceReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            start_len: buf.len(),
        }
    }

    /// Bytes consumed so far
    pub(crate) fn position(&self) -> usize {
        self.start_len - self.buf.len()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn need(&self, n: usize, what: &str) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(TuckError::decode(format!(
                "Not enough data to decode {} (need {} bytes, got {})",
                what,
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self, what: &str) -> Result<u8> {
        self.need(1, what)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u16(&mut self, what: &str) -> Result<u16> {
        self.need(2, what)?;
        Ok(self.buf.get_u16_le())
    }

    pub(crate) fn i16(&mut self, what: &str) -> Result<i16> {
        self.need(2, what)?;
        Ok(self.buf.get_i16_le())
    }

    pub(crate) fn u32(&mut self, what: &str) -> Result<u32> {
        self.need(4, what)?;
        Ok(self.buf.get_u32_le())
    }

    pub(crate) fn i32(&mut self, what: &str) -> Result<i32> {
        self.need(4, what)?;
        Ok(self.buf.get_i32_le())
    }

    pub(crate) fn u64(&mut self, what: &str) -> Result<u64> {
        self.need(8, what)?;
        Ok(self.buf.get_u64_le())
    }

    pub(crate) fn i64(&mut self, what: &str) -> Result<i64> {
        self.need(8, what)?;
        Ok(self.buf.get_i64_le())
    }

    pub(crate) fn f64(&mut self, what: &str) -> Result<f64> {
        self.need(8, what)?;
        Ok(self.buf.get_f64_le())
    }

    /// Borrow the next `n` bytes
    pub(crate) fn bytes(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        self.need(n, what)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub(crate) fn utf8(&mut self, n: usize, what: &str) -> Result<String> {
        let raw = self.bytes(n, what)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| TuckError::decode(format!("Invalid UTF-8 in {}: {}", what, e)))
    }

    /// u16 length-prefixed UTF-8 string
    pub(crate) fn str16(&mut self, what: &str) -> Result<String> {
        let len = self.u16(what)? as usize;
        self.utf8(len, what)
    }

    /// The unread tail
    pub(crate) fn rest(&self) -> &'a [u8] {
        self.buf
    }
}
