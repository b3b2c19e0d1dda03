//! Buffer read/write traits for the fixed-width encodings used by action
//! records and their payloads.
//!
//! Log records and table payloads are little-endian; the big-endian getters
//! and putters exist for wire messages, which travel in network byte order
//! and are swapped on receipt.

use thiserror::Error;

/// Failure to decode from a byte buffer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer has {have} bytes left, expected {want}")]
    BufferLength { want: usize, have: usize },
    #[error("invalid tag {tag} for {ty}")]
    InvalidTag { tag: u8, ty: &'static str },
    #[error("{what} of length {len} exceeds its limit")]
    TooLong { what: &'static str, len: usize },
    #[error("string payload is not valid utf-8")]
    InvalidUtf8,
}

/// A buffer which can be written to.
pub trait BufWriter {
    /// Writes the slice `slice` to the buffer.
    fn put_slice(&mut self, slice: &[u8]);

    fn put_u8(&mut self, val: u8) {
        self.put_slice(&[val]);
    }

    fn put_u16(&mut self, val: u16) {
        self.put_slice(&val.to_le_bytes());
    }

    fn put_u32(&mut self, val: u32) {
        self.put_slice(&val.to_le_bytes());
    }

    fn put_u64(&mut self, val: u64) {
        self.put_slice(&val.to_le_bytes());
    }

    fn put_i8(&mut self, val: i8) {
        self.put_slice(&val.to_le_bytes());
    }

    fn put_i16(&mut self, val: i16) {
        self.put_slice(&val.to_le_bytes());
    }

    fn put_i32(&mut self, val: i32) {
        self.put_slice(&val.to_le_bytes());
    }

    fn put_i64(&mut self, val: i64) {
        self.put_slice(&val.to_le_bytes());
    }

    fn put_f32(&mut self, val: f32) {
        self.put_u32(val.to_bits());
    }

    fn put_f64(&mut self, val: f64) {
        self.put_u64(val.to_bits());
    }

    /// Writes `s` as a `u16` length prefix followed by the string bytes.
    ///
    /// Rejects strings whose length does not fit the prefix, leaving the
    /// buffer untouched.
    fn put_str(&mut self, s: &str) -> Result<(), DecodeError> {
        if s.len() > u16::MAX as usize {
            return Err(DecodeError::TooLong {
                what: "string",
                len: s.len(),
            });
        }
        self.put_u16(s.len() as u16);
        self.put_slice(s.as_bytes());
        Ok(())
    }

    fn put_u16_be(&mut self, val: u16) {
        self.put_slice(&val.to_be_bytes());
    }

    fn put_u32_be(&mut self, val: u32) {
        self.put_slice(&val.to_be_bytes());
    }

    fn put_u64_be(&mut self, val: u64) {
        self.put_slice(&val.to_be_bytes());
    }

    fn put_i16_be(&mut self, val: i16) {
        self.put_slice(&val.to_be_bytes());
    }

    fn put_i32_be(&mut self, val: i32) {
        self.put_slice(&val.to_be_bytes());
    }

    fn put_i64_be(&mut self, val: i64) {
        self.put_slice(&val.to_be_bytes());
    }

    fn put_f32_be(&mut self, val: f32) {
        self.put_u32_be(val.to_bits());
    }

    fn put_f64_be(&mut self, val: f64) {
        self.put_u64_be(val.to_bits());
    }

    /// Writes `s` as a big-endian `u16` length prefix followed by the bytes.
    ///
    /// Rejects strings whose length does not fit the prefix, leaving the
    /// buffer untouched.
    fn put_str_be(&mut self, s: &str) -> Result<(), DecodeError> {
        if s.len() > u16::MAX as usize {
            return Err(DecodeError::TooLong {
                what: "string",
                len: s.len(),
            });
        }
        self.put_u16_be(s.len() as u16);
        self.put_slice(s.as_bytes());
        Ok(())
    }
}

impl BufWriter for Vec<u8> {
    fn put_slice(&mut self, slice: &[u8]) {
        self.extend_from_slice(slice);
    }
}

/// A buffer which can be read from.
pub trait BufReader<'de> {
    /// Reads and returns a slice of `len` bytes, advancing past it.
    fn get_slice(&mut self, len: usize) -> Result<&'de [u8], DecodeError>;

    /// Bytes left in the buffer.
    fn remaining(&self) -> usize;

    fn get_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let slice = self.get_slice(N)?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(slice);
        Ok(buf)
    }

    fn get_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.get_array::<1>()?[0])
    }

    fn get_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.get_array()?))
    }

    fn get_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.get_array()?))
    }

    fn get_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.get_array()?))
    }

    fn get_i8(&mut self) -> Result<i8, DecodeError> {
        Ok(i8::from_le_bytes(self.get_array()?))
    }

    fn get_i16(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_le_bytes(self.get_array()?))
    }

    fn get_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.get_array()?))
    }

    fn get_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.get_array()?))
    }

    fn get_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_bits(self.get_u32()?))
    }

    fn get_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.get_u64()?))
    }

    /// Reads a `u16` length prefix followed by that many string bytes.
    fn get_str(&mut self) -> Result<&'de str, DecodeError> {
        let len = self.get_u16()? as usize;
        let bytes = self.get_slice(len)?;
        std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)
    }

    fn get_u16_be(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.get_array()?))
    }

    fn get_u32_be(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.get_array()?))
    }

    fn get_u64_be(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_be_bytes(self.get_array()?))
    }

    fn get_i16_be(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_be_bytes(self.get_array()?))
    }

    fn get_i32_be(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.get_array()?))
    }

    fn get_i64_be(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_be_bytes(self.get_array()?))
    }

    fn get_f32_be(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_bits(self.get_u32_be()?))
    }

    fn get_f64_be(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.get_u64_be()?))
    }

    /// Reads a big-endian `u16` length prefix followed by the string bytes.
    fn get_str_be(&mut self) -> Result<&'de str, DecodeError> {
        let len = self.get_u16_be()? as usize;
        let bytes = self.get_slice(len)?;
        std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)
    }
}

impl<'de> BufReader<'de> for &'de [u8] {
    fn get_slice(&mut self, len: usize) -> Result<&'de [u8], DecodeError> {
        if self.len() < len {
            return Err(DecodeError::BufferLength {
                want: len,
                have: self.len(),
            });
        }
        let (head, tail) = self.split_at(len);
        *self = tail;
        Ok(head)
    }

    fn remaining(&self) -> usize {
        self.len()
    }
}
