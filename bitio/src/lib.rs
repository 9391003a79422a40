//! `bitio` provides the small readers and writers every codec in the
//! workspace is built on: MSB-first bit I/O over byte slices and a
//! byte-order typed cursor for multi-byte fields.
//!
//! Every multi-byte access names its byte order explicitly through the
//! `byteorder` marker types (IPS uses big endian record headers, UPS and the
//! ROM itself are little endian).

use byteorder::ByteOrder;
use strum_macros::IntoStaticStr;
use thiserror::Error;

pub use byteorder::{BigEndian, LittleEndian};


/// Default ceiling for anything a decoder produces. Large enough for any
/// real cart (the biggest are 6MB) but small enough that a hostile stream
/// can't exhaust memory.
pub const DEFAULT_MAX_OUTPUT: usize = 16 * 1024 * 1024;

/// `BitError` defines the ways reading or writing raw bits/bytes can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq, IntoStaticStr)]
pub enum BitError {
    /// The input ran out before the requested data could be read.
    #[error("Unexpected end of input at byte {offset:#X} (needed {wanted} more bytes)")]
    UnexpectedEof {
        /// Byte offset where the read started.
        offset: usize,
        /// How many bytes were needed.
        wanted: usize,
    },

    /// More than 32 bits were requested in a single read/write.
    #[error("Can't transfer {count} bits at once, max is 32")]
    TooManyBits {
        /// The requested count.
        count: u32,
    },
}

/// `BitReader` reads bits MSB first from a byte slice. Bit 7 of byte 0
/// is the first bit returned.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    // Absolute bit position.
    pos: usize,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the first bit of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Read a single bit.
    ///
    /// # Errors
    /// Returns `UnexpectedEof` once every bit has been consumed.
    pub fn read_bit(&mut self) -> Result<bool, BitError> {
        let byte = self.data.get(self.pos / 8).ok_or(BitError::UnexpectedEof {
            offset: self.pos / 8,
            wanted: 1,
        })?;
        let bit = (byte >> (7 - (self.pos % 8))) & 0x01;
        self.pos += 1;
        Ok(bit == 0x01)
    }

    /// Read `count` bits (up to 32) and return them right aligned, first bit
    /// read in the most significant position.
    ///
    /// # Errors
    /// `TooManyBits` for counts over 32 and `UnexpectedEof` if the data
    /// runs out part way. On error the reader position is unchanged.
    pub fn read_bits(&mut self, count: u32) -> Result<u32, BitError> {
        if count > 32 {
            return Err(BitError::TooManyBits { count });
        }
        if self.remaining_bits() < count as usize {
            return Err(BitError::UnexpectedEof {
                offset: self.pos / 8,
                wanted: (count as usize).div_ceil(8),
            });
        }
        let mut val = 0u32;
        for _ in 0..count {
            val = (val << 1) | u32::from(self.read_bit()?);
        }
        Ok(val)
    }

    /// Bits left to read.
    #[must_use]
    pub fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    /// The byte currently being read from (rounded down).
    #[must_use]
    pub fn byte_position(&self) -> usize {
        self.pos / 8
    }

    /// Skip any partially consumed byte so the next read starts on a byte
    /// boundary.
    pub fn align(&mut self) {
        self.pos = self.pos.div_ceil(8) * 8;
    }
}

/// `BitWriter` accumulates bits MSB first into bytes. A trailing partial
/// byte is zero padded when finished.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    out: Vec<u8>,
    cur: u8,
    filled: u8,
}

impl BitWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one bit.
    pub fn write_bit(&mut self, bit: bool) {
        self.cur = (self.cur << 1) | u8::from(bit);
        self.filled += 1;
        if self.filled == 8 {
            self.out.push(self.cur);
            self.cur = 0;
            self.filled = 0;
        }
    }

    /// Append the low `count` bits of `value`, most significant first.
    ///
    /// # Errors
    /// `TooManyBits` for counts over 32.
    pub fn write_bits(&mut self, value: u32, count: u32) -> Result<(), BitError> {
        if count > 32 {
            return Err(BitError::TooManyBits { count });
        }
        for bit in (0..count).rev() {
            self.write_bit((value >> bit) & 0x01 == 0x01);
        }
        Ok(())
    }

    /// Total bits written so far.
    #[must_use]
    pub fn bit_len(&self) -> usize {
        self.out.len() * 8 + usize::from(self.filled)
    }

    /// Flush any partial byte (zero padded) and return the bytes.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        if self.filled > 0 {
            self.out.push(self.cur << (8 - self.filled));
        }
        self.out
    }
}

/// `ByteReader` is a bounds checked cursor over a byte slice. Reads never
/// panic; running off the end is an `UnexpectedEof`.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader at offset 0.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of the slice.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// True once everything has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Look at the next `len` bytes without consuming them.
    #[must_use]
    pub fn peek(&self, len: usize) -> Option<&'a [u8]> {
        self.data.get(self.pos..self.pos.checked_add(len)?)
    }

    /// Consume and return the next `len` bytes.
    ///
    /// # Errors
    /// `UnexpectedEof` if fewer than `len` bytes remain.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], BitError> {
        let out = self.peek(len).ok_or(BitError::UnexpectedEof {
            offset: self.pos,
            wanted: len,
        })?;
        self.pos += len;
        Ok(out)
    }

    /// Read a single byte.
    ///
    /// # Errors
    /// `UnexpectedEof` at the end of input.
    pub fn read_u8(&mut self) -> Result<u8, BitError> {
        Ok(self.take(1)?[0])
    }

    /// Read a 16 bit value in the given byte order.
    ///
    /// # Errors
    /// `UnexpectedEof` if fewer than 2 bytes remain.
    pub fn read_u16<E: ByteOrder>(&mut self) -> Result<u16, BitError> {
        Ok(E::read_u16(self.take(2)?))
    }

    /// Read a 24 bit value in the given byte order.
    ///
    /// # Errors
    /// `UnexpectedEof` if fewer than 3 bytes remain.
    pub fn read_u24<E: ByteOrder>(&mut self) -> Result<u32, BitError> {
        Ok(E::read_u24(self.take(3)?))
    }

    /// Read a 32 bit value in the given byte order.
    ///
    /// # Errors
    /// `UnexpectedEof` if fewer than 4 bytes remain.
    pub fn read_u32<E: ByteOrder>(&mut self) -> Result<u32, BitError> {
        Ok(E::read_u32(self.take(4)?))
    }
}

/// `ByteWriter` appends fixed width fields to a growable buffer.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    out: Vec<u8>,
}

impl ByteWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.out.len()
    }

    /// True if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    /// View of everything written so far.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.out
    }

    /// Append one byte.
    pub fn write_u8(&mut self, val: u8) {
        self.out.push(val);
    }

    /// Append raw bytes.
    pub fn write_all(&mut self, data: &[u8]) {
        self.out.extend_from_slice(data);
    }

    /// Append a 16 bit value in the given byte order.
    pub fn write_u16<E: ByteOrder>(&mut self, val: u16) {
        let mut buf = [0u8; 2];
        E::write_u16(&mut buf, val);
        self.out.extend_from_slice(&buf);
    }

    /// Append the low 24 bits of `val` in the given byte order.
    pub fn write_u24<E: ByteOrder>(&mut self, val: u32) {
        let mut buf = [0u8; 3];
        E::write_u24(&mut buf, val & 0x00FF_FFFF);
        self.out.extend_from_slice(&buf);
    }

    /// Append a 32 bit value in the given byte order.
    pub fn write_u32<E: ByteOrder>(&mut self, val: u32) {
        let mut buf = [0u8; 4];
        E::write_u32(&mut buf, val);
        self.out.extend_from_slice(&buf);
    }

    /// Return the written bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.out
    }
}
