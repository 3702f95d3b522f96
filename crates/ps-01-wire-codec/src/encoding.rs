//! Primitive field encoding: little-endian integers, CompactSize,
//! length-prefixed byte strings.
//!
//! Reading never panics. Every accessor checks the remaining length and
//! reports `UnexpectedEof` with the offending offset.

use crate::errors::CodecError;
use bytes::BufMut;
use shared_types::Hash;

/// Bounds-checked cursor over a payload.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of the payload.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Bytes consumed between `start` and the current position.
    pub fn consumed_since(&self, start: usize) -> &'a [u8] {
        &self.data[start..self.pos]
    }

    pub fn peek_u8(&self, ahead: usize) -> Option<u8> {
        self.data.get(self.pos + ahead).copied()
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u16_be(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_hash(&mut self) -> Result<Hash, CodecError> {
        self.read_array()
    }

    /// Reads a CompactSize integer, rejecting non-canonical encodings.
    pub fn read_compact_size(&mut self) -> Result<u64, CodecError> {
        let offset = self.pos;
        let (value, min) = match self.read_u8()? {
            0xFF => (self.read_u64()?, 0x1_0000_0000),
            0xFE => (u64::from(self.read_u32()?), 0x1_0000),
            0xFD => (u64::from(self.read_u16_le()?), 0xFD),
            n => return Ok(u64::from(n)),
        };
        if value < min {
            return Err(CodecError::InvalidData(format!(
                "non-canonical CompactSize at offset {offset}"
            )));
        }
        Ok(value)
    }

    /// Reads a CompactSize element count and enforces `max`.
    pub fn read_count(&mut self, what: &'static str, max: u64) -> Result<usize, CodecError> {
        let count = self.read_compact_size()?;
        if count > max {
            return Err(CodecError::TooManyEntries { what, count, max });
        }
        // Each element takes at least one byte.
        if count > self.remaining() as u64 {
            return Err(CodecError::UnexpectedEof {
                offset: self.pos,
                needed: count as usize - self.remaining(),
            });
        }
        Ok(count as usize)
    }

    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_compact_size()?;
        if len > self.remaining() as u64 {
            return Err(CodecError::UnexpectedEof {
                offset: self.pos,
                needed: (len - self.remaining() as u64) as usize,
            });
        }
        Ok(self.read_bytes(len as usize)?.to_vec())
    }

    /// Reads a length-prefixed string, limited to `max` bytes, lossy UTF-8.
    pub fn read_var_str(&mut self, max: usize) -> Result<String, CodecError> {
        let bytes = self.read_var_bytes()?;
        if bytes.len() > max {
            return Err(CodecError::InvalidData(format!(
                "string of {} bytes exceeds {max}",
                bytes.len()
            )));
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Fails if unread bytes remain.
    pub fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

/// Appends a CompactSize integer.
pub fn put_compact_size(buf: &mut impl BufMut, n: u64) {
    match n {
        0..=0xFC => buf.put_u8(n as u8),
        0xFD..=0xFFFF => {
            buf.put_u8(0xFD);
            buf.put_u16_le(n as u16);
        }
        0x1_0000..=0xFFFF_FFFF => {
            buf.put_u8(0xFE);
            buf.put_u32_le(n as u32);
        }
        _ => {
            buf.put_u8(0xFF);
            buf.put_u64_le(n);
        }
    }
}

/// Appends a CompactSize length followed by the bytes.
pub fn put_var_bytes(buf: &mut impl BufMut, bytes: &[u8]) {
    put_compact_size(buf, bytes.len() as u64);
    buf.put_slice(bytes);
}
