//! TLV records of the UIC handshake.
//!
//! Every record is a family byte, a varint id and a family-specific value.
//! Varints are little-endian base-128: seven bits per byte, high bit set on
//! every byte but the last.

use std::fmt;

/// Family of a varint number.
pub const FAMILY_NUMBER: u8 = 0x00;
/// Family of an 8-byte fixed value.
pub const FAMILY_FIXED8: u8 = 0x01;
/// Family of a NUL-terminated string.
pub const FAMILY_STRING: u8 = 0x03;
/// Family of a length-prefixed blob.
pub const FAMILY_BLOB: u8 = 0x04;
/// Family of a count-prefixed varint array.
pub const FAMILY_ARRAY: u8 = 0x06;

/// Marker opening a group of records.
pub const OBJECT_MARKER: u8 = 0x41;

/// Longest valid encoding of a `u32`.
pub const MAX_VARINT_LEN: usize = 5;

// ─── Error ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Input ended inside a record.
    Truncated,
    /// A varint ran past [`MAX_VARINT_LEN`] bytes.
    VarintOverflow,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated      => write!(f, "TLV input truncated"),
            Self::VarintOverflow => write!(f, "varint longer than {MAX_VARINT_LEN} bytes"),
        }
    }
}

impl std::error::Error for Error {}

// ─── Varint ───────────────────────────────────────────────────────────────────

/// Append the varint encoding of `value`.
pub fn write_varint(buf: &mut Vec<u8>, mut value: u32) {
    while value > 0x7f {
        buf.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Read a varint at `*pos`, advancing `*pos` past it.
pub fn read_varint(buf: &[u8], pos: &mut usize) -> Result<u32, Error> {
    let mut result: u32 = 0;
    for i in 0..MAX_VARINT_LEN {
        let byte = *buf.get(*pos).ok_or(Error::Truncated)?;
        *pos += 1;
        result |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(Error::VarintOverflow)
}

/// Read one raw byte at `*pos`.
pub fn read_u8(buf: &[u8], pos: &mut usize) -> Result<u8, Error> {
    let byte = *buf.get(*pos).ok_or(Error::Truncated)?;
    *pos += 1;
    Ok(byte)
}

/// Borrow `len` bytes at `*pos`.
pub fn read_bytes<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], Error> {
    let end = pos.checked_add(len).ok_or(Error::Truncated)?;
    let out = buf.get(*pos..end).ok_or(Error::Truncated)?;
    *pos = end;
    Ok(out)
}

// ─── Writer ───────────────────────────────────────────────────────────────────

/// Builds a TLV byte stream.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a group of `count` records.
    pub fn object(&mut self, count: u8) -> &mut Self {
        self.buf.extend_from_slice(&[OBJECT_MARKER, count]);
        self
    }

    fn head(&mut self, family: u8, id: u32) {
        write_varint(&mut self.buf, family as u32);
        write_varint(&mut self.buf, id);
    }

    pub fn number(&mut self, id: u32, value: u32) -> &mut Self {
        self.head(FAMILY_NUMBER, id);
        write_varint(&mut self.buf, value);
        self
    }

    pub fn fixed8(&mut self, id: u32, value: &[u8; 8]) -> &mut Self {
        self.head(FAMILY_FIXED8, id);
        self.buf.extend_from_slice(value);
        self
    }

    pub fn string(&mut self, id: u32, value: &str) -> &mut Self {
        self.head(FAMILY_STRING, id);
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
        self
    }

    pub fn blob(&mut self, id: u32, value: &[u8]) -> &mut Self {
        self.head(FAMILY_BLOB, id);
        write_varint(&mut self.buf, value.len() as u32);
        self.buf.extend_from_slice(value);
        self
    }

    pub fn array(&mut self, id: u32, values: &[u32]) -> &mut Self {
        self.head(FAMILY_ARRAY, id);
        write_varint(&mut self.buf, values.len() as u32);
        for &v in values {
            write_varint(&mut self.buf, v);
        }
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
