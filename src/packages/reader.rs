// src/packages/reader.rs

//! Bounds-checked reader over a HAP container
//!
//! The container is a flat big-endian stream, so the reader only needs to
//! know its own offset and the total length of the input. Every read checks
//! the remaining length first; a length field can never make the reader
//! allocate or seek past the end of the file.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{self, Read, Seek, SeekFrom};
use thiserror::Error;

/// Size of the magic prefix
pub const MAGIC_LEN: usize = 4;

/// Required value of the last magic byte
pub const MAGIC_VALUE: u8 = 0x11;

/// Errors produced while decoding the container
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("unexpected end of data at offset {offset}: need {needed} bytes, {available} left")]
    Truncated {
        offset: u64,
        needed: u64,
        available: u64,
    },

    #[error("value at offset {offset} is out of range")]
    Overflow { offset: u64 },

    #[error("zero length field at offset {offset}")]
    ZeroLength { offset: u64 },

    #[error("bad magic number")]
    BadMagic,

    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 { offset: u64 },

    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

impl From<ParseError> for crate::error::Error {
    fn from(err: ParseError) -> Self {
        crate::error::Error::FileDataInvalid(err.to_string())
    }
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Reader over a package positioned at offset 0
pub struct HapReader<R> {
    inner: R,
    offset: u64,
    len: u64,
}

impl<R: Read + Seek> HapReader<R> {
    /// Wrap `inner`, which holds `len` bytes in total
    pub fn new(inner: R, len: u64) -> Self {
        Self {
            inner,
            offset: 0,
            len,
        }
    }

    /// Current offset from the start of the package
    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Total package size
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes left before the end of the package
    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.offset)
    }

    /// Fail unless `needed` more bytes are available
    pub fn ensure(&self, needed: u64) -> ParseResult<()> {
        let available = self.remaining();
        if needed > available {
            return Err(ParseError::Truncated {
                offset: self.offset,
                needed,
                available,
            });
        }
        Ok(())
    }

    /// Read a big-endian u32 that must fit in a non-negative i32
    pub fn read_u32(&mut self) -> ParseResult<u32> {
        let offset = self.offset;
        self.ensure(4)?;
        let value = self.inner.read_u32::<BigEndian>()?;
        self.offset += 4;

        if value > i32::MAX as u32 {
            return Err(ParseError::Overflow { offset });
        }
        Ok(value)
    }

    /// Read a big-endian u64 that must fit in a non-negative i64
    ///
    /// Zero is rejected: a zero length cannot be told apart from a failed
    /// read by the producers of this format.
    pub fn read_u64(&mut self) -> ParseResult<u64> {
        let offset = self.offset;
        self.ensure(8)?;
        let value = self.inner.read_u64::<BigEndian>()?;
        self.offset += 8;

        if value > i64::MAX as u64 {
            return Err(ParseError::Overflow { offset });
        }
        if value == 0 {
            return Err(ParseError::ZeroLength { offset });
        }
        Ok(value)
    }

    /// Read `len` bytes as a UTF-8 string
    pub fn read_string(&mut self, len: u32) -> ParseResult<String> {
        if len == 0 {
            return Ok(String::new());
        }

        let offset = self.offset;
        let bytes = self.read_bytes(u64::from(len))?;
        String::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8 { offset })
    }

    /// Read exactly `len` bytes into a new buffer
    pub fn read_bytes(&mut self, len: u64) -> ParseResult<Vec<u8>> {
        self.ensure(len)?;
        let size = usize::try_from(len).map_err(|_| ParseError::Overflow {
            offset: self.offset,
        })?;

        let mut buf = vec![0u8; size];
        self.inner.read_exact(&mut buf)?;
        self.offset += len;
        Ok(buf)
    }

    /// Fill `buf` completely
    pub fn read_exact(&mut self, buf: &mut [u8]) -> ParseResult<()> {
        self.ensure(buf.len() as u64)?;
        self.inner.read_exact(buf)?;
        self.offset += buf.len() as u64;
        Ok(())
    }

    /// Move forward `len` bytes without reading them
    pub fn skip(&mut self, len: u64) -> ParseResult<()> {
        self.ensure(len)?;
        let delta = i64::try_from(len).map_err(|_| ParseError::Overflow {
            offset: self.offset,
        })?;
        self.inner.seek(SeekFrom::Current(delta))?;
        self.offset += len;
        Ok(())
    }

    /// Validate the magic prefix
    pub fn check_magic(&mut self) -> ParseResult<()> {
        let mut magic = [0u8; MAGIC_LEN];
        self.read_exact(&mut magic)
            .map_err(|_| ParseError::BadMagic)?;

        if magic[MAGIC_LEN - 1] != MAGIC_VALUE {
            return Err(ParseError::BadMagic);
        }
        Ok(())
    }
}
