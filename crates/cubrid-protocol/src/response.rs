//! Response frame reader.
//!
//! A response is `[i32 length][i32 response code][payload]`. The length
//! prefix is consumed by the framing layer; this module works on the bytes
//! that follow it. Every read is bounds-checked against the frame.

use bytes::{Buf, Bytes};

use crate::error::ProtocolError;
use crate::request::OID_SIZE;

/// Bounds-checked big-endian reader over one response frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseReader {
    buf: Bytes,
}

impl ResponseReader {
    /// Create a reader over the given bytes.
    #[must_use]
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Whether every byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure(&self, needed: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < needed {
            return Err(ProtocolError::BufferOverrun {
                needed,
                available: self.buf.remaining(),
            });
        }
        Ok(())
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    /// Read a big-endian `i16`.
    pub fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        self.ensure(2)?;
        Ok(self.buf.get_i16())
    }

    /// Read a big-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    /// Read a big-endian `i64`.
    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        self.ensure(8)?;
        Ok(self.buf.get_i64())
    }

    /// Read an `f32` from its big-endian bit pattern.
    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        Ok(f32::from_bits(self.read_i32()? as u32))
    }

    /// Read an `f64` from its big-endian bit pattern.
    pub fn read_f64(&mut self) -> Result<f64, ProtocolError> {
        Ok(f64::from_bits(self.read_i64()? as u64))
    }

    /// Read `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, ProtocolError> {
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }

    /// Read an eight-byte OID.
    pub fn read_oid(&mut self) -> Result<[u8; OID_SIZE], ProtocolError> {
        self.ensure(OID_SIZE)?;
        let mut oid = [0u8; OID_SIZE];
        self.buf.copy_to_slice(&mut oid);
        Ok(oid)
    }

    /// Skip `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<(), ProtocolError> {
        self.ensure(len)?;
        self.buf.advance(len);
        Ok(())
    }

    /// Split off a reader over exactly the next `len` bytes.
    pub fn split_to(&mut self, len: usize) -> Result<Self, ProtocolError> {
        Ok(Self::new(self.read_bytes(len)?))
    }

    /// Read a string occupying `size` bytes including its NUL terminator.
    ///
    /// A size of zero or less is a NULL string.
    pub fn read_string(&mut self, size: i32) -> Result<Option<String>, ProtocolError> {
        if size <= 0 {
            return Ok(None);
        }
        let raw = self.read_bytes(size as usize)?;
        let text = strip_nul(&raw);
        String::from_utf8(text.to_vec())
            .map(Some)
            .map_err(|_| ProtocolError::InvalidString)
    }

    /// Read an `i32` size followed by a string of that size.
    pub fn read_sized_string(&mut self) -> Result<Option<String>, ProtocolError> {
        let size = self.read_i32()?;
        self.read_string(size)
    }

    /// Read the rest of the frame as text, replacing invalid UTF-8.
    pub fn read_remaining_string(&mut self) -> String {
        let raw = self.buf.split_to(self.buf.len());
        String::from_utf8_lossy(strip_nul(&raw)).into_owned()
    }
}

fn strip_nul(raw: &[u8]) -> &[u8] {
    match raw.split_last() {
        Some((0, head)) => head,
        _ => raw,
    }
}

/// A decoded response: the response code and the rest of the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    code: i32,
    body: ResponseReader,
}

impl Response {
    /// Parse the bytes that followed a response length prefix.
    ///
    /// A negative response code turns the remainder of the frame into a
    /// [`ProtocolError::Server`].
    pub fn from_frame(payload: Bytes) -> Result<Self, ProtocolError> {
        let mut body = ResponseReader::new(payload);
        let code = body.read_i32()?;
        if code < 0 {
            return Err(ProtocolError::Server {
                code,
                message: body.read_remaining_string(),
            });
        }
        Ok(Self { code, body })
    }

    /// The non-negative response code.
    #[must_use]
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Reader positioned after the response code.
    pub fn body(&mut self) -> &mut ResponseReader {
        &mut self.body
    }

    /// Consume the response, keeping only the body reader.
    #[must_use]
    pub fn into_body(self) -> ResponseReader {
        self.body
    }
}
