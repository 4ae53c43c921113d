// src/core/protocol/body.rs

//! Field-level readers and writers for frame bodies.
//!
//! Every variable-length field carries an explicit length prefix: names use a `u8`,
//! strings a `u16` and blobs a `u32`. Lists are a `u32` element count.

use crate::core::BrokerError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Maximum length, in bytes, of an entity or user name.
pub const MAX_NAME_LEN: usize = 64;

/// A cursor over a request body. Any read past the end is a protocol error.
#[derive(Debug)]
pub struct BodyReader {
    buf: Bytes,
}

impl BodyReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, n: usize, field: &str) -> Result<(), BrokerError> {
        if self.buf.remaining() < n {
            return Err(BrokerError::Protocol(format!("truncated {field} field")));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, BrokerError> {
        self.need(1, "u8")?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16, BrokerError> {
        self.need(2, "u16")?;
        Ok(self.buf.get_u16())
    }

    pub fn read_u32(&mut self) -> Result<u32, BrokerError> {
        self.need(4, "u32")?;
        Ok(self.buf.get_u32())
    }

    pub fn read_u64(&mut self) -> Result<u64, BrokerError> {
        self.need(8, "u64")?;
        Ok(self.buf.get_u64())
    }

    /// Reads an optional trailing byte, returning `None` when the body is exhausted.
    pub fn read_opt_u8(&mut self) -> Option<u8> {
        if self.buf.has_remaining() {
            Some(self.buf.get_u8())
        } else {
            None
        }
    }

    /// Reads a `u8`-prefixed name of 1 to [`MAX_NAME_LEN`] bytes of UTF-8.
    pub fn read_name(&mut self) -> Result<String, BrokerError> {
        let len = self.read_u8()? as usize;
        if len == 0 || len > MAX_NAME_LEN {
            return Err(BrokerError::Protocol(format!(
                "name length {len} out of range 1..={MAX_NAME_LEN}"
            )));
        }
        self.need(len, "name")?;
        let raw = self.buf.split_to(len);
        Ok(std::str::from_utf8(&raw)?.to_owned())
    }

    pub fn read_string(&mut self) -> Result<String, BrokerError> {
        let len = self.read_u16()? as usize;
        self.need(len, "string")?;
        let raw = self.buf.split_to(len);
        Ok(std::str::from_utf8(&raw)?.to_owned())
    }

    /// Reads a `u32`-prefixed blob without copying it out of the request buffer.
    pub fn read_blob(&mut self) -> Result<Bytes, BrokerError> {
        let len = self.read_u32()? as usize;
        self.need(len, "blob")?;
        Ok(self.buf.split_to(len))
    }

    /// Fails if unread bytes remain after the last expected field.
    pub fn finish(self) -> Result<(), BrokerError> {
        if self.buf.has_remaining() {
            return Err(BrokerError::Protocol(format!(
                "{} trailing bytes in request body",
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}

/// Builds a frame body.
#[derive(Debug, Default)]
pub struct BodyWriter {
    buf: BytesMut,
}

impl BodyWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.buf.put_u8(v);
        self
    }

    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.buf.put_u32(v);
        self
    }

    pub fn put_u64(&mut self, v: u64) -> &mut Self {
        self.buf.put_u64(v);
        self
    }

    /// Writes a name. Names are validated on the way in, so they always fit a `u8` prefix.
    pub fn put_name(&mut self, name: &str) -> &mut Self {
        let len = name.len().min(u8::MAX as usize);
        self.buf.put_u8(len as u8);
        self.buf.extend_from_slice(&name.as_bytes()[..len]);
        self
    }

    /// Writes a string, truncating at the `u16` limit.
    pub fn put_string(&mut self, s: &str) -> &mut Self {
        let len = s.len().min(u16::MAX as usize);
        self.buf.put_u16(len as u16);
        self.buf.extend_from_slice(&s.as_bytes()[..len]);
        self
    }

    pub fn put_blob(&mut self, b: &[u8]) -> &mut Self {
        self.buf.put_u32(b.len() as u32);
        self.buf.extend_from_slice(b);
        self
    }

    pub fn put_count(&mut self, n: usize) -> &mut Self {
        self.buf.put_u32(n as u32);
        self
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}
