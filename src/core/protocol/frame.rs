// src/core/protocol/frame.rs

//! The binary request/response frames and their `tokio_util::codec` implementations.
//!
//! A request is a 6-byte header (`magic`, `command`, `body_len: u32`) followed by the body.
//! A response is a 7-byte header (`magic`, `command`, `status`, `body_len: u32`) followed
//! by the body. All integers are big-endian.

use super::body::BodyWriter;
use super::command_id::{CommandId, Status};
use crate::core::BrokerError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

pub const REQUEST_MAGIC: u8 = 0xEB;
pub const RESPONSE_MAGIC: u8 = 0xEC;
pub const REQUEST_HEADER_LEN: usize = 6;
pub const RESPONSE_HEADER_LEN: usize = 7;

/// Upper bound for a request body when no explicit limit is configured.
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 64 * 1024 * 1024;

/// A decoded client request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub command: CommandId,
    pub body: Bytes,
}

impl Request {
    pub fn new(command: CommandId, body: impl Into<Bytes>) -> Self {
        Self {
            command,
            body: body.into(),
        }
    }
}

/// A server frame: a reply to a request or a server-initiated event.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub command: CommandId,
    pub status: Status,
    pub body: Bytes,
}

impl Response {
    pub fn ok(command: CommandId, body: impl Into<Bytes>) -> Self {
        Self {
            command,
            status: Status::Ok,
            body: body.into(),
        }
    }

    pub fn ok_empty(command: CommandId) -> Self {
        Self::ok(command, Bytes::new())
    }

    /// Builds an `ERR` reply: the error tag followed by the error text.
    pub fn error(command: CommandId, err: &BrokerError) -> Self {
        let mut w = BodyWriter::new();
        w.put_u8(err.tag() as u8);
        w.put_string(&err.to_string());
        Self {
            command,
            status: Status::Err,
            body: w.freeze(),
        }
    }

    pub fn event(command: CommandId, body: impl Into<Bytes>) -> Self {
        Self {
            command,
            status: Status::Event,
            body: body.into(),
        }
    }

    /// The number of bytes this frame occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        RESPONSE_HEADER_LEN + self.body.len()
    }

    /// Serializes the frame into a standalone buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.write_to(&mut buf);
        buf.freeze()
    }

    fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u8(RESPONSE_MAGIC);
        dst.put_u8(self.command.code());
        dst.put_u8(self.status as u8);
        dst.put_u32(self.body.len() as u32);
        dst.extend_from_slice(&self.body);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DecodeState {
    Header,
    Body { command: CommandId, len: usize },
}

/// Incremental request decoder.
///
/// The codec remembers whether it is waiting for a header or for the rest of a body
/// whose length is already known, so a frame split over many reads is parsed once.
#[derive(Debug)]
pub struct RequestCodec {
    state: DecodeState,
    max_request_size: usize,
}

impl RequestCodec {
    pub fn new(max_request_size: usize) -> Self {
        Self {
            state: DecodeState::Header,
            max_request_size,
        }
    }

    fn decode_header(&self, src: &mut BytesMut) -> Result<Option<(CommandId, usize)>, BrokerError> {
        if src.len() < REQUEST_HEADER_LEN {
            return Ok(None);
        }
        if src[0] != REQUEST_MAGIC {
            return Err(BrokerError::Protocol(format!(
                "invalid request magic 0x{:02x}",
                src[0]
            )));
        }
        let command = CommandId::from_repr(src[1]).ok_or_else(|| {
            BrokerError::Protocol(format!("unknown command id 0x{:02x}", src[1]))
        })?;
        let raw_len = u32::from_be_bytes([src[2], src[3], src[4], src[5]]);
        // The length travels as an unsigned field, but a set sign bit means the sender
        // produced a negative length.
        if raw_len > i32::MAX as u32 {
            return Err(BrokerError::Protocol("negative body length".into()));
        }
        let len = raw_len as usize;
        if len > self.max_request_size {
            return Err(BrokerError::Protocol(format!(
                "body length {len} exceeds the maximum of {}",
                self.max_request_size
            )));
        }
        src.advance(REQUEST_HEADER_LEN);
        Ok(Some((command, len)))
    }
}

impl Default for RequestCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUEST_SIZE)
    }
}

impl Decoder for RequestCodec {
    type Item = Request;
    type Error = BrokerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let DecodeState::Header = self.state {
            match self.decode_header(src)? {
                Some((command, len)) => {
                    self.state = DecodeState::Body { command, len };
                    src.reserve(len);
                }
                None => {
                    src.reserve(REQUEST_HEADER_LEN);
                    return Ok(None);
                }
            }
        }

        let DecodeState::Body { command, len } = self.state else {
            return Ok(None);
        };
        if src.len() < len {
            return Ok(None);
        }
        let body = src.split_to(len).freeze();
        self.state = DecodeState::Header;
        Ok(Some(Request { command, body }))
    }
}

impl Encoder<Request> for RequestCodec {
    type Error = BrokerError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(REQUEST_HEADER_LEN + item.body.len());
        dst.put_u8(REQUEST_MAGIC);
        dst.put_u8(item.command.code());
        dst.put_u32(item.body.len() as u32);
        dst.extend_from_slice(&item.body);
        Ok(())
    }
}

/// Encodes server frames; the decoder half is used by clients and tests.
#[derive(Debug, Default)]
pub struct ResponseCodec;

impl Encoder<Response> for ResponseCodec {
    type Error = BrokerError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.write_to(dst);
        Ok(())
    }
}

impl Decoder for ResponseCodec {
    type Item = Response;
    type Error = BrokerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < RESPONSE_HEADER_LEN {
            return Ok(None);
        }
        if src[0] != RESPONSE_MAGIC {
            return Err(BrokerError::Protocol(format!(
                "invalid response magic 0x{:02x}",
                src[0]
            )));
        }
        let command = CommandId::from_repr(src[1])
            .ok_or_else(|| BrokerError::Protocol(format!("unknown command id 0x{:02x}", src[1])))?;
        let status = Status::from_repr(src[2])
            .ok_or_else(|| BrokerError::Protocol(format!("unknown status 0x{:02x}", src[2])))?;
        let len = u32::from_be_bytes([src[3], src[4], src[5], src[6]]) as usize;
        if src.len() < RESPONSE_HEADER_LEN + len {
            src.reserve(RESPONSE_HEADER_LEN + len - src.len());
            return Ok(None);
        }
        src.advance(RESPONSE_HEADER_LEN);
        let body = src.split_to(len).freeze();
        Ok(Some(Response {
            command,
            status,
            body,
        }))
    }
}
