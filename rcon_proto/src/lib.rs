//! Packet codec for the RCON console protocol.
//!
//! Every packet travels as a little-endian `i32` length followed by that many
//! bytes: request id, packet type, body and two NUL terminators. This crate
//! only converts between bytes and [`Packet`] values; sockets live with the
//! callers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest command body a server accepts in a single request.
pub const MAX_REQUEST_BODY: usize = 1446;
/// Servers split longer responses into fragments of exactly this size.
pub const MAX_RESPONSE_FRAGMENT: usize = 4096;
/// Request id a server answers with when the password is rejected.
pub const AUTH_FAILED_ID: i32 = -1;

const ID_AND_TYPE_LEN: usize = 8;
const TERMINATOR_LEN: usize = 2;
/// Smallest legal value of the length prefix (empty body).
pub const MIN_FRAME_LEN: usize = ID_AND_TYPE_LEN + TERMINATOR_LEN;
/// Largest legal value of the length prefix.
pub const MAX_FRAME_LEN: usize = MIN_FRAME_LEN + MAX_RESPONSE_FRAGMENT;

/// Raw packet type. Type `2` means "execute" from a client and "auth response"
/// from a server, so this stays a thin wrapper instead of an enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PacketType(pub i32);

impl PacketType {
    pub const AUTH: PacketType = PacketType(3);
    pub const EXEC_COMMAND: PacketType = PacketType(2);
    pub const AUTH_RESPONSE: PacketType = PacketType(2);
    pub const RESPONSE_VALUE: PacketType = PacketType(0);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub id: i32,
    pub kind: PacketType,
    pub body: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtoError {
    #[error("request body is {len} bytes, limit is {MAX_REQUEST_BODY}")]
    BodyTooLong { len: usize },
    #[error("frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("frame length {0} outside {MIN_FRAME_LEN}..={MAX_FRAME_LEN}")]
    LengthOutOfRange(i64),
    #[error("frame is missing its NUL terminators")]
    MissingTerminator,
    #[error("packet body is not valid UTF-8")]
    InvalidUtf8,
}

impl Packet {
    pub fn new(id: i32, kind: PacketType, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    pub fn auth(id: i32, password: &str) -> Self {
        Self::new(id, PacketType::AUTH, password)
    }

    /// Builds an execute request, refusing bodies the server would drop.
    pub fn command(id: i32, body: &str) -> Result<Self, ProtoError> {
        if body.len() > MAX_REQUEST_BODY {
            return Err(ProtoError::BodyTooLong { len: body.len() });
        }
        Ok(Self::new(id, PacketType::EXEC_COMMAND, body))
    }

    pub fn response(id: i32, body: impl Into<String>) -> Self {
        Self::new(id, PacketType::RESPONSE_VALUE, body)
    }

    /// True when this is the server's answer to a rejected login.
    pub fn is_auth_rejection(&self) -> bool {
        self.kind == PacketType::AUTH_RESPONSE && self.id == AUTH_FAILED_ID
    }

    pub fn encode(&self) -> Vec<u8> {
        Frame::encode(self.id, self.kind, self.body.as_bytes())
    }

    /// Parses the bytes that follow the length prefix.
    pub fn decode_frame(frame: &[u8]) -> Result<Self, ProtoError> {
        let frame = Frame::parse(frame)?;
        let body = std::str::from_utf8(frame.body).map_err(|_| ProtoError::InvalidUtf8)?;
        Ok(Self::new(frame.id, frame.kind, body))
    }

    /// Parses one packet from the start of `buf`, returning it with the number
    /// of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), ProtoError> {
        if buf.len() < 4 {
            return Err(ProtoError::Truncated {
                needed: 4,
                available: buf.len(),
            });
        }
        let frame_len = frame_length([buf[0], buf[1], buf[2], buf[3]])?;
        let total = 4 + frame_len;
        if buf.len() < total {
            return Err(ProtoError::Truncated {
                needed: total,
                available: buf.len(),
            });
        }
        let packet = Self::decode_frame(&buf[4..total])?;
        Ok((packet, total))
    }
}

/// A packet whose body is still raw bytes. Servers split long responses at
/// byte offsets, so a fragment may end inside a UTF-8 sequence; callers
/// join the fragments and decode the text once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub id: i32,
    pub kind: PacketType,
    pub body: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Parses the bytes that follow the length prefix without decoding the
    /// body.
    pub fn parse(frame: &'a [u8]) -> Result<Self, ProtoError> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(ProtoError::Truncated {
                needed: MIN_FRAME_LEN,
                available: frame.len(),
            });
        }
        let id = read_i32(&frame[0..4]);
        let kind = PacketType(read_i32(&frame[4..8]));
        let (body, terminators) = frame[ID_AND_TYPE_LEN..].split_at(frame.len() - MIN_FRAME_LEN);
        if terminators != [0, 0] {
            return Err(ProtoError::MissingTerminator);
        }
        Ok(Self { id, kind, body })
    }

    /// Length-prefixed wire form of a packet with an arbitrary byte body.
    pub fn encode(id: i32, kind: PacketType, body: &[u8]) -> Vec<u8> {
        let frame_len = ID_AND_TYPE_LEN + body.len() + TERMINATOR_LEN;
        let mut buffer = Vec::with_capacity(4 + frame_len);
        buffer.extend_from_slice(&(frame_len as i32).to_le_bytes());
        buffer.extend_from_slice(&id.to_le_bytes());
        buffer.extend_from_slice(&kind.0.to_le_bytes());
        buffer.extend_from_slice(body);
        buffer.extend_from_slice(&[0, 0]);
        buffer
    }
}

/// Validates a length prefix and returns the frame size it announces.
pub fn frame_length(prefix: [u8; 4]) -> Result<usize, ProtoError> {
    let len = i32::from_le_bytes(prefix) as i64;
    if len < MIN_FRAME_LEN as i64 || len > MAX_FRAME_LEN as i64 {
        return Err(ProtoError::LengthOutOfRange(len));
    }
    Ok(len as usize)
}

fn read_i32(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
