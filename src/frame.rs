//! Gateway frame layout and request encoding.
//!
//! Every frame is a fixed 16-byte big-endian header followed by a UTF-8 JSON
//! body:
//!
//! | Field     | Offset | Size | Description                              |
//! |-----------|--------|------|------------------------------------------|
//! | type      | 0      | 2    | `0x01` request, `0x10` reply, `0x11` error |
//! | body_len  | 2      | 4    | Body length in bytes                     |
//! | call_id   | 6      | 4    | Correlation id (0 = no reply expected)   |
//! | reserved  | 10     | 6    | Written as zero, ignored on read         |
//! | body      | 16     | var  | JSON body (`body_len` bytes)             |

#![expect(clippy::big_endian_bytes, reason = "network protocol uses big-endian")]

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FrameError;

/// Length of a frame header in bytes.
pub const HEADER_LEN: usize = 16;
/// Command sent on every scheduler tick to keep connections warm.
pub const HEARTBEAT_COMMAND: &str = "triton.heartbeat";
/// Call id used for frames that expect no reply.
pub const NO_REPLY: u32 = 0;

/// Frame type carried in the first two header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Outbound command.
    Request,
    /// Successful response.
    Reply,
    /// Application error response.
    Error,
    /// Any other type value.
    Unknown(u16),
}

impl FrameKind {
    const REQUEST: u16 = 0x01;
    const REPLY: u16 = 0x10;
    const ERROR: u16 = 0x11;

    /// Numeric wire value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Request => Self::REQUEST,
            Self::Reply => Self::REPLY,
            Self::Error => Self::ERROR,
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<u16> for FrameKind {
    fn from(raw: u16) -> Self {
        match raw {
            Self::REQUEST => Self::Request,
            Self::REPLY => Self::Reply,
            Self::ERROR => Self::Error,
            other => Self::Unknown(other),
        }
    }
}

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame type.
    pub kind: FrameKind,
    /// Body length in bytes.
    pub body_len: u32,
    /// Correlation id.
    pub call_id: u32,
}

impl FrameHeader {
    /// Parse a header from its 16-byte wire form.
    #[must_use = "use the returned header"]
    pub const fn from_bytes(buf: &[u8; HEADER_LEN]) -> Self {
        Self {
            kind: match u16::from_be_bytes([buf[0], buf[1]]) {
                FrameKind::REQUEST => FrameKind::Request,
                FrameKind::REPLY => FrameKind::Reply,
                FrameKind::ERROR => FrameKind::Error,
                other => FrameKind::Unknown(other),
            },
            body_len: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
            call_id: u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]),
        }
    }

    /// Write the header, zeroing the reserved bytes.
    pub fn write_bytes(&self, buf: &mut [u8; HEADER_LEN]) {
        buf[0..2].copy_from_slice(&self.kind.as_u16().to_be_bytes());
        buf[2..6].copy_from_slice(&self.body_len.to_be_bytes());
        buf[6..10].copy_from_slice(&self.call_id.to_be_bytes());
        buf[10..].fill(0);
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Frame type.
    pub kind: FrameKind,
    /// Correlation id.
    pub call_id: u32,
    /// Decoded JSON body.
    pub body: Value,
}

impl Frame {
    /// Build a reply frame.
    #[must_use]
    pub const fn reply(call_id: u32, body: Value) -> Self {
        Self {
            kind: FrameKind::Reply,
            call_id,
            body,
        }
    }

    /// Build an error frame carrying `{"message", "code"}`.
    #[must_use]
    pub fn error(call_id: u32, message: impl Into<String>, code: Option<i64>) -> Self {
        let body = ErrorBody {
            message: Some(message.into()),
            code,
        };
        Self {
            kind: FrameKind::Error,
            call_id,
            body: serde_json::to_value(body).unwrap_or(Value::Null),
        }
    }

    /// Interpret the body as a request envelope.
    ///
    /// Returns `None` for non-request frames or bodies of the wrong shape.
    #[must_use]
    pub fn request_body(&self) -> Option<RequestBody> {
        if self.kind != FrameKind::Request {
            return None;
        }
        serde_json::from_value(self.body.clone()).ok()
    }

    /// Serialise the frame to wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Encode`] if the body does not fit the length field.
    pub fn to_bytes(&self) -> Result<Bytes, FrameError> {
        let body = serde_json::to_vec(&self.body).map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(assemble(self.kind, self.call_id, &body)?.freeze())
    }
}

/// Envelope of a request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    /// Command name.
    pub name: String,
    /// Command payload, `null` when absent.
    pub body: Value,
}

/// Body of an error frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Application error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
}

/// Encode an outbound request frame.
///
/// # Errors
///
/// Returns [`FrameError::Encode`] if the payload cannot be serialised or the
/// body exceeds the 32-bit length field.
///
/// # Examples
///
/// ```
/// use triton_client::frame::{HEADER_LEN, encode_request};
///
/// let bytes = encode_request(7, "triton.echo", None).expect("encodes");
/// assert_eq!(&bytes[..2], &[0x00, 0x01]);
/// assert_eq!(&bytes[HEADER_LEN..], br#"{"name":"triton.echo","body":null}"#);
/// ```
pub fn encode_request(call_id: u32, name: &str, payload: Option<&Value>) -> Result<Bytes, FrameError> {
    #[derive(Serialize)]
    struct Envelope<'a> {
        name: &'a str,
        body: Option<&'a Value>,
    }

    let body = serde_json::to_vec(&Envelope {
        name,
        body: payload,
    })
    .map_err(|e| FrameError::Encode(e.to_string()))?;
    Ok(assemble(FrameKind::Request, call_id, &body)?.freeze())
}

pub(crate) fn assemble(kind: FrameKind, call_id: u32, body: &[u8]) -> Result<BytesMut, FrameError> {
    let mut dst = BytesMut::with_capacity(HEADER_LEN + body.len());
    write_frame(kind, call_id, body, &mut dst)?;
    Ok(dst)
}

pub(crate) fn write_frame(
    kind: FrameKind,
    call_id: u32,
    body: &[u8],
    dst: &mut BytesMut,
) -> Result<(), FrameError> {
    let body_len = u32::try_from(body.len())
        .map_err(|_| FrameError::Encode(format!("body of {} bytes is too large", body.len())))?;
    let header = FrameHeader {
        kind,
        body_len,
        call_id,
    };
    let mut hdr = [0u8; HEADER_LEN];
    header.write_bytes(&mut hdr);
    dst.reserve(HEADER_LEN + body.len());
    dst.put_slice(&hdr);
    dst.put_slice(body);
    Ok(())
}
