//! Tokio codec for gateway framing.
//!
//! [`GatewayCodec`] implements Tokio's [`Decoder`] and [`Encoder`] so a socket
//! can be wrapped in [`tokio_util::codec::FramedRead`] or
//! [`tokio_util::codec::Framed`]. Reassembly of partial and coalesced frames
//! falls out of the `Decoder` contract: bytes stay buffered until a complete
//! frame is available and exactly one frame is consumed per call.
//!
//! A complete frame with an unreadable body is not fatal. The decoder consumes
//! it and yields `Some(Err(FrameError::Malformed { .. }))` so the stream can
//! carry on with the next frame. Only a declared body length above the
//! configured limit ends the stream, since the framing can no longer be
//! trusted.
//!
//! # Usage
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//! use tokio_util::codec::FramedRead;
//! use triton_client::GatewayCodec;
//!
//! let mut frames = FramedRead::new(read_half, GatewayCodec::new());
//! while let Some(decoded) = frames.next().await {
//!     match decoded? {
//!         Ok(frame) => dispatch(frame),
//!         Err(malformed) => tracing::warn!(%malformed, "skipping frame"),
//!     }
//! }
//! ```

use bytes::{Buf, BytesMut};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::{
    error::FrameError,
    frame::{Frame, FrameHeader, HEADER_LEN, write_frame},
};

/// Default ceiling on inbound body length (16 MiB).
pub const DEFAULT_MAX_BODY_LEN: usize = 16 * 1024 * 1024;

/// One decoded frame, or the reason a complete frame was skipped.
pub type DecodedFrame = Result<Frame, FrameError>;

/// Tokio codec for the gateway's 16-byte-header framing.
#[derive(Debug, Clone)]
pub struct GatewayCodec {
    max_body_len: usize,
}

impl Default for GatewayCodec {
    fn default() -> Self {
        Self {
            max_body_len: DEFAULT_MAX_BODY_LEN,
        }
    }
}

impl GatewayCodec {
    /// Create a codec with the default body limit.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Override the largest accepted body length.
    #[must_use]
    pub const fn with_max_body_len(mut self, max_body_len: usize) -> Self {
        self.max_body_len = max_body_len;
        self
    }
}

impl Decoder for GatewayCodec {
    type Error = FrameError;
    type Item = DecodedFrame;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(hdr) = src.first_chunk::<HEADER_LEN>() else {
            return Ok(None);
        };
        let header = FrameHeader::from_bytes(hdr);

        let body_len = usize::try_from(header.body_len).unwrap_or(usize::MAX);
        if body_len > self.max_body_len {
            return Err(FrameError::BodyTooLarge {
                len: body_len,
                max: self.max_body_len,
            });
        }

        let frame_len = HEADER_LEN + body_len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let body = src.split_to(body_len);
        let decoded = serde_json::from_slice::<Value>(&body)
            .map(|value| Frame {
                kind: header.kind,
                call_id: header.call_id,
                body: value,
            })
            .map_err(|source| FrameError::Malformed {
                call_id: header.call_id,
                source,
            });
        Ok(Some(decoded))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        if !buf.is_empty() {
            debug!(leftover = buf.len(), "discarding partial frame at end of stream");
            buf.clear();
        }
        Ok(None)
    }
}

impl Encoder<Frame> for GatewayCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&item.body).map_err(|e| FrameError::Encode(e.to_string()))?;
        write_frame(item.kind, item.call_id, &body, dst)
    }
}

#[cfg(test)]
mod tests;
