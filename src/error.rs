//! Error types for framing, individual calls, and the client façade.
//!
//! Errors are split by who observes them: [`FrameError`] stays inside the
//! connection tasks, [`CallError`] is delivered to a single call's completion
//! handler, and [`ClientError`] is returned synchronously by the façade.

use std::io;

use thiserror::Error;

use crate::codes;

/// Errors raised while encoding or decoding wire frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Socket I/O failed while reading or writing frames.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The header announced a body larger than the configured maximum.
    #[error("frame body of {len} bytes exceeds maximum of {max} bytes")]
    BodyTooLarge {
        /// Declared body length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },
    /// The body of a complete frame was not valid UTF-8 JSON.
    #[error("malformed body in frame for call {call_id}: {source}")]
    Malformed {
        /// Call id read from the frame header.
        call_id: u32,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// The outbound body could not be serialised or does not fit the header.
    #[error("cannot encode frame: {0}")]
    Encode(String),
}

/// Outcome of a failed call, delivered to that call's completion handler.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CallError {
    /// The gateway answered with an error frame.
    #[error("{message}")]
    Application {
        /// Message supplied by the gateway.
        message: String,
        /// Optional application error code.
        code: Option<i64>,
    },
    /// No reply arrived before the call expired.
    #[error("timed out")]
    Timeout,
    /// No connection was available and the outbound queue was full.
    #[error("not connected")]
    NotConnected,
    /// The gateway answered with a frame type the client does not understand.
    #[error("invalid response type 0x{0:02x}")]
    Protocol(u16),
    /// `release` was called on a lock that was never acquired.
    #[error("lock has not been acquired yet")]
    LockNotAcquired,
    /// The client shut down before the call completed.
    #[error("client closed")]
    Closed,
    /// The request could not be encoded.
    #[error("cannot encode request: {0}")]
    Encode(String),
}

impl CallError {
    /// Numeric code for this error from the [`codes`] catalogue.
    ///
    /// Application errors report the gateway's own code when it sent one.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::Application { code: Some(code), .. } => *code,
            Self::Application { code: None, .. } => codes::server::ERROR,
            Self::Timeout => codes::client::TIMEOUT,
            Self::NotConnected | Self::Closed => codes::client::NOT_CONNECTED,
            Self::Protocol(_) => codes::client::BODY_FORMAT,
            Self::LockNotAcquired => codes::client::ERROR,
            Self::Encode(_) => codes::client::JSON_FORMAT,
        }
    }
}

/// Errors returned synchronously by [`crate::Client`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configuration named no gateway host.
    #[error("no gateway hosts configured")]
    NoHosts,
    /// A host entry could not be parsed.
    #[error("invalid host entry {0:?}")]
    InvalidHost(String),
    /// Configuration sources could not be merged or extracted.
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
    /// The client has already shut down.
    #[error("client closed")]
    Closed,
    /// No connection is active and the outbound queue is full.
    #[error("not connected and the outbound queue is full")]
    NotConnected,
    /// The client was started outside a Tokio runtime.
    #[error("client must be opened from within a Tokio runtime")]
    NoRuntime,
}

impl From<figment::Error> for ClientError {
    fn from(err: figment::Error) -> Self { Self::Config(Box::new(err)) }
}
