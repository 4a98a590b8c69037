//! Lifecycle notifications published by a client.
//!
//! Notifications are observational: connection and protocol failures are
//! recovered internally, and subscribers only learn that they happened.
//! Receivers that fall behind lose the oldest notifications.

use std::fmt;

use crate::host::HostRecord;

/// Buffered notifications per subscriber.
pub const EVENT_CAPACITY: usize = 64;

/// A lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The first connection became active.
    Open,
    /// The last active connection closed.
    Close,
    /// A connection failed or received an unreadable frame.
    Error {
        /// Host the failure occurred on.
        host: HostRecord,
        /// Description of the cause.
        message: String,
    },
    /// A connection went idle for longer than the configured timeout.
    Timeout {
        /// Host whose connection timed out.
        host: HostRecord,
    },
    /// Informational message.
    Log(String),
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Close => f.write_str("close"),
            Self::Error { host, message } => write!(f, "error on {host}: {message}"),
            Self::Timeout { host } => write!(f, "timeout on {host}"),
            Self::Log(message) => f.write_str(message),
        }
    }
}
