//! Catalogue of numeric error codes shared with the gateway.
//!
//! The gateway reports these in the `code` field of error frames. Client-side
//! failures reuse the `client` family so callers can match on one number
//! regardless of where an error originated.

/// Errors detected by the client runtime.
pub mod client {
    /// Generic client error.
    pub const ERROR: i64 = 400;
    /// Command not found.
    pub const NOT_FOUND: i64 = 404;
    /// Call timed out.
    pub const TIMEOUT: i64 = 408;
    /// Body was not valid JSON.
    pub const JSON_FORMAT: i64 = 415;
    /// Body had an unexpected shape.
    pub const BODY_FORMAT: i64 = 416;
    /// No connection to the gateway.
    pub const NOT_CONNECTED: i64 = 420;
}

/// Errors raised by the gateway itself.
pub mod server {
    /// Generic server error.
    pub const ERROR: i64 = 500;
}

/// Errors raised by the gateway's wide-column storage backend.
pub mod storage {
    /// Generic storage error.
    pub const ERROR: i64 = 600;
    /// Backend connection failed.
    pub const CONNECTION_FAIL: i64 = 601;
    /// Named cluster does not exist.
    pub const NO_CLUSTER: i64 = 610;
    /// Named keyspace does not exist.
    pub const NO_KEYSPACE: i64 = 611;
    /// Named column family does not exist.
    pub const NO_COLUMN_FAMILY: i64 = 612;
    /// Unsupported consistency level.
    pub const INVALID_CONSISTENCY: i64 = 680;
    /// Unsupported comparator.
    pub const INVALID_COMPARATOR: i64 = 681;
    /// Unsupported token type.
    pub const INVALID_TOKEN_TYPE: i64 = 682;
}

/// Errors raised by the gateway's cache backend.
pub mod cache {
    /// Cache backend is not configured.
    pub const NOT_CONFIGURED: i64 = 700;
    /// Generic cache error.
    pub const ERROR: i64 = 710;
    /// Cache backend timed out.
    pub const TIMEOUT: i64 = 711;
}

/// Short human-readable description for a known code.
///
/// # Examples
///
/// ```
/// use triton_client::codes;
///
/// assert_eq!(codes::describe(codes::client::TIMEOUT), Some("timeout"));
/// assert_eq!(codes::describe(1), None);
/// ```
#[must_use]
pub const fn describe(code: i64) -> Option<&'static str> {
    let text = match code {
        client::ERROR => "client error",
        client::NOT_FOUND => "not found",
        client::TIMEOUT => "timeout",
        client::JSON_FORMAT => "invalid json",
        client::BODY_FORMAT => "invalid body",
        client::NOT_CONNECTED => "not connected",
        server::ERROR => "server error",
        storage::ERROR => "storage error",
        storage::CONNECTION_FAIL => "storage connection failed",
        storage::NO_CLUSTER => "no such cluster",
        storage::NO_KEYSPACE => "no such keyspace",
        storage::NO_COLUMN_FAMILY => "no such column family",
        storage::INVALID_CONSISTENCY => "invalid consistency level",
        storage::INVALID_COMPARATOR => "invalid comparator",
        storage::INVALID_TOKEN_TYPE => "invalid token type",
        cache::NOT_CONFIGURED => "cache not configured",
        cache::ERROR => "cache error",
        cache::TIMEOUT => "cache timeout",
        _ => return None,
    };
    Some(text)
}
