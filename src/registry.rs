//! Registry of calls awaiting a reply.
//!
//! Each client owns exactly one registry, so independent clients never share
//! call ids. Entries are removed before their completion handler runs, which
//! is what guarantees a handler fires at most once.

use std::{collections::HashMap, time::Duration};

use serde_json::Value;
use tokio::time::Instant;
use tracing::trace;

use crate::{
    error::CallError,
    frame::{ErrorBody, Frame, FrameKind},
};

/// Ids wrap back to zero once the counter passes this value.
pub const CALL_ID_CEILING: u32 = 10_000_000;

/// Result delivered to a completion handler.
pub type CallResult = Result<Value, CallError>;

/// Handler invoked once with the outcome of a call.
pub type Completion = Box<dyn FnOnce(CallResult) + Send + 'static>;

struct PendingCall {
    expire_at: Instant,
    complete: Completion,
}

/// Outstanding calls keyed by call id.
#[derive(Default)]
pub struct CallRegistry {
    pending: HashMap<u32, PendingCall>,
    counter: u32,
}

impl CallRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Store `complete` under a fresh call id that expires `timeout` after `now`.
    ///
    /// Ids increase monotonically and wrap at [`CALL_ID_CEILING`]. Zero is
    /// never returned because it marks frames that expect no reply.
    pub fn register(&mut self, complete: Completion, timeout: Duration, now: Instant) -> u32 {
        self.counter += 1;
        let call_id = self.counter;
        if self.counter > CALL_ID_CEILING {
            self.counter = 0;
        }
        self.pending.insert(
            call_id,
            PendingCall {
                expire_at: now + timeout,
                complete,
            },
        );
        call_id
    }

    /// Complete the call addressed by `frame`.
    ///
    /// Returns `false` when no call is waiting on that id; such frames are
    /// dropped.
    pub fn resolve(&mut self, frame: Frame) -> bool {
        let Some(call) = self.pending.remove(&frame.call_id) else {
            trace!(call_id = frame.call_id, "dropping frame with no pending call");
            return false;
        };
        let outcome = match frame.kind {
            FrameKind::Reply => Ok(frame.body),
            FrameKind::Error => Err(application_error(frame.body)),
            other => Err(CallError::Protocol(other.as_u16())),
        };
        (call.complete)(outcome);
        true
    }

    /// Fail one call locally without waiting for the gateway.
    pub fn fail(&mut self, call_id: u32, error: CallError) -> bool {
        match self.pending.remove(&call_id) {
            Some(call) => {
                (call.complete)(Err(error));
                true
            }
            None => false,
        }
    }

    /// Fail every call whose deadline is at or before `now`.
    ///
    /// Returns the number of calls that timed out.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let expired: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, call)| call.expire_at <= now)
            .map(|(id, _)| *id)
            .collect();
        for call_id in &expired {
            if let Some(call) = self.pending.remove(call_id) {
                trace!(call_id, "call timed out");
                (call.complete)(Err(CallError::Timeout));
            }
        }
        expired.len()
    }

    /// Number of outstanding calls.
    #[must_use]
    pub fn len(&self) -> usize { self.pending.len() }

    /// Whether no call is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.pending.is_empty() }
}

fn application_error(body: Value) -> CallError {
    let ErrorBody { message, code } = serde_json::from_value(body).unwrap_or_default();
    CallError::Application {
        message: message.unwrap_or_else(|| "unknown error".to_owned()),
        code,
    }
}
