//! Outbound queue for calls made while no connection is active.
//!
//! The queue is bounded. Reaching the bound sheds the whole backlog, not
//! just the newest entry.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::pool::Route;

/// Default number of frames held while disconnected.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000;

/// An encoded frame waiting for a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFrame {
    /// Routing policy to apply once a connection is available.
    pub route: Route,
    /// Encoded frame bytes.
    pub frame: Bytes,
}

/// Returned by [`OutboundQueue::push`] when the queue was full and has been
/// cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueShed {
    /// Number of queued frames discarded.
    pub dropped: usize,
}

/// Bounded FIFO of frames awaiting a connection.
#[derive(Debug)]
pub struct OutboundQueue {
    entries: VecDeque<QueuedFrame>,
    capacity: usize,
}

impl Default for OutboundQueue {
    fn default() -> Self { Self::with_capacity(DEFAULT_QUEUE_CAPACITY) }
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` frames.
    #[must_use]
    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Append `entry`, or clear the queue if it is already full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueShed`] when the queue was at capacity. The queue is
    /// empty afterwards and `entry` is not stored.
    pub fn push(&mut self, entry: QueuedFrame) -> Result<(), QueueShed> {
        if self.is_full() {
            return Err(QueueShed {
                dropped: self.clear(),
            });
        }
        self.entries.push_back(entry);
        Ok(())
    }

    /// Discard every entry, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    /// Take the oldest entry.
    pub fn pop(&mut self) -> Option<QueuedFrame> { self.entries.pop_front() }

    /// Put an entry back at the head, ahead of everything else.
    pub fn requeue(&mut self, entry: QueuedFrame) { self.entries.push_front(entry); }

    /// Number of queued frames.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Whether the next push would shed the queue.
    #[must_use]
    pub fn is_full(&self) -> bool { self.entries.len() >= self.capacity }

    /// Maximum number of queued frames.
    #[must_use]
    pub const fn capacity(&self) -> usize { self.capacity }
}
