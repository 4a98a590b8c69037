//! Active connection set and routing.
//!
//! The active list is kept sorted by host id at all times. Both routing
//! policies index into that list, so the order in which hosts connect or
//! reconnect never changes where a call goes.

#![expect(
    clippy::integer_division_remainder_used,
    reason = "routing reduces cursors and keys modulo the active count"
)]

use std::collections::BTreeSet;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{
    connection::Outbound,
    host::{HostId, HostRecord},
};

/// How a call selects its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Route {
    /// Rotate through active connections.
    #[default]
    RoundRobin,
    /// Pick `key mod active_count`.
    Key(u32),
}

impl Route {
    /// Route by the FNV-1a hash of `source`.
    ///
    /// # Examples
    ///
    /// ```
    /// use triton_client::Route;
    ///
    /// assert_eq!(Route::hashed("lock-a"), Route::hashed("lock-a"));
    /// assert_ne!(Route::hashed("lock-a"), Route::RoundRobin);
    /// ```
    #[must_use]
    pub fn hashed(source: &str) -> Self { Self::Key(fnv1a(source.as_bytes())) }
}

/// 32-bit FNV-1a hash.
#[must_use]
pub fn fnv1a(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    bytes.iter().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(PRIME)
    })
}

/// Write side of an active connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    host: HostRecord,
    writer: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    /// Pair a host with the channel feeding its socket writer.
    #[must_use]
    pub(crate) const fn new(host: HostRecord, writer: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { host, writer }
    }

    /// Host this connection is bound to.
    #[must_use]
    pub const fn host(&self) -> &HostRecord { &self.host }

    /// Queue `frame` for the socket writer.
    ///
    /// Returns `false` if the socket task has already gone away.
    pub fn write(&self, frame: Bytes) -> bool { self.writer.send(Outbound::Frame(frame)).is_ok() }

    /// Ask the socket writer to flush and half-close the connection.
    pub fn end(&self) -> bool { self.writer.send(Outbound::End).is_ok() }
}

/// Active and deactive connections of one client.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    active: Vec<ConnectionHandle>,
    deactive: BTreeSet<HostId>,
    cursor: usize,
}

impl ConnectionPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Move a host into the active list, keeping host-id order.
    ///
    /// A handle already active for the same host is replaced.
    pub fn activate(&mut self, handle: ConnectionHandle) {
        let id = handle.host().id();
        self.deactive.remove(&id);
        match self.active.binary_search_by_key(&id, |c| c.host().id()) {
            Ok(index) => {
                if let Some(slot) = self.active.get_mut(index) {
                    *slot = handle;
                }
            }
            Err(index) => self.active.insert(index, handle),
        }
    }

    /// Move a host into the deactive set.
    ///
    /// Returns the handle if the host was active.
    pub fn deactivate(&mut self, id: HostId) -> Option<ConnectionHandle> {
        self.deactive.insert(id);
        let index = self
            .active
            .binary_search_by_key(&id, |c| c.host().id())
            .ok()?;
        Some(self.active.remove(index))
    }

    /// Select a connection for `route`.
    ///
    /// Round-robin starts at the lowest host id and advances one position per
    /// pick; the cursor is reduced modulo the current active count so it
    /// survives hosts joining and leaving.
    pub fn pick(&mut self, route: Route) -> Option<&ConnectionHandle> {
        let count = self.active.len();
        if count == 0 {
            return None;
        }
        let index = match route {
            Route::RoundRobin => {
                let index = self.cursor % count;
                self.cursor = index + 1;
                index
            }
            Route::Key(key) => usize::try_from(key).map_or(0, |wide| wide % count),
        };
        self.active.get(index)
    }

    /// Active connections in host-id order.
    pub fn iter(&self) -> impl Iterator<Item = &ConnectionHandle> { self.active.iter() }

    /// Number of active connections.
    #[must_use]
    pub const fn active_count(&self) -> usize { self.active.len() }

    /// Whether any connection is active.
    #[must_use]
    pub const fn is_connected(&self) -> bool { !self.active.is_empty() }

    /// Whether `id` is in the deactive set.
    #[must_use]
    pub fn is_deactive(&self, id: HostId) -> bool { self.deactive.contains(&id) }
}
