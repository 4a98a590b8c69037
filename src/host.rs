//! Gateway host table.
//!
//! Host records are numbered in the order they are configured. That ordinal
//! is the only thing the connection pool sorts by, so routing stays stable no
//! matter which hosts happen to connect first.

use std::fmt;

use crate::{config::ClientConfig, error::ClientError};

/// Stable ordinal identifying a configured gateway host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostId(u32);

impl HostId {
    /// Wrap a raw ordinal.
    #[must_use]
    pub const fn new(value: u32) -> Self { Self(value) }

    /// Return the raw ordinal.
    #[must_use]
    pub const fn get(self) -> u32 { self.0 }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// One configured gateway endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostRecord {
    id: HostId,
    address: String,
    port: u16,
}

impl HostRecord {
    /// Create a record with an explicit id.
    #[must_use]
    pub fn new(id: HostId, address: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            address: address.into(),
            port,
        }
    }

    /// Ordinal id of this host.
    #[must_use]
    pub const fn id(&self) -> HostId { self.id }

    /// Host name or IP address.
    #[must_use]
    pub fn address(&self) -> &str { &self.address }

    /// TCP port.
    #[must_use]
    pub const fn port(&self) -> u16 { self.port }
}

impl fmt::Display for HostRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

/// Ordered set of gateway hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTable {
    hosts: Vec<HostRecord>,
}

impl HostTable {
    /// Build the table from `host` followed by every `hosts` entry.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoHosts`] when nothing is configured and
    /// [`ClientError::InvalidHost`] for an entry that cannot be parsed.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let entries = config.host.iter().chain(config.hosts.iter());
        Self::parse(entries, config.port)
    }

    /// Parse `host[:port]` entries, numbering them from 1.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoHosts`] for an empty list and
    /// [`ClientError::InvalidHost`] for an unparsable entry.
    ///
    /// # Examples
    ///
    /// ```
    /// use triton_client::HostTable;
    ///
    /// let table = HostTable::parse(["10.0.0.1", "10.0.0.2:5000"], 4848).expect("valid hosts");
    /// let ports: Vec<u16> = table.iter().map(|h| h.port()).collect();
    /// assert_eq!(ports, vec![4848, 5000]);
    /// ```
    pub fn parse<I, S>(entries: I, default_port: u16) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hosts = Vec::new();
        for (ordinal, entry) in (1..).zip(entries) {
            let (address, port) = split_host_port(entry.as_ref(), default_port)?;
            hosts.push(HostRecord::new(HostId::new(ordinal), address, port));
        }
        if hosts.is_empty() {
            return Err(ClientError::NoHosts);
        }
        Ok(Self { hosts })
    }

    /// Iterate hosts in id order.
    pub fn iter(&self) -> impl Iterator<Item = &HostRecord> { self.hosts.iter() }

    /// Number of configured hosts.
    #[must_use]
    pub const fn len(&self) -> usize { self.hosts.len() }

    /// Whether the table is empty. Always `false` for a parsed table.
    #[must_use]
    pub const fn is_empty(&self) -> bool { self.hosts.is_empty() }
}

fn split_host_port(raw: &str, default_port: u16) -> Result<(String, u16), ClientError> {
    let entry = raw.trim();
    let invalid = || ClientError::InvalidHost(entry.to_owned());
    if entry.is_empty() {
        return Err(invalid());
    }

    // Bracketed IPv6 literal, optionally followed by a port.
    if let Some(rest) = entry.strip_prefix('[') {
        let (address, tail) = rest.split_once(']').ok_or_else(invalid)?;
        let port = match tail.strip_prefix(':') {
            Some(port) => port.parse().map_err(|_| invalid())?,
            None if tail.is_empty() => default_port,
            None => return Err(invalid()),
        };
        if address.is_empty() {
            return Err(invalid());
        }
        return Ok((address.to_owned(), port));
    }

    match entry.split_once(':') {
        // More than one colon: a bare IPv6 literal without a port.
        Some((_, rest)) if rest.contains(':') => Ok((entry.to_owned(), default_port)),
        Some((address, digits)) if !address.is_empty() => {
            let port = digits.parse().map_err(|_| invalid())?;
            Ok((address.to_owned(), port))
        }
        Some(_) => Err(invalid()),
        None => Ok((entry.to_owned(), default_port)),
    }
}
