//! Endpoint addressing.
//!
//! An endpoint is either a TCP `(host, port)` pair or a Unix socket path.
//! Its canonical key form, `"<host>_<port>"`, doubles as the connection-cache
//! key and the form that appears (with `:` in place of `_`) in MOVED/ASK
//! replies.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix { path: String },
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Canonical `"host_port"` key. Unix sockets use their path as-is.
    pub fn key(&self) -> String {
        match self {
            Self::Tcp { host, port } => format!("{host}_{port}"),
            Self::Unix { path } => path.clone(),
        }
    }

    /// Parse a `"host:port"` wire address (as seen in MOVED/ASK replies)
    /// into an endpoint-key by substituting `:` with `_`.
    pub fn key_from_wire_addr(addr: &str) -> String {
        addr.replacen(':', "_", 1)
    }

    /// Parse a `"host:port"` wire address into a structured TCP endpoint.
    pub fn from_wire_addr(addr: &str) -> Option<Self> {
        let (host, port) = addr.rsplit_once(':')?;
        let port: u16 = port.parse().ok()?;
        Some(Self::tcp(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
            Self::Unix { path } => write!(f, "{path}"),
        }
    }
}
