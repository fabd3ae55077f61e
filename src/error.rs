//! Error taxonomy.
//!
//! Kinds are distinct (not subclassed) for their observable semantics: a caller
//! matches on `RsedisError` variants directly rather than on a shared base type.

use std::fmt;
use std::io;

/// A parsed `MOVED`/`ASK` redirection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub slot: u16,
    pub addr: String,
}

/// Structured view of a `-` reply, distinguishing the redirection kinds the
/// cluster client handles from everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    Moved(Redirect),
    Ask(Redirect),
    Other,
}

impl ReplyKind {
    /// Classify a raw reply-error message (the text after the leading `-`).
    pub fn classify(msg: &str) -> Self {
        if let Some(redirect) = parse_redirect(msg, "MOVED ") {
            return Self::Moved(redirect);
        }
        if let Some(redirect) = parse_redirect(msg, "ASK ") {
            return Self::Ask(redirect);
        }
        Self::Other
    }
}

fn parse_redirect(msg: &str, prefix: &str) -> Option<Redirect> {
    let rest = msg.strip_prefix(prefix)?;
    let (slot_str, addr) = rest.split_once(' ')?;
    let slot = slot_str.parse::<u16>().ok()?;
    Some(Redirect {
        slot,
        addr: addr.to_string(),
    })
}

/// All error variants surfaced by this crate, matching the taxonomy in
/// the error handling design: URL, Configuration, Connection, Read-timeout,
/// Connection-closed, Protocol, Reply.
#[derive(Debug)]
pub enum RsedisError {
    /// Malformed scheme or unknown option in a `getbyurl`-style factory call.
    Url(String),
    /// Mutually exclusive or missing construction parameters.
    Configuration(String),
    /// DNS failure, connect refusal, broken pipe, reset, zero-byte read,
    /// unreachable seeds/sentinels, pool exhaustion, retries-exceeded redirection.
    Connection(String),
    /// Socket recv exceeded the configured read timeout.
    ReadTimeout,
    /// Peer closed the socket mid-read.
    ConnectionClosed,
    /// RESP frame began with a byte that is not one of `+ - : $ *`.
    Protocol(String),
    /// A `-` frame from the server, carried verbatim.
    Reply(String),
}

impl RsedisError {
    /// Build a Reply error, recording whether it is a redirect.
    pub fn reply(msg: impl Into<String>) -> Self {
        Self::Reply(msg.into())
    }

    /// Classify this error as a `MOVED`/`ASK` redirect if it is a Reply error
    /// carrying one.
    pub fn reply_kind(&self) -> Option<ReplyKind> {
        match self {
            Self::Reply(msg) => Some(ReplyKind::classify(msg)),
            _ => None,
        }
    }

    /// True for the error kinds the component design calls "connection-kind":
    /// every one of these implies the offending Connection has been (or must be)
    /// closed before the error propagates.
    pub fn is_connection_kind(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::ReadTimeout | Self::ConnectionClosed
        )
    }
}

impl fmt::Display for RsedisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(msg) => write!(f, "url error: {msg}"),
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::Connection(msg) => write!(f, "connection error: {msg}"),
            Self::ReadTimeout => write!(f, "read timeout"),
            Self::ConnectionClosed => write!(f, "connection closed by peer"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Reply(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for RsedisError {}

impl From<io::Error> for RsedisError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::ReadTimeout,
            io::ErrorKind::UnexpectedEof => Self::ConnectionClosed,
            _ => Self::Connection(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, RsedisError>;
