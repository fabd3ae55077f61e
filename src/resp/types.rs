//! RESP value model.
//!
//! A tagged variant over the five RESP2 frame types. Arrays nest to
//! arbitrary depth; bulk strings and arrays carry an explicit nil case
//! rather than folding nil into a separate variant.

use bytes::Bytes;

#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// `+` frame: a short status line, e.g. `OK`, `PONG`.
    SimpleString(Bytes),
    /// `-` frame: the server's error message, carried verbatim.
    Error(String),
    /// `:` frame: a signed 64-bit integer.
    Integer(i64),
    /// `$` frame: `Some(bytes)`, or `None` for `$-1\r\n`.
    BulkString(Option<Bytes>),
    /// `*` frame: `Some(values)`, or `None` for `*-1\r\n`.
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::BulkString(None) | Self::Array(None))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn as_error(&self) -> Option<&str> {
        match self {
            Self::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// Byte view of a simple string or non-nil bulk string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::SimpleString(b) => Some(b),
            Self::BulkString(Some(b)) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<RespValue>> {
        match self {
            Self::Array(arr) => arr,
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SimpleString(_) => "simple string",
            Self::Error(_) => "error",
            Self::Integer(_) => "integer",
            Self::BulkString(_) => "bulk string",
            Self::Array(_) => "array",
        }
    }
}
