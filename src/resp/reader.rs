//! Resumable RESP reader.
//!
//! Driven by a growable buffer: the caller repeatedly calls `feed` to append
//! bytes and `gets` to pull the next complete top-level value. `gets` returns
//! `Ok(None)` (the sentinel-false of the source design) when no full frame is
//! available yet, so the caller knows to read more off the socket and feed it.

use crate::error::RsedisError;
use crate::resp::types::RespValue;
use bytes::{Bytes, BytesMut};

type ErrCtor = Box<dyn Fn(String) -> RsedisError + Send + Sync>;

/// A resumable, incremental RESP parser.
///
/// Protocol-error and reply-error construction are pluggable at construction
/// time (`with_error_constructors`); `new` wires up the crate's own
/// `RsedisError::Protocol`/`RsedisError::reply`.
pub struct Reader {
    buf: BytesMut,
    protocol_err: ErrCtor,
    reply_err: ErrCtor,
    encoding: Option<String>,
}

impl Default for Reader {
    fn default() -> Self {
        Self::new()
    }
}

impl Reader {
    pub fn new() -> Self {
        Self::with_error_constructors(
            Box::new(RsedisError::Protocol),
            Box::new(RsedisError::reply),
        )
    }

    pub fn with_error_constructors(protocol_err: ErrCtor, reply_err: ErrCtor) -> Self {
        Self {
            buf: BytesMut::new(),
            protocol_err,
            reply_err,
            encoding: None,
        }
    }

    /// Set the character set bulk strings are validated against (§4.1).
    /// A decode failure never fails the read — it only means validation is
    /// skipped and the raw bytes are returned as-is.
    pub fn set_encoding(&mut self, encoding: Option<String>) {
        self.encoding = encoding;
    }

    /// Append the given slice to the internal buffer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Append `data[offset..offset+length]`, validating the range.
    pub fn feed_slice(&mut self, data: &[u8], offset: usize, length: usize) -> Result<(), RsedisError> {
        let end = offset
            .checked_add(length)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| RsedisError::Configuration("feed offset/length out of range".into()))?;
        self.feed(&data[offset..end]);
        Ok(())
    }

    /// Try to pull the next complete value. `Ok(None)` means "feed more bytes".
    pub fn gets(&mut self) -> Result<Option<RespValue>, RsedisError> {
        match parse_value(
            &self.buf,
            &self.protocol_err,
            &self.reply_err,
            self.encoding.as_deref(),
        )? {
            Some((value, consumed)) => {
                let _ = self.buf.split_to(consumed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Number of unconsumed bytes currently buffered.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }
}

/// Find the offset of a line-terminating `\r\n`, if the line is complete.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    let mut start = 0;
    loop {
        let rel = memchr::memchr(b'\r', &buf[start..])?;
        let idx = start + rel;
        if idx + 1 < buf.len() {
            if buf[idx + 1] == b'\n' {
                return Some(idx);
            }
            start = idx + 1;
        } else {
            return None;
        }
    }
}

/// Parse a signed 64-bit integer from a decimal ASCII line, accumulating as
/// negative throughout so `i64::MIN` round-trips without overflow.
fn parse_i64(line: &[u8]) -> Option<i64> {
    if line.is_empty() {
        return None;
    }
    let (neg, digits) = match line[0] {
        b'-' => (true, &line[1..]),
        _ => (false, line),
    };
    if digits.is_empty() {
        return None;
    }
    let mut acc: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        acc = acc.checked_mul(10)?.checked_sub((b - b'0') as i64)?;
    }
    if neg {
        Some(acc)
    } else {
        acc.checked_neg()
    }
}

/// `None` = incomplete, need more bytes. `Some((value, consumed))` on success.
fn parse_value(
    buf: &[u8],
    protocol_err: &ErrCtor,
    reply_err: &ErrCtor,
    encoding: Option<&str>,
) -> Result<Option<(RespValue, usize)>, RsedisError> {
    if buf.is_empty() {
        return Ok(None);
    }
    match buf[0] {
        b'+' => Ok(parse_line(buf).map(|(line, total)| {
            (RespValue::SimpleString(Bytes::copy_from_slice(line)), total)
        })),
        b'-' => Ok(parse_line(buf).map(|(line, total)| {
            let msg = String::from_utf8_lossy(line).into_owned();
            (RespValue::Error(msg), total)
        })),
        b':' => match parse_line(buf) {
            None => Ok(None),
            Some((line, total)) => {
                let n = parse_i64(line)
                    .ok_or_else(|| protocol_err(format!("invalid integer frame: {line:?}")))?;
                Ok(Some((RespValue::Integer(n), total)))
            }
        },
        b'$' => parse_bulk(buf, protocol_err, encoding),
        b'*' => parse_array(buf, protocol_err, reply_err, encoding),
        other => Err(protocol_err(format!(
            "invalid RESP type byte: {:?}",
            other as char
        ))),
    }
}

/// Split off a CRLF-terminated line (without CRLF), returning
/// `(line, total_bytes_consumed_including_crlf)`.
fn parse_line(buf: &[u8]) -> Option<(&[u8], usize)> {
    let idx = find_crlf(&buf[1..]).map(|i| i + 1)?;
    Some((&buf[1..idx], idx + 2))
}

/// Validate `data` against the configured encoding, purely for diagnostics:
/// a decode failure never changes what is returned (§4.1) — the raw bytes
/// always carry the bulk string, decoded or not.
fn validate_encoding(data: &[u8], encoding: Option<&str>) {
    let Some(encoding) = encoding else { return };
    if !encoding.eq_ignore_ascii_case("utf-8") && !encoding.eq_ignore_ascii_case("utf8") {
        return;
    }
    if std::str::from_utf8(data).is_err() {
        tracing::debug!(encoding, "bulk string is not valid {encoding}; keeping raw bytes");
    }
}

fn parse_bulk(
    buf: &[u8],
    protocol_err: &ErrCtor,
    encoding: Option<&str>,
) -> Result<Option<(RespValue, usize)>, RsedisError> {
    let (line, header_len) = match parse_line(buf) {
        Some(v) => v,
        None => return Ok(None),
    };
    let len = parse_i64(line).ok_or_else(|| protocol_err(format!("invalid bulk length: {line:?}")))?;
    if len == -1 {
        return Ok(Some((RespValue::BulkString(None), header_len)));
    }
    if len < 0 {
        return Err(protocol_err(format!("negative bulk length: {len}")));
    }
    let len = len as usize;
    let total = header_len + len + 2;
    if buf.len() < total {
        return Ok(None);
    }
    let data = &buf[header_len..header_len + len];
    if &buf[header_len + len..total] != b"\r\n" {
        return Err(protocol_err("bulk string not terminated by CRLF".into()));
    }
    validate_encoding(data, encoding);
    Ok(Some((
        RespValue::BulkString(Some(Bytes::copy_from_slice(data))),
        total,
    )))
}

fn parse_array(
    buf: &[u8],
    protocol_err: &ErrCtor,
    reply_err: &ErrCtor,
    encoding: Option<&str>,
) -> Result<Option<(RespValue, usize)>, RsedisError> {
    let (line, header_len) = match parse_line(buf) {
        Some(v) => v,
        None => return Ok(None),
    };
    let n = parse_i64(line).ok_or_else(|| protocol_err(format!("invalid array length: {line:?}")))?;
    if n == -1 {
        return Ok(Some((RespValue::Array(None), header_len)));
    }
    if n < 0 {
        return Err(protocol_err(format!("negative array length: {n}")));
    }
    let mut consumed = header_len;
    let mut items = Vec::with_capacity(n as usize);
    for _ in 0..n {
        match parse_value(&buf[consumed..], protocol_err, reply_err, encoding)? {
            Some((value, used)) => {
                consumed += used;
                items.push(value);
            }
            None => return Ok(None),
        }
    }
    Ok(Some((RespValue::Array(Some(items)), consumed)))
}
