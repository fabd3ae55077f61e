//! RESP command serializer.
//!
//! Encodes command arguments into the RESP bulk string array wire format:
//! `*<N>\r\n$<len>\r\narg1\r\n$<len>\r\narg2\r\n…`

use itoa::Buffer;

/// Encode a command (list of arguments) into RESP wire format.
///
/// Each argument is treated as a binary-safe bulk string.
///
/// # Example
/// ```ignore
/// let bytes = encode_command(&[b"SET", b"key", b"value"]);
/// // → *3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n
/// ```
pub fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    // Pre-calculate capacity for zero (or minimal) reallocation
    let mut cap = 1 + 10 + 2; // '*' + max_digits(usize) + \r\n
    for arg in args {
        cap += 1 + 10 + 2 + arg.len() + 2; // '$' + len + \r\n + data + \r\n
    }

    let mut buf = Vec::with_capacity(cap);
    let mut itoa_buf = Buffer::new();

    // *<N>\r\n
    buf.push(b'*');
    buf.extend_from_slice(itoa_buf.format(args.len()).as_bytes());
    buf.extend_from_slice(b"\r\n");

    for arg in args {
        // $<len>\r\n<data>\r\n
        buf.push(b'$');
        buf.extend_from_slice(itoa_buf.format(arg.len()).as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(arg);
        buf.extend_from_slice(b"\r\n");
    }

    buf
}

// ── Tests ──────────────────────────────────────────────────────────
