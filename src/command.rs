//! Command argument tokens.
//!
//! A command is an ordered sequence of argument tokens; each token is a byte
//! string, a UTF-8 string, an integer, or a float. Non-byte tokens are
//! coerced to their decimal textual representation when serialized.

use crate::resp::writer::encode_command;

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Bytes(Vec<u8>),
    Str(String),
    Int(i64),
    Float(f64),
}

impl Arg {
    /// Render this token to its wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Bytes(b) => b.clone(),
            Self::Str(s) => s.as_bytes().to_vec(),
            Self::Int(n) => n.to_string().into_bytes(),
            Self::Float(f) => format_float(*f).into_bytes(),
        }
    }
}

/// Shortest non-exponential decimal representation, matching the Writer's
/// coercion rule for float arguments.
fn format_float(f: f64) -> String {
    if f == f.trunc() && f.is_finite() && f.abs() < 1e15 {
        format!("{f:.0}")
    } else {
        format!("{f}")
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&[u8]> for Arg {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for Arg {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<i64> for Arg {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Arg {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

pub type Command = Vec<Arg>;

/// Serialize a command (argument vector) into RESP wire format.
pub fn encode(args: &[Arg]) -> Vec<u8> {
    let byte_args: Vec<Vec<u8>> = args.iter().map(Arg::to_bytes).collect();
    let refs: Vec<&[u8]> = byte_args.iter().map(|v| v.as_slice()).collect();
    encode_command(&refs)
}

/// Build a `Command` from string literals; convenience used throughout the
/// topology/client layer where most verbs and arguments are plain text.
#[macro_export]
macro_rules! command {
    ($($arg:expr),+ $(,)?) => {
        vec![$($crate::command::Arg::from($arg)),+]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_int_and_float() {
        let cmd: Command = vec![Arg::from("SET"), Arg::from("key"), Arg::from(42i64)];
        assert_eq!(encode(&cmd), b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$2\r\n42\r\n");

        let cmd: Command = vec![Arg::from("INCRBYFLOAT"), Arg::from("key"), Arg::from(1.5f64)];
        assert_eq!(
            encode(&cmd),
            b"*3\r\n$11\r\nINCRBYFLOAT\r\n$3\r\nkey\r\n$3\r\n1.5\r\n"
        );
    }

    #[test]
    fn whole_number_float_is_non_exponential() {
        assert_eq!(Arg::Float(10.0).to_bytes(), b"10");
    }

    #[test]
    fn command_macro() {
        let cmd = command!("GET", "foo");
        assert_eq!(cmd, vec![Arg::Str("GET".into()), Arg::Str("foo".into())]);
    }

    #[test]
    fn negative_int() {
        assert_eq!(Arg::Int(-7).to_bytes(), b"-7");
    }
}
