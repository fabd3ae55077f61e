//! A single owned socket to a Redis-compatible server.
//!
//! `Connection` performs connect/auth/select, then exposes `write`/`read`
//! with typed errors. It is single-owner: while a request is in flight no
//! other caller may touch the socket. Once closed it is inert.

use crate::command::Arg;
use crate::endpoint::Endpoint;
use crate::error::{RsedisError, Result};
use crate::resp::reader::Reader;
use crate::resp::types::RespValue;

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

const READ_CHUNK: usize = 1500;

enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.set_read_timeout(timeout),
            #[cfg(unix)]
            Self::Unix(s) => s.set_read_timeout(timeout),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Self::Unix(s) => s.read(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.write_all(buf),
            #[cfg(unix)]
            Self::Unix(s) => s.write_all(buf),
        }
    }
}

/// Per-connection settings frozen at construction (mirrors the Pool's frozen
/// configuration, §3 "Pool" — a Connection is built from the same bag).
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: u16,
    /// Character set bulk strings are validated against on read. Only
    /// `"utf-8"` is meaningfully checked; a decode failure never fails the
    /// read (§4.1) — it is only logged, the raw bytes are returned either way.
    pub encoding: Option<String>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Skip AUTH/SELECT — used when talking to Sentinels.
    pub sentinel: bool,
    /// Issue READONLY right after connect (replica-read mode).
    pub read_only: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            database: 0,
            encoding: None,
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(2),
            sentinel: false,
            read_only: false,
        }
    }
}

pub struct Connection {
    endpoint: Endpoint,
    opts: ConnectionOptions,
    stream: Option<Stream>,
    reader: Option<Reader>,
    closed: bool,
}

impl Connection {
    pub fn new(endpoint: Endpoint, opts: ConnectionOptions) -> Self {
        Self {
            endpoint,
            opts,
            stream: None,
            reader: None,
            closed: false,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    fn ensure_connected(&mut self) -> Result<()> {
        if self.stream.is_none() {
            self.connect()?;
        }
        Ok(())
    }

    /// Connect, then (unless `sentinel`) authenticate, set READONLY, and
    /// SELECT the configured database.
    pub fn connect(&mut self) -> Result<()> {
        if self.closed {
            return Err(RsedisError::Connection("connection gone".into()));
        }
        let stream = match &self.endpoint {
            Endpoint::Tcp { host, port } => connect_tcp(host, *port, self.opts.connect_timeout),
            Endpoint::Unix { path } => connect_unix(path),
        };
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                self.closed = true;
                return Err(e);
            }
        };
        self.stream = Some(stream);
        let mut reader = Reader::new();
        reader.set_encoding(self.opts.encoding.clone());
        self.reader = Some(reader);

        if !self.opts.sentinel {
            if let Err(e) = self.authenticate() {
                self.close();
                return Err(e);
            }
            if self.opts.read_only {
                if let Err(e) = self.issue(&[Arg::from("READONLY")]) {
                    self.close();
                    return Err(e);
                }
            }
            if let Err(e) = self.select_db() {
                self.close();
                return Err(e);
            }
        }

        if let Some(stream) = &self.stream {
            stream.set_read_timeout(Some(self.opts.read_timeout))?;
        }
        Ok(())
    }

    fn authenticate(&mut self) -> Result<()> {
        let Some(password) = self.opts.password.clone() else {
            return Ok(());
        };
        let mut args = vec![Arg::from("AUTH")];
        if let Some(username) = self.opts.username.clone() {
            args.push(Arg::from(username));
        }
        args.push(Arg::from(password));
        self.issue(&args)
    }

    fn select_db(&mut self) -> Result<()> {
        self.issue(&[Arg::from("SELECT"), Arg::from(self.opts.database as i64)])
    }

    /// Write then read one reply, raising on a reply error. Used internally
    /// for the connect-time handshake commands.
    fn issue(&mut self, args: &[Arg]) -> Result<()> {
        self.write(args)?;
        self.read()?;
        Ok(())
    }

    /// Serialize and send `args`, looping until every byte is delivered.
    pub fn write(&mut self, args: &[Arg]) -> Result<()> {
        self.ensure_connected()?;
        let wire = crate::command::encode(args);
        self.write_raw(&wire)
    }

    /// Send an already-encoded frame (used to prefix `ASKING` ahead of the
    /// real command on the same connection).
    pub fn write_raw(&mut self, wire: &[u8]) -> Result<()> {
        self.ensure_connected()?;
        let stream = self.stream.as_mut().expect("connected");
        match stream.write_all(wire) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.close();
                Err(RsedisError::Connection(format!("write failed: {e}")))
            }
        }
    }

    /// Read one reply, raising on reply errors and closing on timeout.
    pub fn read(&mut self) -> Result<RespValue> {
        self.read_opts(true, true)
    }

    /// Read one reply with explicit control over error-raising and
    /// close-on-timeout, used by pipelining (`raise_on_result_err=false`)
    /// and pub/sub (`close_on_timeout=false`).
    pub fn read_opts(&mut self, raise_on_result_err: bool, close_on_timeout: bool) -> Result<RespValue> {
        self.ensure_connected()?;
        loop {
            if let Some(value) = self
                .reader
                .as_mut()
                .expect("connected")
                .gets()
                .map_err(|e| {
                    self.close();
                    e
                })?
            {
                if raise_on_result_err {
                    if let RespValue::Error(msg) = &value {
                        return Err(RsedisError::reply(msg.clone()));
                    }
                }
                return Ok(value);
            }

            let mut buf = [0u8; READ_CHUNK];
            let stream = self.stream.as_mut().expect("connected");
            match stream.read(&mut buf) {
                Ok(0) => {
                    self.close();
                    return Err(RsedisError::ConnectionClosed);
                }
                Ok(n) => {
                    self.reader.as_mut().expect("connected").feed(&buf[..n]);
                }
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    if close_on_timeout {
                        self.close();
                    }
                    return Err(RsedisError::ReadTimeout);
                }
                Err(e) => {
                    self.close();
                    return Err(RsedisError::Connection(format!("read failed: {e}")));
                }
            }
        }
    }

    pub fn close(&mut self) {
        self.stream = None;
        self.reader = None;
        self.closed = true;
    }
}

fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<Stream> {
    let candidates: Vec<_> = (host, port)
        .to_socket_addrs()
        .map_err(|e| RsedisError::Connection(format!("could not resolve {host}:{port}: {e}")))?
        .collect();
    if candidates.is_empty() {
        return Err(RsedisError::Connection(format!(
            "host {host} resolved to no addresses"
        )));
    }
    let mut ordered = candidates;
    ordered.sort_by_key(|a| !a.is_ipv4());

    let mut last_err = None;
    for addr in ordered {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(s) => return Ok(Stream::Tcp(s)),
            Err(e) => last_err = Some(e),
        }
    }
    Err(RsedisError::Connection(format!(
        "could not connect to {host}:{port}: {}",
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

#[cfg(unix)]
fn connect_unix(path: &str) -> Result<Stream> {
    UnixStream::connect(path)
        .map(Stream::Unix)
        .map_err(|e| RsedisError::Connection(format!("could not connect to {path}: {e}")))
}

#[cfg(not(unix))]
fn connect_unix(_path: &str) -> Result<Stream> {
    Err(RsedisError::Configuration(
        "unix sockets are not supported on this platform".into(),
    ))
}
