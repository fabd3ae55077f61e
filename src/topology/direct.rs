//! Direct (single-server) client.
//!
//! Wraps one `Connection` and adds bulk (pipelining) mode: while active,
//! `execute` only writes; replies are drained in batches of `batch_size`
//! and, once stopped, any remainder is drained and handed back.

use crate::command::Arg;
use crate::connection::socket::{Connection, ConnectionOptions};
use crate::endpoint::Endpoint;
use crate::error::{Result, RsedisError};
use crate::resp::types::RespValue;
use crate::topology::bulk::BulkState;
use crate::topology::PoolClient;

pub struct DirectClient {
    conn: Connection,
    bulk: Option<BulkState>,
}

impl DirectClient {
    pub fn new(endpoint: Endpoint, opts: ConnectionOptions) -> Self {
        Self {
            conn: Connection::new(endpoint, opts),
            bulk: None,
        }
    }

    /// Wrap an already-connected `Connection` (used by the Sentinel pool
    /// factories, which must validate a candidate's role before handing it
    /// to the pool).
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn, bulk: None }
    }

    pub fn connect(&mut self) -> Result<()> {
        self.conn.connect()
    }

    pub fn is_closed(&self) -> bool {
        self.conn.closed()
    }

    pub fn close(&mut self) {
        self.conn.close();
    }

    /// Execute one command. In bulk mode this only writes; a drain happens
    /// automatically once `batch_size` writes have queued.
    pub fn execute(&mut self, args: &[Arg]) -> Result<Option<RespValue>> {
        if let Some(bulk) = &mut self.bulk {
            self.conn.write(args)?;
            bulk.queued += 1;
            if bulk.queued == bulk.batch_size {
                let drained = drain(&mut self.conn, bulk.queued)?;
                bulk.queued = 0;
                if bulk.keep_results {
                    bulk.results.get_or_insert_with(Vec::new).extend(drained);
                }
            }
            return Ok(None);
        }
        self.conn.write(args)?;
        Ok(Some(self.conn.read()?))
    }

    /// Enter bulk mode. Re-entry without `bulk_stop` is a usage error.
    pub fn bulk_start(&mut self, batch_size: usize, keep_results: bool) -> Result<()> {
        if self.bulk.is_some() {
            return Err(RsedisError::Configuration(
                "bulk mode already active; call bulk_stop first".into(),
            ));
        }
        self.bulk = Some(BulkState::new(batch_size, keep_results));
        Ok(())
    }

    /// Drain any remaining queued replies and leave bulk mode, returning
    /// the accumulated results if `keep_results` was set.
    pub fn bulk_stop(&mut self) -> Result<Option<Vec<RespValue>>> {
        let Some(mut bulk) = self.bulk.take() else {
            return Err(RsedisError::Configuration("bulk mode is not active".into()));
        };
        if bulk.queued > 0 {
            let drained = drain(&mut self.conn, bulk.queued)?;
            if bulk.keep_results {
                bulk.results.get_or_insert_with(Vec::new).extend(drained);
            }
            bulk.queued = 0;
        }
        Ok(bulk.results)
    }
}

fn drain(conn: &mut Connection, count: usize) -> Result<Vec<RespValue>> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(conn.read_opts(false, true)?);
    }
    Ok(out)
}

impl PoolClient for DirectClient {
    fn is_closed(&self) -> bool {
        DirectClient::is_closed(self)
    }
    fn close(&mut self) {
        DirectClient::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn mock_server_with_responses(responses: &'static [&'static [u8]]) -> Endpoint {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                for r in responses {
                    let mut buf = [0u8; 1024];
                    if stream.read(&mut buf).unwrap_or(0) == 0 {
                        break;
                    }
                    if stream.write_all(r).is_err() {
                        break;
                    }
                }
            }
        });
        Endpoint::tcp(addr.ip().to_string(), addr.port())
    }

    fn opts() -> ConnectionOptions {
        ConnectionOptions {
            sentinel: true,
            ..Default::default()
        }
    }

    #[test]
    fn plain_execute_round_trip() {
        let endpoint = mock_server_with_responses(&[b"$5\r\nhello\r\n"]);
        let mut client = DirectClient::new(endpoint, opts());
        let result = client.execute(&[Arg::from("GET"), Arg::from("foo")]).unwrap();
        assert_eq!(
            result,
            Some(RespValue::BulkString(Some(bytes::Bytes::from_static(b"hello"))))
        );
    }

    #[test]
    fn bulk_mode_drains_in_batches() {
        let endpoint = mock_server_with_responses(&[b"+PONG\r\n", b"+PONG\r\n", b"+PONG\r\n"]);
        let mut client = DirectClient::new(endpoint, opts());
        client.bulk_start(3, true).unwrap();
        assert!(client.execute(&[Arg::from("PING")]).unwrap().is_none());
        assert!(client.execute(&[Arg::from("PING")]).unwrap().is_none());
        assert!(client.execute(&[Arg::from("PING")]).unwrap().is_none());

        let results = client.bulk_stop().unwrap().unwrap();
        assert_eq!(results.len(), 3);
        assert!(results
            .iter()
            .all(|r| *r == RespValue::SimpleString(bytes::Bytes::from_static(b"PONG"))));
    }

    #[test]
    fn bulk_stop_drains_remainder_below_batch_size() {
        let endpoint = mock_server_with_responses(&[b"+PONG\r\n", b"+PONG\r\n"]);
        let mut client = DirectClient::new(endpoint, opts());
        client.bulk_start(5, true).unwrap();
        client.execute(&[Arg::from("PING")]).unwrap();
        client.execute(&[Arg::from("PING")]).unwrap();
        let results = client.bulk_stop().unwrap().unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn bulk_mode_collects_errors_without_raising() {
        let endpoint = mock_server_with_responses(&[b"-ERR boom\r\n", b"+OK\r\n"]);
        let mut client = DirectClient::new(endpoint, opts());
        client.bulk_start(2, true).unwrap();
        client.execute(&[Arg::from("PING")]).unwrap();
        client.execute(&[Arg::from("PING")]).unwrap();
        let results = client.bulk_stop().unwrap().unwrap();
        assert_eq!(results[0], RespValue::Error("ERR boom".into()));
        assert_eq!(results[1], RespValue::SimpleString(bytes::Bytes::from_static(b"OK")));
    }

    #[test]
    fn re_entering_bulk_mode_is_a_usage_error() {
        let endpoint = mock_server_with_responses(&[]);
        let mut client = DirectClient::new(endpoint, opts());
        client.bulk_start(1, false).unwrap();
        assert!(matches!(
            client.bulk_start(1, false),
            Err(RsedisError::Configuration(_))
        ));
    }
}
