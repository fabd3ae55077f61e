//! Publish/Subscribe client (§4.9).
//!
//! A thin wrapper: `write` sends a subscribe-family command with no
//! synchronous reply expected, `get` reads the next pushed message. Reads
//! use `close_on_timeout=false` so an idle subscription survives a read
//! timeout instead of being torn down.

use crate::command::Arg;
use crate::connection::socket::{Connection, ConnectionOptions};
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::resp::types::RespValue;
use crate::topology::PoolClient;

pub struct PubSubClient {
    conn: Connection,
}

impl PubSubClient {
    pub fn new(endpoint: Endpoint, opts: ConnectionOptions) -> Self {
        Self {
            conn: Connection::new(endpoint, opts),
        }
    }

    pub fn write(&mut self, args: &[Arg]) -> Result<()> {
        self.conn.write(args)
    }

    /// Read the next pushed message. Does not close the connection on a
    /// read timeout, since an idle subscription is expected to sit quiet.
    pub fn get(&mut self) -> Result<RespValue> {
        self.conn.read_opts(true, false)
    }

    pub fn close(&mut self) {
        self.conn.close();
    }

    pub fn is_closed(&self) -> bool {
        self.conn.closed()
    }
}

impl PoolClient for PubSubClient {
    fn is_closed(&self) -> bool {
        PubSubClient::is_closed(self)
    }
    fn close(&mut self) {
        PubSubClient::close(self)
    }
}
