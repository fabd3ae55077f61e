//! Blocking connection pool.
//!
//! A bounded free/used set over a single endpoint. `acquire` never blocks:
//! if the free set is empty and the pool is already at capacity, it raises
//! immediately rather than waiting for a connection to be returned (the
//! source pool has no queueing — a caller that wants to wait retries itself).
//!
//! `close_on_err` governs what happens to the free set when a checked-out
//! connection comes back having errored: Sentinel-backed pools set this so
//! that a stale master triggers a full reconnect of every idle connection,
//! not just the one that noticed.

use crate::connection::socket::{Connection, ConnectionOptions};
use crate::endpoint::Endpoint;
use crate::error::{Result, RsedisError};

use parking_lot::Mutex;

struct PoolState {
    free: Vec<Connection>,
    used: usize,
}

pub struct Pool {
    endpoint: Endpoint,
    opts: ConnectionOptions,
    size: usize,
    close_on_err: bool,
    state: Mutex<PoolState>,
}

impl Pool {
    pub fn new(endpoint: Endpoint, opts: ConnectionOptions, size: usize, close_on_err: bool) -> Self {
        Self {
            endpoint,
            opts,
            size,
            close_on_err,
            state: Mutex::new(PoolState {
                free: Vec::with_capacity(size),
                used: 0,
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn free_count(&self) -> usize {
        self.state.lock().free.len()
    }

    pub fn used_count(&self) -> usize {
        self.state.lock().used
    }

    /// Hand out a connection. Reuses an idle one if available, opens a new
    /// one if the pool has headroom, otherwise raises immediately — the
    /// pool never queues a waiting caller.
    pub fn acquire(&self) -> Result<PoolGuard<'_>> {
        let mut state = self.state.lock();
        if let Some(conn) = state.free.pop() {
            state.used += 1;
            return Ok(PoolGuard {
                conn: Some(conn),
                pool: self,
                errored: false,
            });
        }
        if state.used >= self.size {
            return Err(RsedisError::Connection(format!(
                "pool exhausted: {} connections already in use",
                self.size
            )));
        }
        state.used += 1;
        drop(state);
        let conn = Connection::new(self.endpoint.clone(), self.opts.clone());
        Ok(PoolGuard {
            conn: Some(conn),
            pool: self,
            errored: false,
        })
    }

    fn release(&self, conn: Connection, errored: bool) {
        let mut state = self.state.lock();
        state.used = state.used.saturating_sub(1);
        if errored && self.close_on_err {
            state.free.clear();
            return;
        }
        if !conn.closed() {
            state.free.push(conn);
        }
    }
}

/// RAII checkout: returns the connection to the pool on drop, unless it was
/// taken out or left in a closed/errored state that `close_on_err` should
/// propagate.
pub struct PoolGuard<'a> {
    conn: Option<Connection>,
    pool: &'a Pool,
    errored: bool,
}

impl<'a> PoolGuard<'a> {
    pub fn conn(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection already taken")
    }

    /// Flag this checkout as having seen an application-level error, even
    /// though the underlying socket may still be open (e.g. a role
    /// mismatch discovered after the fact).
    pub fn mark_errored(&mut self) {
        self.errored = true;
    }

    /// Remove the connection from the pool entirely; it will not be
    /// returned to the free set on drop.
    pub fn take(mut self) -> Connection {
        self.conn.take().expect("connection already taken")
    }
}

impl Drop for PoolGuard<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let errored = self.errored || conn.closed();
            self.pool.release(conn, errored);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Arg;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn mock_server_echo_reply(reply: &'static [u8]) -> Endpoint {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                thread::spawn(move || loop {
                    let mut buf = [0u8; 1024];
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            if stream.write_all(reply).is_err() {
                                break;
                            }
                        }
                    }
                });
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
    fn acquire_and_release_reuses_connection() {
        let endpoint = mock_server_echo_reply(b"+PONG\r\n");
        let pool = Pool::new(endpoint, opts(), 2, false);

        {
            let mut guard = pool.acquire().unwrap();
            guard.conn().write(&[Arg::from("PING")]).unwrap();
            guard.conn().read().unwrap();
        }
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.used_count(), 0);

        let _guard = pool.acquire().unwrap();
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.used_count(), 1);
    }

    #[test]
    fn exhaustion_raises_immediately() {
        let endpoint = mock_server_echo_reply(b"+PONG\r\n");
        let pool = Pool::new(endpoint, opts(), 1, false);

        let _g1 = pool.acquire().unwrap();
        let err = pool.acquire().unwrap_err();
        assert!(matches!(err, RsedisError::Connection(_)));
    }

    #[test]
    fn take_removes_connection_from_pool() {
        let endpoint = mock_server_echo_reply(b"+PONG\r\n");
        let pool = Pool::new(endpoint, opts(), 2, false);

        let guard = pool.acquire().unwrap();
        let _conn = guard.take();
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.used_count(), 0);
    }

    #[test]
    fn close_on_err_clears_entire_free_set() {
        let endpoint = mock_server_echo_reply(b"+PONG\r\n");
        let pool = Pool::new(endpoint, opts(), 3, true);

        {
            let mut guard = pool.acquire().unwrap();
            guard.conn().write(&[Arg::from("PING")]).unwrap();
            guard.conn().read().unwrap();
        }
        assert_eq!(pool.free_count(), 1);

        {
            let mut guard = pool.acquire().unwrap();
            guard.conn().write(&[Arg::from("PING")]).unwrap();
            guard.conn().read().unwrap();
            guard.mark_errored();
        }
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn without_close_on_err_only_the_errored_connection_is_dropped() {
        let endpoint = mock_server_echo_reply(b"+PONG\r\n");
        let pool = Pool::new(endpoint, opts(), 3, false);

        {
            let mut guard = pool.acquire().unwrap();
            guard.conn().write(&[Arg::from("PING")]).unwrap();
            guard.conn().read().unwrap();
        }
        {
            let mut guard = pool.acquire().unwrap();
            guard.conn().write(&[Arg::from("PING")]).unwrap();
            guard.conn().read().unwrap();
            guard.mark_errored();
        }
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn connect_failure_surfaces_from_acquire_and_frees_the_slot() {
        let pool = Pool::new(Endpoint::tcp("127.0.0.1", 1), opts(), 1, false);
        let mut guard = pool.acquire().unwrap();
        let err = guard.conn().write(&[Arg::from("PING")]).unwrap_err();
        assert!(matches!(err, RsedisError::Connection(_)));
        drop(guard);
        assert_eq!(pool.used_count(), 0);
        assert_eq!(pool.free_count(), 0);
    }
}
