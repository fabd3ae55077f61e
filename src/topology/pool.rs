//! Generic bounded pool over any `PoolClient` (§4.7).
//!
//! Same free/used/close_on_err skeleton as `connection::pool::Pool`, but
//! parameterized over the client type a topology hands out, constructed
//! from a factory closure instead of a fixed endpoint — this is the
//! `BasePool` with `_connect` overridden per flavor.

use crate::error::{Result, RsedisError};
use crate::topology::PoolClient;

use parking_lot::Mutex;

type Factory<C> = Box<dyn Fn() -> Result<C> + Send + Sync>;

struct PoolState<C> {
    free: Vec<C>,
    used: usize,
    size: usize,
}

pub struct Pool<C: PoolClient> {
    factory: Factory<C>,
    close_on_err: bool,
    state: Mutex<PoolState<C>>,
}

impl<C: PoolClient> Pool<C> {
    pub fn new(size: usize, close_on_err: bool, factory: Factory<C>) -> Self {
        Self {
            factory,
            close_on_err,
            state: Mutex::new(PoolState {
                free: Vec::with_capacity(size),
                used: 0,
                size,
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.state.lock().size
    }

    pub fn free_count(&self) -> usize {
        self.state.lock().free.len()
    }

    pub fn used_count(&self) -> usize {
        self.state.lock().used
    }

    /// Shrink or grow the pool's capacity, closing idle clients over the
    /// new size immediately; active clients are closed on their next
    /// release rather than interrupted mid-use.
    pub fn set_size(&self, new_size: usize) {
        let mut state = self.state.lock();
        while state.free.len() + state.used > new_size && !state.free.is_empty() {
            if let Some(mut c) = state.free.pop() {
                c.close();
            }
        }
        state.size = new_size;
    }

    pub fn acquire(&self) -> Result<PoolGuard<'_, C>> {
        let mut state = self.state.lock();
        if let Some(client) = state.free.pop() {
            state.used += 1;
            return Ok(PoolGuard {
                client: Some(client),
                pool: self,
            });
        }
        if state.used >= state.size {
            return Err(RsedisError::Connection(format!(
                "pool exhausted: {} clients already in use",
                state.size
            )));
        }
        state.used += 1;
        drop(state);
        match (self.factory)() {
            Ok(client) => Ok(PoolGuard {
                client: Some(client),
                pool: self,
            }),
            Err(e) => {
                self.state.lock().used -= 1;
                Err(e)
            }
        }
    }

    fn release(&self, mut client: C) {
        let mut state = self.state.lock();
        state.used = state.used.saturating_sub(1);
        if client.is_closed() && self.close_on_err {
            for mut c in state.free.drain(..) {
                c.close();
            }
            return;
        }
        if client.is_closed() {
            return;
        }
        if state.free.len() + state.used < state.size {
            state.free.push(client);
        } else {
            client.close();
        }
    }
}

pub struct PoolGuard<'a, C: PoolClient> {
    client: Option<C>,
    pool: &'a Pool<C>,
}

impl<'a, C: PoolClient> PoolGuard<'a, C> {
    pub fn client(&mut self) -> &mut C {
        self.client.as_mut().expect("client already taken")
    }

    pub fn take(mut self) -> C {
        self.client.take().expect("client already taken")
    }
}

impl<C: PoolClient> Drop for PoolGuard<'_, C> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.release(client);
        }
    }
}
