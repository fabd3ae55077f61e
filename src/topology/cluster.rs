//! Cluster slot map and Cluster client (§4.3, §4.4).

use crate::command::Arg;
use crate::connection::socket::{Connection, ConnectionOptions};
use crate::crc16::hash_slot;
use crate::endpoint::Endpoint;
use crate::error::{ReplyKind, Result, RsedisError};
use crate::resp::types::RespValue;
use crate::topology::PoolClient;

use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const DEFAULT_RETRIES: u32 = 3;

#[derive(Clone)]
struct SlotEntry {
    master: Endpoint,
    replica: Option<Endpoint>,
}

#[derive(Default)]
struct SlotTable {
    slots: Vec<Option<SlotEntry>>,
}

impl SlotTable {
    fn empty() -> Self {
        Self {
            slots: vec![None; crate::crc16::SLOT_COUNT as usize],
        }
    }

    fn lookup(&self, slot: u16) -> Option<SlotEntry> {
        self.slots.get(slot as usize).and_then(|e| e.clone())
    }

    /// All distinct endpoint keys currently present in the table.
    fn host_keys(&self) -> std::collections::HashSet<String> {
        let mut set = std::collections::HashSet::new();
        for entry in self.slots.iter().flatten() {
            set.insert(entry.master.key());
            if let Some(r) = &entry.replica {
                set.insert(r.key());
            }
        }
        set
    }

    fn from_cluster_slots(resp: &RespValue) -> Result<Self> {
        let ranges = resp.clone().into_array().ok_or_else(|| {
            RsedisError::Protocol("CLUSTER SLOTS: expected an array reply".into())
        })?;

        let mut table = Self::empty();
        for range in ranges {
            let items = range.into_array().ok_or_else(|| {
                RsedisError::Protocol("CLUSTER SLOTS: expected a range array".into())
            })?;
            if items.len() < 3 {
                continue;
            }
            let start = items[0]
                .as_int()
                .ok_or_else(|| RsedisError::Protocol("CLUSTER SLOTS: bad start".into()))?
                as u16;
            let end = items[1]
                .as_int()
                .ok_or_else(|| RsedisError::Protocol("CLUSTER SLOTS: bad end".into()))?
                as u16;
            let master = parse_node(&items[2])?;

            let mut replicas = Vec::new();
            for node in &items[3..] {
                replicas.push(parse_node(node)?);
            }
            let mut rng = rand::thread_rng();
            let replica = replicas.choose(&mut rng).cloned();

            for slot in start..=end {
                table.slots[slot as usize] = Some(SlotEntry {
                    master: master.clone(),
                    replica: replica.clone(),
                });
            }
        }
        Ok(table)
    }
}

fn parse_node(val: &RespValue) -> Result<Endpoint> {
    let items = val
        .clone()
        .into_array()
        .ok_or_else(|| RsedisError::Protocol("CLUSTER SLOTS: expected node array".into()))?;
    if items.len() < 2 {
        return Err(RsedisError::Protocol(
            "CLUSTER SLOTS: node array too short".into(),
        ));
    }
    let host = items[0]
        .as_str()
        .ok_or_else(|| RsedisError::Protocol("CLUSTER SLOTS: bad host".into()))?
        .to_string();
    let port = items[1]
        .as_int()
        .ok_or_else(|| RsedisError::Protocol("CLUSTER SLOTS: bad port".into()))? as u16;
    Ok(Endpoint::tcp(host, port))
}

/// Shared, refreshable slot table (§4.3). Cheap to clone via `Arc`; the
/// compare-and-refresh idiom collapses concurrent MOVED-triggered
/// refreshes into a single upstream round.
pub struct ClusterMap {
    seeds: Vec<Endpoint>,
    opts: ConnectionOptions,
    table: RwLock<SlotTable>,
    generation: AtomicU64,
    refresh_lock: Mutex<()>,
}

impl ClusterMap {
    pub fn new(seeds: Vec<Endpoint>, opts: ConnectionOptions) -> Self {
        Self {
            seeds,
            opts,
            table: RwLock::new(SlotTable::empty()),
            generation: AtomicU64::new(0),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn lookup(&self, slot: u16) -> Option<SlotEntry> {
        self.table.read().lookup(slot)
    }

    fn host_keys(&self) -> std::collections::HashSet<String> {
        self.table.read().host_keys()
    }

    /// Refresh from the seed nodes unless `last_seen_id` is already stale
    /// relative to the current generation (someone else refreshed first).
    pub fn refresh(&self, last_seen_id: u64) -> Result<u64> {
        let _guard = self.refresh_lock.lock();
        let current = self.generation();
        if last_seen_id != current {
            return Ok(current);
        }

        let new_table = self.fetch_from_seeds()?;
        *self.table.write() = new_table;
        let new_id = current + 1;
        self.generation.store(new_id, Ordering::SeqCst);
        tracing::debug!(generation = new_id, "cluster slot map refreshed");
        Ok(new_id)
    }

    fn fetch_from_seeds(&self) -> Result<SlotTable> {
        let mut last_err = None;
        for seed in &self.seeds {
            match self.fetch_from(seed) {
                Ok(table) => return Ok(table),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            RsedisError::Connection("no cluster seed node responded to CLUSTER SLOTS".into())
        }))
    }

    fn fetch_from(&self, seed: &Endpoint) -> Result<SlotTable> {
        let mut refresh_opts = self.opts.clone();
        refresh_opts.sentinel = true;
        let mut conn = Connection::new(seed.clone(), refresh_opts);
        conn.connect()?;

        if let Some(password) = self.opts.password.clone() {
            let mut args = vec![Arg::from("AUTH")];
            if let Some(username) = self.opts.username.clone() {
                args.push(Arg::from(username));
            }
            args.push(Arg::from(password));
            conn.write(&args)?;
            conn.read()?;
        }

        conn.write(&[Arg::from("CLUSTER"), Arg::from("SLOTS")])?;
        let resp = conn.read()?;
        SlotTable::from_cluster_slots(&resp)
    }
}

/// Which endpoint class the caller wants a given command routed to.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    Master,
    Replica,
}

/// Exactly one of these selects the target for a call to `execute` (§4.4).
pub enum Target {
    ShardKey(Vec<u8>),
    Endpoint(Endpoint),
}

/// Owns a connection cache and a handle to a (possibly shared) slot map.
pub struct ClusterClient {
    map: Arc<ClusterMap>,
    last_seen_generation: u64,
    conns: HashMap<String, Connection>,
    opts: ConnectionOptions,
    /// Set once any node connection has errored out or `close()` was
    /// called — a session-level failure flag, the same close-on-err
    /// signal `StaticHashClient` tracks per whole client.
    closed: bool,
}

impl ClusterClient {
    pub fn new(map: Arc<ClusterMap>, opts: ConnectionOptions) -> Self {
        let last_seen_generation = map.generation();
        Self {
            map,
            last_seen_generation,
            conns: HashMap::new(),
            opts,
            closed: false,
        }
    }

    pub fn execute(
        &mut self,
        args: &[Arg],
        target: Target,
        preference: Preference,
    ) -> Result<RespValue> {
        self.execute_inner(args, target, preference, false, DEFAULT_RETRIES)
    }

    fn adopt_generation_if_stale(&mut self) {
        let current = self.map.generation();
        if current != self.last_seen_generation {
            let live = self.map.host_keys();
            self.conns.retain(|key, _| live.contains(key));
            self.last_seen_generation = current;
        }
    }

    fn execute_inner(
        &mut self,
        args: &[Arg],
        target: Target,
        preference: Preference,
        asking: bool,
        retries: u32,
    ) -> Result<RespValue> {
        self.adopt_generation_if_stale();

        let endpoint = match &target {
            Target::Endpoint(ep) => ep.clone(),
            Target::ShardKey(key) => {
                let slot = hash_slot(key);
                let entry = match self.map.lookup(slot) {
                    Some(e) => e,
                    None => {
                        let new_id = self.map.refresh(self.last_seen_generation)?;
                        self.last_seen_generation = new_id;
                        self.map.lookup(slot).ok_or_else(|| {
                            RsedisError::Connection(format!("no cluster node owns slot {slot}"))
                        })?
                    }
                };
                match preference {
                    Preference::Replica => entry.replica.unwrap_or(entry.master),
                    Preference::Master => entry.master,
                }
            }
        };

        let key = endpoint.key();
        let result = self.send(&key, &endpoint, args, asking);

        match result {
            Ok(resp) => Ok(resp),
            Err(e) => {
                if let Some(kind) = e.reply_kind() {
                    return self.handle_redirect(kind, args, target, preference, retries);
                }
                if e.is_connection_kind() {
                    self.conns.remove(&key);
                    self.closed = true;
                    let _ = self.map.refresh(self.last_seen_generation);
                }
                Err(e)
            }
        }
    }

    fn handle_redirect(
        &mut self,
        kind: ReplyKind,
        args: &[Arg],
        target: Target,
        preference: Preference,
        retries: u32,
    ) -> Result<RespValue> {
        match kind {
            ReplyKind::Moved(redirect) => {
                if !matches!(target, Target::ShardKey(_)) {
                    return Err(RsedisError::reply(format!(
                        "MOVED {} {}",
                        redirect.slot, redirect.addr
                    )));
                }
                if retries <= 1 {
                    return Err(RsedisError::Connection("slot moved too often".into()));
                }
                tracing::debug!(slot = redirect.slot, addr = %redirect.addr, "MOVED redirect");
                let new_id = self.map.refresh(self.last_seen_generation)?;
                self.last_seen_generation = new_id;
                self.execute_inner(args, target, preference, false, retries - 1)
            }
            ReplyKind::Ask(redirect) => {
                if retries <= 1 {
                    return Err(RsedisError::Connection("slot moved too often".into()));
                }
                tracing::debug!(slot = redirect.slot, addr = %redirect.addr, "ASK redirect");
                let new_endpoint = Endpoint::from_wire_addr(&redirect.addr).ok_or_else(|| {
                    RsedisError::Protocol(format!("malformed ASK target {}", redirect.addr))
                })?;
                self.execute_inner(
                    args,
                    Target::Endpoint(new_endpoint),
                    preference,
                    true,
                    retries - 1,
                )
            }
            ReplyKind::Other => unreachable!("classified as redirect by caller"),
        }
    }

    fn send(&mut self, key: &str, endpoint: &Endpoint, args: &[Arg], asking: bool) -> Result<RespValue> {
        if !self.conns.contains_key(key) {
            self.conns.insert(
                key.to_string(),
                Connection::new(endpoint.clone(), self.opts.clone()),
            );
        }
        let conn = self.conns.get_mut(key).expect("just inserted");
        if asking {
            conn.write(&[Arg::from("ASKING")])?;
            conn.read()?;
        }
        conn.write(args)?;
        conn.read()
    }
}

impl PoolClient for ClusterClient {
    fn is_closed(&self) -> bool {
        self.closed
    }
    fn close(&mut self) {
        for conn in self.conns.values_mut() {
            conn.close();
        }
        self.conns.clear();
        self.closed = true;
    }
}
