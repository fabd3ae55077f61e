//! Sentinel resolver and Sentinel-backed pool factories (§4.5).

use crate::command::Arg;
use crate::connection::socket::{Connection, ConnectionOptions};
use crate::endpoint::Endpoint;
use crate::error::{Result, RsedisError};
use crate::resp::types::RespValue;
use crate::topology::direct::DirectClient;
use crate::topology::pool::Pool;
use crate::topology::statichash::StaticHashClient;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;

/// A rotating ordered list of sentinel endpoints with at most one connected
/// sentinel at a time. Rotation always moves the current head to the back.
pub struct SentinelResolver {
    sentinels: Vec<Endpoint>,
    current: Option<Connection>,
    opts: ConnectionOptions,
}

impl SentinelResolver {
    pub fn new(sentinels: Vec<Endpoint>, mut opts: ConnectionOptions) -> Self {
        opts.sentinel = true;
        Self {
            sentinels,
            current: None,
            opts,
        }
    }

    pub fn rotate(&mut self) {
        if !self.sentinels.is_empty() {
            self.sentinels.rotate_left(1);
        }
        self.current = None;
    }

    fn ensure_current(&mut self) -> Result<()> {
        if self.current.is_some() {
            return Ok(());
        }
        let attempts = self.sentinels.len().max(1);
        let mut last_err = None;
        for _ in 0..attempts {
            let Some(endpoint) = self.sentinels.first().cloned() else {
                return Err(RsedisError::Connection(
                    "no sentinel endpoints configured".into(),
                ));
            };
            let mut conn = Connection::new(endpoint, self.opts.clone());
            let ping = conn.connect().and_then(|_| {
                conn.write(&[Arg::from("PING")])?;
                conn.read()
            });
            match ping {
                Ok(_) => {
                    self.current = Some(conn);
                    return Ok(());
                }
                Err(e) => {
                    last_err = Some(e);
                    self.rotate();
                }
            }
        }
        Err(last_err.unwrap_or_else(|| RsedisError::Connection("no sentinel reachable".into())))
    }

    fn query(&mut self, args: &[Arg]) -> Result<RespValue> {
        self.ensure_current()?;
        let conn = self.current.as_mut().expect("ensured");
        match conn.write(args).and_then(|_| conn.read()) {
            Ok(resp) => Ok(resp),
            Err(e) => {
                self.rotate();
                Err(e)
            }
        }
    }

    pub fn query_master(&mut self, name: &str) -> Result<Endpoint> {
        let resp = self.query(&[Arg::from("SENTINEL"), Arg::from("master"), Arg::from(name)])?;
        let kv = flat_kv(&resp)?;
        endpoint_from_kv(&kv)
    }

    pub fn query_slaves(&mut self, name: &str) -> Result<Vec<Endpoint>> {
        let resp = self.query(&[Arg::from("SENTINEL"), Arg::from("slaves"), Arg::from(name)])?;
        let rows = resp
            .into_array()
            .ok_or_else(|| RsedisError::Protocol("SENTINEL slaves: expected an array".into()))?;
        rows.iter().map(|row| flat_kv(row).and_then(|kv| endpoint_from_kv(&kv))).collect()
    }

    /// `SENTINEL masters` — every monitored master this sentinel knows
    /// about, not just the one named by `query_master`.
    pub fn query_masters(&mut self) -> Result<Vec<Endpoint>> {
        let resp = self.query(&[Arg::from("SENTINEL"), Arg::from("masters")])?;
        let rows = resp
            .into_array()
            .ok_or_else(|| RsedisError::Protocol("SENTINEL masters: expected an array".into()))?;
        rows.iter().map(|row| flat_kv(row).and_then(|kv| endpoint_from_kv(&kv))).collect()
    }
}

fn flat_kv(resp: &RespValue) -> Result<HashMap<String, String>> {
    let items = resp
        .clone()
        .into_array()
        .ok_or_else(|| RsedisError::Protocol("expected a flat key/value array".into()))?;
    let mut map = HashMap::new();
    let mut iter = items.into_iter();
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        let (Some(k), Some(v)) = (k.as_str(), v.as_str()) else {
            continue;
        };
        map.insert(k.to_string(), v.to_string());
    }
    Ok(map)
}

fn endpoint_from_kv(kv: &HashMap<String, String>) -> Result<Endpoint> {
    let ip = kv
        .get("ip")
        .ok_or_else(|| RsedisError::Protocol("sentinel reply missing ip".into()))?;
    let port: u16 = kv
        .get("port")
        .ok_or_else(|| RsedisError::Protocol("sentinel reply missing port".into()))?
        .parse()
        .map_err(|_| RsedisError::Protocol("sentinel reply has a non-numeric port".into()))?;
    Ok(Endpoint::tcp(ip.clone(), port))
}

fn verify_role(endpoint: &Endpoint, opts: &ConnectionOptions, want: &str) -> Result<Connection> {
    let mut conn = Connection::new(endpoint.clone(), opts.clone());
    conn.connect()?;
    conn.write(&[Arg::from("INFO"), Arg::from("replication")])?;
    let resp = conn.read()?;
    let text = resp.as_str().unwrap_or_default();
    if text.contains(&format!("role:{want}")) {
        Ok(conn)
    } else {
        conn.close();
        Err(RsedisError::Connection(format!(
            "{endpoint} does not report role:{want}"
        )))
    }
}

/// Build the `_connect` factory for a master-mode Sentinel pool (§4.5).
pub fn master_factory(
    resolver: Arc<Mutex<SentinelResolver>>,
    name: String,
    service_opts: ConnectionOptions,
    retries: u32,
) -> Box<dyn Fn() -> Result<DirectClient> + Send + Sync> {
    Box::new(move || {
        let mut last_err = None;
        for _ in 0..retries.max(1) {
            let endpoint = match resolver.lock().query_master(&name) {
                Ok(ep) => ep,
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            };
            match verify_role(&endpoint, &service_opts, "master") {
                Ok(conn) => return Ok(DirectClient::from_connection(conn)),
                Err(e) => {
                    tracing::debug!(%endpoint, "sentinel master candidate failed verification, rotating");
                    resolver.lock().rotate();
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| RsedisError::Connection("sentinel master resolution failed".into())))
    })
}

/// Build the `_connect` factory for a replica-mode Sentinel pool (§4.5).
pub fn replica_factory(
    resolver: Arc<Mutex<SentinelResolver>>,
    name: String,
    service_opts: ConnectionOptions,
    retries: u32,
) -> Box<dyn Fn() -> Result<DirectClient> + Send + Sync> {
    Box::new(move || {
        let mut last_err = None;
        for _ in 0..retries.max(1) {
            let mut slaves = match resolver.lock().query_slaves(&name) {
                Ok(s) => s,
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            };
            if slaves.is_empty() {
                last_err = Some(RsedisError::Connection(format!(
                    "sentinel reports no slaves for {name}"
                )));
                resolver.lock().rotate();
                continue;
            }
            slaves.shuffle(&mut rand::thread_rng());
            let endpoint = slaves.remove(0);
            match verify_role(&endpoint, &service_opts, "slave") {
                Ok(conn) => return Ok(DirectClient::from_connection(conn)),
                Err(e) => {
                    tracing::debug!(%endpoint, "sentinel replica candidate failed verification, rotating");
                    resolver.lock().rotate();
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| RsedisError::Connection("sentinel replica resolution failed".into())))
    })
}

/// Convenience constructor for a Sentinel-backed master pool (§4.5,
/// "Sentinel-backed pools set `close_on_err=true`").
pub fn master_pool(
    sentinels: Vec<Endpoint>,
    name: String,
    sentinel_opts: ConnectionOptions,
    service_opts: ConnectionOptions,
    pool_size: usize,
    retries: u32,
) -> Pool<DirectClient> {
    let resolver = Arc::new(Mutex::new(SentinelResolver::new(sentinels, sentinel_opts)));
    Pool::new(pool_size, true, master_factory(resolver, name, service_opts, retries))
}

/// Convenience constructor for a Sentinel-backed replica pool.
pub fn replica_pool(
    sentinels: Vec<Endpoint>,
    name: String,
    sentinel_opts: ConnectionOptions,
    service_opts: ConnectionOptions,
    pool_size: usize,
    retries: u32,
) -> Pool<DirectClient> {
    let resolver = Arc::new(Mutex::new(SentinelResolver::new(sentinels, sentinel_opts)));
    Pool::new(pool_size, true, replica_factory(resolver, name, service_opts, retries))
}

/// Build a `StaticHashClient` over a list of Sentinel-managed service names
/// (§4.5 "SentinelHashPool"): each name is resolved once (master or replica,
/// per `prefer_replica`), in the caller's bucket order.
pub fn resolve_hash_buckets(
    sentinels: Vec<Endpoint>,
    names: &[String],
    sentinel_opts: ConnectionOptions,
    prefer_replica: bool,
) -> Result<Vec<Endpoint>> {
    let mut resolver = SentinelResolver::new(sentinels, sentinel_opts);
    names
        .iter()
        .map(|name| {
            if prefer_replica {
                let mut slaves = resolver.query_slaves(name)?;
                slaves.shuffle(&mut rand::thread_rng());
                slaves.into_iter().next().ok_or_else(|| {
                    RsedisError::Connection(format!("sentinel reports no slaves for {name}"))
                })
            } else {
                resolver.query_master(name)
            }
        })
        .collect()
}

pub fn sentinel_static_hash_client(
    sentinels: Vec<Endpoint>,
    names: &[String],
    sentinel_opts: ConnectionOptions,
    service_opts: ConnectionOptions,
    prefer_replica: bool,
) -> Result<StaticHashClient> {
    let buckets = resolve_hash_buckets(sentinels, names, sentinel_opts, prefer_replica)?;
    StaticHashClient::new(buckets, service_opts)
}
