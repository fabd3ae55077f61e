//! URL-to-pool factory (§2 item 8, §6 "URL factory").
//!
//! Turns a parsed `ConnectionConfig`/raw URL into the pool or client the
//! scheme names: `redis://` a direct pool, `cluster://` a cluster pool,
//! `sentinel://` a Sentinel-backed pool (master or replica, by `slave_ok`),
//! `pubsub://` a bare subscribe client (§4.9 has no pooled variant).

use crate::config::{ConnectionConfig, Topology};
use crate::error::{Result, RsedisError};
use crate::topology::cluster::{ClusterClient, ClusterMap};
use crate::topology::direct::DirectClient;
use crate::topology::pool::Pool;
use crate::topology::pubsub::PubSubClient;
use crate::topology::sentinel;

use std::sync::Arc;

/// Whatever a URL resolved to: a pool for the connection-oriented
/// topologies, or a bare client for pub/sub.
pub enum PoolHandle {
    Direct(Pool<DirectClient>),
    Cluster(Pool<ClusterClient>),
    Sentinel(Pool<DirectClient>),
    PubSub(PubSubClient),
}

/// Parse `url` and build the pool/client its scheme names.
pub fn pool_from_url(url: &str) -> Result<PoolHandle> {
    pool_from_config(&ConnectionConfig::from_url(url)?)
}

/// Build the pool/client a parsed config names (§6 "URL factory").
pub fn pool_from_config(cfg: &ConnectionConfig) -> Result<PoolHandle> {
    let opts = cfg.connection_options();

    match &cfg.topology {
        Topology::Standalone { endpoint } => {
            let endpoint = endpoint.clone();
            Ok(PoolHandle::Direct(Pool::new(
                cfg.pool_size,
                false,
                Box::new(move || Ok(DirectClient::new(endpoint.clone(), opts.clone()))),
            )))
        }
        Topology::Cluster { seeds } => {
            let map = Arc::new(ClusterMap::new(seeds.clone(), opts.clone()));
            Ok(PoolHandle::Cluster(Pool::new(
                cfg.pool_size,
                false,
                Box::new(move || Ok(ClusterClient::new(map.clone(), opts.clone()))),
            )))
        }
        Topology::Sentinel { sentinels, name } => {
            let name = name.clone().ok_or_else(|| {
                RsedisError::Configuration(
                    "sentinel:// URL requires a ?name=<master> query key".into(),
                )
            })?;
            let sentinel_opts = crate::connection::socket::ConnectionOptions {
                sentinel: true,
                ..opts.clone()
            };
            let pool = if cfg.slave_ok {
                sentinel::replica_pool(
                    sentinels.clone(),
                    name,
                    sentinel_opts,
                    opts,
                    cfg.pool_size,
                    cfg.retries,
                )
            } else {
                sentinel::master_pool(
                    sentinels.clone(),
                    name,
                    sentinel_opts,
                    opts,
                    cfg.pool_size,
                    cfg.retries,
                )
            };
            Ok(PoolHandle::Sentinel(pool))
        }
        Topology::PubSub { endpoint } => {
            Ok(PoolHandle::PubSub(PubSubClient::new(endpoint.clone(), opts)))
        }
    }
}
