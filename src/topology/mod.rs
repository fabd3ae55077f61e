//! Topology resolvers and the Clients/Pools built on top of them.
//!
//! A "Client" here is whatever a Pool hands out on `acquire`: a direct
//! single-connection client, a cluster client owning a connection cache
//! and slot map, or a static-hash client owning one connection per bucket.
//! `Pool` only needs to know how to make one and whether it is still good.

pub mod bulk;
pub mod cluster;
pub mod direct;
pub mod factory;
pub mod pool;
pub mod pubsub;
pub mod sentinel;
pub mod statichash;

pub use cluster::{ClusterClient, ClusterMap};
pub use direct::DirectClient;
pub use factory::{pool_from_config, pool_from_url, PoolHandle};
pub use pool::Pool;
pub use pubsub::PubSubClient;
pub use sentinel::SentinelResolver;
pub use statichash::StaticHashClient;

/// Capability a `Pool` needs from whatever it pools: liveness and the
/// ability to be torn down cleanly on `close_on_err`.
pub trait PoolClient: Send {
    fn is_closed(&self) -> bool;
    fn close(&mut self);
}
