pub mod pool;
pub mod socket;

pub use pool::{Pool, PoolGuard};
pub use socket::{Connection, ConnectionOptions};
