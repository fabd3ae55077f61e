//! Shared pipelining ("bulk") state (§3, §4.8).
//!
//! Carried per-Client: how many writes have been queued since the last
//! drain, the batch size that triggers an automatic drain, whether to
//! keep drained replies, and the accumulator itself.

use crate::resp::types::RespValue;

pub struct BulkState {
    pub batch_size: usize,
    pub queued: usize,
    pub keep_results: bool,
    pub results: Option<Vec<RespValue>>,
}

impl BulkState {
    pub fn new(batch_size: usize, keep_results: bool) -> Self {
        Self {
            batch_size,
            queued: 0,
            keep_results,
            results: if keep_results { Some(Vec::new()) } else { None },
        }
    }
}

/// Sharded variant's bulk state additionally tracks, in issue order, which
/// connection (by endpoint key) received each queued write, so replies can
/// be drained from the right socket in the right order (§4.8).
pub struct ShardedBulkState {
    pub batch_size: usize,
    pub queued: usize,
    pub keep_results: bool,
    pub results: Option<Vec<RespValue>>,
    pub write_order: Vec<String>,
}

impl ShardedBulkState {
    pub fn new(batch_size: usize, keep_results: bool) -> Self {
        Self {
            batch_size,
            queued: 0,
            keep_results,
            results: if keep_results { Some(Vec::new()) } else { None },
            write_order: Vec::new(),
        }
    }
}
