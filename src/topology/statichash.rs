//! Static client-side hashing client (§4.6).
//!
//! The slot→bucket mapping is fixed at construction and purely positional:
//! slot *s* always goes to bucket *s mod B*. Every participant must be built
//! with the same bucket order, and changing the bucket count invalidates
//! the mapping for existing data.

use crate::command::Arg;
use crate::connection::socket::{Connection, ConnectionOptions};
use crate::crc16::{hash_slot, SLOT_COUNT};
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::resp::types::RespValue;
use crate::topology::bulk::ShardedBulkState;
use crate::topology::PoolClient;

pub struct StaticHashClient {
    buckets: Vec<Connection>,
    slot_to_bucket: Vec<usize>,
    bulk: Option<ShardedBulkState>,
    closed: bool,
}

impl StaticHashClient {
    /// Open one connection per bucket eagerly and build the round-robin
    /// slot table.
    pub fn new(bucket_endpoints: Vec<Endpoint>, opts: ConnectionOptions) -> Result<Self> {
        let bucket_count = bucket_endpoints.len().max(1);
        let mut buckets = Vec::with_capacity(bucket_endpoints.len());
        for endpoint in bucket_endpoints {
            let mut conn = Connection::new(endpoint, opts.clone());
            conn.connect()?;
            buckets.push(conn);
        }
        let slot_to_bucket = (0..SLOT_COUNT as usize)
            .map(|slot| slot % bucket_count)
            .collect();
        Ok(Self {
            buckets,
            slot_to_bucket,
            bulk: None,
            closed: false,
        })
    }

    fn bucket_for(&self, shard_key: &[u8]) -> usize {
        let slot = hash_slot(shard_key) as usize;
        self.slot_to_bucket[slot]
    }

    /// A connection error anywhere closes the whole client: buckets are
    /// not independent once pipelining has interleaved writes across them.
    pub fn execute(&mut self, args: &[Arg], shard_key: &[u8]) -> Result<Option<RespValue>> {
        let bucket = self.bucket_for(shard_key);

        if let Some(bulk) = &mut self.bulk {
            let result = self.buckets[bucket].write(args);
            if let Err(e) = result {
                self.closed = true;
                return Err(e);
            }
            bulk.write_order.push(bucket.to_string());
            bulk.queued += 1;
            if bulk.queued == bulk.batch_size {
                let drained = drain(&mut self.buckets, &bulk.write_order)?;
                bulk.queued = 0;
                bulk.write_order.clear();
                if bulk.keep_results {
                    bulk.results.get_or_insert_with(Vec::new).extend(drained);
                }
            }
            return Ok(None);
        }

        let conn = &mut self.buckets[bucket];
        if let Err(e) = conn.write(args) {
            self.closed = true;
            return Err(e);
        }
        match conn.read() {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                self.closed = true;
                Err(e)
            }
        }
    }

    pub fn bulk_start(&mut self, batch_size: usize, keep_results: bool) -> Result<()> {
        if self.bulk.is_some() {
            return Err(crate::error::RsedisError::Configuration(
                "bulk mode already active; call bulk_stop first".into(),
            ));
        }
        self.bulk = Some(ShardedBulkState::new(batch_size, keep_results));
        Ok(())
    }

    pub fn bulk_stop(&mut self) -> Result<Option<Vec<RespValue>>> {
        let Some(mut bulk) = self.bulk.take() else {
            return Err(crate::error::RsedisError::Configuration(
                "bulk mode is not active".into(),
            ));
        };
        if bulk.queued > 0 {
            let drained = drain(&mut self.buckets, &bulk.write_order)?;
            if bulk.keep_results {
                bulk.results.get_or_insert_with(Vec::new).extend(drained);
            }
            bulk.queued = 0;
            bulk.write_order.clear();
        }
        Ok(bulk.results)
    }

    pub fn close(&mut self) {
        for conn in &mut self.buckets {
            conn.close();
        }
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Drain replies strictly in issue order, reading from whichever bucket
/// connection received each queued write.
fn drain(buckets: &mut [Connection], write_order: &[String]) -> Result<Vec<RespValue>> {
    let mut out = Vec::with_capacity(write_order.len());
    for bucket_idx in write_order {
        let idx: usize = bucket_idx.parse().expect("written as a plain index");
        out.push(buckets[idx].read_opts(false, true)?);
    }
    Ok(out)
}

impl PoolClient for StaticHashClient {
    fn is_closed(&self) -> bool {
        StaticHashClient::is_closed(self)
    }
    fn close(&mut self) {
        StaticHashClient::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn mock_bucket(responses: &'static [&'static [u8]]) -> Endpoint {
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
    fn slots_are_assigned_round_robin() {
        let buckets = vec![mock_bucket(&[]), mock_bucket(&[]), mock_bucket(&[])];
        let client = StaticHashClient::new(buckets, opts()).unwrap();
        assert_eq!(client.slot_to_bucket[0], 0);
        assert_eq!(client.slot_to_bucket[1], 1);
        assert_eq!(client.slot_to_bucket[3], 0);
    }

    #[test]
    fn execute_round_trips_through_the_owning_bucket() {
        let buckets = vec![mock_bucket(&[b"$3\r\nbar\r\n"]), mock_bucket(&[])];
        let mut client = StaticHashClient::new(buckets, opts()).unwrap();
        let bucket = client.bucket_for(b"foo");
        let result = client
            .execute(&[Arg::from("GET"), Arg::from("foo")], b"foo")
            .unwrap();
        assert_eq!(
            result,
            Some(RespValue::BulkString(Some(bytes::Bytes::from_static(b"bar"))))
        );
        assert_eq!(bucket, client.bucket_for(b"foo"));
    }

    #[test]
    fn pipelining_preserves_issue_order_across_buckets() {
        // Two buckets; interleave writes across them, verify drain order matches issue order.
        let bucket0 = mock_bucket(&[b"$1\r\na\r\n", b"$1\r\nc\r\n"]);
        let bucket1 = mock_bucket(&[b"$1\r\nb\r\n"]);
        let mut client = StaticHashClient::new(vec![bucket0, bucket1], opts()).unwrap();

        // Pick shard keys that land on bucket 0 and bucket 1 respectively.
        let key_b0 = find_key_for_bucket(&client, 0);
        let key_b1 = find_key_for_bucket(&client, 1);

        client.bulk_start(3, true).unwrap();
        client.execute(&[Arg::from("GET"), Arg::from("a")], key_b0.as_bytes()).unwrap();
        client.execute(&[Arg::from("GET"), Arg::from("b")], key_b1.as_bytes()).unwrap();
        client.execute(&[Arg::from("GET"), Arg::from("c")], key_b0.as_bytes()).unwrap();
        let results = client.bulk_stop().unwrap().unwrap();

        assert_eq!(results[0], RespValue::BulkString(Some(bytes::Bytes::from_static(b"a"))));
        assert_eq!(results[1], RespValue::BulkString(Some(bytes::Bytes::from_static(b"b"))));
        assert_eq!(results[2], RespValue::BulkString(Some(bytes::Bytes::from_static(b"c"))));
    }

    fn find_key_for_bucket(client: &StaticHashClient, bucket: usize) -> String {
        for i in 0..10_000 {
            let key = format!("k{i}");
            if client.bucket_for(key.as_bytes()) == bucket {
                return key;
            }
        }
        panic!("no key found for bucket {bucket}");
    }
}
