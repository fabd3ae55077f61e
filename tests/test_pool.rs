//! Integration tests: pool exhaustion (§8 "Pool exhaustion").

mod common;

use rsedis::connection::ConnectionOptions;
use rsedis::topology::{DirectClient, Pool};

fn direct_pool(size: usize, close_on_err: bool) -> Pool<DirectClient> {
    let endpoint = common::mock_server_repeating(b"+PONG\r\n");
    let opts = ConnectionOptions {
        sentinel: true,
        ..Default::default()
    };
    Pool::new(
        size,
        close_on_err,
        Box::new(move || Ok(DirectClient::new(endpoint.clone(), opts.clone()))),
    )
}

#[test]
fn n_plus_one_acquire_raises() {
    let pool = direct_pool(2, false);
    let _a = pool.acquire().unwrap();
    let _b = pool.acquire().unwrap();
    assert!(pool.acquire().is_err());
}

#[test]
fn releasing_frees_a_slot_for_the_next_acquire() {
    let pool = direct_pool(1, false);
    {
        let _a = pool.acquire().unwrap();
        assert!(pool.acquire().is_err());
    }
    let _b = pool.acquire().unwrap();
    assert_eq!(pool.used_count(), 1);
}

#[test]
fn close_on_err_clears_the_free_set_on_release() {
    let pool = direct_pool(3, true);
    {
        let _idle = pool.acquire().unwrap();
    }
    assert_eq!(pool.free_count(), 1);

    {
        let mut failing = pool.acquire().unwrap();
        failing.client().close();
    }
    assert_eq!(pool.free_count(), 0);
}
