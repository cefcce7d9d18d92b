//! Connection pool behavior under concurrent borrowers
//!
//! Pools are built over the simulated tag transport so the number of
//! physically open connections can be checked against the pool ceiling.

#![allow(clippy::disallowed_methods)] // Integration test - unwrap is acceptable

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use errors::PoolError;
use plc_comlink::pool::ConnectionFactory;
use plc_comlink::{ConnectionPool, PlcConnection, PlcDriver, PoolConfig, SimulatedPlc};
use plc_config::DeviceConfig;

type TagPool = ConnectionPool<Box<dyn PlcConnection>>;

fn tag_pool(plc: &SimulatedPlc, max_connections: u32, timeout_ms: u64) -> Arc<TagPool> {
    let mut device = DeviceConfig::new("plc1", "10.0.0.5");
    device.max_connections = Some(max_connections);
    device.timeout = Some(timeout_ms);

    let driver = plc.clone();
    let connection_string = device.connection_string();
    let factory: ConnectionFactory<Box<dyn PlcConnection>> =
        Box::new(move || driver.connect(&connection_string));
    Arc::new(ConnectionPool::new(
        device.id.clone(),
        PoolConfig::from_device(&device),
        factory,
    ))
}

#[test]
fn test_single_connection_blocks_second_borrower_until_return() {
    let plc = SimulatedPlc::new();
    let pool = tag_pool(&plc, 1, 2000);

    let first = pool.borrow().unwrap();
    let released_at = Arc::new(parking_lot::Mutex::new(None::<Instant>));

    let p = Arc::clone(&pool);
    let waiter = thread::spawn(move || {
        let guard = p.borrow().unwrap();
        let acquired = Instant::now();
        drop(guard);
        acquired
    });

    thread::sleep(Duration::from_millis(100));
    *released_at.lock() = Some(Instant::now());
    first.release();

    let acquired = waiter.join().unwrap();
    assert!(acquired >= released_at.lock().unwrap());
    assert_eq!(plc.stats().tag_connects, 1);
}

#[test]
fn test_single_connection_exhausted_when_never_returned() {
    let plc = SimulatedPlc::new();
    let pool = tag_pool(&plc, 1, 80);
    let _held = pool.borrow().unwrap();

    let p = Arc::clone(&pool);
    let result = thread::spawn(move || p.borrow().map(|_| ())).join().unwrap();
    match result {
        Err(PoolError::Exhausted { device, waited_ms }) => {
            assert_eq!(device, "plc1");
            assert!(waited_ms >= 80);
        },
        other => panic!("expected exhaustion, got {:?}", other),
    }
}

#[test]
fn test_never_exceeds_max_total() {
    let plc = SimulatedPlc::new();
    plc.set_latency(Some(Duration::from_millis(5)));
    let pool = tag_pool(&plc, 3, 5000);

    let threads = 12;
    let barrier = Arc::new(Barrier::new(threads));
    let in_use = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            let in_use = Arc::clone(&in_use);
            let peak = Arc::clone(&peak);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..5 {
                    let mut conn = pool.borrow().unwrap();
                    let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    conn.read(&Default::default(), Duration::from_millis(100))
                        .unwrap();
                    in_use.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(plc.stats().peak_open <= 3);
    let stats = pool.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.borrowed, 60);
    assert_eq!(stats.created - stats.destroyed, stats.idle as u64);
}

#[test]
fn test_broken_connections_are_not_handed_out_again() {
    let plc = SimulatedPlc::new();
    let pool = tag_pool(&plc, 2, 200);

    let a = pool.borrow().unwrap();
    let b = pool.borrow().unwrap();
    drop(a);
    drop(b);
    assert_eq!(pool.stats().idle, 1);

    plc.disconnect_all();
    let conn = pool.borrow().unwrap();
    assert!(conn.is_connected());
    drop(conn);

    let stats = pool.stats();
    // One idle dropped by max_idle, one found dead on borrow
    assert_eq!(stats.destroyed, 2);
    assert_eq!(stats.created, 3);
}

#[test]
fn test_idle_eviction() {
    let plc = SimulatedPlc::new();
    let pool = tag_pool(&plc, 2, 30);
    drop(pool.borrow().unwrap());
    assert_eq!(pool.stats().idle, 1);

    thread::sleep(Duration::from_millis(60));
    assert_eq!(pool.evict(), 1);
    // Refilled to min_idle with a fresh connection
    assert_eq!(pool.stats().idle, 1);
    assert_eq!(plc.stats().tag_connects, 2);
    assert_eq!(plc.stats().closes, 1);
}

#[test]
fn test_close_destroys_idle_and_late_returns() {
    let plc = SimulatedPlc::new();
    let pool = tag_pool(&plc, 2, 200);
    let held = pool.borrow().unwrap();
    drop(pool.borrow().unwrap());

    pool.close();
    assert!(matches!(pool.borrow(), Err(PoolError::Closed { .. })));
    drop(held);
    assert_eq!(plc.stats().open, 0);
    assert_eq!(plc.stats().closes, 2);
}
