//! Blocking connection pool
//!
//! One pool per device. PLC CPUs enforce a hard ceiling on concurrent
//! connections, so the pool is always bounded by `max_total`; a borrower
//! that finds no idle connection and no free slot waits on a condvar for at
//! most `borrow_timeout` and then gets `PoolError::Exhausted`.
//!
//! Connections are validated on borrow and on return. A connection that
//! fails validation is destroyed, never handed out again. Destruction always
//! calls `close()`; a close error is logged and swallowed.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use errors::{PoolError, TransportError};
use parking_lot::{Condvar, Mutex};
use plc_config::DeviceConfig;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::transport::PlcConnection;

/// Granularity at which the evictor thread notices a dropped or closed pool
const EVICTOR_TICK: Duration = Duration::from_millis(100);

/// A connection the pool can manage
pub trait PooledConnection: Send {
    /// Protocol level liveness probe
    fn is_valid(&self) -> bool;

    /// Release the underlying transport resource
    fn close(&mut self) -> Result<(), TransportError>;

    /// Connection info for logs
    fn connection_info(&self) -> String;
}

impl PooledConnection for Box<dyn PlcConnection> {
    fn is_valid(&self) -> bool {
        self.is_connected()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        PlcConnection::close(self.as_mut())
    }

    fn connection_info(&self) -> String {
        self.describe()
    }
}

/// Creates new connections for a pool
pub type ConnectionFactory<C> = Box<dyn Fn() -> Result<C, TransportError> + Send + Sync>;

// ============================================================================
// Configuration
// ============================================================================

/// Connection pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum connections, idle and borrowed together
    pub max_total: usize,
    /// Idle connections kept warm by `prewarm` and the evictor
    pub min_idle: usize,
    /// Idle connections kept on return; extra ones are destroyed
    pub max_idle: usize,
    /// Longest a borrower waits for a free connection
    pub borrow_timeout: Duration,
    /// How often the evictor runs
    pub eviction_interval: Duration,
    /// Idle time after which a connection is evicted
    pub min_evictable_idle: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let timeout = Duration::from_millis(plc_config::serde_defaults::timeout_ms());
        Self {
            max_total: 1,
            min_idle: 1,
            max_idle: 1,
            borrow_timeout: timeout,
            eviction_interval: timeout * 10,
            min_evictable_idle: timeout,
        }
    }
}

impl PoolConfig {
    /// Sizing and timing derived from a device declaration
    pub fn from_device(device: &DeviceConfig) -> Self {
        let timeout = Duration::from_millis(device.timeout_ms());
        Self {
            max_total: device.pool_max_total(),
            min_idle: device.pool_min_idle(),
            max_idle: device.pool_max_idle(),
            borrow_timeout: timeout,
            eviction_interval: timeout * 10,
            min_evictable_idle: timeout,
        }
    }
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub idle: usize,
    pub active: usize,
    pub max_total: usize,
    pub created: u64,
    pub destroyed: u64,
    pub borrowed: u64,
}

// ============================================================================
// Pool internals
// ============================================================================

/// Connection wrapper with metadata
struct ConnectionWrapper<C> {
    connection: C,
    created_at: Instant,
    last_used: Instant,
    use_count: u64,
}

impl<C: PooledConnection> ConnectionWrapper<C> {
    fn new(connection: C) -> Self {
        let now = Instant::now();
        Self {
            connection,
            created_at: now,
            last_used: now,
            use_count: 0,
        }
    }

    fn touch(&mut self) {
        self.last_used = Instant::now();
        self.use_count += 1;
    }

    fn is_idle(&self, max_idle: Duration) -> bool {
        self.last_used.elapsed() > max_idle
    }
}

struct PoolState<C> {
    idle: VecDeque<ConnectionWrapper<C>>,
    /// Borrowed connections plus slots reserved while a connection is created
    /// or checked outside the lock
    active: usize,
    closed: bool,
}

impl<C> PoolState<C> {
    fn total(&self) -> usize {
        self.idle.len() + self.active
    }
}

/// Bounded, blocking pool of connections to one device
pub struct ConnectionPool<C: PooledConnection> {
    name: String,
    config: PoolConfig,
    factory: ConnectionFactory<C>,
    state: Mutex<PoolState<C>>,
    available: Condvar,
    created: AtomicU64,
    destroyed: AtomicU64,
    borrowed: AtomicU64,
}

impl<C: PooledConnection + 'static> ConnectionPool<C> {
    pub fn new(name: impl Into<String>, config: PoolConfig, factory: ConnectionFactory<C>) -> Self {
        Self {
            name: name.into(),
            config,
            factory,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                active: 0,
                closed: false,
            }),
            available: Condvar::new(),
            created: AtomicU64::new(0),
            destroyed: AtomicU64::new(0),
            borrowed: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Borrow a validated connection, waiting up to `borrow_timeout`
    pub fn borrow(self: &Arc<Self>) -> Result<PooledConnectionGuard<C>, PoolError> {
        let started = Instant::now();
        let deadline = started + self.config.borrow_timeout;

        loop {
            let mut state = self.state.lock();
            if state.closed {
                return Err(PoolError::Closed {
                    device: self.name.clone(),
                });
            }

            // Most recently used first
            if let Some(wrapper) = state.idle.pop_back() {
                state.active += 1;
                drop(state);

                if wrapper.connection.is_valid() {
                    return Ok(self.hand_out(wrapper));
                }
                self.destroy(wrapper, "failed validation on borrow");
                self.release_slot();
                continue;
            }

            if state.total() < self.config.max_total {
                state.active += 1;
                drop(state);
                return self.create_for_borrow();
            }

            if Instant::now() >= deadline {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(
                    "[POOL] {} exhausted: {} connection(s) in use, waited {} ms",
                    self.name, state.active, waited_ms
                );
                return Err(PoolError::Exhausted {
                    device: self.name.clone(),
                    waited_ms,
                });
            }
            self.available.wait_until(&mut state, deadline);
        }
    }

    /// Create a connection into an already reserved slot
    fn create_for_borrow(self: &Arc<Self>) -> Result<PooledConnectionGuard<C>, PoolError> {
        match self.create() {
            Ok(wrapper) if wrapper.connection.is_valid() => Ok(self.hand_out(wrapper)),
            Ok(wrapper) => {
                self.destroy(wrapper, "not connected after creation");
                self.release_slot();
                Err(PoolError::InvalidConnection {
                    device: self.name.clone(),
                })
            },
            Err(source) => {
                self.release_slot();
                Err(PoolError::Creation {
                    device: self.name.clone(),
                    source,
                })
            },
        }
    }

    fn create(&self) -> Result<ConnectionWrapper<C>, TransportError> {
        let connection = (self.factory)()?;
        self.created.fetch_add(1, Ordering::Relaxed);
        debug!(
            "[POOL] {} created connection {}",
            self.name,
            connection.connection_info()
        );
        Ok(ConnectionWrapper::new(connection))
    }

    fn hand_out(self: &Arc<Self>, mut wrapper: ConnectionWrapper<C>) -> PooledConnectionGuard<C> {
        wrapper.touch();
        self.borrowed.fetch_add(1, Ordering::Relaxed);
        PooledConnectionGuard {
            connection: Some(wrapper),
            pool: Arc::clone(self),
            discard: false,
        }
    }

    /// Give back a borrowed connection; its slot is released either way
    fn give_back(&self, mut wrapper: ConnectionWrapper<C>, discard: bool) {
        if discard {
            self.destroy(wrapper, "invalidated by borrower");
            self.release_slot();
            return;
        }
        if !wrapper.connection.is_valid() {
            self.destroy(wrapper, "failed validation on return");
            self.release_slot();
            return;
        }

        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        if state.closed || state.idle.len() >= self.config.max_idle {
            drop(state);
            self.destroy(wrapper, "idle limit reached");
        } else {
            wrapper.last_used = Instant::now();
            state.idle.push_back(wrapper);
            drop(state);
        }
        self.available.notify_one();
    }

    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        drop(state);
        self.available.notify_one();
    }

    /// Close the transport resource; errors are reported, never propagated
    fn destroy(&self, mut wrapper: ConnectionWrapper<C>, reason: &str) {
        let info = wrapper.connection.connection_info();
        if let Err(e) = wrapper.connection.close() {
            warn!("[POOL] {} close failed for {}: {}", self.name, info, e);
        }
        self.destroyed.fetch_add(1, Ordering::Relaxed);
        debug!(
            "[POOL] {} destroyed {} ({}, used {} times, age {:?})",
            self.name,
            info,
            reason,
            wrapper.use_count,
            wrapper.created_at.elapsed()
        );
    }

    /// Fill the idle set up to `min_idle`; creation failures are logged
    pub fn prewarm(&self) -> usize {
        let mut added = 0;
        loop {
            {
                let mut state = self.state.lock();
                if state.closed
                    || state.idle.len() >= self.config.min_idle
                    || state.total() >= self.config.max_total
                {
                    break;
                }
                state.active += 1;
            }

            match self.create() {
                Ok(wrapper) if wrapper.connection.is_valid() => {
                    let mut state = self.state.lock();
                    state.active = state.active.saturating_sub(1);
                    state.idle.push_back(wrapper);
                    drop(state);
                    self.available.notify_one();
                    added += 1;
                },
                Ok(wrapper) => {
                    self.destroy(wrapper, "not connected after creation");
                    self.release_slot();
                    break;
                },
                Err(e) => {
                    warn!("[POOL] {} prewarm failed: {}", self.name, e);
                    self.release_slot();
                    break;
                },
            }
        }
        if added > 0 {
            debug!("[POOL] {} prewarmed {} connection(s)", self.name, added);
        }
        added
    }

    /// Destroy idle connections past `min_evictable_idle` or failing
    /// validation, then top idle back up to `min_idle`
    pub fn evict(&self) -> usize {
        let candidates: Vec<_> = {
            let mut state = self.state.lock();
            if state.closed {
                return 0;
            }
            let drained: Vec<_> = state.idle.drain(..).collect();
            // Hold the slots while checking outside the lock
            state.active += drained.len();
            drained
        };

        let checked = candidates.len();
        let mut kept = Vec::with_capacity(checked);
        let mut evicted = 0;
        for wrapper in candidates {
            if wrapper.is_idle(self.config.min_evictable_idle) {
                self.destroy(wrapper, "idle timeout");
                evicted += 1;
            } else if !wrapper.connection.is_valid() {
                self.destroy(wrapper, "failed validation while idle");
                evicted += 1;
            } else {
                kept.push(wrapper);
            }
        }

        {
            let mut state = self.state.lock();
            state.active = state.active.saturating_sub(checked);
            for wrapper in kept.into_iter().rev() {
                state.idle.push_front(wrapper);
            }
        }
        self.available.notify_all();

        if evicted > 0 {
            debug!("[POOL] {} evicted {} idle connection(s)", self.name, evicted);
        }
        self.prewarm();
        evicted
    }

    /// Run `evict` every `eviction_interval` until the pool is closed or dropped
    pub fn start_evictor(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = self.config.eviction_interval;
        let result = thread::Builder::new()
            .name(format!("pool-evictor-{}", self.name))
            .spawn(move || {
                let mut next = Instant::now() + interval;
                loop {
                    thread::sleep(EVICTOR_TICK.min(interval));
                    let Some(pool) = weak.upgrade() else {
                        break;
                    };
                    if pool.is_closed() {
                        break;
                    }
                    if Instant::now() >= next {
                        pool.evict();
                        next = Instant::now() + interval;
                    }
                }
            });

        match result {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("[POOL] {} evictor not started: {}", self.name, e);
                None
            },
        }
    }

    /// Destroy idle connections and refuse further borrows
    ///
    /// Borrowed connections are destroyed when they come back.
    pub fn close(&self) {
        let drained: Vec<_> = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.idle.drain(..).collect()
        };
        self.available.notify_all();

        let count = drained.len();
        for wrapper in drained {
            self.destroy(wrapper, "pool closed");
        }
        info!("[POOL] {} closed, {} idle connection(s) destroyed", self.name, count);
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            idle: state.idle.len(),
            active: state.active,
            max_total: self.config.max_total,
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            borrowed: self.borrowed.load(Ordering::Relaxed),
        }
    }
}

impl<C: PooledConnection> Drop for ConnectionPool<C> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for mut wrapper in state.idle.drain(..) {
            if let Err(e) = wrapper.connection.close() {
                warn!("[POOL] {} close failed on drop: {}", self.name, e);
            }
        }
    }
}

// ============================================================================
// Guard
// ============================================================================

/// A borrowed connection; returned to the pool on drop
pub struct PooledConnectionGuard<C: PooledConnection + 'static> {
    connection: Option<ConnectionWrapper<C>>,
    pool: Arc<ConnectionPool<C>>,
    discard: bool,
}

impl<C: PooledConnection + 'static> PooledConnectionGuard<C> {
    /// Return the connection now
    pub fn release(self) {}

    /// Destroy the connection instead of returning it
    pub fn invalidate(mut self) {
        self.discard = true;
    }

    /// Mark the connection for destruction when the guard drops
    pub fn mark_invalid(&mut self) {
        self.discard = true;
    }

    pub fn use_count(&self) -> u64 {
        self.connection.as_ref().map_or(0, |w| w.use_count)
    }

    pub fn pool_name(&self) -> &str {
        self.pool.name()
    }
}

impl<C: PooledConnection + 'static> fmt::Debug for PooledConnectionGuard<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnectionGuard")
            .field("pool", &self.pool_name())
            .field("use_count", &self.use_count())
            .field("discard", &self.discard)
            .finish()
    }
}

impl<C: PooledConnection + 'static> Deref for PooledConnectionGuard<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        match &self.connection {
            Some(wrapper) => &wrapper.connection,
            None => unreachable!("connection is only taken on drop"),
        }
    }
}

impl<C: PooledConnection + 'static> DerefMut for PooledConnectionGuard<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.connection {
            Some(wrapper) => &mut wrapper.connection,
            None => unreachable!("connection is only taken on drop"),
        }
    }
}

impl<C: PooledConnection + 'static> Drop for PooledConnectionGuard<C> {
    fn drop(&mut self) {
        if let Some(wrapper) = self.connection.take() {
            self.pool.give_back(wrapper, self.discard);
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    struct MockConnection {
        id: usize,
        alive: Arc<AtomicBool>,
        closes: Arc<AtomicUsize>,
        fail_close: bool,
    }

    impl PooledConnection for MockConnection {
        fn is_valid(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        fn close(&mut self) -> Result<(), TransportError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(TransportError::Close("socket already gone".into()))
            } else {
                Ok(())
            }
        }

        fn connection_info(&self) -> String {
            format!("mock#{}", self.id)
        }
    }

    struct Harness {
        alive: Arc<AtomicBool>,
        closes: Arc<AtomicUsize>,
        refuse: Arc<AtomicBool>,
    }

    fn pool_with(config: PoolConfig, fail_close: bool) -> (Arc<ConnectionPool<MockConnection>>, Harness) {
        let alive = Arc::new(AtomicBool::new(true));
        let closes = Arc::new(AtomicUsize::new(0));
        let refuse = Arc::new(AtomicBool::new(false));
        let next_id = Arc::new(AtomicUsize::new(0));

        let (a, c, r) = (alive.clone(), closes.clone(), refuse.clone());
        let factory: ConnectionFactory<MockConnection> = Box::new(move || {
            if r.load(Ordering::SeqCst) {
                return Err(TransportError::connect("mock", "refused"));
            }
            Ok(MockConnection {
                id: next_id.fetch_add(1, Ordering::SeqCst),
                alive: a.clone(),
                closes: c.clone(),
                fail_close,
            })
        });
        let pool = Arc::new(ConnectionPool::new("plc1", config, factory));
        (pool, Harness { alive, closes, refuse })
    }

    fn config(max_total: usize, timeout_ms: u64) -> PoolConfig {
        PoolConfig {
            max_total,
            min_idle: 1,
            max_idle: max_total,
            borrow_timeout: Duration::from_millis(timeout_ms),
            eviction_interval: Duration::from_millis(timeout_ms * 10),
            min_evictable_idle: Duration::from_millis(timeout_ms),
        }
    }

    #[test]
    fn test_pool_config_from_device() {
        let mut device = DeviceConfig::new("plc1", "10.0.0.5");
        device.max_connections = Some(4);
        device.min_idle = Some(8);
        device.timeout = Some(200);
        let config = PoolConfig::from_device(&device);
        assert_eq!(config.max_total, 4);
        assert_eq!(config.min_idle, 1);
        assert_eq!(config.max_idle, 1);
        assert_eq!(config.borrow_timeout, Duration::from_millis(200));
        assert_eq!(config.eviction_interval, Duration::from_millis(2000));

        let config = PoolConfig::from_device(&DeviceConfig::new("plc2", "h"));
        assert_eq!(config.max_total, 1);
    }

    #[test]
    fn test_borrow_reuses_returned_connection() {
        let (pool, _h) = pool_with(config(2, 50), false);
        let id = {
            let guard = pool.borrow().unwrap();
            guard.id
        };
        let guard = pool.borrow().unwrap();
        assert_eq!(guard.id, id);
        assert_eq!(guard.use_count(), 2);
        assert_eq!(
            format!("{:?}", guard),
            "PooledConnectionGuard { pool: \"plc1\", use_count: 2, discard: false }"
        );
        drop(guard);

        let stats = pool.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.borrowed, 2);
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.active, 0);
    }

    #[test]
    fn test_exhausted_after_timeout() {
        let (pool, _h) = pool_with(config(1, 50), false);
        let _held = pool.borrow().unwrap();

        let started = Instant::now();
        let err = pool.borrow().unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(matches!(err, PoolError::Exhausted { ref device, .. } if device == "plc1"));
    }

    #[test]
    fn test_waiter_gets_returned_connection() {
        let (pool, _h) = pool_with(config(1, 2000), false);
        let held = pool.borrow().unwrap();

        let p = Arc::clone(&pool);
        let waiter = thread::spawn(move || p.borrow().map(|g| g.id));
        thread::sleep(Duration::from_millis(50));
        let id = held.id;
        held.release();

        assert_eq!(waiter.join().unwrap().unwrap(), id);
        assert_eq!(pool.stats().created, 1);
    }

    #[test]
    fn test_invalid_connection_is_destroyed_not_reused() {
        let (pool, h) = pool_with(config(1, 50), false);
        drop(pool.borrow().unwrap());
        assert_eq!(pool.stats().idle, 1);

        h.alive.store(false, Ordering::SeqCst);
        // Idle one fails validation, the fresh one is dead too
        let err = pool.borrow().unwrap_err();
        assert!(matches!(err, PoolError::InvalidConnection { .. }));
        assert_eq!(pool.stats().destroyed, 2);
        assert_eq!(h.closes.load(Ordering::SeqCst), 2);
        assert_eq!(pool.stats().active, 0);

        h.alive.store(true, Ordering::SeqCst);
        assert!(pool.borrow().is_ok());
    }

    #[test]
    fn test_invalidate_and_close_error_swallowed() {
        let (pool, h) = pool_with(config(1, 50), true);
        let guard = pool.borrow().unwrap();
        guard.invalidate();

        assert_eq!(h.closes.load(Ordering::SeqCst), 1);
        let stats = pool.stats();
        assert_eq!(stats.destroyed, 1);
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.active, 0);
        assert!(pool.borrow().is_ok());
    }

    #[test]
    fn test_creation_failure() {
        let (pool, h) = pool_with(config(1, 50), false);
        h.refuse.store(true, Ordering::SeqCst);
        let err = pool.borrow().unwrap_err();
        assert!(matches!(err, PoolError::Creation { .. }));
        assert_eq!(pool.stats().active, 0);
        assert_eq!(pool.prewarm(), 0);
    }

    #[test]
    fn test_max_idle_shrinks_on_return() {
        let mut cfg = config(3, 50);
        cfg.max_idle = 1;
        let (pool, _h) = pool_with(cfg, false);
        let a = pool.borrow().unwrap();
        let b = pool.borrow().unwrap();
        drop(a);
        drop(b);
        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.destroyed, 1);
    }

    #[test]
    fn test_prewarm_and_evict() {
        let mut cfg = config(3, 30);
        cfg.min_idle = 2;
        let (pool, h) = pool_with(cfg, false);
        assert_eq!(pool.prewarm(), 2);
        assert_eq!(pool.stats().idle, 2);

        thread::sleep(Duration::from_millis(60));
        assert_eq!(pool.evict(), 2);
        // Topped back up to min_idle
        let stats = pool.stats();
        assert_eq!(stats.idle, 2);
        assert_eq!(stats.created, 4);

        h.alive.store(false, Ordering::SeqCst);
        assert_eq!(pool.evict(), 2);
        assert_eq!(pool.stats().active, 0);
    }

    #[test]
    fn test_close_refuses_borrow_and_destroys_on_return() {
        let (pool, h) = pool_with(config(2, 50), false);
        let held = pool.borrow().unwrap();
        drop(pool.borrow().unwrap());
        pool.close();
        assert_eq!(h.closes.load(Ordering::SeqCst), 1);
        assert!(matches!(pool.borrow(), Err(PoolError::Closed { .. })));

        drop(held);
        assert_eq!(h.closes.load(Ordering::SeqCst), 2);
        assert_eq!(pool.stats().idle, 0);
    }

    #[test]
    fn test_evictor_stops_with_pool() {
        let mut cfg = config(1, 5);
        cfg.eviction_interval = Duration::from_millis(20);
        let (pool, _h) = pool_with(cfg, false);
        let handle = pool.start_evictor().unwrap();
        pool.close();
        handle.join().unwrap();
    }
}
