//! Pooled backend for the tag transport (S7)

use std::sync::Arc;
use std::time::Duration;

use errors::{PlcError, PlcErrorTrait, PlcResult, TransportError};
use parking_lot::Mutex;
use plc_config::{Datagram, DeviceConfig};
use tracing::{debug, info};

use super::request::{self, ResolvedItem, WriteValues};
use super::{ItemFailure, PlcIo, WriteOutcome};
use crate::codec::PlcCodec;
use crate::pool::{ConnectionFactory, ConnectionPool, PoolConfig, PoolStats, PooledConnectionGuard};
use crate::transport::{PlcConnection, PlcDriver, ReadRequest, WriteRequest};
use crate::value::ReadValues;

/// Pool of tag transport connections
pub type TagPool = ConnectionPool<Box<dyn PlcConnection>>;

/// A tag connection borrowed from a [`TagPool`]
pub type TagConnection = PooledConnectionGuard<Box<dyn PlcConnection>>;

/// Tag transport backend; the pool is the only synchronization point
pub struct PooledIo {
    device: Arc<DeviceConfig>,
    driver: Arc<dyn PlcDriver>,
    pool: Mutex<Option<Arc<TagPool>>>,
}

impl PooledIo {
    pub fn new(device: Arc<DeviceConfig>, driver: Arc<dyn PlcDriver>) -> Self {
        Self {
            device,
            driver,
            pool: Mutex::new(None),
        }
    }

    /// Borrow a connection, building the pool on first use
    ///
    /// The pool is installed before its first connect so concurrent first
    /// callers wait inside its borrow timeout instead of on this slot. A pool
    /// that never produced a connection is dropped again, so a device that
    /// never connects leaves nothing behind.
    pub fn borrow(&self) -> PlcResult<TagConnection> {
        let (pool, fresh) = {
            let mut slot = self.pool.lock();
            match slot.as_ref().filter(|p| !p.is_closed()) {
                Some(pool) => (Arc::clone(pool), false),
                None => {
                    self.device.validate_for_connect()?;
                    let pool = Arc::new(ConnectionPool::new(
                        self.device.id.clone(),
                        PoolConfig::from_device(&self.device),
                        self.factory(),
                    ));
                    *slot = Some(Arc::clone(&pool));
                    (pool, true)
                },
            }
        };

        match pool.borrow() {
            Ok(guard) => {
                if fresh {
                    let config = pool.config();
                    info!(
                        "[POOL] Created pool for {} (max_total={}, min_idle={}, max_idle={})",
                        self.device.masked_connection_string(),
                        config.max_total,
                        config.min_idle,
                        config.max_idle
                    );
                    pool.start_evictor();
                }
                Ok(guard)
            },
            Err(e) => {
                if pool.stats().created == 0 {
                    self.discard(&pool);
                } else if fresh {
                    pool.start_evictor();
                }
                Err(e.into())
            },
        }
    }

    /// Forget `pool` if it is still the installed one
    fn discard(&self, pool: &Arc<TagPool>) {
        let mut slot = self.pool.lock();
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, pool)) {
            *slot = None;
            drop(slot);
            pool.close();
        }
    }

    fn factory(&self) -> ConnectionFactory<Box<dyn PlcConnection>> {
        let driver = Arc::clone(&self.driver);
        let connection_string = self.device.connection_string();
        let masked = self.device.masked_connection_string();
        Box::new(move || {
            debug!("[CONNECT] Opening {}", masked);
            let mut conn = driver.connect(&connection_string)?;
            if !conn.metadata().read_supported {
                if let Err(e) = PlcConnection::close(conn.as_mut()) {
                    debug!("[CONNECT] Close after capability check failed: {}", e);
                }
                return Err(TransportError::ReadNotSupported(masked.clone()));
            }
            Ok(conn)
        })
    }

    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.pool.lock().as_ref().map(|pool| pool.stats())
    }

    fn read_batch(
        &self,
        resolved: &[ResolvedItem<'_>],
        timeout: Duration,
    ) -> PlcResult<ReadValues> {
        let mut conn = self.borrow()?;
        let request = ReadRequest {
            items: resolved.iter().map(|r| r.to_request(Vec::new())).collect(),
        };

        let response = match conn.read(&request, timeout) {
            Ok(response) => {
                conn.release();
                response
            },
            Err(e) => {
                conn.invalidate();
                return Err(e.into());
            },
        };

        let mut values = ReadValues::new();
        for entry in resolved {
            let code = response.response_code(entry.code());
            if !code.is_ok() {
                request::log_item_failure("READ", entry, code);
                continue;
            }
            let data = response.data(entry.code()).unwrap_or_default();
            match PlcCodec::decode(entry.data_type, &entry.address, data) {
                Ok(value) => {
                    debug!("  {} = {}", entry.code(), value);
                    values.insert(entry.code().to_string(), value);
                },
                Err(e) => request::log_item_failure("READ", entry, e),
            }
        }
        Ok(values)
    }
}

impl PlcIo for PooledIo {
    fn device(&self) -> &DeviceConfig {
        &self.device
    }

    fn try_read(&self, datagram: &Datagram, timeout_ms: u64) -> PlcResult<ReadValues> {
        info!("{}", request::log_title("Read", &self.device, datagram));
        let resolved = request::resolve_items(datagram)?;
        self.read_batch(&resolved, Duration::from_millis(timeout_ms))
    }

    fn write_outcome(
        &self,
        datagram: &Datagram,
        values: &WriteValues,
        timeout_ms: u64,
    ) -> WriteOutcome {
        let title = request::log_title("Write", &self.device, datagram);
        info!("{}", title);

        let prepared = request::resolve_items(datagram).and_then(|resolved| {
            let payloads = request::encode_values(datagram, &resolved, values)?;
            let conn = self.borrow()?;
            Ok((resolved, payloads, conn))
        });
        let (resolved, payloads, mut conn) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                e.log(&format!("[WRITE] {} not attempted:", title));
                return WriteOutcome::NotAttempted;
            },
        };

        let request = WriteRequest {
            items: resolved
                .iter()
                .zip(payloads)
                .map(|(entry, data)| entry.to_request(data))
                .collect(),
        };

        let response = match conn.write(&request, Duration::from_millis(timeout_ms)) {
            Ok(response) => {
                conn.release();
                response
            },
            Err(e) => {
                conn.invalidate();
                let e = PlcError::from(e);
                e.log(&format!("[WRITE] {} failed:", title));
                let failed = resolved
                    .iter()
                    .map(|entry| ItemFailure {
                        code: entry.code().to_string(),
                        reason: e.to_string(),
                    })
                    .collect();
                return WriteOutcome::PartiallyApplied {
                    applied: Vec::new(),
                    failed,
                };
            },
        };

        let mut applied = Vec::new();
        let mut failed = Vec::new();
        for entry in &resolved {
            let code = response.response_code(entry.code());
            if code.is_ok() {
                applied.push(entry.code().to_string());
            } else {
                request::log_item_failure("WRITE", entry, code);
                failed.push(ItemFailure {
                    code: entry.code().to_string(),
                    reason: code.to_string(),
                });
            }
        }
        WriteOutcome::from_results(applied, failed)
    }

    fn connect(&self) -> PlcResult<()> {
        self.borrow().map(|conn| conn.release())
    }

    fn is_connected(&self) -> bool {
        self.pool
            .lock()
            .as_ref()
            .map(|pool| !pool.is_closed())
            .unwrap_or(false)
    }

    fn close(&self) {
        if let Some(pool) = self.pool.lock().take() {
            pool.close();
        }
    }
}
