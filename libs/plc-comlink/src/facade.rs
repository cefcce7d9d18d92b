//! Device facade: the read/write entry point for callers
//!
//! Resolves device and datagram ids through an injected [`ConfigStore`],
//! picks the backend from the device's protocol variant and delegates with
//! the device's call timeout. Nothing crosses this boundary as an error: a
//! failed read is an empty mapping, a failed write is `false`.

use std::sync::Arc;

use dashmap::DashMap;
use errors::{PlcErrorTrait, PlcResult};
use plc_config::{ConfigStore, DeviceConfig, ProtocolVariant};
use tracing::{debug, info};

use crate::io::{AreaHandle, DirectIo, PlcIo, PooledIo, TagConnection, WriteOutcome, WriteValues};
use crate::pool::PoolStats;
use crate::transport::{AreaDriver, PlcDriver, SimulatedPlc};
use crate::value::ReadValues;

/// Transport drivers for both protocol families
#[derive(Clone)]
pub struct Drivers {
    pub tag: Arc<dyn PlcDriver>,
    pub area: Arc<dyn AreaDriver>,
}

impl Drivers {
    pub fn new(tag: Arc<dyn PlcDriver>, area: Arc<dyn AreaDriver>) -> Self {
        Self { tag, area }
    }

    /// Both families served by one simulated controller
    pub fn simulated(plc: &SimulatedPlc) -> Self {
        Self {
            tag: Arc::new(plc.clone()),
            area: Arc::new(plc.clone()),
        }
    }
}

/// Backend of one device, chosen by protocol variant
#[derive(Clone)]
enum Backend {
    Pooled(Arc<PooledIo>),
    Direct(Arc<DirectIo>),
}

impl Backend {
    fn io(&self) -> &dyn PlcIo {
        match self {
            Backend::Pooled(io) => io.as_ref(),
            Backend::Direct(io) => io.as_ref(),
        }
    }
}

/// Raw transport access, only through [`PlcFacade::advanced_raw_connection`]
pub enum RawConnection {
    /// A tag connection borrowed from the device pool; returned on drop
    Tag(TagConnection),
    /// The single area client, locked for the duration of each call
    Area(AreaHandle),
}

/// Read/write entry point over a configuration store
pub struct PlcFacade {
    store: Arc<ConfigStore>,
    drivers: Drivers,
    backends: DashMap<String, Backend>,
}

impl PlcFacade {
    pub fn new(store: Arc<ConfigStore>, drivers: Drivers) -> Self {
        info!(
            "[FACADE] Created with {} device(s), {} datagram(s)",
            store.devices().count(),
            store.datagrams().count()
        );
        Self {
            store,
            drivers,
            backends: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Backend for `device_id`, created on first use
    fn backend(&self, device_id: &str) -> PlcResult<(Arc<DeviceConfig>, Backend)> {
        let device = self.store.require_device(device_id)?;
        if let Some(backend) = self.backends.get(device_id) {
            return Ok((device, backend.clone()));
        }

        let backend = self
            .backends
            .entry(device_id.to_string())
            .or_insert_with(|| {
                debug!(
                    "[FACADE] Backend for {} ({})",
                    device.id,
                    device.protocol.description()
                );
                match device.protocol {
                    ProtocolVariant::S7 => Backend::Pooled(Arc::new(PooledIo::new(
                        Arc::clone(&device),
                        Arc::clone(&self.drivers.tag),
                    ))),
                    ProtocolVariant::S7200Smart => Backend::Direct(Arc::new(DirectIo::new(
                        Arc::clone(&device),
                        Arc::clone(&self.drivers.area),
                    ))),
                }
            })
            .clone();
        Ok((device, backend))
    }

    /// Read with the error preserved
    pub fn try_read(&self, device_id: &str, datagram_id: &str) -> PlcResult<ReadValues> {
        let (device, backend) = self.backend(device_id)?;
        let datagram = self.store.require_datagram(datagram_id)?;
        backend.io().try_read(&datagram, device.call_timeout_ms())
    }

    /// Read a datagram; an empty mapping on any failure
    pub fn read_datas(&self, device_id: &str, datagram_id: &str) -> ReadValues {
        match self.try_read(device_id, datagram_id) {
            Ok(values) => values,
            Err(e) => {
                e.log(&format!("[READ] {}.{} failed:", device_id, datagram_id));
                ReadValues::new()
            },
        }
    }

    /// Write a datagram and report which items were applied
    pub fn write_outcome(
        &self,
        device_id: &str,
        datagram_id: &str,
        values: &WriteValues,
    ) -> WriteOutcome {
        let resolved = self.backend(device_id).and_then(|(device, backend)| {
            let datagram = self.store.require_datagram(datagram_id)?;
            Ok((device, backend, datagram))
        });
        match resolved {
            Ok((device, backend, datagram)) => {
                backend
                    .io()
                    .write_outcome(&datagram, values, device.call_timeout_ms())
            },
            Err(e) => {
                e.log(&format!("[WRITE] {}.{} not attempted:", device_id, datagram_id));
                WriteOutcome::NotAttempted
            },
        }
    }

    /// Write a datagram; `true` only when every item was applied
    pub fn write_datas(&self, device_id: &str, datagram_id: &str, values: &WriteValues) -> bool {
        self.write_outcome(device_id, datagram_id, values)
            .is_applied()
    }

    /// Connect a device ahead of its first call
    pub fn connect(&self, device_id: &str) -> PlcResult<()> {
        let (_, backend) = self.backend(device_id)?;
        backend.io().connect()
    }

    pub fn is_connected(&self, device_id: &str) -> bool {
        self.backends
            .get(device_id)
            .map(|backend| backend.io().is_connected())
            .unwrap_or(false)
    }

    /// Pool counters of a pooled device that has connected at least once
    pub fn pool_stats(&self, device_id: &str) -> Option<PoolStats> {
        match self.backends.get(device_id)?.value() {
            Backend::Pooled(io) => io.pool_stats(),
            Backend::Direct(_) => None,
        }
    }

    /// Tear down the connections of one device
    pub fn close_device(&self, device_id: &str) -> bool {
        match self.backends.remove(device_id) {
            Some((_, backend)) => {
                backend.io().close();
                info!("[FACADE] Closed device {}", device_id);
                true
            },
            None => false,
        }
    }

    pub fn close_all(&self) {
        let ids: Vec<String> = self.backends.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.close_device(&id);
        }
    }

    /// Raw transport handle for operations outside the read/write contract
    ///
    /// Pooled devices lend one connection from their pool; it goes back when
    /// the handle drops. Area devices expose their single client under the
    /// connection lock.
    pub fn advanced_raw_connection(&self, device_id: &str) -> PlcResult<RawConnection> {
        let (_, backend) = self.backend(device_id)?;
        match backend {
            Backend::Pooled(io) => Ok(RawConnection::Tag(io.borrow()?)),
            Backend::Direct(io) => {
                io.connect()?;
                Ok(RawConnection::Area(AreaHandle::new(io)))
            },
        }
    }
}

impl Drop for PlcFacade {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    const CONFIG: &str = r#"
devices:
  - id: plc1
    host: 10.0.0.5
  - id: smart1
    host: 10.0.0.6
    protocol: S7-200-SMART
datagrams:
  - id: dg1
    items:
      - code: speed
        register_kind: DB
        register_number: 1
        register_offset: "0"
        data_type: INT
"#;

    fn facade() -> (SimulatedPlc, PlcFacade) {
        let plc = SimulatedPlc::new();
        let store = Arc::new(ConfigStore::from_yaml_str(CONFIG).unwrap());
        let facade = PlcFacade::new(store, Drivers::simulated(&plc));
        (plc, facade)
    }

    #[test]
    fn test_backend_by_protocol() {
        let (plc, facade) = facade();
        plc.set_bytes(plc_config::RegisterKind::DataBlock, 1, 0, &[0, 42]);

        assert_eq!(facade.read_datas("plc1", "dg1").len(), 1);
        assert_eq!(facade.read_datas("smart1", "dg1").len(), 1);
        let stats = plc.stats();
        assert_eq!(stats.tag_connects, 1);
        assert_eq!(stats.area_connects, 1);
        assert!(facade.pool_stats("plc1").is_some());
        assert!(facade.pool_stats("smart1").is_none());
    }

    #[test]
    fn test_unknown_ids() {
        let (_plc, facade) = facade();
        assert!(facade.read_datas("nope", "dg1").is_empty());
        assert!(facade.read_datas("plc1", "nope").is_empty());
        assert!(!facade.write_datas("nope", "dg1", &WriteValues::new()));
        assert_eq!(
            facade.write_outcome("plc1", "nope", &WriteValues::new()),
            WriteOutcome::NotAttempted
        );
    }

    #[test]
    fn test_close_device() {
        let (_plc, facade) = facade();
        facade.connect("smart1").unwrap();
        assert!(facade.is_connected("smart1"));
        assert!(facade.close_device("smart1"));
        assert!(!facade.is_connected("smart1"));
        assert!(!facade.close_device("smart1"));
    }
}
