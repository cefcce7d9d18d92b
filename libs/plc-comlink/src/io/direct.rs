//! Single connection backend for the area client (S7-200 SMART)
//!
//! Holds at most one client. The mutex serialises connect, execute and
//! teardown, so a call never runs against a half-closed client. State
//! machine: `Disconnected -> Connecting -> Connected -> Disconnected` on a
//! transport failure; the next call simply connects again.

use std::sync::Arc;
use std::time::Duration;

use errors::{PlcError, PlcErrorTrait, PlcResult, TransportError};
use parking_lot::Mutex;
use plc_config::{DataType, Datagram, DeviceConfig};
use tracing::{debug, info, warn};

use super::request::{self, ResolvedItem, WriteValues};
use super::{ItemFailure, PlcIo, WriteOutcome};
use crate::bytes::{get_bit, put_bit};
use crate::codec::PlcCodec;
use crate::transport::{AreaClient, AreaDriver, ConnectionState};
use crate::value::ReadValues;

/// Device result code meaning success
const AREA_OK: i32 = 0;

struct AreaLink {
    client: Option<Box<dyn AreaClient>>,
    state: ConnectionState,
}

/// Area client backend with one persistent connection
pub struct DirectIo {
    device: Arc<DeviceConfig>,
    driver: Arc<dyn AreaDriver>,
    link: Mutex<AreaLink>,
}

impl DirectIo {
    pub fn new(device: Arc<DeviceConfig>, driver: Arc<dyn AreaDriver>) -> Self {
        Self {
            device,
            driver,
            link: Mutex::new(AreaLink {
                client: None,
                state: ConnectionState::Disconnected,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.link.lock().state
    }

    /// Return the live client, connecting first when needed
    fn ensure_connected<'l>(&self, link: &'l mut AreaLink) -> PlcResult<&'l mut dyn AreaClient> {
        let stale = link.client.as_ref().is_some_and(|c| !c.is_connected());
        if stale {
            self.teardown(link, "connection lost");
        }

        if link.client.is_none() {
            self.device.validate_for_connect()?;
            let (rack, slot) = (self.device.area_rack(), self.device.area_slot());
            link.state = ConnectionState::Connecting;
            match self.driver.connect(&self.device.host, rack, slot) {
                Ok(client) => {
                    info!(
                        "[CONNECT] {} connected to {} rack={} slot={}",
                        self.device.id, self.device.host, rack, slot
                    );
                    link.client = Some(client);
                    link.state = ConnectionState::Connected;
                },
                Err(e) => {
                    link.state = ConnectionState::Disconnected;
                    return Err(e.into());
                },
            }
        }

        match link.client.as_deref_mut() {
            Some(client) => Ok(client),
            None => Err(TransportError::NotConnected.into()),
        }
    }

    fn teardown(&self, link: &mut AreaLink, reason: &str) {
        if let Some(mut client) = link.client.take() {
            if let Err(e) = client.disconnect() {
                warn!("[CONNECT] {} disconnect failed: {}", self.device.id, e);
            }
            info!("[CONNECT] {} disconnected ({})", self.device.id, reason);
        }
        link.state = ConnectionState::Disconnected;
    }

    fn on_transport_error(&self, link: &mut AreaLink, error: &TransportError) {
        if self.device.reconnect_on_error && error.needs_reconnect() {
            self.teardown(link, "transport error");
        }
    }

    /// Run `f` against the connected client while holding the connection lock
    pub fn with_client<R>(&self, f: impl FnOnce(&mut dyn AreaClient) -> R) -> PlcResult<R> {
        let mut link = self.link.lock();
        let client = self.ensure_connected(&mut link)?;
        Ok(f(client))
    }

    fn write_item(
        client: &mut dyn AreaClient,
        entry: &ResolvedItem<'_>,
        data: &[u8],
    ) -> Result<i32, TransportError> {
        let address = &entry.address;
        let area = address.register_kind.area_code();
        let db = address.register_number;
        let start = address.byte_offset;

        if entry.data_type != DataType::Bool {
            return client.write_area(area, db, start, data);
        }

        // Merge the single bit into the current device byte
        let mut current = [0u8; 1];
        let code = client.read_area(area, db, start, &mut current)?;
        if code != AREA_OK {
            return Ok(code);
        }
        let bit = get_bit(data, 0, address.bit_offset).unwrap_or(false);
        put_bit(&mut current, 0, address.bit_offset, bit);
        client.write_area(area, db, start, &current)
    }
}

impl PlcIo for DirectIo {
    fn device(&self) -> &DeviceConfig {
        &self.device
    }

    fn try_read(&self, datagram: &Datagram, timeout_ms: u64) -> PlcResult<ReadValues> {
        info!("{}", request::log_title("Read", &self.device, datagram));
        let resolved = request::resolve_items(datagram)?;

        let mut link = self.link.lock();
        let client = self.ensure_connected(&mut link)?;
        client.set_timeout(Duration::from_millis(timeout_ms));

        let mut values = ReadValues::new();
        let mut failure = None;
        for entry in &resolved {
            let mut buf = match PlcCodec::allocate(entry.data_type) {
                Ok(buf) => buf,
                Err(e) => {
                    request::log_item_failure("READ", entry, e);
                    continue;
                },
            };
            let address = &entry.address;
            let result = client.read_area(
                address.register_kind.area_code(),
                address.register_number,
                address.byte_offset,
                &mut buf,
            );
            match result {
                Ok(AREA_OK) => match PlcCodec::decode(entry.data_type, address, &buf) {
                    Ok(value) => {
                        debug!("  {} = {}", entry.code(), value);
                        values.insert(entry.code().to_string(), value);
                    },
                    Err(e) => request::log_item_failure("READ", entry, e),
                },
                Ok(code) => request::log_item_failure("READ", entry, code),
                Err(e) => {
                    failure = Some(e);
                    break;
                },
            }
        }

        if let Some(e) = failure {
            self.on_transport_error(&mut link, &e);
            return Err(e.into());
        }
        Ok(values)
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
            Ok((resolved, payloads))
        });
        let (resolved, payloads) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                e.log(&format!("[WRITE] {} not attempted:", title));
                return WriteOutcome::NotAttempted;
            },
        };

        let mut link = self.link.lock();
        let client = match self.ensure_connected(&mut link) {
            Ok(client) => client,
            Err(e) => {
                e.log(&format!("[WRITE] {} not attempted:", title));
                return WriteOutcome::NotAttempted;
            },
        };
        client.set_timeout(Duration::from_millis(timeout_ms));

        let mut applied = Vec::new();
        let mut failed = Vec::new();
        let mut transport_error = None;
        for (entry, data) in resolved.iter().zip(&payloads) {
            match Self::write_item(client, entry, data) {
                Ok(AREA_OK) => applied.push(entry.code().to_string()),
                Ok(code) => {
                    request::log_item_failure("WRITE", entry, code);
                    failed.push(ItemFailure {
                        code: entry.code().to_string(),
                        reason: format!("device code {}", code),
                    });
                    break;
                },
                Err(e) => {
                    failed.push(ItemFailure {
                        code: entry.code().to_string(),
                        reason: e.to_string(),
                    });
                    transport_error = Some(e);
                    break;
                },
            }
        }

        if let Some(e) = transport_error {
            self.on_transport_error(&mut link, &e);
            PlcError::from(e).log(&format!("[WRITE] {} failed:", title));
        }
        WriteOutcome::from_results(applied, failed)
    }

    fn connect(&self) -> PlcResult<()> {
        let mut link = self.link.lock();
        self.ensure_connected(&mut link).map(|_| ())
    }

    fn is_connected(&self) -> bool {
        let link = self.link.lock();
        link.state.is_connected() && link.client.as_ref().is_some_and(|c| c.is_connected())
    }

    fn close(&self) {
        let mut link = self.link.lock();
        self.teardown(&mut link, "closed");
    }
}

/// Capability handle over the single area client of a [`DirectIo`]
pub struct AreaHandle {
    io: Arc<DirectIo>,
}

impl AreaHandle {
    pub(crate) fn new(io: Arc<DirectIo>) -> Self {
        Self { io }
    }

    /// Run `f` with exclusive access to the connected client
    pub fn with_client<R>(&self, f: impl FnOnce(&mut dyn AreaClient) -> R) -> PlcResult<R> {
        self.io.with_client(f)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::transport::SimulatedPlc;
    use crate::value::PlcValue;
    use plc_config::{DataItem, ProtocolVariant, RegisterKind};

    fn setup() -> (SimulatedPlc, DirectIo, Datagram) {
        let plc = SimulatedPlc::new();
        let mut device = DeviceConfig::new("smart1", "192.168.2.1");
        device.protocol = ProtocolVariant::S7200Smart;
        let io = DirectIo::new(Arc::new(device), Arc::new(plc.clone()));
        let datagram = Datagram::new(
            "dg",
            "",
            vec![
                DataItem::new("count")
                    .with_location(RegisterKind::DataBlock, Some(1), "10")
                    .with_data_type(DataType::DInt),
                DataItem::new("alarm")
                    .with_location(RegisterKind::Memory, None, "3.7")
                    .with_data_type(DataType::Bool),
            ],
        );
        (plc, io, datagram)
    }

    #[test]
    fn test_lazy_connect_and_read() {
        let (plc, io, dg) = setup();
        assert_eq!(io.state(), ConnectionState::Disconnected);
        plc.set_bytes(RegisterKind::DataBlock, 1, 10, &(-5i32).to_be_bytes());
        plc.set_bit(RegisterKind::Memory, 0, 3, 7, true);

        let values = io.read_datas(&dg, 100);
        assert_eq!(values.get("count"), Some(&PlcValue::Int(-5)));
        assert_eq!(values.get("alarm"), Some(&PlcValue::Bool(true)));
        assert_eq!(io.state(), ConnectionState::Connected);
        assert_eq!(plc.stats().area_connects, 1);
    }

    #[test]
    fn test_read_skips_failed_item() {
        let (plc, io, dg) = setup();
        plc.force_area_code(RegisterKind::DataBlock, 1, 10, 3);
        let values = io.read_datas(&dg, 100);
        assert!(!values.contains_key("count"));
        assert!(values.contains_key("alarm"));
    }

    #[test]
    fn test_bool_write_merges_device_byte() {
        let (plc, io, dg) = setup();
        plc.set_bytes(RegisterKind::Memory, 0, 3, &[0b0000_0101]);

        let mut values = WriteValues::new();
        values.insert("count".into(), PlcValue::Int(7));
        values.insert("alarm".into(), PlcValue::Bool(true));
        assert!(io.write_datas(&dg, &values, 100));
        assert_eq!(plc.bytes(RegisterKind::Memory, 0, 3, 1), vec![0b1000_0101]);
        assert_eq!(plc.bytes(RegisterKind::DataBlock, 1, 10, 4), vec![0, 0, 0, 7]);
    }

    #[test]
    fn test_write_stops_at_first_device_error() {
        let (plc, io, dg) = setup();
        plc.force_area_code(RegisterKind::DataBlock, 1, 10, 6);

        let mut values = WriteValues::new();
        values.insert("count".into(), PlcValue::Int(7));
        values.insert("alarm".into(), PlcValue::Bool(true));
        let outcome = io.write_outcome(&dg, &values, 100);
        assert_eq!(
            outcome,
            WriteOutcome::PartiallyApplied {
                applied: vec![],
                failed: vec![ItemFailure {
                    code: "count".into(),
                    reason: "device code 6".into()
                }],
            }
        );
        assert!(!plc.bit(RegisterKind::Memory, 0, 3, 7));
    }

    #[test]
    fn test_transport_error_tears_down() {
        let (plc, io, dg) = setup();
        io.connect().unwrap();
        plc.set_fail_execute(true);
        assert!(io.read_datas(&dg, 100).is_empty());
        assert_eq!(io.state(), ConnectionState::Disconnected);

        plc.set_fail_execute(false);
        assert_eq!(io.read_datas(&dg, 100).len(), 2);
        assert_eq!(plc.stats().area_connects, 2);
    }
}
