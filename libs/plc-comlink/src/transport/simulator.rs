//! In-memory PLC for tests and offline runs
//!
//! `SimulatedPlc` implements both transport families over one byte image
//! keyed by `(area code, block number)`. Memory grows on demand and reads
//! of untouched bytes return zero.
//!
//! Fault injection: refused connects, execute failures, timeouts, a
//! read-unsupported tag transport, per item forced response codes,
//! per location forced area codes, latency, and `disconnect_all` which
//! breaks every open connection at once.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use errors::TransportError;
use parking_lot::Mutex;
use plc_config::RegisterKind;
use tracing::debug;

use super::traits::{
    AreaClient, AreaDriver, ConnectionMetadata, PlcConnection, PlcDriver, ReadRequest,
    ReadResponse, RequestItem, ResponseCode, WriteRequest, WriteResponse,
};
use crate::address::parse_transport_tag;
use crate::bytes::{get_bit, put_bit};

/// Device result code reported by simulated area operations on success
pub const AREA_OK: i32 = 0;

/// Call counters of a [`SimulatedPlc`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub tag_connects: usize,
    pub area_connects: usize,
    pub reads: usize,
    pub writes: usize,
    pub area_reads: usize,
    pub area_writes: usize,
    pub closes: usize,
    /// Connections currently open (both families)
    pub open: usize,
    /// Highest value `open` ever reached
    pub peak_open: usize,
}

#[derive(Default)]
struct SimState {
    image: HashMap<(u8, u16), Vec<u8>>,
    fail_connect: bool,
    fail_execute: bool,
    time_out: bool,
    read_unsupported: bool,
    latency: Option<Duration>,
    forced: HashMap<String, ResponseCode>,
    forced_area: HashMap<(u8, u16, u32), i32>,
    generation: u64,
    stats: SimStats,
}

impl SimState {
    fn segment(&mut self, area: u8, db: u16, end: usize) -> &mut Vec<u8> {
        let seg = self.image.entry((area, db)).or_default();
        if seg.len() < end {
            seg.resize(end, 0);
        }
        seg
    }

    fn load(&mut self, area: u8, db: u16, start: usize, buffer: &mut [u8]) {
        let end = start + buffer.len();
        let seg = self.segment(area, db, end);
        buffer.copy_from_slice(&seg[start..end]);
    }

    fn store(&mut self, area: u8, db: u16, start: usize, data: &[u8]) {
        let end = start + data.len();
        let seg = self.segment(area, db, end);
        seg[start..end].copy_from_slice(data);
    }

    fn opened(&mut self) -> u64 {
        self.stats.open += 1;
        self.stats.peak_open = self.stats.peak_open.max(self.stats.open);
        self.generation
    }

    fn closed(&mut self) {
        self.stats.closes += 1;
        self.stats.open = self.stats.open.saturating_sub(1);
    }

    /// Common execute gate: liveness, then injected faults
    fn check_execute(&self, generation: u64, timeout: Duration) -> Result<(), TransportError> {
        if generation != self.generation {
            return Err(TransportError::NotConnected);
        }
        if self.time_out {
            return Err(TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        if self.fail_execute {
            return Err(TransportError::execute("simulated execute failure"));
        }
        Ok(())
    }
}

/// Shared handle to one simulated controller; clones see the same state
#[derive(Clone, Default)]
pub struct SimulatedPlc {
    inner: Arc<Mutex<SimState>>,
}

impl SimulatedPlc {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    pub fn set_fail_connect(&self, fail: bool) {
        self.inner.lock().fail_connect = fail;
    }

    pub fn set_fail_execute(&self, fail: bool) {
        self.inner.lock().fail_execute = fail;
    }

    /// Make every execute fail with `TransportError::Timeout`
    pub fn set_timeout(&self, time_out: bool) {
        self.inner.lock().time_out = time_out;
    }

    /// Tag connections report `read_supported = false` when set
    pub fn set_read_unsupported(&self, unsupported: bool) {
        self.inner.lock().read_unsupported = unsupported;
    }

    /// Sleep this long inside every execute
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.inner.lock().latency = latency;
    }

    /// Answer `code_or_tag` with `code` instead of touching memory
    pub fn force_response(&self, code_or_tag: impl Into<String>, code: ResponseCode) {
        self.inner.lock().forced.insert(code_or_tag.into(), code);
    }

    /// Answer area operations at `(kind, db, start)` with a device result code
    pub fn force_area_code(&self, kind: RegisterKind, db: u16, start: u32, code: i32) {
        self.inner
            .lock()
            .forced_area
            .insert((kind.area_code(), db, start), code);
    }

    pub fn clear_faults(&self) {
        let mut state = self.inner.lock();
        state.fail_connect = false;
        state.fail_execute = false;
        state.time_out = false;
        state.read_unsupported = false;
        state.latency = None;
        state.forced.clear();
        state.forced_area.clear();
    }

    /// Break every open connection; later calls on them fail `NotConnected`
    pub fn disconnect_all(&self) {
        let mut state = self.inner.lock();
        state.generation += 1;
        state.stats.open = 0;
        debug!("[SIM] All connections dropped");
    }

    // ========================================================================
    // Memory image
    // ========================================================================

    pub fn set_bytes(&self, kind: RegisterKind, db: u16, start: u32, data: &[u8]) {
        self.inner
            .lock()
            .store(kind.area_code(), db, start as usize, data);
    }

    pub fn bytes(&self, kind: RegisterKind, db: u16, start: u32, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.inner
            .lock()
            .load(kind.area_code(), db, start as usize, &mut buf);
        buf
    }

    pub fn set_bit(&self, kind: RegisterKind, db: u16, byte: u32, bit: u8, value: bool) {
        let mut state = self.inner.lock();
        let seg = state.segment(kind.area_code(), db, byte as usize + 1);
        put_bit(seg, byte as usize, bit, value);
    }

    pub fn bit(&self, kind: RegisterKind, db: u16, byte: u32, bit: u8) -> bool {
        let state = self.inner.lock();
        state
            .image
            .get(&(kind.area_code(), db))
            .and_then(|seg| get_bit(seg, byte as usize, bit))
            .unwrap_or(false)
    }

    pub fn stats(&self) -> SimStats {
        self.inner.lock().stats
    }

    fn latency(&self) {
        let latency = self.inner.lock().latency;
        if let Some(latency) = latency {
            thread::sleep(latency);
        }
    }
}

// ============================================================================
// Tag transport
// ============================================================================

impl PlcDriver for SimulatedPlc {
    fn connect(&self, connection_string: &str) -> Result<Box<dyn PlcConnection>, TransportError> {
        let mut state = self.inner.lock();
        if state.fail_connect {
            return Err(TransportError::connect(
                connection_string,
                "simulated connection refused",
            ));
        }
        state.stats.tag_connects += 1;
        let generation = state.opened();
        debug!("[SIM] Tag connection opened: {}", connection_string);
        Ok(Box::new(SimTagConnection {
            plc: self.clone(),
            endpoint: connection_string.to_string(),
            generation,
            open: true,
        }))
    }
}

struct SimTagConnection {
    plc: SimulatedPlc,
    endpoint: String,
    generation: u64,
    open: bool,
}

impl SimTagConnection {
    fn gate(&self, timeout: Duration) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotConnected);
        }
        self.plc.inner.lock().check_execute(self.generation, timeout)
    }

    fn forced(state: &SimState, item: &RequestItem) -> Option<ResponseCode> {
        state
            .forced
            .get(&item.code)
            .or_else(|| state.forced.get(&item.tag))
            .copied()
    }
}

impl PlcConnection for SimTagConnection {
    fn is_connected(&self) -> bool {
        self.open && self.plc.inner.lock().generation == self.generation
    }

    fn metadata(&self) -> ConnectionMetadata {
        ConnectionMetadata {
            read_supported: !self.plc.inner.lock().read_unsupported,
            write_supported: true,
        }
    }

    fn read(
        &mut self,
        request: &ReadRequest,
        timeout: Duration,
    ) -> Result<ReadResponse, TransportError> {
        self.plc.latency();
        self.gate(timeout)?;

        let mut state = self.plc.inner.lock();
        state.stats.reads += 1;
        let mut response = ReadResponse::new();
        for item in &request.items {
            if let Some(code) = Self::forced(&state, item) {
                response.insert(item.code.as_str(), code, Vec::new());
                continue;
            }
            let Ok(address) = parse_transport_tag(&item.tag) else {
                response.insert(item.code.as_str(), ResponseCode::InvalidAddress, Vec::new());
                continue;
            };
            let Some(width) = item.data_type.wire_width() else {
                response.insert(item.code.as_str(), ResponseCode::Unsupported, Vec::new());
                continue;
            };
            let mut buf = vec![0u8; width];
            state.load(
                address.register_kind.area_code(),
                address.register_number,
                address.byte_offset as usize,
                &mut buf,
            );
            response.insert(item.code.as_str(), ResponseCode::Ok, buf);
        }
        Ok(response)
    }

    fn write(
        &mut self,
        request: &WriteRequest,
        timeout: Duration,
    ) -> Result<WriteResponse, TransportError> {
        self.plc.latency();
        self.gate(timeout)?;

        let mut state = self.plc.inner.lock();
        state.stats.writes += 1;
        let mut response = WriteResponse::new();
        for item in &request.items {
            if let Some(code) = Self::forced(&state, item) {
                response.insert(item.code.as_str(), code);
                continue;
            }
            let Ok(address) = parse_transport_tag(&item.tag) else {
                response.insert(item.code.as_str(), ResponseCode::InvalidAddress);
                continue;
            };
            if item.data_type.wire_width() != Some(item.data.len()) {
                response.insert(item.code.as_str(), ResponseCode::InvalidData);
                continue;
            }
            let area = address.register_kind.area_code();
            let db = address.register_number;
            let start = address.byte_offset as usize;
            if item.data_type == plc_config::DataType::Bool {
                let value = get_bit(&item.data, 0, address.bit_offset).unwrap_or(false);
                let seg = state.segment(area, db, start + 1);
                put_bit(seg, start, address.bit_offset, value);
            } else {
                state.store(area, db, start, &item.data);
            }
            response.insert(item.code.as_str(), ResponseCode::Ok);
        }
        Ok(response)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let mut state = self.plc.inner.lock();
        if state.generation == self.generation {
            state.closed();
        } else {
            state.stats.closes += 1;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("simulated {}", self.endpoint)
    }
}

// ============================================================================
// Area transport
// ============================================================================

impl AreaDriver for SimulatedPlc {
    fn connect(
        &self,
        host: &str,
        rack: u16,
        slot: u16,
    ) -> Result<Box<dyn AreaClient>, TransportError> {
        let endpoint = format!("{}:{}/{}", host, rack, slot);
        let mut state = self.inner.lock();
        if state.fail_connect {
            return Err(TransportError::connect(
                endpoint,
                "simulated connection refused",
            ));
        }
        state.stats.area_connects += 1;
        let generation = state.opened();
        debug!("[SIM] Area client connected: {}", endpoint);
        Ok(Box::new(SimAreaClient {
            plc: self.clone(),
            generation,
            open: true,
            timeout: Duration::from_millis(plc_config::serde_defaults::timeout_ms()),
        }))
    }
}

struct SimAreaClient {
    plc: SimulatedPlc,
    generation: u64,
    open: bool,
    timeout: Duration,
}

impl SimAreaClient {
    fn gate(&self, state: &SimState) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotConnected);
        }
        state.check_execute(self.generation, self.timeout)
    }
}

impl AreaClient for SimAreaClient {
    fn is_connected(&self) -> bool {
        self.open && self.plc.inner.lock().generation == self.generation
    }

    fn read_area(
        &mut self,
        area: u8,
        db_number: u16,
        start: u32,
        buffer: &mut [u8],
    ) -> Result<i32, TransportError> {
        self.plc.latency();
        let mut state = self.plc.inner.lock();
        self.gate(&state)?;
        state.stats.area_reads += 1;
        if let Some(code) = state.forced_area.get(&(area, db_number, start)) {
            return Ok(*code);
        }
        state.load(area, db_number, start as usize, buffer);
        Ok(AREA_OK)
    }

    fn write_area(
        &mut self,
        area: u8,
        db_number: u16,
        start: u32,
        data: &[u8],
    ) -> Result<i32, TransportError> {
        self.plc.latency();
        let mut state = self.plc.inner.lock();
        self.gate(&state)?;
        state.stats.area_writes += 1;
        if let Some(code) = state.forced_area.get(&(area, db_number, start)) {
            return Ok(*code);
        }
        state.store(area, db_number, start as usize, data);
        Ok(AREA_OK)
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let mut state = self.plc.inner.lock();
        if state.generation == self.generation {
            state.closed();
        } else {
            state.stats.closes += 1;
        }
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}
