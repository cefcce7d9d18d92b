//! Transport traits and request/response types

use std::fmt;
use std::time::Duration;

use errors::TransportError;
use indexmap::IndexMap;
use plc_config::DataType;

use crate::address::ParsedAddress;

// ============================================================================
// Connection state
// ============================================================================

/// Lifecycle of a single persistent connection
///
/// There is no separate reconnecting state: a reconnect is a fresh
/// `Connecting` attempt made lazily by the next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionState::Connecting => write!(f, "CONNECTING"),
            ConnectionState::Connected => write!(f, "CONNECTED"),
        }
    }
}

// ============================================================================
// Tag transport
// ============================================================================

/// Per-item result code reported by the tag transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    Ok,
    NotFound,
    AccessDenied,
    InvalidAddress,
    InvalidDataType,
    InvalidData,
    RemoteBusy,
    RemoteError,
    InternalError,
    Unsupported,
}

impl ResponseCode {
    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseCode::Ok)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NotFound => "NOT_FOUND",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::InvalidAddress => "INVALID_ADDRESS",
            Self::InvalidDataType => "INVALID_DATATYPE",
            Self::InvalidData => "INVALID_DATA",
            Self::RemoteBusy => "REMOTE_BUSY",
            Self::RemoteError => "REMOTE_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Unsupported => "UNSUPPORTED",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resolved item of a batch request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestItem {
    /// Item code, the key of the per-item response
    pub code: String,
    /// Transport tag, e.g. `%DB20.92:BOOL`
    pub tag: String,
    pub address: ParsedAddress,
    pub data_type: DataType,
    /// Encoded value for writes, empty for reads
    pub data: Vec<u8>,
}

/// Batch read, items in datagram declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadRequest {
    pub items: Vec<RequestItem>,
}

/// Batch write, items in datagram declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteRequest {
    pub items: Vec<RequestItem>,
}

/// Per-item codes and raw bytes of a batch read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadResponse {
    entries: IndexMap<String, (ResponseCode, Vec<u8>)>,
}

impl ReadResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: impl Into<String>, response: ResponseCode, data: Vec<u8>) {
        self.entries.insert(code.into(), (response, data));
    }

    /// Response code of an item; an item missing from the response is `NotFound`
    pub fn response_code(&self, code: &str) -> ResponseCode {
        self.entries
            .get(code)
            .map(|(rc, _)| *rc)
            .unwrap_or(ResponseCode::NotFound)
    }

    pub fn data(&self, code: &str) -> Option<&[u8]> {
        self.entries.get(code).map(|(_, data)| data.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-item codes of a batch write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteResponse {
    codes: IndexMap<String, ResponseCode>,
}

impl WriteResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: impl Into<String>, response: ResponseCode) {
        self.codes.insert(code.into(), response);
    }

    /// Response code of an item; an item missing from the response is `NotFound`
    pub fn response_code(&self, code: &str) -> ResponseCode {
        self.codes
            .get(code)
            .copied()
            .unwrap_or(ResponseCode::NotFound)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Capabilities reported by a tag connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionMetadata {
    pub read_supported: bool,
    pub write_supported: bool,
}

impl Default for ConnectionMetadata {
    fn default() -> Self {
        Self {
            read_supported: true,
            write_supported: true,
        }
    }
}

/// Opens tag transport connections from a connection string
pub trait PlcDriver: Send + Sync {
    fn connect(&self, connection_string: &str) -> Result<Box<dyn PlcConnection>, TransportError>;
}

/// One live tag transport connection
pub trait PlcConnection: Send {
    /// Protocol level liveness probe
    fn is_connected(&self) -> bool;

    fn metadata(&self) -> ConnectionMetadata;

    fn read(
        &mut self,
        request: &ReadRequest,
        timeout: Duration,
    ) -> Result<ReadResponse, TransportError>;

    fn write(
        &mut self,
        request: &WriteRequest,
        timeout: Duration,
    ) -> Result<WriteResponse, TransportError>;

    fn close(&mut self) -> Result<(), TransportError>;

    /// Endpoint description for logs
    fn describe(&self) -> String {
        "tag connection".to_string()
    }
}

// ============================================================================
// Area transport
// ============================================================================

/// Opens area clients by host, rack and slot
pub trait AreaDriver: Send + Sync {
    fn connect(&self, host: &str, rack: u16, slot: u16)
        -> Result<Box<dyn AreaClient>, TransportError>;
}

/// Byte range client for controllers without a tag transport
///
/// `read_area` and `write_area` return the device result code, 0 meaning
/// success. An `Err` is a transport level failure (socket, timeout).
pub trait AreaClient: Send {
    fn is_connected(&self) -> bool;

    /// Fill `buffer` from `area` (S7 area code), block `db_number`, byte `start`
    fn read_area(
        &mut self,
        area: u8,
        db_number: u16,
        start: u32,
        buffer: &mut [u8],
    ) -> Result<i32, TransportError>;

    fn write_area(
        &mut self,
        area: u8,
        db_number: u16,
        start: u32,
        data: &[u8],
    ) -> Result<i32, TransportError>;

    fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Bound the next operations; clients without a timeout ignore it
    fn set_timeout(&mut self, _timeout: Duration) {}
}
