//! Unified error handling for the PLC tag read/write libraries
//!
//! Every component error lives in this crate so that the address parser,
//! codec, connection pool, transports and facade share one taxonomy and one
//! classification scheme (category, retryability, log level).

use std::fmt;
use thiserror::Error;

// ============================================================================
// Address errors
// ============================================================================

/// Reason a tag address was rejected by the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressErrorReason {
    /// No register kind code matches the start of the address
    MissingKind,
    /// The character after the kind is neither a type letter nor a digit
    MissingType,
    /// The byte/bit tail is empty, non-numeric or out of range
    InvalidOffset,
    /// A data block address was given without a usable block number
    MissingRegisterNumber,
}

impl AddressErrorReason {
    /// Stable reason tag used in logs
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::MissingKind => "missing-kind",
            Self::MissingType => "missing-type",
            Self::InvalidOffset => "invalid-offset",
            Self::MissingRegisterNumber => "missing-register-number",
        }
    }
}

impl fmt::Display for AddressErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Malformed tag address. Always a configuration-time defect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Address [{address}] {reason}: '{fragment}'")]
pub struct AddressSyntaxError {
    /// Full address as supplied by the caller
    pub address: String,
    /// Offending part of the address
    pub fragment: String,
    pub reason: AddressErrorReason,
}

impl AddressSyntaxError {
    pub fn new(
        address: impl Into<String>,
        fragment: impl Into<String>,
        reason: AddressErrorReason,
    ) -> Self {
        Self {
            address: address.into(),
            fragment: fragment.into(),
            reason,
        }
    }
}

// ============================================================================
// Codec errors
// ============================================================================

/// Type/width mismatch between a value and its PLC representation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Data type {0} is not supported by the codec yet")]
    UnsupportedType(&'static str),

    #[error("Value {value} overflows {data_type}")]
    Overflow {
        data_type: &'static str,
        value: String,
    },

    #[error("Malformed {data_type} value: {value}")]
    MalformedInput {
        data_type: &'static str,
        value: String,
    },

    #[error("Buffer size mismatch for {data_type}: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch {
        data_type: &'static str,
        expected: usize,
        actual: usize,
    },
}

// ============================================================================
// Transport errors
// ============================================================================

/// Failure reported by an external transport (connect, execute, close)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection failed: {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("Execution failed: {0}")]
    Execute(String),

    #[error("Operation timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Not connected")]
    NotConnected,

    #[error("Connection to {0} does not support reading")]
    ReadNotSupported(String),

    #[error("Close failed: {0}")]
    Close(String),
}

impl TransportError {
    pub fn connect(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connect {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    pub fn execute(msg: impl Into<String>) -> Self {
        Self::Execute(msg.into())
    }

    /// Check if this error means the underlying socket should not be reused
    pub fn needs_reconnect(&self) -> bool {
        !matches!(self, Self::ReadNotSupported(_))
    }
}

// ============================================================================
// Pool errors
// ============================================================================

/// Connection pool failure (transient infrastructure condition)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("Pool exhausted for {device}: no connection within {waited_ms} ms")]
    Exhausted { device: String, waited_ms: u64 },

    #[error("Failed to create connection for {device}: {source}")]
    Creation {
        device: String,
        #[source]
        source: TransportError,
    },

    #[error("Borrowed connection for {device} is no longer connected")]
    InvalidConnection { device: String },

    #[error("Pool for {device} is closed")]
    Closed { device: String },
}

// ============================================================================
// Configuration errors
// ============================================================================

/// Missing or inconsistent configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {owner}.{field}")]
    MissingField { owner: String, field: &'static str },

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Datagram not found: {0}")]
    DatagramNotFound(String),

    #[error("Duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },

    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Load(format!("YAML error: {}", err))
    }
}

// ============================================================================
// PlcError - umbrella type
// ============================================================================

/// Any error raised by the PLC libraries
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlcError {
    #[error(transparent)]
    AddressSyntax(#[from] AddressSyntaxError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Datagram {0} has no resolvable items")]
    NoResolvableItems(String),

    #[error("No value supplied for item {code} of datagram {datagram}")]
    MissingValue { datagram: String, code: String },

    #[error("Value {value} for item {code} is outside [{min}, {max}]")]
    OutOfBounds {
        code: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for PLC library operations
pub type PlcResult<T> = std::result::Result<T, PlcError>;

/// Build a `ConfigError::InvalidValue`
#[macro_export]
macro_rules! config_error {
    ($field:expr, $msg:expr) => {
        $crate::ConfigError::InvalidValue {
            field: $field.to_string(),
            reason: $msg.to_string(),
        }
    };
    ($field:expr, $fmt:expr, $($arg:tt)*) => {
        $crate::ConfigError::InvalidValue {
            field: $field.to_string(),
            reason: format!($fmt, $($arg)*),
        }
    };
}

// ============================================================================
// Error classification
// ============================================================================

/// Error category for classification and log routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    // Configuration time
    Configuration,
    Validation,
    NotFound,

    // Data path
    Codec,

    // Infrastructure
    Connection,
    Timeout,
    ResourceExhausted,

    // System level
    Internal,
}

/// Classification shared by every error the libraries surface
pub trait PlcErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Get error code (for logs and tooling)
    fn error_code(&self) -> &'static str;

    /// Get error category
    fn category(&self) -> ErrorCategory;

    /// Whether retrying the whole call may succeed
    fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Connection | ErrorCategory::Timeout | ErrorCategory::ResourceExhausted
        )
    }

    /// Recommended retry delay in milliseconds
    fn retry_delay_ms(&self) -> u64 {
        match self.category() {
            ErrorCategory::Connection => 1500,
            ErrorCategory::Timeout => 500,
            ErrorCategory::ResourceExhausted => 2000,
            _ => 0,
        }
    }

    /// Get log level
    fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Internal | ErrorCategory::Configuration | ErrorCategory::Validation => {
                Level::ERROR
            },
            ErrorCategory::Codec
            | ErrorCategory::Connection
            | ErrorCategory::Timeout
            | ErrorCategory::ResourceExhausted => Level::WARN,
            ErrorCategory::NotFound => Level::ERROR,
        }
    }

    /// Emit this error through `tracing` at its own level
    fn log(&self, context: &str) {
        use tracing::Level;
        let code = self.error_code();
        match self.log_level() {
            Level::ERROR => tracing::error!("{} [{}] {}", context, code, self),
            Level::WARN => tracing::warn!("{} [{}] {}", context, code, self),
            Level::INFO => tracing::info!("{} [{}] {}", context, code, self),
            _ => tracing::debug!("{} [{}] {}", context, code, self),
        }
    }
}

impl PlcErrorTrait for PlcError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::AddressSyntax(_) => "ADDRESS_SYNTAX",
            Self::Codec(CodecError::UnsupportedType(_)) => "CODEC_UNSUPPORTED_TYPE",
            Self::Codec(CodecError::Overflow { .. }) => "CODEC_OVERFLOW",
            Self::Codec(CodecError::MalformedInput { .. }) => "CODEC_MALFORMED_INPUT",
            Self::Codec(CodecError::BufferSizeMismatch { .. }) => "CODEC_BUFFER_SIZE",
            Self::Pool(PoolError::Exhausted { .. }) => "POOL_EXHAUSTED",
            Self::Pool(PoolError::Creation { .. }) => "POOL_CREATION",
            Self::Pool(PoolError::InvalidConnection { .. }) => "POOL_INVALID_CONNECTION",
            Self::Pool(PoolError::Closed { .. }) => "POOL_CLOSED",
            Self::Transport(TransportError::Connect { .. }) => "TRANSPORT_CONNECT",
            Self::Transport(TransportError::Execute(_)) => "TRANSPORT_EXECUTE",
            Self::Transport(TransportError::Timeout { .. }) => "TRANSPORT_TIMEOUT",
            Self::Transport(TransportError::NotConnected) => "TRANSPORT_NOT_CONNECTED",
            Self::Transport(TransportError::ReadNotSupported(_)) => "TRANSPORT_READ_UNSUPPORTED",
            Self::Transport(TransportError::Close(_)) => "TRANSPORT_CLOSE",
            Self::Config(ConfigError::DeviceNotFound(_)) => "DEVICE_NOT_FOUND",
            Self::Config(ConfigError::DatagramNotFound(_)) => "DATAGRAM_NOT_FOUND",
            Self::Config(_) => "CONFIG_ERROR",
            Self::NoResolvableItems(_) => "NO_RESOLVABLE_ITEMS",
            Self::MissingValue { .. } => "MISSING_VALUE",
            Self::OutOfBounds { .. } => "VALUE_OUT_OF_BOUNDS",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::AddressSyntax(_) => ErrorCategory::Configuration,
            Self::Codec(_) => ErrorCategory::Codec,
            Self::Pool(PoolError::Exhausted { .. }) => ErrorCategory::ResourceExhausted,
            Self::Pool(PoolError::Closed { .. }) => ErrorCategory::Internal,
            Self::Pool(_) => ErrorCategory::Connection,
            Self::Transport(TransportError::Timeout { .. }) => ErrorCategory::Timeout,
            Self::Transport(TransportError::ReadNotSupported(_)) => ErrorCategory::Configuration,
            Self::Transport(_) => ErrorCategory::Connection,
            Self::Config(ConfigError::DeviceNotFound(_) | ConfigError::DatagramNotFound(_)) => {
                ErrorCategory::NotFound
            },
            Self::Config(_) => ErrorCategory::Configuration,
            Self::NoResolvableItems(_) | Self::MissingValue { .. } | Self::OutOfBounds { .. } => {
                ErrorCategory::Validation
            },
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }
}
