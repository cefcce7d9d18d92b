//! Error types for the PLC communication link
//!
//! The taxonomy lives in the `errors` crate so configuration and
//! communication share one set of types; this module re-exports it.

pub use errors::{
    AddressErrorReason, AddressSyntaxError, CodecError, ConfigError, ErrorCategory, PlcError,
    PlcErrorTrait, PlcResult, PoolError, TransportError,
};

/// Result type for the communication link
pub type Result<T> = PlcResult<T>;
