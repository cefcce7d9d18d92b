//! Shared support for the PLC binaries
//!
//! - logging initialisation

pub mod logging;

pub use logging::{init_logging, LogConfig};
