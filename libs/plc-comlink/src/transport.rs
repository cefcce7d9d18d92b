//! External transport seams
//!
//! The wire protocols themselves are provided by other libraries. This module
//! defines what the backends need from them:
//!
//! - the generic tag transport ([`PlcDriver`] / [`PlcConnection`]), which
//!   executes batches of transport tags such as `%DB20.92:BOOL`
//! - the area client ([`AreaDriver`] / [`AreaClient`]) used for S7-200 SMART,
//!   which reads and writes raw byte ranges one item at a time
//!
//! [`simulator::SimulatedPlc`] implements both against an in-memory image.

pub mod simulator;
pub mod traits;

pub use simulator::SimulatedPlc;
pub use traits::{
    AreaClient, AreaDriver, ConnectionMetadata, ConnectionState, PlcConnection, PlcDriver,
    ReadRequest, ReadResponse, RequestItem, ResponseCode, WriteRequest, WriteResponse,
};
