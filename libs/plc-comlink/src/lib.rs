//! PLC Communication Link Library
//!
//! Reads and writes named values on S7 family controllers without callers
//! knowing register layouts or byte encodings.
//!
//! # Architecture
//!
//! - **Address**: tag address parsing (`DBW34.0`, `%DB20.92:BOOL`)
//! - **Bytes / Codec**: typed values to and from item buffers
//! - **Transport**: the seams to the external wire libraries, plus an
//!   in-memory simulator
//! - **Pool**: bounded blocking connection pool
//! - **IO**: pooled (S7) and single connection (S7-200 SMART) backends
//! - **Facade**: `read_datas` / `write_datas` by device and datagram id
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use plc_comlink::{Drivers, PlcFacade, PlcValue, SimulatedPlc, WriteValues};
//! use plc_config::ConfigStore;
//!
//! let store = ConfigStore::from_yaml_str(r#"
//! devices:
//!   - { id: plc1, host: 10.0.0.5 }
//! datagrams:
//!   - id: setpoints
//!     items:
//!       - { code: speed, register_kind: DB, register_number: 1, register_offset: "0", data_type: INT }
//! "#).unwrap();
//!
//! let plc = SimulatedPlc::new();
//! let facade = PlcFacade::new(Arc::new(store), Drivers::simulated(&plc));
//!
//! let mut values = WriteValues::new();
//! values.insert("speed".into(), PlcValue::Int(1200));
//! assert!(facade.write_datas("plc1", "setpoints", &values));
//! assert_eq!(facade.read_datas("plc1", "setpoints")["speed"], PlcValue::Int(1200));
//! ```

pub mod address;
pub mod bytes;
pub mod codec;
pub mod error;
pub mod facade;
pub mod io;
pub mod pool;
pub mod transport;
pub mod value;

// Re-export core types
pub use address::{parse, parse_item, parse_transport_tag, ParsedAddress};
pub use bytes::ByteOrder;
pub use codec::PlcCodec;
pub use error::{PlcError, Result};
pub use facade::{Drivers, PlcFacade, RawConnection};
pub use io::{DirectIo, ItemFailure, PlcIo, PooledIo, WriteOutcome, WriteValues};
pub use pool::{ConnectionPool, PoolConfig, PoolStats, PooledConnection};
pub use transport::{
    AreaClient, AreaDriver, ConnectionState, PlcConnection, PlcDriver, ResponseCode,
    SimulatedPlc,
};
pub use value::{PlcValue, ReadValues};
