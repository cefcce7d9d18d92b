//! PLC configuration model
//!
//! Declarative description of what to read and write on which controller:
//!
//! - [`types`]: register kinds, data types and protocol variants
//! - [`item`] and [`datagram`]: named values and the ordered batches they form
//! - [`device`]: connection parameters and pool sizing
//! - [`store`]: the id-keyed store handed to the facade
//! - [`loader`]: YAML/TOML/JSON loading with environment overrides
//!
//! # Example
//!
//! ```
//! use plc_config::ConfigStore;
//!
//! let store = ConfigStore::from_yaml_str(r#"
//! devices:
//!   - id: plc1
//!     host: 10.0.0.5
//! datagrams:
//!   - id: status
//!     items:
//!       - { code: running, register_kind: DB, register_number: 20, register_offset: "92", data_type: BOOL }
//! "#).unwrap();
//!
//! let datagram = store.datagram("status").unwrap();
//! assert_eq!(datagram.item("running").unwrap().tag_address(), "%DB20.92:BOOL");
//! ```

pub mod datagram;
pub mod device;
pub mod item;
pub mod loader;
pub mod serde_defaults;
pub mod store;
pub mod types;
pub mod validation;

pub use datagram::{Datagram, DatagramConfig};
pub use device::DeviceConfig;
pub use item::DataItem;
pub use loader::{load_store_from_file, load_store_with_env};
pub use store::{ConfigFile, ConfigStore, StoreDefaults};
pub use types::{DataType, ProtocolVariant, RegisterKind};
pub use validation::ValidationResult;
