//! Configuration store: devices and datagrams keyed by id
//!
//! The store is built once, then shared read-only (`Arc<ConfigStore>`) with
//! the facade that resolves identifiers through it.

use std::collections::BTreeMap;
use std::sync::Arc;

use errors::ConfigError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::datagram::{Datagram, DatagramConfig};
use crate::device::DeviceConfig;
use crate::validation::ValidationResult;

/// File level defaults applied to devices that leave the field unset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
}

/// On-disk shape of a configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub defaults: StoreDefaults,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub datagrams: Vec<DatagramConfig>,
}

/// Devices and datagrams by id
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    devices: BTreeMap<String, Arc<DeviceConfig>>,
    datagrams: BTreeMap<String, Arc<Datagram>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a parsed configuration file
    ///
    /// Fails on duplicate device or datagram ids.
    pub fn from_config(file: ConfigFile) -> Result<Self, ConfigError> {
        let ConfigFile {
            defaults,
            devices,
            datagrams,
        } = file;

        let mut store = Self::new();
        for mut device in devices {
            apply_defaults(&mut device, &defaults);
            store.insert_device(device)?;
        }
        for datagram in datagrams {
            store.insert_datagram(Datagram::from(datagram))?;
        }

        debug!(
            "[CONFIG] Store built: {} devices, {} datagrams",
            store.devices.len(),
            store.datagrams.len()
        );
        Ok(store)
    }

    /// Parse YAML text directly
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_yaml::from_str(yaml)?;
        Self::from_config(file)
    }

    pub fn insert_device(&mut self, device: DeviceConfig) -> Result<(), ConfigError> {
        if self.devices.contains_key(&device.id) {
            return Err(ConfigError::DuplicateId {
                kind: "device",
                id: device.id,
            });
        }
        self.devices.insert(device.id.clone(), Arc::new(device));
        Ok(())
    }

    pub fn insert_datagram(&mut self, datagram: Datagram) -> Result<(), ConfigError> {
        if self.datagrams.contains_key(datagram.id()) {
            return Err(ConfigError::DuplicateId {
                kind: "datagram",
                id: datagram.id().to_string(),
            });
        }
        self.datagrams
            .insert(datagram.id().to_string(), Arc::new(datagram));
        Ok(())
    }

    pub fn device(&self, id: &str) -> Option<Arc<DeviceConfig>> {
        self.devices.get(id).cloned()
    }

    pub fn datagram(&self, id: &str) -> Option<Arc<Datagram>> {
        self.datagrams.get(id).cloned()
    }

    pub fn require_device(&self, id: &str) -> Result<Arc<DeviceConfig>, ConfigError> {
        self.device(id)
            .ok_or_else(|| ConfigError::DeviceNotFound(id.to_string()))
    }

    pub fn require_datagram(&self, id: &str) -> Result<Arc<Datagram>, ConfigError> {
        self.datagram(id)
            .ok_or_else(|| ConfigError::DatagramNotFound(id.to_string()))
    }

    /// Devices ordered by id
    pub fn devices(&self) -> impl Iterator<Item = &Arc<DeviceConfig>> {
        self.devices.values()
    }

    /// Datagrams ordered by id
    pub fn datagrams(&self) -> impl Iterator<Item = &Arc<Datagram>> {
        self.datagrams.values()
    }

    /// Structural checks that do not need the address parser
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        for device in self.devices() {
            if let Err(e) = device.validate_for_connect() {
                result.add_error(format!("device '{}': {}", device.id, e));
            }
            if let (Some(min), Some(max)) = (device.min_idle, device.max_connections) {
                if min > max {
                    result.add_warning(format!(
                        "device '{}': min_idle {} exceeds max_connections {}, clamped",
                        device.id, min, max
                    ));
                }
            }
        }

        for datagram in self.datagrams() {
            result.merge(validate_datagram(datagram));
        }

        result
    }
}

fn apply_defaults(device: &mut DeviceConfig, defaults: &StoreDefaults) {
    if device.timeout.is_none() {
        device.timeout = defaults.timeout_ms;
    }
    if device.call_timeout.is_none() {
        device.call_timeout = defaults.call_timeout_ms;
    }
    if device.max_connections.is_none() {
        device.max_connections = defaults.max_connections;
    }
}

fn validate_datagram(datagram: &Datagram) -> ValidationResult {
    let mut result = ValidationResult::new();
    let id = datagram.id();

    if datagram.is_empty() {
        result.add_error(format!("datagram '{}': no items declared", id));
        return result;
    }

    for code in datagram.duplicate_codes() {
        result.add_error(format!("datagram '{}': duplicate item code '{}'", id, code));
    }

    let mut resolvable = 0usize;
    for item in datagram.items() {
        if item.code().trim().is_empty() {
            result.add_error(format!("datagram '{}': item with empty code", id));
        }
        if item.is_resolvable() {
            resolvable += 1;
        } else {
            result.add_warning(format!(
                "datagram '{}': item '{}' is incomplete and will be skipped",
                id,
                item.code()
            ));
        }
        if let (Some(min), Some(max)) = (item.min_value(), item.max_value()) {
            if min > max {
                result.add_error(format!(
                    "datagram '{}': item '{}' has min_value {} above max_value {}",
                    id,
                    item.code(),
                    min,
                    max
                ));
            }
        }
        if !item.is_numeric() && (item.min_value().is_some() || item.max_value().is_some()) {
            result.add_warning(format!(
                "datagram '{}': bounds on non-numeric item '{}' are ignored",
                id,
                item.code()
            ));
        }
    }

    if resolvable == 0 {
        result.add_error(format!("datagram '{}': no resolvable items", id));
    }

    result
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::types::{DataType, ProtocolVariant, RegisterKind};

    const SAMPLE: &str = r#"
defaults:
  timeout_ms: 3000
devices:
  - id: plc1
    comment: "Press line "
    host: 10.0.0.5
    max_connections: 4
  - id: smart
    host: 10.0.0.6
    protocol: S7-200-SMART
    timeout_ms: 800
    call_timeout_ms: 2000
datagrams:
  - id: status
    comment: "Status "
    items:
      - code: running
        register_kind: RD
        register_number: 20
        register_offset: "92"
        data_type: DBool
      - code: speed
        register_kind: DB
        register_number: 20
        register_offset: "94"
        data_type: INT
        min_value: 0
        max_value: 3000
"#;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let store = ConfigStore::from_yaml_str(SAMPLE).unwrap();

        let plc1 = store.device("plc1").unwrap();
        assert_eq!(plc1.timeout_ms(), 3000);
        assert_eq!(plc1.protocol, ProtocolVariant::S7);
        assert_eq!(plc1.pool_max_total(), 4);

        let smart = store.device("smart").unwrap();
        assert_eq!(smart.timeout_ms(), 800);
        assert_eq!(smart.call_timeout_ms(), 2000);
        assert_eq!(smart.protocol, ProtocolVariant::S7200Smart);

        let status = store.datagram("status").unwrap();
        assert_eq!(status.len(), 2);
        assert_eq!(status.item("running").unwrap().tag_address(), "%DB20.92:BOOL");
        assert_eq!(
            status.item("speed").unwrap().register_kind(),
            Some(RegisterKind::DataBlock)
        );
        assert_eq!(
            status.item("speed").unwrap().data_type(),
            Some(DataType::Int)
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let yaml = "devices:\n  - {id: a, host: h}\n  - {id: a, host: h2}\n";
        let err = ConfigStore::from_yaml_str(yaml).unwrap_err();
        assert_eq!(
            err,
            ConfigError::DuplicateId {
                kind: "device",
                id: "a".into()
            }
        );

        let yaml = "datagrams:\n  - {id: d}\n  - {id: d}\n";
        assert!(matches!(
            ConfigStore::from_yaml_str(yaml),
            Err(ConfigError::DuplicateId { kind: "datagram", .. })
        ));
    }

    #[test]
    fn test_require_lookups() {
        let store = ConfigStore::from_yaml_str(SAMPLE).unwrap();
        assert!(store.require_device("plc1").is_ok());
        assert_eq!(
            store.require_device("nope").unwrap_err(),
            ConfigError::DeviceNotFound("nope".into())
        );
        assert_eq!(
            store.require_datagram("nope").unwrap_err(),
            ConfigError::DatagramNotFound("nope".into())
        );
    }

    #[test]
    fn test_validate_clean_store() {
        let store = ConfigStore::from_yaml_str(SAMPLE).unwrap();
        let result = store.validate();
        assert!(result.is_valid, "{:?}", result.errors);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn test_validate_reports_problems() {
        let yaml = r#"
devices:
  - id: nohost
datagrams:
  - id: broken
    items:
      - {code: a, register_kind: M, register_offset: "1.0", data_type: BOOL}
      - {code: a, register_kind: M, register_offset: "1.1", data_type: BOOL}
      - {code: b, register_kind: DB, register_offset: "2", data_type: INT}
      - {code: c, register_kind: M, register_offset: "4", data_type: INT, min_value: 10, max_value: 1}
  - id: hollow
    items:
      - {code: x, data_type: INT}
"#;
        let store = ConfigStore::from_yaml_str(yaml).unwrap();
        let result = store.validate();
        assert!(!result.is_valid);

        let errors = result.errors.join("\n");
        assert!(errors.contains("nohost"));
        assert!(errors.contains("duplicate item code 'a'"));
        assert!(errors.contains("min_value 10 above max_value 1"));
        assert!(errors.contains("'hollow': no resolvable items"));

        let warnings = result.warnings.join("\n");
        assert!(warnings.contains("item 'b' is incomplete"));
        assert!(warnings.contains("item 'x' is incomplete"));
    }
}
