//! Loader tests: file formats, file-level defaults and environment overrides
//!
//! Every test that touches the environment uses its own prefix so tests can
//! run in parallel without seeing each other's variables.

// Allow unwrap() in tests for cleaner test code
#![allow(clippy::disallowed_methods)]

use std::io::Write;

use plc_config::loader::{load_config_file, load_store_with_env};
use plc_config::{DataType, ProtocolVariant, RegisterKind};
use tempfile::NamedTempFile;

const YAML: &str = r#"
defaults:
  timeout_ms: 4000
devices:
  - id: press
    comment: "Press "
    host: 10.0.0.5
    rack: 0
    slot: 1
    username: op
    password: secret
    max_connections: 8
    min_idle: 2
    max_idle: 4
  - id: smart
    host: 10.0.0.9
    protocol: S7-200-SMART
    reconnect_on_error: 0
datagrams:
  - id: press_status
    comment: "Press status "
    items:
      - code: running
        name: Running
        register_kind: RD
        register_number: 20
        register_offset: 92
        data_type: DBool
      - code: pressure
        name: Pressure
        register_kind: DB
        register_number: 20
        register_offset: "94"
        data_type: DReal
        min_value: 0
        max_value: "250.5"
"#;

fn temp_file(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

// ============================================================================
// Formats
// ============================================================================

#[test]
fn test_load_yaml_file() {
    let file = temp_file(".yaml", YAML);
    let store = load_store_with_env(file.path(), "PLCTEST_YAML_").unwrap();

    let press = store.device("press").unwrap();
    assert_eq!(press.timeout_ms(), 4000);
    assert_eq!(
        press.connection_string(),
        "s7://op:secret@10.0.0.5:102?timeout=4000&remote-rack=0&remote-slot=1"
    );
    assert_eq!(press.pool_max_total(), 8);
    assert_eq!(press.pool_min_idle(), 2);

    let smart = store.device("smart").unwrap();
    assert_eq!(smart.protocol, ProtocolVariant::S7200Smart);
    assert!(!smart.reconnect_on_error);

    let datagram = store.datagram("press_status").unwrap();
    let running = datagram.item("running").unwrap();
    assert_eq!(running.register_offset(), Some("92"));
    assert_eq!(running.tag_address(), "%DB20.92:BOOL");
    assert_eq!(running.datagram_id(), Some("press_status"));

    let pressure = datagram.item("pressure").unwrap();
    assert_eq!(pressure.data_type(), Some(DataType::Real));
    assert_eq!(pressure.max_value(), Some(250.5));
    assert!(pressure.is_within_bounds(250.5));
    assert!(!pressure.is_within_bounds(251.0));
}

#[test]
fn test_load_toml_file() {
    let toml = r#"
[[devices]]
id = "plc1"
host = "192.168.1.10"
timeout_ms = 1500

[[datagrams]]
id = "flags"

[[datagrams.items]]
code = "door"
register_kind = "M"
register_offset = "16.0"
data_type = "BOOL"
"#;
    let file = temp_file(".toml", toml);
    let store = load_store_with_env(file.path(), "PLCTEST_TOML_").unwrap();

    assert_eq!(store.device("plc1").unwrap().timeout_ms(), 1500);
    let door = store.datagram("flags").unwrap();
    let door = door.item("door").unwrap();
    assert_eq!(door.register_kind(), Some(RegisterKind::Memory));
    assert_eq!(door.tag_address(), "%M0.16.0:BOOL");
}

#[test]
fn test_load_json_file() {
    let json = r#"{
  "devices": [{ "id": "plc1", "host": "h", "protocol": "s7" }],
  "datagrams": [{ "id": "d", "items": [
    { "code": "w", "register_kind": "DB", "register_number": 1, "register_offset": "0", "data_type": "WORD" }
  ]}]
}"#;
    let file = temp_file(".json", json);
    let config = load_config_file(file.path()).unwrap();
    assert_eq!(config.devices.len(), 1);
    assert_eq!(config.datagrams[0].items[0].tag_address(), "%DB1.0:WORD");
}

#[test]
fn test_wide_plc_codes_keep_their_width() {
    let yaml = r#"
devices:
  - { id: plc1, host: 10.0.0.5 }
datagrams:
  - id: counters
    items:
      - { code: total, register_kind: DB, register_number: 1, register_offset: "0", data_type: DINT }
      - { code: unsigned, register_kind: DB, register_number: 1, register_offset: "4", data_type: UDINT }
      - { code: mask, register_kind: DB, register_number: 1, register_offset: "8", data_type: DWORD }
      - { code: short, register_kind: DB, register_number: 1, register_offset: "12", data_type: DInt }
"#;
    let file = temp_file(".yaml", yaml);
    let store = load_store_with_env(file.path(), "PLCTEST_WIDE_").unwrap();
    let datagram = store.datagram("counters").unwrap();

    let total = datagram.item("total").unwrap();
    assert_eq!(total.data_type(), Some(DataType::DInt));
    assert_eq!(total.tag_address(), "%DB1.0:DINT");

    let unsigned = datagram.item("unsigned").unwrap();
    assert_eq!(unsigned.data_type(), Some(DataType::UDInt));
    assert_eq!(unsigned.tag_address(), "%DB1.4:UDINT");

    let mask = datagram.item("mask").unwrap();
    assert_eq!(mask.data_type(), Some(DataType::DWord));
    assert_eq!(mask.tag_address(), "%DB1.8:DWORD");

    // value id of INT
    let short = datagram.item("short").unwrap();
    assert_eq!(short.data_type(), Some(DataType::Int));
    assert_eq!(short.tag_address(), "%DB1.12:INT");
}

#[test]
fn test_invalid_enum_value_fails_load() {
    let yaml = "devices:\n  - id: a\n    host: h\n    protocol: modbus\n";
    let file = temp_file(".yaml", yaml);
    let err = load_store_with_env(file.path(), "PLCTEST_BADENUM_").unwrap_err();
    assert!(err.to_string().contains("protocol variant"), "{}", err);
}

// ============================================================================
// Environment overrides
// ============================================================================

#[test]
fn test_env_overrides_defaults() {
    let file = temp_file(".yaml", YAML);

    std::env::set_var("PLCTEST_ENV_DEFAULTS__CALL_TIMEOUT_MS", "8000");
    std::env::set_var("PLCTEST_ENV_DEFAULTS__TIMEOUT_MS", "2500");
    let store = load_store_with_env(file.path(), "PLCTEST_ENV_").unwrap();
    std::env::remove_var("PLCTEST_ENV_DEFAULTS__CALL_TIMEOUT_MS");
    std::env::remove_var("PLCTEST_ENV_DEFAULTS__TIMEOUT_MS");

    let press = store.device("press").unwrap();
    assert_eq!(press.call_timeout_ms(), 8000);
    assert_eq!(press.timeout_ms(), 2500);
}

#[test]
fn test_no_env_keeps_file_values() {
    let file = temp_file(".yml", YAML);
    let store = load_store_with_env(file.path(), "PLCTEST_NOENV_").unwrap();
    let press = store.device("press").unwrap();
    assert_eq!(press.call_timeout_ms(), 10_000);
    assert_eq!(press.timeout_ms(), 4000);
}

// ============================================================================
// Shipped sample
// ============================================================================

#[test]
fn test_sample_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/plc.yaml");
    let store = load_store_with_env(path, "PLCTEST_SAMPLE_").unwrap();

    let report = store.validate();
    assert!(report.is_valid, "{:?}", report.errors);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);

    assert_eq!(
        store.device("conveyor").unwrap().protocol,
        ProtocolVariant::S7200Smart
    );
    let setpoints = store.datagram("conveyor_setpoints").unwrap();
    assert_eq!(setpoints.item("speed").unwrap().tag_address(), "%DB1.34.0:INT");
    assert_eq!(setpoints.item("enable").unwrap().tag_address(), "%M0.16.0:BOOL");
}
