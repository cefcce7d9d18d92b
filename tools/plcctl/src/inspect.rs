//! Configuration inspection commands

use anyhow::{anyhow, Result};
use colored::*;
use plc_comlink::parse_item;
use plc_config::{ConfigStore, Datagram, ProtocolVariant, ValidationResult};

/// Structural validation plus a parse of every resolvable item address
pub fn validate(store: &ConfigStore) -> ValidationResult {
    let mut report = store.validate();
    for datagram in store.datagrams() {
        for item in datagram.resolvable_items() {
            if let Err(e) = parse_item(item) {
                report.add_error(format!(
                    "datagram {} item {}: {}",
                    datagram.id(),
                    item.code(),
                    e
                ));
            }
        }
    }
    report
}

pub fn print_validation(report: &ValidationResult) {
    for warning in &report.warnings {
        println!("   {} {}", "WARNING".yellow(), warning);
    }
    for error in &report.errors {
        eprintln!("   {} {}", "ERROR".red(), error);
    }
    if report.is_valid {
        println!("{} Valid ({} warning(s))", "OK".green(), report.warnings.len());
    }
}

fn backend_name(protocol: ProtocolVariant) -> &'static str {
    match protocol {
        ProtocolVariant::S7 => "pooled",
        ProtocolVariant::S7200Smart => "direct",
    }
}

pub fn print_devices(store: &ConfigStore) {
    for device in store.devices() {
        println!(
            "{} {} ({}, {})",
            "-".bright_cyan(),
            device.label().bright_yellow(),
            device.protocol,
            backend_name(device.protocol)
        );
        println!("   {}", device.masked_connection_string());
        match device.protocol {
            ProtocolVariant::S7 => println!(
                "   pool: max {} / min idle {} / max idle {}",
                device.pool_max_total(),
                device.pool_min_idle(),
                device.pool_max_idle()
            ),
            ProtocolVariant::S7200Smart => println!(
                "   rack {} slot {}",
                device.area_rack(),
                device.area_slot()
            ),
        }
    }
}

/// `code  tag  parsed` rows for one datagram
pub fn tag_rows(datagram: &Datagram) -> Vec<(String, String, String)> {
    datagram
        .items()
        .iter()
        .map(|item| {
            let parsed = if item.is_resolvable() {
                match parse_item(item) {
                    Ok(address) => address.to_string(),
                    Err(e) => format!("error: {}", e),
                }
            } else {
                "skipped".to_string()
            };
            (item.code().to_string(), item.tag_address().to_string(), parsed)
        })
        .collect()
}

pub fn print_tags(store: &ConfigStore, only: Option<&str>) -> Result<()> {
    let datagrams: Vec<_> = match only {
        Some(id) => vec![store
            .datagram(id)
            .ok_or_else(|| anyhow!("datagram '{}' not found", id))?],
        None => store.datagrams().cloned().collect(),
    };

    for datagram in datagrams {
        println!("{} {}", "-".bright_cyan(), datagram.label().bright_yellow());
        for (code, tag, parsed) in tag_rows(&datagram) {
            let tag = if tag.is_empty() { "-".dimmed().to_string() } else { tag };
            println!("   {:<16} {:<24} {}", code, tag, parsed);
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    const CONFIG: &str = r#"
devices:
  - { id: plc1, host: 10.0.0.5 }
datagrams:
  - id: motor
    items:
      - { code: speed, register_kind: DB, register_number: 5, register_offset: "0", data_type: INT }
      - { code: flag, register_kind: DB, register_number: 5, register_offset: "2.9", data_type: BOOL }
      - { code: loose, register_kind: M }
"#;

    #[test]
    fn test_validate_reports_bad_offsets() {
        let store = ConfigStore::from_yaml_str(CONFIG).unwrap();
        let report = validate(&store);
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("flag")));
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn test_tag_rows() {
        let store = ConfigStore::from_yaml_str(CONFIG).unwrap();
        let rows = tag_rows(&store.datagram("motor").unwrap());
        assert_eq!(rows[0].1, "%DB5.0:INT");
        assert_eq!(rows[0].2, "DB0.0");
        assert!(rows[1].2.starts_with("error"));
        assert_eq!(rows[2].2, "skipped");
    }
}
