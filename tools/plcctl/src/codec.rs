//! Offline address parsing and codec commands

use anyhow::{anyhow, Result};
use colored::*;
use plc_comlink::{bytes, parse, parse_transport_tag, ParsedAddress, PlcCodec, PlcValue};
use plc_config::DataType;

/// Parse either the human form or a `%`-prefixed transport tag
pub fn parse_any(address: &str, db: Option<i32>) -> Result<ParsedAddress> {
    let parsed = if address.trim_start().starts_with('%') {
        parse_transport_tag(address)?
    } else {
        parse(db, address)?
    };
    Ok(parsed)
}

pub fn print_address(parsed: &ParsedAddress) {
    println!("{} {}", "OK".green(), parsed.to_string().bright_yellow());
    println!("   kind:     {}", parsed.register_kind.description());
    if parsed.register_kind.requires_block_number() {
        println!("   block:    {}", parsed.register_number);
    }
    if !parsed.type_code.is_empty() {
        println!("   type:     {}", parsed.type_code);
    }
    println!("   byte:     {}", parsed.byte_offset);
    println!("   bit:      {}", parsed.bit_offset);
}

pub fn encode(data_type: DataType, address: &str, value: &str, db: Option<i32>) -> Result<Vec<u8>> {
    let parsed = parse_any(address, db)?;
    Ok(PlcCodec::encode(data_type, &parsed, &PlcValue::from(value))?)
}

pub fn decode(data_type: DataType, address: &str, hex: &str, db: Option<i32>) -> Result<PlcValue> {
    let parsed = parse_any(address, db)?;
    let buffer = bytes::parse_hex(hex).ok_or_else(|| anyhow!("'{}' is not hex", hex))?;
    Ok(PlcCodec::decode(data_type, &parsed, &buffer)?)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_parse_any() {
        assert_eq!(parse_any("DBW34.0", Some(5)).unwrap().register_number, 5);
        assert_eq!(parse_any("%DB20.92.3:BOOL", None).unwrap().bit_offset, 3);
        assert!(parse_any("DBW34.0", None).is_err());
    }

    #[test]
    fn test_encode_decode_text_values() {
        let bytes = encode(DataType::Int, "DBW0.0", "1450", Some(1)).unwrap();
        assert_eq!(bytes, vec![0x05, 0xAA]);
        assert_eq!(
            decode(DataType::Int, "DBW0.0", "05 AA", Some(1)).unwrap(),
            PlcValue::Int(1450)
        );
        assert!(encode(DataType::Int, "DBW0.0", "many", Some(1)).is_err());
        assert!(decode(DataType::Int, "DBW0.0", "zz", Some(1)).is_err());
    }
}
