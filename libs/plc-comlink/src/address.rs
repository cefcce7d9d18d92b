//! Tag address parser
//!
//! Two textual forms are understood:
//!
//! - the human form used in configuration, `<kind><type?><byte>[.<bit>]`,
//!   e.g. `M16.0` or `DBW34.0`; the data block number is supplied separately
//! - the transport tag generated by [`DataItem::tag_address`], e.g.
//!   `%DB20.92:BOOL` or `%DB3.10:STRING(32)`
//!
//! Both parsers are pure functions.

use std::fmt;

use errors::{AddressErrorReason, AddressSyntaxError};
use plc_config::{DataItem, DataType, RegisterKind};

use crate::bytes::MAX_BIT_INDEX;

/// Highest data block number accepted as a hint
pub const MAX_BLOCK_NUMBER: i32 = 65_535;

/// Kind codes tried longest first so `DB` is never taken for a one-letter code
const KINDS_BY_CODE_LEN: [RegisterKind; 4] = [
    RegisterKind::DataBlock,
    RegisterKind::Input,
    RegisterKind::Output,
    RegisterKind::Memory,
];

/// Result of parsing one tag address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedAddress {
    pub register_kind: RegisterKind,
    /// Data block number, 0 for kinds that ignore it
    pub register_number: u16,
    /// Upper-case type letters (`W`, `X`, `BOOL`), possibly empty
    pub type_code: String,
    pub byte_offset: u32,
    /// Bit within the byte, 0..=7
    pub bit_offset: u8,
}

impl ParsedAddress {
    /// Data type implied by a one-letter S7 size prefix, if any
    pub fn implied_data_type(&self) -> Option<DataType> {
        match self.type_code.as_str() {
            "X" => Some(DataType::Bool),
            "B" => Some(DataType::Byte),
            "W" => Some(DataType::Word),
            "D" => Some(DataType::DWord),
            other => DataType::from_code(other),
        }
    }

    /// Transport tag for this address, `%<kind><number>.<byte>.<bit>:<TYPE>`
    pub fn transport_tag(&self, data_type: DataType) -> String {
        format!(
            "%{}{}.{}.{}:{}",
            self.register_kind.code(),
            self.register_number,
            self.byte_offset,
            self.bit_offset,
            data_type.code()
        )
    }

    /// Build a data item located at this address
    pub fn to_item(&self, code: impl Into<String>, data_type: DataType) -> DataItem {
        let number = if self.register_kind.requires_block_number() {
            Some(i32::from(self.register_number))
        } else {
            None
        };
        DataItem::new(code)
            .with_location(
                self.register_kind,
                number,
                format!("{}.{}", self.byte_offset, self.bit_offset),
            )
            .with_data_type(data_type)
    }
}

impl fmt::Display for ParsedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}.{}",
            self.register_kind.code(),
            self.type_code,
            self.byte_offset,
            self.bit_offset
        )
    }
}

// ============================================================================
// Human form
// ============================================================================

/// Parse a human tag address such as `M16.0` or `DBW34.0`
///
/// `register_number_hint` is required (and must be `0..=65535`) for data
/// block addresses and ignored for the other kinds.
pub fn parse(
    register_number_hint: Option<i32>,
    address: &str,
) -> Result<ParsedAddress, AddressSyntaxError> {
    let upper = address.trim().to_uppercase();
    let error = |fragment: &str, reason| AddressSyntaxError::new(address, fragment, reason);

    let (register_kind, rest) =
        split_kind(&upper).ok_or_else(|| error(&upper, AddressErrorReason::MissingKind))?;

    let register_number = if register_kind.requires_block_number() {
        match register_number_hint {
            Some(n) if (0..=MAX_BLOCK_NUMBER).contains(&n) => n as u16,
            Some(n) => {
                return Err(error(
                    &n.to_string(),
                    AddressErrorReason::MissingRegisterNumber,
                ))
            },
            None => return Err(error("", AddressErrorReason::MissingRegisterNumber)),
        }
    } else {
        0
    };

    let type_len = rest
        .chars()
        .take_while(|c| c.is_ascii_uppercase())
        .count();
    let (type_code, tail) = rest.split_at(type_len);
    match tail.chars().next() {
        Some(c) if c.is_ascii_digit() => {},
        Some(_) => return Err(error(tail, AddressErrorReason::MissingType)),
        None => return Err(error(rest, AddressErrorReason::InvalidOffset)),
    }

    let (byte_offset, bit_offset) =
        parse_offset(tail).ok_or_else(|| error(tail, AddressErrorReason::InvalidOffset))?;

    Ok(ParsedAddress {
        register_kind,
        register_number,
        type_code: type_code.to_string(),
        byte_offset,
        bit_offset,
    })
}

/// Resolve a configured item through its [`DataItem::address_string`]
pub fn parse_item(item: &DataItem) -> Result<ParsedAddress, AddressSyntaxError> {
    let address = item.address_string().ok_or_else(|| {
        AddressSyntaxError::new(item.code(), "", AddressErrorReason::InvalidOffset)
    })?;
    parse(item.register_number(), &address)
}

// ============================================================================
// Transport tag form
// ============================================================================

/// Parse a transport tag such as `%DB20.92:BOOL` back into an address
///
/// The register number is taken from the tag itself; the type code is the
/// full PLC type name without the optional `(<length>)` suffix.
pub fn parse_transport_tag(tag: &str) -> Result<ParsedAddress, AddressSyntaxError> {
    let upper = tag.trim().to_uppercase();
    let error = |fragment: &str, reason| AddressSyntaxError::new(tag, fragment, reason);

    let body = upper
        .strip_prefix('%')
        .ok_or_else(|| error(&upper, AddressErrorReason::MissingKind))?;
    let (register_kind, rest) =
        split_kind(body).ok_or_else(|| error(body, AddressErrorReason::MissingKind))?;

    let (location, type_part) = rest
        .split_once(':')
        .ok_or_else(|| error(rest, AddressErrorReason::MissingType))?;

    let type_code = match type_part.split_once('(') {
        Some((name, len)) => {
            let digits = len
                .strip_suffix(')')
                .ok_or_else(|| error(type_part, AddressErrorReason::MissingType))?;
            if !is_digits(digits) {
                return Err(error(type_part, AddressErrorReason::MissingType));
            }
            name
        },
        None => type_part,
    };
    if type_code.is_empty() || !type_code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(error(type_part, AddressErrorReason::MissingType));
    }

    let (number, offset) = location
        .split_once('.')
        .ok_or_else(|| error(location, AddressErrorReason::InvalidOffset))?;
    if !is_digits(number) {
        return Err(error(number, AddressErrorReason::MissingRegisterNumber));
    }
    let register_number = if register_kind.requires_block_number() {
        number
            .parse::<u16>()
            .map_err(|_| error(number, AddressErrorReason::MissingRegisterNumber))?
    } else {
        0
    };

    let (byte_offset, bit_offset) =
        parse_offset(offset).ok_or_else(|| error(offset, AddressErrorReason::InvalidOffset))?;

    Ok(ParsedAddress {
        register_kind,
        register_number,
        type_code: type_code.to_string(),
        byte_offset,
        bit_offset,
    })
}

// ============================================================================
// Helpers
// ============================================================================

/// Match a kind code at the start of `input`; the code must leave something behind
fn split_kind(input: &str) -> Option<(RegisterKind, &str)> {
    KINDS_BY_CODE_LEN.into_iter().find_map(|kind| {
        input
            .strip_prefix(kind.code())
            .filter(|rest| !rest.is_empty())
            .map(|rest| (kind, rest))
    })
}

/// `<byte>` or `<byte>.<bit>`, digits only, bit within a byte
fn parse_offset(tail: &str) -> Option<(u32, u8)> {
    let mut segments = tail.split('.');
    let byte = segments.next().filter(|s| is_digits(s))?.parse::<u32>().ok()?;
    let bit = match segments.next() {
        Some(seg) if is_digits(seg) => seg.parse::<u8>().ok()?,
        Some(_) => return None,
        None => 0,
    };
    if segments.next().is_some() || bit > MAX_BIT_INDEX {
        return None;
    }
    Some((byte, bit))
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}
