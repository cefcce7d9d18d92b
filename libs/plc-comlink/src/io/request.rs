//! Request assembly shared by both backends
//!
//! Items are resolved in declaration order. An item without a transport tag,
//! or whose address does not parse, is skipped and does not count. A code
//! declared more than once is sent once, for its first declaration. A
//! datagram with nothing left to send is an error, never a silent success.

use std::fmt;

use errors::{PlcError, PlcErrorTrait, PlcResult};
use indexmap::IndexMap;
use plc_config::{DataItem, DataType, Datagram, DeviceConfig};
use tracing::{debug, error, warn};

use crate::address::{self, ParsedAddress};
use crate::bytes::to_hex;
use crate::codec::PlcCodec;
use crate::transport::RequestItem;
use crate::value::PlcValue;

/// Caller supplied values for a write, keyed by item code
pub type WriteValues = IndexMap<String, PlcValue>;

/// One datagram item that made it into a request
#[derive(Debug, Clone)]
pub struct ResolvedItem<'a> {
    pub item: &'a DataItem,
    pub address: ParsedAddress,
    pub data_type: DataType,
}

impl<'a> ResolvedItem<'a> {
    pub fn code(&self) -> &'a str {
        self.item.code()
    }

    pub fn tag(&self) -> &'a str {
        self.item.tag_address()
    }

    pub fn to_request(&self, data: Vec<u8>) -> RequestItem {
        RequestItem {
            code: self.code().to_string(),
            tag: self.tag().to_string(),
            address: self.address.clone(),
            data_type: self.data_type,
            data,
        }
    }
}

/// `PLC <op> <device comment><device id>.<datagram comment><datagram id>`
pub fn log_title(op: &str, device: &DeviceConfig, datagram: &Datagram) -> String {
    format!("PLC {} {}.{}", op, device.label(), datagram.label())
}

/// Resolve every usable item of `datagram`
pub fn resolve_items(datagram: &Datagram) -> PlcResult<Vec<ResolvedItem<'_>>> {
    let mut resolved = Vec::with_capacity(datagram.len());
    for item in datagram.items() {
        let first = datagram.item(item.code());
        if !first.is_some_and(|first| std::ptr::eq(first, item)) {
            warn!(
                "[RESOLVE] Skipping duplicate code {} in datagram {}: {}",
                item.code(),
                datagram.id(),
                item.describe()
            );
            continue;
        }
        let Some(data_type) = item.data_type().filter(|_| item.is_resolvable()) else {
            debug!("[RESOLVE] Skipping incomplete item {}", item.describe());
            continue;
        };
        match address::parse_item(item) {
            Ok(address) => {
                debug!("  {} {} -> {}", item.code(), item.name(), item.tag_address());
                resolved.push(ResolvedItem {
                    item,
                    address,
                    data_type,
                });
            },
            Err(e) => {
                PlcError::from(e).log(&format!("[RESOLVE] Skipping item {}", item.code()));
            },
        }
    }

    if resolved.is_empty() {
        return Err(PlcError::NoResolvableItems(datagram.id().to_string()));
    }
    Ok(resolved)
}

/// Value for `code`, exact match first, then ignoring ASCII case
pub fn lookup_value<'v>(values: &'v WriteValues, code: &str) -> Option<&'v PlcValue> {
    values.get(code).or_else(|| {
        values
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(code))
            .map(|(_, value)| value)
    })
}

/// Encode one buffer per resolved item, in order
///
/// The first missing value, out-of-bounds value or codec failure aborts the
/// whole batch before anything is sent.
pub fn encode_values(
    datagram: &Datagram,
    resolved: &[ResolvedItem<'_>],
    values: &WriteValues,
) -> PlcResult<Vec<Vec<u8>>> {
    let mut payloads = Vec::with_capacity(resolved.len());
    for entry in resolved {
        let value = lookup_value(values, entry.code()).ok_or_else(|| PlcError::MissingValue {
            datagram: datagram.id().to_string(),
            code: entry.code().to_string(),
        })?;

        if entry.item.is_numeric() {
            if let Some(number) = value.as_f64() {
                if !entry.item.is_within_bounds(number) {
                    return Err(PlcError::OutOfBounds {
                        code: entry.code().to_string(),
                        value: value.to_string(),
                        min: bound_text(entry.item.min_value()),
                        max: bound_text(entry.item.max_value()),
                    });
                }
            }
        }

        let data = PlcCodec::encode(entry.data_type, &entry.address, value)?;
        debug!("  {} = {} -> [{}]", entry.code(), value, to_hex(&data));
        payloads.push(data);
    }
    Ok(payloads)
}

/// Log a per item device failure with the full item location
pub fn log_item_failure(op: &str, entry: &ResolvedItem<'_>, response: impl fmt::Display) {
    error!(
        "[{}] Item failed: {} response={}",
        op,
        entry.item.describe(),
        response
    );
}

fn bound_text(bound: Option<f64>) -> String {
    bound.map(|b| b.to_string()).unwrap_or_else(|| "-".to_string())
}
