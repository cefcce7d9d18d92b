//! Serde default value functions and custom deserializers for configuration structs
//!
//! Centralizes the defaults applied to device and item declarations so that
//! the YAML/TOML/JSON loaders and the in-code builders agree.

use serde::de::{self, Deserializer};
use serde::Deserialize;

// ============================================================================
// Default Value Functions
// ============================================================================

/// Default ISO-on-TCP port: 102
pub fn port() -> u16 {
    102
}

/// Default per-operation transport timeout in milliseconds: 5000
pub fn timeout_ms() -> u64 {
    5000
}

/// Default facade call timeout in milliseconds: 10000
///
/// Passed by the facade to the backends for every read/write call.
pub fn call_timeout_ms() -> u64 {
    10_000
}

/// Default rack for area based clients: 0
pub fn area_rack() -> u16 {
    0
}

/// Default slot for area based clients: 1
pub fn area_slot() -> u16 {
    1
}

/// Default value: true
///
/// Used for boolean fields that should default to enabled/true.
pub fn bool_true() -> bool {
    true
}

// ============================================================================
// Custom Deserializers
// ============================================================================

/// Custom deserializer for boolean fields that supports multiple input formats
///
/// Supports native booleans, integers, and string values:
/// - boolean: true, false
/// - integer: 0 (false), 1 (true)
/// - string: "1"/"0", "true"/"false", "yes"/"no" (case-insensitive)
pub fn deserialize_bool_flexible<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrStringOrInt {
        Bool(bool),
        Int(i64),
        String(String),
    }

    match BoolOrStringOrInt::deserialize(deserializer)? {
        BoolOrStringOrInt::Bool(b) => Ok(b),
        BoolOrStringOrInt::Int(i) => match i {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(de::Error::custom(format!(
                "Invalid integer value {}, expected 0 or 1",
                i
            ))),
        },
        BoolOrStringOrInt::String(s) => match s.to_lowercase().trim() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" | "" => Ok(false),
            other => Err(de::Error::custom(format!(
                "Invalid boolean value '{}', expected: 1/0, true/false, yes/no, or boolean",
                other
            ))),
        },
    }
}

/// Deserialize a register offset written either as a string or as a number
///
/// `"92.0"`, `"DBW34.0"` and `16` are accepted. A float such as `92.5` is
/// rejected because its textual form is ambiguous; quote it instead.
pub fn deserialize_offset_flexible<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OffsetRepr {
        Int(u64),
        Float(f64),
        String(String),
    }

    match Option::<OffsetRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(OffsetRepr::Int(i)) => Ok(Some(i.to_string())),
        Some(OffsetRepr::Float(f)) => Err(de::Error::custom(format!(
            "Ambiguous numeric offset {}, write it as a string such as \"{}\"",
            f, f
        ))),
        Some(OffsetRepr::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        },
    }
}

/// Deserialize an optional bound that may be written as a number or a string
///
/// Empty strings are treated as "no bound".
pub fn deserialize_opt_f64_flexible<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrFloat {
        Float(f64),
        String(String),
    }

    match Option::<StringOrFloat>::deserialize(deserializer)? {
        None => Ok(None),
        Some(StringOrFloat::Float(f)) => Ok(Some(f)),
        Some(StringOrFloat::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                trimmed.parse::<f64>().map(Some).map_err(de::Error::custom)
            }
        },
    }
}
