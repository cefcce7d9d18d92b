//! Data item: the declaration of one named PLC value
//!
//! An item is built once at configuration time. Location fields are optional
//! so that an incomplete declaration can be loaded, reported by validation and
//! skipped at run time instead of failing the whole file.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::serde_defaults::{deserialize_offset_flexible, deserialize_opt_f64_flexible};
use crate::types::{DataType, RegisterKind};

/// One named value inside a datagram
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct DataItem {
    /// Unique key within the owning datagram
    code: String,

    /// Human-readable name, used in logs only
    #[serde(default, alias = "display_name")]
    name: String,

    #[serde(default, alias = "kind", alias = "register_type")]
    register_kind: Option<RegisterKind>,

    /// Block number, required for data blocks
    #[serde(default, alias = "register_no")]
    register_number: Option<i32>,

    /// Raw offset, either `byte[.bit]` or a full tag such as `DBW34.0`
    #[serde(
        default,
        alias = "offset",
        deserialize_with = "deserialize_offset_flexible"
    )]
    register_offset: Option<String>,

    #[serde(default, alias = "type")]
    data_type: Option<DataType>,

    /// Declared capacity for string types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_length: Option<u32>,

    #[serde(
        default,
        alias = "min",
        deserialize_with = "deserialize_opt_f64_flexible",
        skip_serializing_if = "Option::is_none"
    )]
    min_value: Option<f64>,

    #[serde(
        default,
        alias = "max",
        deserialize_with = "deserialize_opt_f64_flexible",
        skip_serializing_if = "Option::is_none"
    )]
    max_value: Option<f64>,

    /// Owning datagram, stamped by the configuration store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    datagram_id: Option<String>,

    #[serde(skip)]
    tag_cache: OnceLock<String>,
}

impl DataItem {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    // Builder style setters, used by tests and the CLI

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.set_name(name);
        self
    }

    pub fn with_location(
        mut self,
        kind: RegisterKind,
        number: Option<i32>,
        offset: impl Into<String>,
    ) -> Self {
        self.set_register_kind(Some(kind));
        self.set_register_number(number);
        self.set_register_offset(Some(offset.into()));
        self
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.set_data_type(Some(data_type));
        self
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.set_max_length(Some(max_length));
        self
    }

    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.set_bounds(min, max);
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register_kind(&self) -> Option<RegisterKind> {
        self.register_kind
    }

    pub fn register_number(&self) -> Option<i32> {
        self.register_number
    }

    pub fn register_offset(&self) -> Option<&str> {
        self.register_offset.as_deref()
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.data_type
    }

    pub fn max_length(&self) -> Option<u32> {
        self.max_length
    }

    pub fn min_value(&self) -> Option<f64> {
        self.min_value
    }

    pub fn max_value(&self) -> Option<f64> {
        self.max_value
    }

    pub fn datagram_id(&self) -> Option<&str> {
        self.datagram_id.as_deref()
    }

    // ========================================================================
    // Setters (each one drops the cached tag address)
    // ========================================================================

    pub fn set_code(&mut self, code: impl Into<String>) {
        self.code = code.into();
        self.tag_cache = OnceLock::new();
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_register_kind(&mut self, kind: Option<RegisterKind>) {
        self.register_kind = kind;
        self.tag_cache = OnceLock::new();
    }

    pub fn set_register_number(&mut self, number: Option<i32>) {
        self.register_number = number;
        self.tag_cache = OnceLock::new();
    }

    pub fn set_register_offset(&mut self, offset: Option<String>) {
        self.register_offset = offset;
        self.tag_cache = OnceLock::new();
    }

    pub fn set_data_type(&mut self, data_type: Option<DataType>) {
        self.data_type = data_type;
        self.tag_cache = OnceLock::new();
    }

    pub fn set_max_length(&mut self, max_length: Option<u32>) {
        self.max_length = max_length;
        self.tag_cache = OnceLock::new();
    }

    pub fn set_bounds(&mut self, min: Option<f64>, max: Option<f64>) {
        self.min_value = min;
        self.max_value = max;
    }

    pub fn set_datagram_id(&mut self, datagram_id: Option<String>) {
        self.datagram_id = datagram_id;
    }

    // ========================================================================
    // Derived values
    // ========================================================================

    /// Transport tag of this item, or `""` when the declaration is incomplete
    ///
    /// Format: `%<kind><number>.<byte>[.<bit>]:<TYPE>[(<max_length>)]`,
    /// e.g. `%DB20.92:BOOL`. Built on first use and cached until a setter runs.
    pub fn tag_address(&self) -> &str {
        self.tag_cache.get_or_init(|| self.build_tag_address())
    }

    /// Whether the item resolves to a transport tag
    pub fn is_resolvable(&self) -> bool {
        !self.tag_address().is_empty()
    }

    /// Address in the human form consumed by the address parser
    ///
    /// A numeric offset gets the kind code prefixed (`92.0` on a data block
    /// becomes `DB92.0`); an offset starting with a letter is already a full
    /// tag (`DBW34.0`, `M16.0`) and is returned as is.
    pub fn address_string(&self) -> Option<String> {
        let offset = self.register_offset.as_deref()?.trim();
        let first = offset.chars().next()?;
        if first.is_ascii_digit() {
            let kind = self.register_kind?;
            Some(format!("{}{}", kind.code(), offset))
        } else {
            Some(offset.to_string())
        }
    }

    /// Whether range validation applies to this item
    pub fn is_numeric(&self) -> bool {
        self.data_type.map(|t| t.is_numeric()).unwrap_or(false)
    }

    /// Inclusive `[min_value, max_value]` check. Non-finite values never pass.
    pub fn is_within_bounds(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        if let Some(min) = self.min_value {
            if value < min {
                return false;
            }
        }
        if let Some(max) = self.max_value {
            if value > max {
                return false;
            }
        }
        true
    }

    /// One-line location summary used by error logs
    pub fn describe(&self) -> String {
        format!(
            "{} {} kind={} number={} offset={} type={}",
            self.code,
            self.name,
            self.register_kind.map(|k| k.value_id()).unwrap_or("-"),
            self.register_number
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.register_offset.as_deref().unwrap_or("-"),
            self.data_type.map(|t| t.value_id()).unwrap_or("-"),
        )
    }

    fn build_tag_address(&self) -> String {
        let (Some(kind), Some(data_type)) = (self.register_kind, self.data_type) else {
            return String::new();
        };

        let number = match self.register_number {
            Some(n) if n < 0 => return String::new(),
            Some(n) => n,
            None if kind.requires_block_number() => return String::new(),
            None => 0,
        };

        let Some(tail) = self.register_offset.as_deref().map(offset_tail) else {
            return String::new();
        };
        if tail.is_empty() {
            return String::new();
        }

        let mut tag = format!("%{}{}.{}:{}", kind.code(), number, tail, data_type.code());
        if data_type.is_string() {
            if let Some(len) = self.max_length {
                tag.push_str(&format!("({})", len));
            }
        }
        tag
    }
}

/// Numeric `byte[.bit]` tail of a raw offset
///
/// Leading letters (kind and type codes of a full tag) are dropped, so
/// `DBW34.0` and `34.0` both yield `34.0`.
fn offset_tail(offset: &str) -> &str {
    offset
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
}

impl fmt::Debug for DataItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataItem")
            .field("code", &self.code)
            .field("name", &self.name)
            .field("register_kind", &self.register_kind)
            .field("register_number", &self.register_number)
            .field("register_offset", &self.register_offset)
            .field("data_type", &self.data_type)
            .field("max_length", &self.max_length)
            .field("min_value", &self.min_value)
            .field("max_value", &self.max_value)
            .field("datagram_id", &self.datagram_id)
            .finish()
    }
}

impl PartialEq for DataItem {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
            && self.name == other.name
            && self.register_kind == other.register_kind
            && self.register_number == other.register_number
            && self.register_offset == other.register_offset
            && self.data_type == other.data_type
            && self.max_length == other.max_length
            && self.min_value == other.min_value
            && self.max_value == other.max_value
            && self.datagram_id == other.datagram_id
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn bool_item() -> DataItem {
        DataItem::new("running")
            .with_name("Motor running")
            .with_location(RegisterKind::DataBlock, Some(20), "92")
            .with_data_type(DataType::Bool)
    }

    #[test]
    fn test_tag_address_data_block() {
        assert_eq!(bool_item().tag_address(), "%DB20.92:BOOL");
        assert!(bool_item().is_resolvable());
    }

    #[test]
    fn test_tag_address_string_length() {
        let item = DataItem::new("batch")
            .with_location(RegisterKind::DataBlock, Some(3), "10")
            .with_data_type(DataType::String)
            .with_max_length(32);
        assert_eq!(item.tag_address(), "%DB3.10:STRING(32)");

        // Length only applies to string types
        let item = DataItem::new("speed")
            .with_location(RegisterKind::DataBlock, Some(3), "10")
            .with_data_type(DataType::Int)
            .with_max_length(32);
        assert_eq!(item.tag_address(), "%DB3.10:INT");
    }

    #[test]
    fn test_tag_address_from_full_tag_offset() {
        let item = DataItem::new("flag")
            .with_location(RegisterKind::Memory, None, "M16.0")
            .with_data_type(DataType::Bool);
        assert_eq!(item.tag_address(), "%M0.16.0:BOOL");
        assert_eq!(item.address_string().as_deref(), Some("M16.0"));
    }

    #[test]
    fn test_incomplete_items_are_unresolvable() {
        let mut item = bool_item();
        item.set_data_type(None);
        assert_eq!(item.tag_address(), "");

        let mut item = bool_item();
        item.set_register_kind(None);
        assert_eq!(item.tag_address(), "");

        let mut item = bool_item();
        item.set_register_offset(Some("   ".into()));
        assert_eq!(item.tag_address(), "");

        let mut item = bool_item();
        item.set_register_number(None);
        assert_eq!(item.tag_address(), "");

        let mut item = bool_item();
        item.set_register_number(Some(-1));
        assert!(!item.is_resolvable());
    }

    #[test]
    fn test_setter_invalidates_cache() {
        let mut item = bool_item();
        assert_eq!(item.tag_address(), "%DB20.92:BOOL");
        item.set_register_number(Some(21));
        assert_eq!(item.tag_address(), "%DB21.92:BOOL");
        item.set_data_type(Some(DataType::Word));
        assert_eq!(item.tag_address(), "%DB21.92:WORD");
    }

    #[test]
    fn test_address_string() {
        let item = DataItem::new("a").with_location(RegisterKind::DataBlock, Some(5), "92.0");
        assert_eq!(item.address_string().as_deref(), Some("DB92.0"));

        let item = DataItem::new("b").with_location(RegisterKind::DataBlock, Some(5), "DBW34.0");
        assert_eq!(item.address_string().as_deref(), Some("DBW34.0"));

        assert_eq!(DataItem::new("c").address_string(), None);
    }

    #[test]
    fn test_bounds() {
        let item = DataItem::new("t")
            .with_data_type(DataType::Int)
            .with_bounds(Some(-10.0), Some(100.0));
        assert!(item.is_numeric());
        assert!(item.is_within_bounds(-10.0));
        assert!(item.is_within_bounds(100.0));
        assert!(!item.is_within_bounds(100.5));
        assert!(!item.is_within_bounds(f64::NAN));

        let open = DataItem::new("o").with_data_type(DataType::Real);
        assert!(open.is_within_bounds(1e30));
        assert!(!DataItem::new("b").with_data_type(DataType::Bool).is_numeric());
    }

    #[test]
    fn test_deserialize_with_aliases() {
        let yaml = r#"
code: temp
display_name: Temperature
kind: RD
register_number: 7
offset: 4
type: DReal
min: "-40"
max: 120
"#;
        let item: DataItem = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(item.name(), "Temperature");
        assert_eq!(item.register_kind(), Some(RegisterKind::DataBlock));
        assert_eq!(item.register_offset(), Some("4"));
        assert_eq!(item.min_value(), Some(-40.0));
        assert_eq!(item.max_value(), Some(120.0));
        assert_eq!(item.tag_address(), "%DB7.4:REAL");
    }
}
