//! Closed enumerations for register kinds, data types and protocol variants
//!
//! Each variant carries the identifiers used in configuration files (value id)
//! and on the wire (PLC code). Parsing accepts either form, case-insensitively.
//! Data type value ids overlap with narrower PLC codes (`DInt` is the value id
//! of `INT`), so an exact value id wins, then a PLC code, then a value id in any
//! case.

use std::fmt;
use std::str::FromStr;

use errors::{config_error, ConfigError};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Implement string based serde for an enum with `FromStr` and `code()`
macro_rules! impl_code_serde {
    ($ty:ty, $expecting:expr) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.code())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse::<$ty>().map_err(|_| {
                    de::Error::custom(format!("invalid {} '{}'", $expecting, raw.trim()))
                })
            }
        }
    };
}

// ============================================================================
// Register kind
// ============================================================================

/// PLC memory area addressed by a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterKind {
    /// Process image of inputs
    Input,
    /// Process image of outputs
    Output,
    /// Flag (merker) memory
    Memory,
    /// Data block, needs a block number
    DataBlock,
}

impl RegisterKind {
    /// All kinds in declaration order
    pub const ALL: [RegisterKind; 4] = [
        RegisterKind::Input,
        RegisterKind::Output,
        RegisterKind::Memory,
        RegisterKind::DataBlock,
    ];

    /// Identifier used in configuration files
    pub fn value_id(&self) -> &'static str {
        match self {
            Self::Input => "RI",
            Self::Output => "RQ",
            Self::Memory => "RM",
            Self::DataBlock => "RD",
        }
    }

    /// Code used in tag addresses
    pub fn code(&self) -> &'static str {
        match self {
            Self::Input => "I",
            Self::Output => "Q",
            Self::Memory => "M",
            Self::DataBlock => "DB",
        }
    }

    /// S7 area code used by area based clients
    pub fn area_code(&self) -> u8 {
        match self {
            Self::Input => 0x81,
            Self::Output => 0x82,
            Self::Memory => 0x83,
            Self::DataBlock => 0x84,
        }
    }

    /// Whether addresses of this kind carry a block number
    pub fn requires_block_number(&self) -> bool {
        matches!(self, Self::DataBlock)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Input => "Input register",
            Self::Output => "Output register",
            Self::Memory => "Memory register",
            Self::DataBlock => "Data block",
        }
    }

    pub fn from_value_id(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.value_id().eq_ignore_ascii_case(s))
    }

    pub fn from_code(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.code().eq_ignore_ascii_case(s))
    }
}

impl FromStr for RegisterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_value_id(s)
            .or_else(|| Self::from_code(s))
            .ok_or_else(|| config_error!("register_kind", "unknown register kind '{}'", s.trim()))
    }
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl_code_serde!(RegisterKind, "register kind");

// ============================================================================
// Data type
// ============================================================================

/// PLC data type of a single value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Byte,
    Word,
    DWord,
    SInt,
    USInt,
    Int,
    DInt,
    UDInt,
    Real,
    LReal,
    String,
    WString,
}

impl DataType {
    /// All data types in declaration order
    pub const ALL: [DataType; 13] = [
        DataType::Bool,
        DataType::Byte,
        DataType::Word,
        DataType::DWord,
        DataType::SInt,
        DataType::USInt,
        DataType::Int,
        DataType::DInt,
        DataType::UDInt,
        DataType::Real,
        DataType::LReal,
        DataType::String,
        DataType::WString,
    ];

    /// Identifier used in configuration files
    pub fn value_id(&self) -> &'static str {
        match self {
            Self::Bool => "DBool",
            Self::Byte => "DByte",
            Self::Word => "DWord",
            Self::DWord => "DDWord",
            Self::SInt => "DSInt",
            Self::USInt => "DUSInt",
            Self::Int => "DInt",
            Self::DInt => "DDInt",
            Self::UDInt => "DUDInt",
            Self::Real => "DReal",
            Self::LReal => "DLReal",
            Self::String => "DString",
            Self::WString => "DWString",
        }
    }

    /// Code used in transport tags
    pub fn code(&self) -> &'static str {
        match self {
            Self::Bool => "BOOL",
            Self::Byte => "BYTE",
            Self::Word => "WORD",
            Self::DWord => "DWORD",
            Self::SInt => "SINT",
            Self::USInt => "USINT",
            Self::Int => "INT",
            Self::DInt => "DINT",
            Self::UDInt => "UDINT",
            Self::Real => "REAL",
            Self::LReal => "LREAL",
            Self::String => "STRING",
            Self::WString => "WSTRING",
        }
    }

    /// Canonical width in bytes
    ///
    /// `Bool` is bit-addressed and reports 0. Strings have no fixed width.
    pub fn width(&self) -> Option<usize> {
        match self {
            Self::Bool => Some(0),
            Self::Byte | Self::SInt | Self::USInt => Some(1),
            Self::Word | Self::Int => Some(2),
            Self::DWord | Self::DInt | Self::UDInt | Self::Real => Some(4),
            Self::LReal => Some(8),
            Self::String | Self::WString => None,
        }
    }

    /// Number of bytes moved over the wire for one value
    pub fn wire_width(&self) -> Option<usize> {
        match self {
            Self::Bool => Some(1),
            other => other.width(),
        }
    }

    /// Whether min/max range validation applies
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Word
                | Self::DWord
                | Self::SInt
                | Self::USInt
                | Self::Int
                | Self::DInt
                | Self::UDInt
                | Self::Real
                | Self::LReal
        )
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::String | Self::WString)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Bool => "Boolean",
            Self::Byte => "8-bit byte",
            Self::Word => "16-bit word",
            Self::DWord => "32-bit double word",
            Self::SInt => "8-bit signed integer",
            Self::USInt => "8-bit unsigned integer",
            Self::Int => "16-bit signed integer",
            Self::DInt => "32-bit signed integer",
            Self::UDInt => "32-bit unsigned integer",
            Self::Real => "32-bit float",
            Self::LReal => "64-bit float",
            Self::String => "ASCII string",
            Self::WString => "Unicode string",
        }
    }

    pub fn from_value_id(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|data_type| data_type.value_id().eq_ignore_ascii_case(s))
    }

    pub fn from_code(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|data_type| data_type.code().eq_ignore_ascii_case(s))
    }
}

impl FromStr for DataType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|data_type| data_type.value_id() == trimmed)
            .or_else(|| Self::from_code(trimmed))
            .or_else(|| Self::from_value_id(trimmed))
            .ok_or_else(|| config_error!("data_type", "unknown data type '{}'", s.trim()))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl_code_serde!(DataType, "data type");

// ============================================================================
// Protocol variant
// ============================================================================

/// Device family, selects the IO backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVariant {
    /// S7-300/400/1200/1500 through the tag based transport (pooled)
    #[default]
    S7,
    /// S7-200 SMART through the area based client (single connection)
    S7200Smart,
}

impl ProtocolVariant {
    pub const ALL: [ProtocolVariant; 2] = [ProtocolVariant::S7, ProtocolVariant::S7200Smart];

    pub fn value_id(&self) -> &'static str {
        match self {
            Self::S7 => "S7",
            Self::S7200Smart => "S7-200-SMART",
        }
    }

    /// Same as the value id, kept for symmetry with the other enums
    pub fn code(&self) -> &'static str {
        self.value_id()
    }

    /// Scheme used in connection strings
    pub fn scheme(&self) -> &'static str {
        "s7"
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::S7 => "S7-300, S7-400, S7-1200, S7-1500",
            Self::S7200Smart => "S7-200 SMART",
        }
    }
}

impl FromStr for ProtocolVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|variant| variant.value_id() == normalized)
            .ok_or_else(|| config_error!("protocol", "unknown protocol variant '{}'", s.trim()))
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value_id())
    }
}

impl_code_serde!(ProtocolVariant, "protocol variant");

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_register_kind_lookup() {
        assert_eq!("DB".parse::<RegisterKind>().unwrap(), RegisterKind::DataBlock);
        assert_eq!("rd".parse::<RegisterKind>().unwrap(), RegisterKind::DataBlock);
        assert_eq!(" m ".parse::<RegisterKind>().unwrap(), RegisterKind::Memory);
        assert_eq!(RegisterKind::from_value_id("RQ"), Some(RegisterKind::Output));
        assert!("X".parse::<RegisterKind>().is_err());
    }

    #[test]
    fn test_register_kind_area_codes() {
        assert_eq!(RegisterKind::Input.area_code(), 0x81);
        assert_eq!(RegisterKind::DataBlock.area_code(), 0x84);
        assert!(RegisterKind::DataBlock.requires_block_number());
        assert!(!RegisterKind::Memory.requires_block_number());
    }

    #[test]
    fn test_data_type_lookup() {
        assert_eq!("DWord".parse::<DataType>().unwrap(), DataType::Word);
        assert_eq!("DWORD".parse::<DataType>().unwrap(), DataType::DWord);
        assert_eq!("ddword".parse::<DataType>().unwrap(), DataType::DWord);
        assert_eq!("lreal".parse::<DataType>().unwrap(), DataType::LReal);
        assert_eq!("DWString".parse::<DataType>().unwrap(), DataType::WString);
        assert!("FLOAT".parse::<DataType>().is_err());
    }

    #[test]
    fn test_plc_code_beats_value_id_in_other_case() {
        assert_eq!("DINT".parse::<DataType>().unwrap(), DataType::DInt);
        assert_eq!("dint".parse::<DataType>().unwrap(), DataType::DInt);
        assert_eq!("DInt".parse::<DataType>().unwrap(), DataType::Int);
        assert_eq!("UDINT".parse::<DataType>().unwrap(), DataType::UDInt);
        assert_eq!("DUDInt".parse::<DataType>().unwrap(), DataType::UDInt);
        assert_eq!("DDINT".parse::<DataType>().unwrap(), DataType::DInt);
        for data_type in DataType::ALL {
            assert_eq!(data_type.code().parse::<DataType>().unwrap(), data_type);
            assert_eq!(data_type.value_id().parse::<DataType>().unwrap(), data_type);
        }
    }

    #[test]
    fn test_data_type_widths() {
        assert_eq!(DataType::Bool.width(), Some(0));
        assert_eq!(DataType::Bool.wire_width(), Some(1));
        assert_eq!(DataType::USInt.width(), Some(1));
        assert_eq!(DataType::Int.width(), Some(2));
        assert_eq!(DataType::UDInt.width(), Some(4));
        assert_eq!(DataType::Real.width(), Some(4));
        assert_eq!(DataType::LReal.width(), Some(8));
        assert_eq!(DataType::String.width(), None);
        assert_eq!(DataType::WString.wire_width(), None);
    }

    #[test]
    fn test_data_type_numeric_flag() {
        let numeric: Vec<_> = DataType::ALL
            .into_iter()
            .filter(|t| t.is_numeric())
            .collect();
        assert_eq!(numeric.len(), 9);
        assert!(!DataType::Bool.is_numeric());
        assert!(!DataType::Byte.is_numeric());
        assert!(!DataType::String.is_numeric());
    }

    #[test]
    fn test_protocol_variant_parse() {
        assert_eq!("s7".parse::<ProtocolVariant>().unwrap(), ProtocolVariant::S7);
        assert_eq!(
            "S7-200-SMART".parse::<ProtocolVariant>().unwrap(),
            ProtocolVariant::S7200Smart
        );
        assert_eq!(
            "s7_200_smart".parse::<ProtocolVariant>().unwrap(),
            ProtocolVariant::S7200Smart
        );
        assert!("modbus".parse::<ProtocolVariant>().is_err());
        assert_eq!(ProtocolVariant::default(), ProtocolVariant::S7);
    }

    #[test]
    fn test_serde_accepts_value_ids_and_codes() {
        let kinds: Vec<RegisterKind> = serde_yaml::from_str("[RD, DB, I, rq]").unwrap();
        assert_eq!(
            kinds,
            vec![
                RegisterKind::DataBlock,
                RegisterKind::DataBlock,
                RegisterKind::Input,
                RegisterKind::Output
            ]
        );

        let yaml = serde_yaml::to_string(&DataType::UDInt).unwrap();
        assert_eq!(yaml.trim(), "UDINT");

        let err = serde_yaml::from_str::<DataType>("NOPE").unwrap_err();
        assert!(err.to_string().contains("invalid data type"));
    }
}
