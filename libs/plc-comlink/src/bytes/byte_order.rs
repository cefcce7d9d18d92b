//! Byte order of multi-byte PLC values

/// Byte order of a 16/32/64-bit value
///
/// For 32-bit value `0x12345678`:
/// - `BigEndian`: [0x12, 0x34, 0x56, 0x78]
/// - `LittleEndian`: [0x78, 0x56, 0x34, 0x12]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder {
    /// Most significant byte first, native S7 order
    #[default]
    BigEndian,

    /// Least significant byte first
    LittleEndian,
}

impl ByteOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BigEndian => "ABCD (Big-Endian)",
            Self::LittleEndian => "DCBA (Little-Endian)",
        }
    }
}

impl std::fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_s7_order() {
        assert_eq!(ByteOrder::default(), ByteOrder::BigEndian);
        assert_eq!(ByteOrder::LittleEndian.to_string(), "DCBA (Little-Endian)");
    }
}
