//! Fixed-width numeric conversions with byte order support
//!
//! `get_*` read a value at a byte offset and return `None` when the slice is
//! too short. `*_to_bytes` render a value into a fresh array.

use super::ByteOrder;

macro_rules! impl_numeric_access {
    ($ty:ty, $width:expr, $get:ident, $to_bytes:ident) => {
        #[doc = concat!("Read a `", stringify!($ty), "` at `offset`")]
        pub fn $get(bytes: &[u8], offset: usize, order: ByteOrder) -> Option<$ty> {
            let end = offset.checked_add($width)?;
            let raw: [u8; $width] = bytes.get(offset..end)?.try_into().ok()?;
            Some(match order {
                ByteOrder::BigEndian => <$ty>::from_be_bytes(raw),
                ByteOrder::LittleEndian => <$ty>::from_le_bytes(raw),
            })
        }

        #[doc = concat!("Render a `", stringify!($ty), "` into bytes")]
        pub fn $to_bytes(value: $ty, order: ByteOrder) -> [u8; $width] {
            match order {
                ByteOrder::BigEndian => value.to_be_bytes(),
                ByteOrder::LittleEndian => value.to_le_bytes(),
            }
        }
    };
}

// ============================================================================
// 16-bit
// ============================================================================

impl_numeric_access!(u16, 2, get_u16, u16_to_bytes);
impl_numeric_access!(i16, 2, get_i16, i16_to_bytes);

// ============================================================================
// 32-bit
// ============================================================================

impl_numeric_access!(u32, 4, get_u32, u32_to_bytes);
impl_numeric_access!(i32, 4, get_i32, i32_to_bytes);
impl_numeric_access!(f32, 4, get_f32, f32_to_bytes);

// ============================================================================
// 64-bit
// ============================================================================

impl_numeric_access!(f64, 8, get_f64, f64_to_bytes);

/// Render bytes as space separated upper-case hex, e.g. `3F F8 00 00`
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse hex text; whitespace, `:` and `-` separators and a `0x` prefix are ignored
pub fn parse_hex(text: &str) -> Option<Vec<u8>> {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: Vec<char> = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks(2)
        .map(|pair| {
            let hi = pair[0].to_digit(16)?;
            let lo = pair[1].to_digit(16)?;
            Some((hi * 16 + lo) as u8)
        })
        .collect()
}
