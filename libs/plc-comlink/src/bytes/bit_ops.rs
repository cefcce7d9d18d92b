//! Bit-level operations on PLC bytes
//!
//! S7 bit addresses (`M16.3`) number bits LSB-first within a byte, so bit 0 is
//! the `0x01` mask and bit 7 is `0x80`.

/// Highest valid bit index within a byte
pub const MAX_BIT_INDEX: u8 = 7;

/// Extract single bit from u8 value
#[inline]
pub fn extract_bit_u8(value: u8, bit_index: u8) -> bool {
    debug_assert!(bit_index <= MAX_BIT_INDEX, "Bit index out of range: {}", bit_index);
    (value & (1 << bit_index)) != 0
}

/// Return `value` with one bit set or cleared, other bits untouched
#[inline]
pub fn with_bit_u8(value: u8, bit_index: u8, bit: bool) -> u8 {
    debug_assert!(bit_index <= MAX_BIT_INDEX, "Bit index out of range: {}", bit_index);
    if bit {
        value | (1 << bit_index)
    } else {
        value & !(1 << bit_index)
    }
}

/// Read one bit from a byte array, `None` when out of range
pub fn get_bit(bytes: &[u8], byte_offset: usize, bit_index: u8) -> Option<bool> {
    if bit_index > MAX_BIT_INDEX {
        return None;
    }
    bytes
        .get(byte_offset)
        .map(|&byte| extract_bit_u8(byte, bit_index))
}

/// Write one bit into a byte array, leaving the other bits of that byte alone
///
/// Returns `false` when the position is out of range.
pub fn put_bit(bytes: &mut [u8], byte_offset: usize, bit_index: u8, bit: bool) -> bool {
    if bit_index > MAX_BIT_INDEX {
        return false;
    }
    match bytes.get_mut(byte_offset) {
        Some(byte) => {
            *byte = with_bit_u8(*byte, bit_index, bit);
            true
        },
        None => false,
    }
}
