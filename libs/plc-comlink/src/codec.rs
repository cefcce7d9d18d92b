//! Type codec: typed values to and from PLC byte buffers
//!
//! Every buffer represents exactly one item and starts at the item's byte
//! offset. Widths and byte orders:
//!
//! | Type | Bytes | Order |
//! |------|-------|-------|
//! | Bool | 1 (bit at `bit_offset`) | - |
//! | Byte, SInt, USInt | 1 | - |
//! | Word, Int | 2 | big-endian |
//! | DWord, DInt, UDInt, Real | 4 | big-endian |
//! | LReal | 8 | little-endian |
//!
//! Values are never clamped: a value that does not fit is an `Overflow`.

use errors::CodecError;
use plc_config::DataType;

use crate::address::ParsedAddress;
use crate::bytes::{self, ByteOrder};
use crate::value::PlcValue;

/// Byte order of `LReal` values on the tag transport
pub const LREAL_BYTE_ORDER: ByteOrder = ByteOrder::LittleEndian;

/// Stateless encoder/decoder
pub struct PlcCodec;

impl PlcCodec {
    /// Zeroed buffer sized for one value of `data_type`
    pub fn allocate(data_type: DataType) -> Result<Vec<u8>, CodecError> {
        let width = wire_width(data_type)?;
        Ok(vec![0u8; width])
    }

    /// Encode `value` into a fresh buffer
    ///
    /// A `Bool` only sets its own bit inside a zeroed byte; merging into the
    /// device byte is left to the transport.
    pub fn encode(
        data_type: DataType,
        address: &ParsedAddress,
        value: &PlcValue,
    ) -> Result<Vec<u8>, CodecError> {
        let name = data_type.code();
        let buf = match data_type {
            DataType::Bool => {
                let bit = coerce_bool(name, value)?;
                let mut buf = vec![0u8; 1];
                bytes::put_bit(&mut buf, 0, address.bit_offset, bit);
                buf
            },
            DataType::Byte | DataType::USInt => {
                vec![integer_in_range(name, value, 0, i64::from(u8::MAX))? as u8]
            },
            DataType::SInt => {
                let v = integer_in_range(name, value, i64::from(i8::MIN), i64::from(i8::MAX))?;
                vec![v as i8 as u8]
            },
            DataType::Word => {
                let v = integer_in_range(name, value, 0, i64::from(u16::MAX))?;
                bytes::u16_to_bytes(v as u16, ByteOrder::BigEndian).to_vec()
            },
            DataType::Int => {
                let v = integer_in_range(name, value, i64::from(i16::MIN), i64::from(i16::MAX))?;
                bytes::i16_to_bytes(v as i16, ByteOrder::BigEndian).to_vec()
            },
            DataType::DWord | DataType::UDInt => {
                let v = integer_in_range(name, value, 0, i64::from(u32::MAX))?;
                bytes::u32_to_bytes(v as u32, ByteOrder::BigEndian).to_vec()
            },
            DataType::DInt => {
                let v = integer_in_range(name, value, i64::from(i32::MIN), i64::from(i32::MAX))?;
                bytes::i32_to_bytes(v as i32, ByteOrder::BigEndian).to_vec()
            },
            DataType::Real => {
                let v = coerce_float(name, value)?;
                if v.abs() > f64::from(f32::MAX) {
                    return Err(overflow(name, value));
                }
                bytes::f32_to_bytes(v as f32, ByteOrder::BigEndian).to_vec()
            },
            DataType::LReal => {
                let v = coerce_float(name, value)?;
                bytes::f64_to_bytes(v, LREAL_BYTE_ORDER).to_vec()
            },
            DataType::String | DataType::WString => {
                return Err(CodecError::UnsupportedType(name));
            },
        };
        Ok(buf)
    }

    /// Decode one value from the start of `buffer`
    pub fn decode(
        data_type: DataType,
        address: &ParsedAddress,
        buffer: &[u8],
    ) -> Result<PlcValue, CodecError> {
        let name = data_type.code();
        let width = wire_width(data_type)?;
        if buffer.len() < width {
            return Err(CodecError::BufferSizeMismatch {
                data_type: name,
                expected: width,
                actual: buffer.len(),
            });
        }

        let mismatch = || CodecError::BufferSizeMismatch {
            data_type: name,
            expected: width,
            actual: buffer.len(),
        };
        let value = match data_type {
            DataType::Bool => {
                PlcValue::Bool(bytes::get_bit(buffer, 0, address.bit_offset).ok_or_else(mismatch)?)
            },
            DataType::Byte | DataType::USInt => PlcValue::Int(i64::from(buffer[0]) & 0xFF),
            DataType::SInt => PlcValue::Int(i64::from(buffer[0] as i8)),
            DataType::Word => PlcValue::from(
                bytes::get_u16(buffer, 0, ByteOrder::BigEndian).ok_or_else(mismatch)?,
            ),
            DataType::Int => PlcValue::Int(i64::from(
                bytes::get_i16(buffer, 0, ByteOrder::BigEndian).ok_or_else(mismatch)?,
            )),
            DataType::DWord | DataType::UDInt => PlcValue::Int(
                i64::from(bytes::get_u32(buffer, 0, ByteOrder::BigEndian).ok_or_else(mismatch)?)
                    & 0xFFFF_FFFF,
            ),
            DataType::DInt => PlcValue::Int(i64::from(
                bytes::get_i32(buffer, 0, ByteOrder::BigEndian).ok_or_else(mismatch)?,
            )),
            DataType::Real => PlcValue::from(
                bytes::get_f32(buffer, 0, ByteOrder::BigEndian).ok_or_else(mismatch)?,
            ),
            DataType::LReal => {
                PlcValue::Float(bytes::get_f64(buffer, 0, LREAL_BYTE_ORDER).ok_or_else(mismatch)?)
            },
            DataType::String | DataType::WString => {
                return Err(CodecError::UnsupportedType(name));
            },
        };
        Ok(value)
    }
}

/// Bytes moved for one value; string types are rejected
pub fn wire_width(data_type: DataType) -> Result<usize, CodecError> {
    data_type
        .wire_width()
        .ok_or(CodecError::UnsupportedType(data_type.code()))
}

// ============================================================================
// Coercion
// ============================================================================

fn malformed(data_type: &'static str, value: &PlcValue) -> CodecError {
    CodecError::MalformedInput {
        data_type,
        value: value.to_string(),
    }
}

fn overflow(data_type: &'static str, value: &PlcValue) -> CodecError {
    CodecError::Overflow {
        data_type,
        value: value.to_string(),
    }
}

fn coerce_bool(data_type: &'static str, value: &PlcValue) -> Result<bool, CodecError> {
    value.as_bool().ok_or_else(|| malformed(data_type, value))
}

/// Integral value of `value`; fractional floats are malformed, huge ones overflow
fn coerce_integer(data_type: &'static str, value: &PlcValue) -> Result<i64, CodecError> {
    let from_float = |f: f64| {
        if !f.is_finite() || f.fract() != 0.0 {
            Err(malformed(data_type, value))
        } else if f < i64::MIN as f64 || f >= i64::MAX as f64 {
            Err(overflow(data_type, value))
        } else {
            Ok(f as i64)
        }
    };

    match value {
        PlcValue::Bool(b) => Ok(i64::from(*b)),
        PlcValue::Int(i) => Ok(*i),
        PlcValue::Float(f) => from_float(*f),
        PlcValue::Text(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(i);
            }
            match s.parse::<f64>() {
                Ok(f) => from_float(f),
                Err(_) => Err(malformed(data_type, value)),
            }
        },
    }
}

fn integer_in_range(
    data_type: &'static str,
    value: &PlcValue,
    min: i64,
    max: i64,
) -> Result<i64, CodecError> {
    let v = coerce_integer(data_type, value)?;
    if v < min || v > max {
        return Err(overflow(data_type, value));
    }
    Ok(v)
}

fn coerce_float(data_type: &'static str, value: &PlcValue) -> Result<f64, CodecError> {
    let v = match value {
        PlcValue::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        },
        PlcValue::Int(i) => *i as f64,
        PlcValue::Float(f) => *f,
        PlcValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| malformed(data_type, value))?,
    };
    if v.is_nan() {
        return Err(malformed(data_type, value));
    }
    if v.is_infinite() {
        return Err(overflow(data_type, value));
    }
    Ok(v)
}
