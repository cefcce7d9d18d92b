//! Binary data processing utilities
//!
//! Byte order handling, bit access and fixed-width numeric conversions used by
//! the codec and the simulated transport.
//!
//! S7 controllers store multi-byte values big-endian. `LReal` values exchanged
//! with the tag transport are the one exception and travel little-endian.

pub mod bit_ops;
pub mod byte_order;
pub mod conversions;

pub use bit_ops::*;
pub use byte_order::ByteOrder;
pub use conversions::*;
