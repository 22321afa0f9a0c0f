//! 24.8 signed fixed-point numbers.
//!
//! The protocol carries every non-integer number as a 32-bit two's-complement
//! integer holding `value * 256`. Decoding goes through the IEEE-754 bit
//! pattern instead of a floating-point multiply so that every fixed value maps
//! to exactly one double:
//!
//! ```text
//! bits = ((1023 + 44) << 52) + (1 << 51) + fixed
//! value = f64::from_bits(bits) - (3 << 43)
//! ```
//!
//! # Example
//!
//! ```
//! use wayland_wire::codec::Fixed;
//!
//! let fixed = Fixed::from_raw(0x012030);
//! assert_eq!(fixed.to_f64(), 288.1875);
//! assert_eq!(Fixed::from_f64(288.1875), fixed);
//! ```

use std::fmt;

/// A 24.8 signed fixed-point number as it appears on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fixed(i32);

impl Fixed {
    /// Zero.
    pub const ZERO: Fixed = Fixed(0);

    /// Wrap a raw wire value.
    #[inline]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw wire value.
    #[inline]
    pub const fn to_raw(self) -> i32 {
        self.0
    }

    /// Convert from a double, rounding to the nearest 1/256.
    ///
    /// Values outside the 24-bit integer range saturate.
    #[inline]
    pub fn from_f64(value: f64) -> Self {
        Self((value * 256.0).round() as i32)
    }

    /// Convert to a double. Exact for every fixed value.
    #[inline]
    pub fn to_f64(self) -> f64 {
        let bits = ((1023_i64 + 44) << 52) + (1_i64 << 51) + i64::from(self.0);
        f64::from_bits(bits as u64) - (3_i64 << 43) as f64
    }

    /// Convert from an integer. The integer must fit in 24 bits.
    #[inline]
    pub const fn from_int(value: i32) -> Self {
        Self(value.wrapping_mul(256))
    }

    /// Integer part, rounded toward zero.
    #[inline]
    pub const fn to_int(self) -> i32 {
        self.0 / 256
    }
}

impl From<f64> for Fixed {
    fn from(value: f64) -> Self {
        Self::from_f64(value)
    }
}

impl From<Fixed> for f64 {
    fn from(value: Fixed) -> Self {
        value.to_f64()
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}
