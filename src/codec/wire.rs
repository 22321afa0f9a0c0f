//! Argument primitives for the message payload.
//!
//! Every argument occupies a 4-byte aligned region, little-endian:
//!
//! ```text
//! int / uint / fixed / object / new_id   4 bytes
//! string   u32 length (incl. NUL) + bytes + NUL + zero padding to 4
//! array    u32 byte length + raw u32 elements
//! fd       nothing in the payload, travels as SCM_RIGHTS ancillary data
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::Fixed;
use crate::error::{Result, WaylandError};

/// Size of one protocol word.
pub const WORD_SIZE: usize = 4;

/// Round `len` up to the next word boundary.
#[inline]
pub fn padded_len(len: usize) -> usize {
    (len + WORD_SIZE - 1) & !(WORD_SIZE - 1)
}

/// Wire codec for scalar and composite argument types.
///
/// Encoding appends to a `BytesMut`; decoding consumes from the front of a
/// `Bytes` cursor, so arguments must be read in wire order.
pub struct WireCodec;

impl WireCodec {
    /// Append a signed 32-bit integer.
    #[inline]
    pub fn put_int(buf: &mut BytesMut, value: i32) {
        buf.put_i32_le(value);
    }

    /// Append an unsigned 32-bit integer.
    #[inline]
    pub fn put_uint(buf: &mut BytesMut, value: u32) {
        buf.put_u32_le(value);
    }

    /// Append a fixed-point number.
    #[inline]
    pub fn put_fixed(buf: &mut BytesMut, value: Fixed) {
        buf.put_i32_le(value.to_raw());
    }

    /// Append a string with its NUL terminator and padding.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the string contains an interior NUL,
    /// which the peer would silently truncate.
    pub fn put_string(buf: &mut BytesMut, value: &str) -> Result<()> {
        if value.as_bytes().contains(&0) {
            return Err(WaylandError::protocol(
                "string argument contains an interior NUL byte",
            ));
        }
        let wire_len = value.len() + 1;
        let wire_len_u32 = u32::try_from(wire_len)
            .map_err(|_| WaylandError::protocol("string argument too long"))?;
        buf.put_u32_le(wire_len_u32);
        buf.put_slice(value.as_bytes());
        buf.put_bytes(0, padded_len(wire_len) - value.len());
        Ok(())
    }

    /// Append an array of 32-bit elements.
    pub fn put_array(buf: &mut BytesMut, values: &[u32]) -> Result<()> {
        let byte_len = u32::try_from(values.len() * WORD_SIZE)
            .map_err(|_| WaylandError::protocol("array argument too long"))?;
        buf.put_u32_le(byte_len);
        for value in values {
            buf.put_u32_le(*value);
        }
        Ok(())
    }

    /// Number of payload bytes `put_string` produces for `value`.
    #[inline]
    pub fn string_len(value: &str) -> usize {
        WORD_SIZE + padded_len(value.len() + 1)
    }

    /// Read a signed 32-bit integer.
    pub fn get_int(buf: &mut Bytes) -> Result<i32> {
        ensure_remaining(buf, WORD_SIZE, "int")?;
        Ok(buf.get_i32_le())
    }

    /// Read an unsigned 32-bit integer.
    pub fn get_uint(buf: &mut Bytes) -> Result<u32> {
        ensure_remaining(buf, WORD_SIZE, "uint")?;
        Ok(buf.get_u32_le())
    }

    /// Read a fixed-point number.
    pub fn get_fixed(buf: &mut Bytes) -> Result<Fixed> {
        ensure_remaining(buf, WORD_SIZE, "fixed")?;
        Ok(Fixed::from_raw(buf.get_i32_le()))
    }

    /// Read a string, dropping the NUL terminator and padding.
    ///
    /// A zero length (the protocol's null string) decodes as an empty string.
    pub fn get_string(buf: &mut Bytes) -> Result<String> {
        let wire_len = Self::get_uint(buf)? as usize;
        if wire_len == 0 {
            return Ok(String::new());
        }
        let padded = padded_len(wire_len);
        ensure_remaining(buf, padded, "string")?;

        let raw = buf.split_to(wire_len);
        buf.advance(padded - wire_len);

        let content = match raw.iter().position(|&b| b == 0) {
            Some(nul) => &raw[..nul],
            None => &raw[..],
        };
        String::from_utf8(content.to_vec())
            .map_err(|e| WaylandError::protocol(format!("string argument is not UTF-8: {e}")))
    }

    /// Read an array of 32-bit elements.
    pub fn get_array(buf: &mut Bytes) -> Result<Vec<u32>> {
        let byte_len = Self::get_uint(buf)? as usize;
        if byte_len % WORD_SIZE != 0 {
            return Err(WaylandError::protocol(format!(
                "array length {byte_len} is not a multiple of {WORD_SIZE}"
            )));
        }
        ensure_remaining(buf, byte_len, "array")?;
        Ok((0..byte_len / WORD_SIZE).map(|_| buf.get_u32_le()).collect())
    }
}

fn ensure_remaining(buf: &Bytes, needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(WaylandError::protocol(format!(
            "payload too short for {what} argument: need {needed} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}
