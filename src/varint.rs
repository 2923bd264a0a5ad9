//! Unsigned varint encoding for the wire format.
//!
//! Values are stored little-endian in 7-bit groups; the high bit of each
//! byte flags a continuation. A `u64` needs at most ten bytes.

use crate::error::{Error, Result};

/// Maximum encoded length of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Encode `value` into `buf`, returning the number of bytes written.
pub fn encode(mut value: u64, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut i = 0;
    while value >= 0x80 {
        buf[i] = (value as u8) | 0x80;
        value >>= 7;
        i += 1;
    }
    buf[i] = value as u8;
    i + 1
}

/// Decode a varint from the front of `buf`, returning the value and the
/// number of bytes consumed.
///
/// # Errors
///
/// Returns [`Error::Varint`] when the encoding is truncated or would
/// overflow 64 bits.
pub fn decode(buf: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;

    for (i, &byte) in buf.iter().enumerate() {
        if i == MAX_VARINT_LEN {
            return Err(Error::Varint);
        }
        if byte < 0x80 {
            // The tenth byte may only carry a single bit.
            if i == MAX_VARINT_LEN - 1 && byte > 1 {
                return Err(Error::Varint);
            }
            return Ok((value | (u64::from(byte) << shift), i + 1));
        }
        value |= u64::from(byte & 0x7F) << shift;
        shift += 7;
    }

    Err(Error::Varint)
}
