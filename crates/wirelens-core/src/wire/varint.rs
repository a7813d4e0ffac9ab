//! Base-128 varint and zig-zag encoding.

use bytes::BufMut;

/// A 64-bit value never needs more than 10 varint bytes
pub const MAX_VARINT_LEN: usize = 10;

/// Read a varint starting at `offset`.
///
/// Returns the value and the number of bytes consumed. At most
/// [`MAX_VARINT_LEN`] bytes are read; a longer run is cut off there and the
/// bits seen so far are returned. `None` means the buffer ended before a
/// terminating byte, which callers treat as end-of-stream.
pub fn read_varint(buf: &[u8], offset: usize) -> Option<(u64, usize)> {
    let data = buf.get(offset..)?;
    let mut result: u64 = 0;

    for (i, &byte) in data.iter().take(MAX_VARINT_LEN).enumerate() {
        // The tenth byte only contributes its lowest bit
        result |= ((byte & 0x7F) as u64).wrapping_shl(7 * i as u32);

        if byte & 0x80 == 0 || i + 1 == MAX_VARINT_LEN {
            return Some((result, i + 1));
        }
    }

    None
}

/// Map a zig-zag encoded value back to a signed integer.
pub fn decode_zigzag(raw: u64) -> i64 {
    ((raw >> 1) as i64) ^ -((raw & 1) as i64)
}

/// Map a signed integer onto the zig-zag encoding.
pub fn encode_zigzag_value(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Append `value` as a varint.
pub fn write_varint(mut value: u64, buf: &mut impl BufMut) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Append `value` zig-zag encoded.
pub fn write_zigzag(value: i64, buf: &mut impl BufMut) {
    write_varint(encode_zigzag_value(value), buf);
}

/// Encode `value` as a standalone varint.
pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(value));
    write_varint(value, &mut out);
    out
}

/// Encode `value` as a standalone zig-zag varint.
pub fn encode_zigzag(value: i64) -> Vec<u8> {
    encode_varint(encode_zigzag_value(value))
}

/// Number of bytes `value` occupies as a varint.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    (bits + 6) / 7
}
