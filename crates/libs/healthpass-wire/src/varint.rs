//! Base-128 varint encode/decode.

/// A u64 never needs more than ten 7-bit groups.
pub const MAX_VARINT_LEN: usize = 10;

/// Encode `value` as a little-endian base-128 varint.
pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_VARINT_LEN);
    put_varint(&mut buf, value);
    buf
}

/// Append the varint encoding of `value` to `buf`.
pub fn put_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Decode a varint starting at `offset`.
///
/// Returns the value and the number of bytes consumed, or `None` when the
/// buffer ends before a terminating byte, when `offset` is out of range, or
/// when the encoding is longer than [`MAX_VARINT_LEN`] bytes. Only bytes in
/// `buf[offset..]` are ever inspected.
pub fn decode_varint(buf: &[u8], offset: usize) -> Option<(u64, usize)> {
    let input = buf.get(offset..)?;
    let mut value = 0u64;
    for (index, &byte) in input.iter().take(MAX_VARINT_LEN).enumerate() {
        let group = u64::from(byte & 0x7f);
        let shift = 7 * index as u32;
        if index == MAX_VARINT_LEN - 1 && group > 1 {
            // Tenth byte may only carry the top bit of a u64.
            return None;
        }
        value |= group << shift;
        if byte & 0x80 == 0 {
            return Some((value, index + 1));
        }
    }
    None
}
