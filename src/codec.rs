//! Float register codec.
//!
//! The SDM120 exposes every value as an IEEE-754 float32 spanning two
//! adjacent 16-bit registers, big-endian within each register and across
//! the pair (byte order ABCD). A register pair is always read and written
//! as one atomic 4-byte unit; partial updates are not valid states.

/// Encode an f32 into two registers, [high, low].
#[inline]
pub fn encode_f32(value: f32) -> [u16; 2] {
    let bits = value.to_bits();
    [(bits >> 16) as u16, (bits & 0xFFFF) as u16]
}

/// Decode two registers (high, low) into an f32.
#[inline]
pub fn decode_f32(reg_high: u16, reg_low: u16) -> f32 {
    f32::from_bits(((reg_high as u32) << 16) | (reg_low as u32))
}

/// The 4-byte big-endian wire payload for an f32 register pair.
#[inline]
pub fn f32_to_be_bytes(value: f32) -> [u8; 4] {
    value.to_be_bytes()
}

/// Decode a 4-byte big-endian register-pair payload.
pub fn f32_from_be_bytes(bytes: &[u8]) -> Option<f32> {
    let bytes: [u8; 4] = bytes.try_into().ok()?;
    Some(f32::from_be_bytes(bytes))
}
