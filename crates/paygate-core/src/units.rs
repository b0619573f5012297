//! Numeric and unit utilities.
//!
//! Wei amounts are `U256` throughout; this module provides the packing used
//! by the v0.7 wire format (two 128-bit sub-fields in one 32-byte word) and
//! the strict string parsing applied to operation input.
//!
//! Packing masks each sub-field to 128 bits rather than rejecting overflow,
//! matching the wire format's truncation semantics.

use crate::error::{InputError, InputResult};
use alloy_primitives::{B256, U256};

/// Mask selecting the low 128 bits of a `U256`.
fn low_128_mask() -> U256 {
    (U256::from(1u8) << 128) - U256::from(1u8)
}

/// Pack two 128-bit quantities into one 32-byte word: `(high << 128) | low`.
///
/// Used for `accountGasLimits` (verification ‖ call) and `gasFees`
/// (priority ‖ max). Each input is masked to its low 128 bits first.
#[must_use]
pub fn pack_u128_pair(high: U256, low: U256) -> B256 {
    let mask = low_128_mask();
    let word = ((high & mask) << 128) | (low & mask);
    B256::from(word)
}

/// Unpack a 32-byte word produced by [`pack_u128_pair`] into its
/// `(high, low)` 128-bit halves.
#[must_use]
pub fn unpack_u128_pair(word: B256) -> (U256, U256) {
    let value = U256::from_be_bytes(word.0);
    let mask = low_128_mask();
    (value >> 128, value & mask)
}

/// The low 128 bits of `value` as 16 big-endian bytes.
///
/// Used for the two paymaster gas limits inside `paymasterAndData`.
#[must_use]
pub fn u128_be_bytes(value: U256) -> [u8; 16] {
    let masked = value & low_128_mask();
    let be: [u8; 32] = masked.to_be_bytes();
    let mut out = [0u8; 16];
    out.copy_from_slice(&be[16..]);
    out
}

/// Parse a quantity string into a `U256`.
///
/// Accepts a `0x`-prefixed hexadecimal string or a plain decimal string.
/// A malformed value is a fatal [`InputError`], surfaced before any side
/// effect.
///
/// # Errors
///
/// Returns [`InputError::MalformedNumber`] when the string is empty, has a
/// bare `0x` prefix, contains invalid digits, or exceeds 256 bits.
pub fn parse_quantity(field: &str, value: &str) -> InputResult<U256> {
    let malformed = || InputError::malformed_number(field, value);
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        if hex.is_empty() {
            return Err(malformed());
        }
        U256::from_str_radix(hex, 16).map_err(|_| malformed())
    } else {
        if value.is_empty() {
            return Err(malformed());
        }
        U256::from_str_radix(value, 10).map_err(|_| malformed())
    }
}

/// Parse a decimal wei amount into a `U256`.
///
/// Stricter than [`parse_quantity`]: hex is not accepted, since budget
/// ceilings and thresholds are configured in plain wei.
///
/// # Errors
///
/// Returns [`InputError::MalformedNumber`] for anything that is not a
/// plain decimal integer within 256 bits.
pub fn parse_wei(field: &str, value: &str) -> InputResult<U256> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InputError::malformed_number(field, value));
    }
    U256::from_str_radix(value, 10).map_err(|_| InputError::malformed_number(field, value))
}

// ============================================================================
// Unit Tests
// ============================================================================
