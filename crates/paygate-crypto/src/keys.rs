//! Secret-key material with secure memory handling.
//!
//! Key material is zeroized on drop, never appears in debug output, and is
//! compared in constant time. `SecretKey` intentionally does not implement
//! `Clone`: keys are moved, not copied.

use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The length of a secret key in bytes.
pub const SECRET_KEY_LEN: usize = 32;

/// A 32-byte secp256k1 secret key with automatic zeroization.
///
/// # Example
///
/// ```
/// use paygate_crypto::keys::SecretKey;
///
/// let key = SecretKey::generate();
/// // zeroized when dropped
/// drop(key);
/// ```
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    bytes: [u8; SECRET_KEY_LEN],
}

impl SecretKey {
    /// Creates a `SecretKey` from raw bytes.
    ///
    /// The input is copied; the caller should zeroize the original if it is
    /// no longer needed.
    #[must_use]
    pub const fn new(bytes: [u8; SECRET_KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Generates a new random key from the operating system's secure RNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Parses a hex-encoded key, with or without a `0x` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`SecretKeyError::InvalidKey`] when the string is not exactly
    /// 32 hex-encoded bytes.
    pub fn from_hex(s: &str) -> Result<Self, SecretKeyError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut decoded = hex::decode(s).map_err(|_| SecretKeyError::InvalidKey)?;
        if decoded.len() != SECRET_KEY_LEN {
            decoded.zeroize();
            return Err(SecretKeyError::InvalidKey);
        }
        let mut bytes = [0u8; SECRET_KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self { bytes })
    }

    /// Exposes the raw bytes for the immediate cryptographic operation.
    /// The reference must not be stored or copied beyond it.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SECRET_KEY_LEN] {
        &self.bytes
    }

    /// Converts into a `k256::ecdsa::SigningKey`, consuming `self` so the
    /// material exists in one place.
    ///
    /// # Errors
    ///
    /// Returns [`SecretKeyError::InvalidKey`] when the bytes are not a valid
    /// secp256k1 scalar (zero, or at or above the curve order).
    pub fn into_signing_key(self) -> Result<k256::ecdsa::SigningKey, SecretKeyError> {
        k256::ecdsa::SigningKey::from_bytes((&self.bytes).into())
            .map_err(|_| SecretKeyError::InvalidKey)
    }
}

/// Errors related to secret key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKeyError {
    /// The provided bytes do not represent a valid secret key.
    InvalidKey,
}

impl std::fmt::Display for SecretKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidKey => write!(f, "invalid secret key bytes"),
        }
    }
}

impl std::error::Error for SecretKeyError {}

// Prevent accidental debug printing of secrets
impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

// Constant-time equality to prevent timing attacks
impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for SecretKey {}

impl From<[u8; SECRET_KEY_LEN]> for SecretKey {
    fn from(bytes: [u8; SECRET_KEY_LEN]) -> Self {
        Self::new(bytes)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
