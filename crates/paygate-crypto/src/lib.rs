//! Key handling and EIP-712 paymaster signing for the Paygate
//! sponsorship service.
//!
//! - [`keys`] - Zeroized secret-key material
//! - [`signer`] - Time-bounded EIP-712 paymaster authorizations

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod keys;
pub mod signer;

pub use keys::{SecretKey, SecretKeyError};
pub use signer::{PaymasterAuthorization, PaymasterSigner};
