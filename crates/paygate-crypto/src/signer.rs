//! EIP-712 paymaster signing.
//!
//! The signer produces the time-bounded authorization a paymaster contract
//! verifies on-chain: a typed-data signature binding every operation field,
//! both paymaster gas limits, and the validity window, scoped to a domain of
//! (name, version, chain id, verifying contract = the paymaster address).
//!
//! Output packing is wire-exact:
//! `validAfter (6 bytes) ‖ validUntil (6 bytes) ‖ signature (65 bytes, v = 27 + recovery id)`.

use alloy_primitives::{aliases::U48, Address, Bytes, U256};
use alloy_sol_types::{sol, Eip712Domain, SolStruct};
use k256::ecdsa::SigningKey;
use sha3::{Digest, Keccak256};

use paygate_core::config::SignerConfig;
use paygate_core::error::{ConfigError, ConfigResult, SignError, SignResult};
use paygate_core::types::UserOperation;
use paygate_core::units::pack_u128_pair;

use crate::keys::SecretKey;

sol! {
    /// The typed-data message the paymaster contract reconstructs during
    /// validation. Field order is part of the wire format.
    struct SponsoredUserOperation {
        address sender;
        uint256 nonce;
        bytes initCode;
        bytes callData;
        bytes32 accountGasLimits;
        uint256 preVerificationGas;
        bytes32 gasFees;
        uint128 paymasterVerificationGasLimit;
        uint128 paymasterPostOpGasLimit;
        uint48 validUntil;
        uint48 validAfter;
    }
}

const U48_MASK: u64 = (1 << 48) - 1;

fn low_u128(value: U256) -> u128 {
    let mask: U256 = (U256::from(1u8) << 128) - U256::from(1u8);
    (value & mask).to::<u128>()
}

fn u48_be_bytes(value: u64) -> [u8; 6] {
    let be = (value & U48_MASK).to_be_bytes();
    let mut out = [0u8; 6];
    out.copy_from_slice(&be[2..]);
    out
}

/// A signed, time-bounded paymaster authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymasterAuthorization {
    /// Lower validity bound, unix seconds. Always zero in the current design.
    pub valid_after: u64,
    /// Upper validity bound, unix seconds.
    pub valid_until: u64,
    /// The 77-byte packed blob appended to `paymasterAndData` after the
    /// paymaster gas limits.
    pub data: Bytes,
}

/// The service's single long-lived paymaster signer.
///
/// Constructed once from configuration and passed by reference into the
/// orchestrator; never a process-wide singleton.
pub struct PaymasterSigner {
    signing_key: SigningKey,
    domain_name: String,
    domain_version: String,
    paymaster: Address,
    ttl_secs: u64,
}

impl PaymasterSigner {
    /// Builds the signer from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for an empty key and
    /// [`ConfigError::InvalidValue`] for key material that is not a valid
    /// secp256k1 scalar. Both are surfaced here, before any chain or store
    /// interaction.
    pub fn from_config(config: &SignerConfig) -> ConfigResult<Self> {
        if config.key.trim().is_empty() {
            return Err(ConfigError::missing_field("signer.key"));
        }
        let secret = SecretKey::from_hex(config.key.trim())
            .map_err(|_| ConfigError::invalid_value("signer.key", "<redacted>"))?;
        let signing_key = secret
            .into_signing_key()
            .map_err(|_| ConfigError::invalid_value("signer.key", "<redacted>"))?;
        Ok(Self {
            signing_key,
            domain_name: config.domain_name.clone(),
            domain_version: config.domain_version.clone(),
            paymaster: config.paymaster,
            ttl_secs: config.ttl_secs,
        })
    }

    /// The paymaster contract this signer authorizes for.
    #[must_use]
    pub const fn paymaster(&self) -> Address {
        self.paymaster
    }

    /// The configured default authorization lifetime in seconds.
    #[must_use]
    pub const fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// The signer's Ethereum address: the last 20 bytes of the Keccak-256
    /// hash of the uncompressed public key without its prefix byte.
    #[must_use]
    pub fn address(&self) -> Address {
        let verifying = self.signing_key.verifying_key();
        let point = verifying.to_encoded_point(false);
        let hash = Keccak256::digest(&point.as_bytes()[1..]);
        Address::from_slice(&hash[12..])
    }

    fn domain(&self, chain_id: u64) -> Eip712Domain {
        Eip712Domain::new(
            Some(self.domain_name.clone().into()),
            Some(self.domain_version.clone().into()),
            Some(U256::from(chain_id)),
            Some(self.paymaster),
            None,
        )
    }

    /// Signs a time-bounded authorization over `op` for `chain_id`.
    ///
    /// `validAfter` is always zero; `validUntil = now + ttl`, where `ttl` is
    /// the optional override or the configured default.
    ///
    /// # Errors
    ///
    /// Returns [`SignError::InvalidWindow`] for a window that is not
    /// well-ordered and [`SignError::SignatureFailed`] when the curve
    /// operation fails.
    pub fn authorize(
        &self,
        chain_id: u64,
        op: &UserOperation,
        now: u64,
        ttl_override: Option<u64>,
    ) -> SignResult<PaymasterAuthorization> {
        let valid_after = 0u64;
        let ttl = ttl_override.unwrap_or(self.ttl_secs);
        let valid_until = (now + ttl) & U48_MASK;
        if valid_until <= valid_after {
            return Err(SignError::InvalidWindow {
                valid_after,
                valid_until,
            });
        }

        let message = SponsoredUserOperation {
            sender: op.sender,
            nonce: op.nonce,
            initCode: op.init_code.clone(),
            callData: op.call_data.clone(),
            accountGasLimits: pack_u128_pair(op.verification_gas_limit, op.call_gas_limit),
            preVerificationGas: op.pre_verification_gas,
            gasFees: pack_u128_pair(op.max_priority_fee_per_gas, op.max_fee_per_gas),
            paymasterVerificationGasLimit: low_u128(op.paymaster_verification_gas_limit),
            paymasterPostOpGasLimit: low_u128(op.paymaster_post_op_gas_limit),
            validUntil: U48::from(valid_until),
            validAfter: U48::from(valid_after),
        };
        let digest = message.eip712_signing_hash(&self.domain(chain_id));

        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|_| SignError::signature_failed("secp256k1 signing failed"))?;

        // prevent malleability: keep s in the lower half, flip v to match
        let (signature, recovery_byte) = match signature.normalize_s() {
            Some(normalized) => (normalized, recovery_id.to_byte() ^ 1),
            None => (signature, recovery_id.to_byte()),
        };

        let mut data = Vec::with_capacity(6 + 6 + 65);
        data.extend_from_slice(&u48_be_bytes(valid_after));
        data.extend_from_slice(&u48_be_bytes(valid_until));
        data.extend_from_slice(&signature.to_bytes());
        data.push(27 + recovery_byte);

        Ok(PaymasterAuthorization {
            valid_after,
            valid_until,
            data: Bytes::from(data),
        })
    }
}

impl std::fmt::Debug for PaymasterSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymasterSigner")
            .field("paymaster", &self.paymaster)
            .field("domain_name", &self.domain_name)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use k256::ecdsa::{RecoveryId, Signature as K256Signature, VerifyingKey};

    // well-known test vector: secret key 1
    const KEY_ONE_ADDRESS: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";

    fn signer() -> PaymasterSigner {
        let config = SignerConfig {
            key: format!("0x{}", "00".repeat(31) + "01"),
            domain_name: "Paygate".to_string(),
            domain_version: "1".to_string(),
            paymaster: Address::from([0xaa; 20]),
            ttl_secs: 3600,
        };
        PaymasterSigner::from_config(&config).expect("signer")
    }

    fn sample_op() -> UserOperation {
        UserOperation {
            sender: Address::from([0x11; 20]),
            nonce: U256::from(7u64),
            call_gas_limit: U256::from(100_000u64),
            verification_gas_limit: U256::from(60_000u64),
            pre_verification_gas: U256::from(21_000u64),
            max_fee_per_gas: U256::from(2_000_000_000u64),
            max_priority_fee_per_gas: U256::from(1_000_000_000u64),
            paymaster: Some(Address::from([0xaa; 20])),
            paymaster_verification_gas_limit: U256::from(40_000u64),
            paymaster_post_op_gas_limit: U256::from(20_000u64),
            ..Default::default()
        }
    }

    #[test]
    fn test_construction_rejects_bad_keys() {
        let mut config = SignerConfig::default();
        assert!(matches!(
            PaymasterSigner::from_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.key = "not-hex".to_string();
        assert!(matches!(
            PaymasterSigner::from_config(&config),
            Err(ConfigError::InvalidValue { .. })
        ));

        // zero is not a valid scalar
        config.key = "00".repeat(32);
        assert!(PaymasterSigner::from_config(&config).is_err());
    }

    #[test]
    fn test_address_derivation_known_vector() {
        let signer = signer();
        assert_eq!(
            signer.address(),
            KEY_ONE_ADDRESS.parse::<Address>().unwrap()
        );
    }

    #[test]
    fn test_authorization_packing() {
        let signer = signer();
        let auth = signer
            .authorize(8453, &sample_op(), 1_700_000_000, None)
            .expect("authorize");

        assert_eq!(auth.valid_after, 0);
        assert_eq!(auth.valid_until, 1_700_003_600);
        assert_eq!(auth.data.len(), 6 + 6 + 65);
        // validAfter = 0
        assert!(auth.data[..6].iter().all(|&b| b == 0));
        // validUntil big-endian in the next 6 bytes
        assert_eq!(&auth.data[6..12], &u48_be_bytes(1_700_003_600));
        // v is 27 or 28
        let v = auth.data[76];
        assert!(v == 27 || v == 28);
    }

    #[test]
    fn test_signing_is_deterministic() {
        let signer = signer();
        let a = signer.authorize(8453, &sample_op(), 1_700_000_000, None).unwrap();
        let b = signer.authorize(8453, &sample_op(), 1_700_000_000, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_domain_binds_chain_id() {
        let signer = signer();
        let a = signer.authorize(8453, &sample_op(), 1_700_000_000, None).unwrap();
        let b = signer.authorize(1, &sample_op(), 1_700_000_000, None).unwrap();
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_ttl_override() {
        let signer = signer();
        let auth = signer
            .authorize(8453, &sample_op(), 1_700_000_000, Some(60))
            .unwrap();
        assert_eq!(auth.valid_until, 1_700_000_060);
    }

    #[test]
    fn test_signature_recovers_to_signer_address() {
        let signer = signer();
        let op = sample_op();
        let now = 1_700_000_000u64;
        let auth = signer.authorize(8453, &op, now, None).expect("authorize");

        // rebuild the digest the contract would verify
        let message = SponsoredUserOperation {
            sender: op.sender,
            nonce: op.nonce,
            initCode: op.init_code.clone(),
            callData: op.call_data.clone(),
            accountGasLimits: pack_u128_pair(op.verification_gas_limit, op.call_gas_limit),
            preVerificationGas: op.pre_verification_gas,
            gasFees: pack_u128_pair(op.max_priority_fee_per_gas, op.max_fee_per_gas),
            paymasterVerificationGasLimit: 40_000,
            paymasterPostOpGasLimit: 20_000,
            validUntil: U48::from(auth.valid_until),
            validAfter: U48::from(0u64),
        };
        let digest = message.eip712_signing_hash(&signer.domain(8453));

        let sig = K256Signature::from_slice(&auth.data[12..76]).expect("signature");
        let recid = RecoveryId::try_from(auth.data[76] - 27).expect("recovery id");
        let recovered =
            VerifyingKey::recover_from_prehash(digest.as_slice(), &sig, recid).expect("recover");
        let point = recovered.to_encoded_point(false);
        let hash = Keccak256::digest(&point.as_bytes()[1..]);
        assert_eq!(Address::from_slice(&hash[12..]), signer.address());
    }
}
