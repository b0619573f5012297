//! Canonical v0.7 operation hashing.
//!
//! The hash must match the entry point's `getUserOpHash` byte-for-byte:
//! any deviation breaks interoperability with external verifiers.
//!
//! Layout: the unpacked gas fields are packed into two 32-byte words,
//! `initCode`/`callData`/`paymasterAndData` are hashed independently, the
//! eight resulting static fields are ABI-encoded and hashed, and that inner
//! hash is ABI-encoded with the entry-point address and chain id and hashed
//! again.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use paygate_core::types::UserOperation;
use paygate_core::units::{pack_u128_pair, u128_be_bytes};

/// Packs the verification and call gas limits into the `accountGasLimits`
/// word: verification gas in the upper 16 bytes, call gas in the lower.
#[must_use]
pub fn account_gas_limits(op: &UserOperation) -> B256 {
    pack_u128_pair(op.verification_gas_limit, op.call_gas_limit)
}

/// Packs the fee fields into the `gasFees` word: priority fee in the upper
/// 16 bytes, max fee in the lower.
#[must_use]
pub fn gas_fees(op: &UserOperation) -> B256 {
    pack_u128_pair(op.max_priority_fee_per_gas, op.max_fee_per_gas)
}

/// Builds the `paymasterAndData` field:
/// `paymaster (20) ‖ verification gas limit (16) ‖ postOp gas limit (16) ‖ data`.
///
/// Empty when no paymaster is set.
#[must_use]
pub fn pack_paymaster_and_data(op: &UserOperation) -> Bytes {
    let Some(paymaster) = op.paymaster else {
        return Bytes::new();
    };
    let mut out = Vec::with_capacity(20 + 16 + 16 + op.paymaster_data.len());
    out.extend_from_slice(paymaster.as_slice());
    out.extend_from_slice(&u128_be_bytes(op.paymaster_verification_gas_limit));
    out.extend_from_slice(&u128_be_bytes(op.paymaster_post_op_gas_limit));
    out.extend_from_slice(&op.paymaster_data);
    Bytes::from(out)
}

/// The canonical 32-byte identifier of an operation under one entry point
/// on one chain.
///
/// Deterministic: identical input always produces the identical digest, and
/// changing any single field changes it.
#[must_use]
pub fn operation_hash(op: &UserOperation, entry_point: Address, chain_id: u64) -> B256 {
    let packed = (
        op.sender,
        op.nonce,
        keccak256(&op.init_code),
        keccak256(&op.call_data),
        account_gas_limits(op),
        op.pre_verification_gas,
        gas_fees(op),
        keccak256(pack_paymaster_and_data(op)),
    );
    let inner = keccak256(packed.abi_encode());
    keccak256((inner, entry_point, U256::from(chain_id)).abi_encode())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn sample_op() -> UserOperation {
        UserOperation {
            sender: Address::from([0x11; 20]),
            nonce: U256::from(7u64),
            init_code: Bytes::new(),
            call_data: Bytes::from(vec![0xca, 0x11]),
            call_gas_limit: U256::from(100_000u64),
            verification_gas_limit: U256::from(60_000u64),
            pre_verification_gas: U256::from(21_000u64),
            max_fee_per_gas: U256::from(2_000_000_000u64),
            max_priority_fee_per_gas: U256::from(1_000_000_000u64),
            paymaster: Some(Address::from([0xaa; 20])),
            paymaster_verification_gas_limit: U256::from(40_000u64),
            paymaster_post_op_gas_limit: U256::from(20_000u64),
            paymaster_data: Bytes::from(vec![0x01, 0x02]),
            signature: Bytes::new(),
        }
    }

    const ENTRY_POINT: Address = Address::new([0xe1; 20]);

    #[test]
    fn test_hash_is_deterministic() {
        let op = sample_op();
        let a = operation_hash(&op, ENTRY_POINT, 8453);
        let b = operation_hash(&op, ENTRY_POINT, 8453);
        assert_eq!(a, b);
    }

    #[test]
    fn test_every_field_is_bound() {
        let base = operation_hash(&sample_op(), ENTRY_POINT, 8453);

        let mut op = sample_op();
        op.nonce += U256::from(1u8);
        assert_ne!(operation_hash(&op, ENTRY_POINT, 8453), base);

        let mut op = sample_op();
        op.call_data = Bytes::from(vec![0xca, 0x12]);
        assert_ne!(operation_hash(&op, ENTRY_POINT, 8453), base);

        let mut op = sample_op();
        op.max_fee_per_gas += U256::from(1u8);
        assert_ne!(operation_hash(&op, ENTRY_POINT, 8453), base);

        let mut op = sample_op();
        op.paymaster_data = Bytes::from(vec![0x01, 0x03]);
        assert_ne!(operation_hash(&op, ENTRY_POINT, 8453), base);

        // entry point and chain id are bound too
        assert_ne!(
            operation_hash(&sample_op(), Address::from([0xe2; 20]), 8453),
            base
        );
        assert_ne!(operation_hash(&sample_op(), ENTRY_POINT, 1), base);
    }

    #[test]
    fn test_paymaster_and_data_layout() {
        let op = sample_op();
        let packed = pack_paymaster_and_data(&op);
        assert_eq!(packed.len(), 20 + 16 + 16 + 2);
        assert_eq!(&packed[..20], Address::from([0xaa; 20]).as_slice());
        // verification gas limit 40_000 = 0x9c40 at the end of its 16 bytes
        assert_eq!(packed[34], 0x9c);
        assert_eq!(packed[35], 0x40);
        // postOp gas limit 20_000 = 0x4e20
        assert_eq!(packed[50], 0x4e);
        assert_eq!(packed[51], 0x20);
        assert_eq!(&packed[52..], &[0x01, 0x02]);
    }

    #[test]
    fn test_no_paymaster_means_empty_field() {
        let mut op = sample_op();
        op.paymaster = None;
        assert!(pack_paymaster_and_data(&op).is_empty());
        // and the hash of the empty field is keccak("") by construction;
        // absence must still change the overall digest
        assert_ne!(
            operation_hash(&op, ENTRY_POINT, 8453),
            operation_hash(&sample_op(), ENTRY_POINT, 8453)
        );
    }

    #[test]
    fn test_gas_words_match_packing_layout() {
        let op = sample_op();
        let limits = account_gas_limits(&op);
        // verification 60_000 = 0xea60 in upper half, call 100_000 = 0x0186a0 lower
        assert_eq!(limits.0[14], 0xea);
        assert_eq!(limits.0[15], 0x60);
        assert_eq!(limits.0[29], 0x01);
        assert_eq!(limits.0[30], 0x86);
        assert_eq!(limits.0[31], 0xa0);

        let fees = gas_fees(&op);
        // priority fee upper half, max fee lower half
        assert_eq!(
            U256::from_be_bytes(fees.0) >> 128,
            op.max_priority_fee_per_gas
        );
    }
}
