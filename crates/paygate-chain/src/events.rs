//! Entry-point inclusion event decoding.
//!
//! An operation's on-chain outcome is the `UserOperationEvent` emitted by
//! the entry point when a bundle executes it, successfully or not.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{sol, SolEvent};
use paygate_core::error::{ChainError, ChainResult};

use crate::client::LogEntry;

sol! {
    /// Emitted by the entry point for every executed operation.
    event UserOperationEvent(
        bytes32 indexed userOpHash,
        address indexed sender,
        address indexed paymaster,
        uint256 nonce,
        bool success,
        uint256 actualGasCost,
        uint256 actualGasUsed
    );
}

/// Topic 0 of `UserOperationEvent`.
#[must_use]
pub fn user_operation_event_topic() -> B256 {
    UserOperationEvent::SIGNATURE_HASH
}

/// The decoded outcome of one included operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    /// The canonical operation hash.
    pub user_op_hash: B256,
    /// The sending account.
    pub sender: Address,
    /// The sponsoring paymaster.
    pub paymaster: Address,
    /// The executed nonce.
    pub nonce: U256,
    /// Whether the operation's execution succeeded.
    pub success: bool,
    /// What the operation actually cost, in wei.
    pub actual_gas_cost: U256,
    /// Gas actually consumed.
    pub actual_gas_used: U256,
    /// Block of inclusion.
    pub block_number: u64,
    /// The including (bundle) transaction.
    pub transaction_hash: B256,
}

/// Decodes a raw log into an [`OperationOutcome`].
///
/// # Errors
///
/// Returns [`ChainError::Decode`] when the log is not a well-formed
/// `UserOperationEvent`.
pub fn decode_outcome(log: &LogEntry) -> ChainResult<OperationOutcome> {
    let event = UserOperationEvent::decode_raw_log(log.topics.iter().copied(), &log.data, true)
        .map_err(|e| ChainError::decode(format!("malformed UserOperationEvent: {e}")))?;
    Ok(OperationOutcome {
        user_op_hash: event.userOpHash,
        sender: event.sender,
        paymaster: event.paymaster,
        nonce: event.nonce,
        success: event.success,
        actual_gas_cost: event.actualGasCost,
        actual_gas_used: event.actualGasUsed,
        block_number: log.block_number,
        transaction_hash: log.transaction_hash,
    })
}

/// Encodes an outcome back into a raw log. Test scaffolding for the
/// reconciliation path.
#[must_use]
pub fn encode_outcome_log(entry_point: Address, outcome: &OperationOutcome) -> LogEntry {
    let event = UserOperationEvent {
        userOpHash: outcome.user_op_hash,
        sender: outcome.sender,
        paymaster: outcome.paymaster,
        nonce: outcome.nonce,
        success: outcome.success,
        actualGasCost: outcome.actual_gas_cost,
        actualGasUsed: outcome.actual_gas_used,
    };
    LogEntry {
        address: entry_point,
        topics: vec![
            UserOperationEvent::SIGNATURE_HASH,
            outcome.user_op_hash,
            B256::left_padding_from(outcome.sender.as_slice()),
            B256::left_padding_from(outcome.paymaster.as_slice()),
        ],
        data: event.encode_data().into(),
        block_number: outcome.block_number,
        transaction_hash: outcome.transaction_hash,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
