//! ERC-20 balance reads for token-balance rules.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use paygate_core::error::{ChainError, ChainResult};

use crate::client::ChainReader;

/// Function selector of `balanceOf(address)`.
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// Calldata for `balanceOf(owner)`.
#[must_use]
pub fn balance_of_calldata(owner: Address) -> Bytes {
    let mut data = Vec::with_capacity(4 + 32);
    data.extend_from_slice(&BALANCE_OF_SELECTOR);
    data.extend_from_slice(B256::left_padding_from(owner.as_slice()).as_slice());
    Bytes::from(data)
}

/// Decodes a `balanceOf` return value.
///
/// # Errors
///
/// Returns [`ChainError::Decode`] when the return data is shorter than one
/// 32-byte word.
pub fn decode_balance(data: &Bytes) -> ChainResult<U256> {
    if data.len() < 32 {
        return Err(ChainError::decode(format!(
            "balanceOf returned {} bytes, expected 32",
            data.len()
        )));
    }
    let mut word = [0u8; 32];
    word.copy_from_slice(&data[..32]);
    Ok(U256::from_be_bytes(word))
}

/// Live ERC-20 balance of `owner` on `token`, exact integer comparison
/// downstream (no floating point anywhere).
///
/// # Errors
///
/// Returns [`ChainError`] on a failed or undecodable `eth_call`.
pub async fn balance_of<R: ChainReader + ?Sized>(
    reader: &R,
    token: Address,
    owner: Address,
) -> ChainResult<U256> {
    let result = reader.call(token, balance_of_calldata(owner)).await?;
    decode_balance(&result)
}

/// Token-balance lookup seam used by the rule engine.
///
/// Implemented for every [`ChainReader`]; a trait of its own so rule tests
/// can script balances without a full mock chain.
#[async_trait]
pub trait BalanceReader: Send + Sync {
    /// Live ERC-20 balance of `owner` on `token`.
    async fn token_balance(&self, token: Address, owner: Address) -> ChainResult<U256>;
}

#[async_trait]
impl<T: ChainReader + ?Sized> BalanceReader for T {
    async fn token_balance(&self, token: Address, owner: Address) -> ChainResult<U256> {
        balance_of(self, token, owner).await
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
