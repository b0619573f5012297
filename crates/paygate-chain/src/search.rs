//! Adaptive block-range search for inclusion events.
//!
//! Scanning a whole chain for one event is hopeless; instead the search
//! estimates where in the chain a timestamp falls by linear extrapolation
//! from the current block time and a sample roughly [`SearchParams::sample_depth`]
//! blocks back, widens the range by a safety buffer on both sides, and scans
//! logs in fixed-size chunks to stay under provider result-size limits.

use alloy_primitives::{Address, B256};
use paygate_core::error::ChainResult;
use tracing::debug;

use crate::client::{ChainReader, LogEntry, LogFilter};
use crate::events::user_operation_event_topic;

/// Fallback block time when the sample is degenerate (fresh chain, equal
/// timestamps).
const DEFAULT_SECONDS_PER_BLOCK: u64 = 12;

/// Tuning knobs for the inclusion search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    /// Block-range size per `eth_getLogs` query.
    pub chunk_size: u64,
    /// Blocks subtracted from the estimated start and added to the end.
    pub safety_buffer: u64,
    /// How many blocks back the block-time sample is taken.
    pub sample_depth: u64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            safety_buffer: 100,
            sample_depth: 1000,
        }
    }
}

/// A block-time model fitted from the chain head and one sample block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockClock {
    /// Current head block number.
    pub head: u64,
    /// Timestamp of the head block, unix seconds.
    pub head_timestamp: u64,
    /// Fitted seconds per block.
    pub seconds_per_block: u64,
}

impl BlockClock {
    /// Fits the model from the head and a sample `sample_depth` blocks back.
    ///
    /// # Errors
    ///
    /// Returns [`paygate_core::error::ChainError`] on a failed chain read.
    pub async fn fit(reader: &dyn ChainReader, sample_depth: u64) -> ChainResult<Self> {
        let head = reader.block_number().await?;
        let head_timestamp = reader.block_timestamp(head).await?;
        let sample = head.saturating_sub(sample_depth);
        let seconds_per_block = if sample == head {
            DEFAULT_SECONDS_PER_BLOCK
        } else {
            let sample_timestamp = reader.block_timestamp(sample).await?;
            let elapsed = head_timestamp.saturating_sub(sample_timestamp);
            let fitted = elapsed / (head - sample);
            if fitted == 0 {
                DEFAULT_SECONDS_PER_BLOCK
            } else {
                fitted
            }
        };
        Ok(Self {
            head,
            head_timestamp,
            seconds_per_block,
        })
    }

    /// Estimates the block number at `timestamp` by linear extrapolation.
    /// Timestamps at or past the head estimate the head itself.
    #[must_use]
    pub const fn estimate(&self, timestamp: u64) -> u64 {
        let behind = self.head_timestamp.saturating_sub(timestamp);
        self.head.saturating_sub(behind / self.seconds_per_block)
    }
}

/// Searches `[signed_at, min(expires_at, now)]` for the inclusion event of
/// `user_op_hash` at `entry_point`, returning the first matching log.
///
/// The range is widened by the safety buffer on both sides and scanned in
/// chunks of `params.chunk_size`; the scan stops at the first match.
///
/// # Errors
///
/// Returns [`paygate_core::error::ChainError`] on a failed chain read.
pub async fn find_inclusion(
    reader: &dyn ChainReader,
    entry_point: Address,
    user_op_hash: B256,
    signed_at: u64,
    expires_at: u64,
    params: &SearchParams,
) -> ChainResult<Option<LogEntry>> {
    let clock = BlockClock::fit(reader, params.sample_depth).await?;

    let start = clock
        .estimate(signed_at)
        .saturating_sub(params.safety_buffer);
    let end_timestamp = expires_at.min(clock.head_timestamp);
    let end = clock
        .estimate(end_timestamp)
        .saturating_add(params.safety_buffer)
        .min(clock.head);
    let start = start.min(end);

    debug!(
        user_op_hash = %user_op_hash,
        start,
        end,
        seconds_per_block = clock.seconds_per_block,
        "scanning for inclusion event"
    );

    let mut from = start;
    while from <= end {
        let to = from.saturating_add(params.chunk_size - 1).min(end);
        let filter = LogFilter {
            address: entry_point,
            topics: vec![user_operation_event_topic(), user_op_hash],
            from_block: from,
            to_block: to,
        };
        let logs = reader.logs(&filter).await?;
        if let Some(log) = logs.into_iter().next() {
            return Ok(Some(log));
        }
        if to == end {
            break;
        }
        from = to + 1;
    }
    Ok(None)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::client::MockChainReader;
    use crate::events::{encode_outcome_log, OperationOutcome};
    use alloy_primitives::U256;

    const ENTRY_POINT: Address = Address::new([0xe1; 20]);

    fn outcome_at(block: u64, hash: B256) -> OperationOutcome {
        OperationOutcome {
            user_op_hash: hash,
            sender: Address::from([0x11; 20]),
            paymaster: Address::from([0xaa; 20]),
            nonce: U256::ZERO,
            success: true,
            actual_gas_cost: U256::from(1u64),
            actual_gas_used: U256::from(1u64),
            block_number: block,
            transaction_hash: B256::from([0x77; 32]),
        }
    }

    #[tokio::test]
    async fn test_clock_fits_sample() {
        // 2s blocks from unix zero: block 10_000 at t=20_000
        let reader = MockChainReader::new(10_000).with_block_times(0, 2);
        let clock = BlockClock::fit(&reader, 1000).await.unwrap();
        assert_eq!(clock.head, 10_000);
        assert_eq!(clock.head_timestamp, 20_000);
        assert_eq!(clock.seconds_per_block, 2);
        assert_eq!(clock.estimate(10_000), 5_000);
        // future timestamps clamp to the head
        assert_eq!(clock.estimate(99_999), 10_000);
    }

    #[tokio::test]
    async fn test_clock_degenerate_sample_uses_default() {
        let reader = MockChainReader::new(0).with_block_times(1_000, 2);
        let clock = BlockClock::fit(&reader, 1000).await.unwrap();
        assert_eq!(clock.seconds_per_block, DEFAULT_SECONDS_PER_BLOCK);
    }

    #[tokio::test]
    async fn test_find_inclusion_hits_event_in_range() {
        let hash = B256::from([0xab; 32]);
        let reader = MockChainReader::new(10_000)
            .with_block_times(0, 2)
            .with_log(encode_outcome_log(ENTRY_POINT, &outcome_at(5_010, hash)));

        // signed around t=10_000 (block ~5_000), still valid
        let params = SearchParams::default();
        let found = find_inclusion(&reader, ENTRY_POINT, hash, 10_000, 30_000, &params)
            .await
            .unwrap();
        assert_eq!(found.unwrap().block_number, 5_010);
    }

    #[tokio::test]
    async fn test_find_inclusion_misses_outside_range() {
        let hash = B256::from([0xab; 32]);
        // event long before the signed window
        let reader = MockChainReader::new(10_000)
            .with_block_times(0, 2)
            .with_log(encode_outcome_log(ENTRY_POINT, &outcome_at(100, hash)));

        let params = SearchParams::default();
        let found = find_inclusion(&reader, ENTRY_POINT, hash, 10_000, 30_000, &params)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_find_inclusion_ignores_other_hashes() {
        let wanted = B256::from([0xab; 32]);
        let other = B256::from([0xcd; 32]);
        let reader = MockChainReader::new(10_000)
            .with_block_times(0, 2)
            .with_log(encode_outcome_log(ENTRY_POINT, &outcome_at(5_000, other)));

        let params = SearchParams::default();
        let found = find_inclusion(&reader, ENTRY_POINT, wanted, 10_000, 30_000, &params)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_small_chunks_still_cover_range() {
        let hash = B256::from([0xab; 32]);
        let reader = MockChainReader::new(10_000)
            .with_block_times(0, 2)
            .with_log(encode_outcome_log(ENTRY_POINT, &outcome_at(5_090, hash)));

        let params = SearchParams {
            chunk_size: 7,
            safety_buffer: 100,
            sample_depth: 1000,
        };
        let found = find_inclusion(&reader, ENTRY_POINT, hash, 10_000, 30_000, &params)
            .await
            .unwrap();
        assert_eq!(found.unwrap().block_number, 5_090);
    }
}
