//! Chain-read client.
//!
//! All chain access goes through the [`ChainReader`] trait: current block,
//! block timestamps, transaction lookups, log queries and `eth_call`.
//! [`HttpChainReader`] speaks JSON-RPC 2.0 over HTTP; [`MockChainReader`]
//! serves tests a scripted chain.
//!
//! Timeouts and transport retries live in the HTTP client configuration; a
//! failed read is surfaced as a [`ChainError`] and handled per item by the
//! callers, never silently ignored.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use paygate_core::error::{ChainError, ChainResult};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Gas price and submitter of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInfo {
    /// Effective gas price in wei.
    pub gas_price: U256,
    /// The submitting (bundler) address.
    pub from: Address,
}

/// A log query over one contiguous block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    /// Emitting contract.
    pub address: Address,
    /// Topic filter, position-matched from topic 0.
    pub topics: Vec<B256>,
    /// First block of the range, inclusive.
    pub from_block: u64,
    /// Last block of the range, inclusive.
    pub to_block: u64,
}

/// One decoded-enough log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Emitting contract.
    pub address: Address,
    /// Indexed topics, topic 0 first.
    pub topics: Vec<B256>,
    /// Non-indexed data.
    pub data: Bytes,
    /// Block the log was emitted in.
    pub block_number: u64,
    /// Hash of the including transaction.
    pub transaction_hash: B256,
}

/// Read-only access to one chain.
#[async_trait]
pub trait ChainReader: std::fmt::Debug + Send + Sync {
    /// The current block number.
    async fn block_number(&self) -> ChainResult<u64>;

    /// The timestamp of block `number`, in unix seconds.
    async fn block_timestamp(&self, number: u64) -> ChainResult<u64>;

    /// Gas price and sender of a transaction, `None` when unknown.
    async fn transaction(&self, hash: B256) -> ChainResult<Option<TransactionInfo>>;

    /// Logs matching `filter`.
    async fn logs(&self, filter: &LogFilter) -> ChainResult<Vec<LogEntry>>;

    /// `eth_call` against `to` with `data`, returning the raw result.
    async fn call(&self, to: Address, data: Bytes) -> ChainResult<Bytes>;
}

// ============================================================================
// HttpChainReader
// ============================================================================

/// JSON-RPC 2.0 chain reader over HTTP.
#[derive(Debug, Clone)]
pub struct HttpChainReader {
    client: reqwest::Client,
    url: String,
}

impl HttpChainReader {
    /// Request timeout applied to every RPC call.
    const TIMEOUT: Duration = Duration::from_secs(15);

    /// Creates a reader for one endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Transport`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> ChainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|e| ChainError::transport(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn rpc(&self, method: &str, params: Vec<Value>) -> ChainResult<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::transport(format!("{method} request failed: {e}")))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ChainError::transport(format!("{method} response unreadable: {e}")))?;

        if let Some(error) = body.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(ChainError::rpc(code, message));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| ChainError::decode(format!("no result in {method} response")))
    }
}

fn parse_hex_u64(field: &str, value: &Value) -> ChainResult<u64> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::decode(format!("{field} is not a string")))?;
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16)
        .map_err(|_| ChainError::decode(format!("{field} is not a hex quantity: {s}")))
}

fn parse_hex_u256(field: &str, value: &Value) -> ChainResult<U256> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::decode(format!("{field} is not a string")))?;
    let digits = s.strip_prefix("0x").unwrap_or(s);
    U256::from_str_radix(digits, 16)
        .map_err(|_| ChainError::decode(format!("{field} is not a hex quantity: {s}")))
}

fn parse_address(field: &str, value: &Value) -> ChainResult<Address> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::decode(format!("{field} is not a string")))?;
    Address::from_str(s).map_err(|_| ChainError::decode(format!("{field} is not an address: {s}")))
}

fn parse_b256(field: &str, value: &Value) -> ChainResult<B256> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::decode(format!("{field} is not a string")))?;
    B256::from_str(s).map_err(|_| ChainError::decode(format!("{field} is not a 32-byte hash: {s}")))
}

fn parse_log(value: &Value) -> ChainResult<LogEntry> {
    let topics = value
        .get("topics")
        .and_then(Value::as_array)
        .ok_or_else(|| ChainError::decode("log has no topics"))?
        .iter()
        .map(|t| parse_b256("log.topics", t))
        .collect::<ChainResult<Vec<B256>>>()?;
    let data = value
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| ChainError::decode("log has no data"))?;
    let data =
        Bytes::from_str(data).map_err(|_| ChainError::decode("log data is not hex bytes"))?;
    Ok(LogEntry {
        address: parse_address(
            "log.address",
            value.get("address").unwrap_or(&Value::Null),
        )?,
        topics,
        data,
        block_number: parse_hex_u64(
            "log.blockNumber",
            value.get("blockNumber").unwrap_or(&Value::Null),
        )?,
        transaction_hash: parse_b256(
            "log.transactionHash",
            value.get("transactionHash").unwrap_or(&Value::Null),
        )?,
    })
}

#[async_trait]
impl ChainReader for HttpChainReader {
    async fn block_number(&self) -> ChainResult<u64> {
        let result = self.rpc("eth_blockNumber", vec![]).await?;
        parse_hex_u64("eth_blockNumber", &result)
    }

    async fn block_timestamp(&self, number: u64) -> ChainResult<u64> {
        let result = self
            .rpc(
                "eth_getBlockByNumber",
                vec![json!(format!("0x{number:x}")), json!(false)],
            )
            .await?;
        if result.is_null() {
            return Err(ChainError::decode(format!("block {number} not found")));
        }
        parse_hex_u64(
            "block.timestamp",
            result.get("timestamp").unwrap_or(&Value::Null),
        )
    }

    async fn transaction(&self, hash: B256) -> ChainResult<Option<TransactionInfo>> {
        let result = self
            .rpc("eth_getTransactionByHash", vec![json!(hash.to_string())])
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(TransactionInfo {
            gas_price: parse_hex_u256(
                "tx.gasPrice",
                result.get("gasPrice").unwrap_or(&Value::Null),
            )?,
            from: parse_address("tx.from", result.get("from").unwrap_or(&Value::Null))?,
        }))
    }

    async fn logs(&self, filter: &LogFilter) -> ChainResult<Vec<LogEntry>> {
        let topics: Vec<String> = filter.topics.iter().map(ToString::to_string).collect();
        let params = json!({
            "address": filter.address.to_string(),
            "topics": topics,
            "fromBlock": format!("0x{:x}", filter.from_block),
            "toBlock": format!("0x{:x}", filter.to_block),
        });
        let result = self.rpc("eth_getLogs", vec![params]).await?;
        result
            .as_array()
            .ok_or_else(|| ChainError::decode("eth_getLogs result is not an array"))?
            .iter()
            .map(parse_log)
            .collect()
    }

    async fn call(&self, to: Address, data: Bytes) -> ChainResult<Bytes> {
        let params = vec![
            json!({
                "to": to.to_string(),
                "data": data.to_string(),
            }),
            json!("latest"),
        ];
        let result = self.rpc("eth_call", params).await?;
        let s = result
            .as_str()
            .ok_or_else(|| ChainError::decode("eth_call result is not a string"))?;
        Bytes::from_str(s).map_err(|_| ChainError::decode("eth_call result is not hex bytes"))
    }
}

// ============================================================================
// MockChainReader
// ============================================================================

/// Scripted chain for tests: a fixed head, regular block times, and
/// pre-loaded logs, transactions and call results.
#[derive(Debug, Default)]
pub struct MockChainReader {
    head: u64,
    genesis_timestamp: u64,
    seconds_per_block: u64,
    logs: Vec<LogEntry>,
    transactions: HashMap<B256, TransactionInfo>,
    call_results: HashMap<(Address, Bytes), Bytes>,
}

impl MockChainReader {
    /// A chain at block `head` with 2-second blocks from unix time zero.
    #[must_use]
    pub fn new(head: u64) -> Self {
        Self {
            head,
            genesis_timestamp: 0,
            seconds_per_block: 2,
            logs: Vec::new(),
            transactions: HashMap::new(),
            call_results: HashMap::new(),
        }
    }

    /// Sets the block-time parameters.
    #[must_use]
    pub const fn with_block_times(mut self, genesis_timestamp: u64, seconds_per_block: u64) -> Self {
        self.genesis_timestamp = genesis_timestamp;
        self.seconds_per_block = seconds_per_block;
        self
    }

    /// Adds a log the reader will return for matching filters.
    #[must_use]
    pub fn with_log(mut self, log: LogEntry) -> Self {
        self.logs.push(log);
        self
    }

    /// Adds a transaction lookup result.
    #[must_use]
    pub fn with_transaction(mut self, hash: B256, info: TransactionInfo) -> Self {
        self.transactions.insert(hash, info);
        self
    }

    /// Adds an `eth_call` result for an exact (to, data) pair.
    #[must_use]
    pub fn with_call_result(mut self, to: Address, data: Bytes, result: Bytes) -> Self {
        self.call_results.insert((to, data), result);
        self
    }
}

#[async_trait]
impl ChainReader for MockChainReader {
    async fn block_number(&self) -> ChainResult<u64> {
        Ok(self.head)
    }

    async fn block_timestamp(&self, number: u64) -> ChainResult<u64> {
        Ok(self.genesis_timestamp + number * self.seconds_per_block)
    }

    async fn transaction(&self, hash: B256) -> ChainResult<Option<TransactionInfo>> {
        Ok(self.transactions.get(&hash).cloned())
    }

    async fn logs(&self, filter: &LogFilter) -> ChainResult<Vec<LogEntry>> {
        Ok(self
            .logs
            .iter()
            .filter(|log| {
                log.address == filter.address
                    && log.block_number >= filter.from_block
                    && log.block_number <= filter.to_block
                    && filter
                        .topics
                        .iter()
                        .zip(log.topics.iter())
                        .all(|(want, have)| want == have)
                    && log.topics.len() >= filter.topics.len()
            })
            .cloned()
            .collect())
    }

    async fn call(&self, to: Address, data: Bytes) -> ChainResult<Bytes> {
        self.call_results
            .get(&(to, data))
            .cloned()
            .ok_or_else(|| ChainError::rpc(-32000, "execution reverted"))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
