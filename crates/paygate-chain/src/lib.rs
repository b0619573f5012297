//! Chain access for the Paygate sponsorship service.
//!
//! - [`client`] - The [`client::ChainReader`] trait, its JSON-RPC and mock
//!   implementations
//! - [`registry`] - Per-chain endpoint registry
//! - [`userop`] - Canonical v0.7 operation hashing
//! - [`erc20`] - Token balance reads
//! - [`events`] - Inclusion event decoding
//! - [`search`] - Adaptive block-range search

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod erc20;
pub mod events;
pub mod registry;
pub mod search;
pub mod userop;

pub use client::{ChainReader, HttpChainReader, LogEntry, LogFilter, MockChainReader, TransactionInfo};
pub use registry::EndpointRegistry;
