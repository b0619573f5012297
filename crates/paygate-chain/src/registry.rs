//! Per-chain endpoint registry.
//!
//! Maps a chain id to its [`ChainReader`]. A chain without a configured
//! endpoint is a [`ChainError::NoEndpoint`] at first use, never a default.

use crate::client::{ChainReader, HttpChainReader};
use paygate_core::error::{ChainError, ChainResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of chain readers keyed by chain id.
#[derive(Clone, Default)]
pub struct EndpointRegistry {
    readers: HashMap<u64, Arc<dyn ChainReader>>,
}

impl EndpointRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry of HTTP readers from configured endpoint URLs.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Transport`] if an HTTP client cannot be built.
    pub fn from_endpoints(endpoints: &HashMap<u64, String>) -> ChainResult<Self> {
        let mut registry = Self::new();
        for (&chain_id, url) in endpoints {
            registry.insert(chain_id, Arc::new(HttpChainReader::new(url.clone())?));
        }
        Ok(registry)
    }

    /// Registers a reader for a chain, replacing any existing one.
    pub fn insert(&mut self, chain_id: u64, reader: Arc<dyn ChainReader>) {
        self.readers.insert(chain_id, reader);
    }

    /// The reader for `chain_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::NoEndpoint`] when the chain is not configured.
    pub fn reader(&self, chain_id: u64) -> ChainResult<Arc<dyn ChainReader>> {
        self.readers
            .get(&chain_id)
            .cloned()
            .ok_or(ChainError::NoEndpoint { chain_id })
    }

    /// The configured chain ids.
    #[must_use]
    pub fn chain_ids(&self) -> Vec<u64> {
        self.readers.keys().copied().collect()
    }
}

impl std::fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("chains", &self.chain_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::client::MockChainReader;

    #[test]
    fn test_missing_chain_is_no_endpoint() {
        let registry = EndpointRegistry::new();
        let err = registry.reader(8453).unwrap_err();
        assert!(matches!(err, ChainError::NoEndpoint { chain_id: 8453 }));
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = EndpointRegistry::new();
        registry.insert(8453, Arc::new(MockChainReader::new(1)));
        assert!(registry.reader(8453).is_ok());
        assert_eq!(registry.chain_ids(), vec![8453]);
    }

    #[test]
    fn test_from_endpoints_builds_http_readers() {
        let mut endpoints = HashMap::new();
        endpoints.insert(1u64, "https://eth.example".to_string());
        let registry = EndpointRegistry::from_endpoints(&endpoints).unwrap();
        assert!(registry.reader(1).is_ok());
        assert!(registry.reader(2).is_err());
    }
}
