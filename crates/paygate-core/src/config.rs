//! Configuration types for the Paygate sponsorship service.
//!
//! Configuration is stored in TOML format. Every value not supplied falls
//! back to a documented default, except the signing key and the per-chain
//! RPC endpoints, which have no safe default and fail validation when
//! missing.
//!
//! # Default TOML Output
//!
//! ```toml
//! [signer]
//! key = ""
//! domain_name = "Paygate"
//! domain_version = "1"
//! paymaster = "0x0000000000000000000000000000000000000000"
//! ttl_secs = 3600
//!
//! [entry_point]
//! address = "0x0000000071727De22E5E9d8BAf0edAc6f37da032"
//!
//! [chains]
//! # 8453 = { rpc_url = "https://mainnet.base.org" }
//!
//! [reconciliation]
//! interval_secs = 300
//! staleness_secs = 900
//! batch_size = 50
//! chunk_size = 2000
//! safety_buffer = 100
//! sample_depth = 1000
//!
//! [audit]
//! directory = "~/.paygate/audit"
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use crate::error::{ConfigError, ConfigResult};
use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Top-level configuration for the Paygate daemon.
///
/// # Examples
///
/// ```
/// use paygate_core::config::Config;
///
/// let toml_str = r#"
/// [signer]
/// key = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
/// paymaster = "0x00000000000000000000000000000000000000aa"
///
/// [chains]
/// 8453 = { rpc_url = "https://mainnet.base.org" }
/// "#;
///
/// let config: Config = toml::from_str(toml_str).expect("valid TOML");
/// assert_eq!(config.signer.ttl_secs, 3600);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Signing key and EIP-712 domain settings.
    #[serde(default)]
    pub signer: SignerConfig,

    /// Entry-point contract settings.
    #[serde(default)]
    pub entry_point: EntryPointConfig,

    /// Per-chain RPC endpoints, keyed by chain id.
    #[serde(default)]
    pub chains: HashMap<String, ChainConfig>,

    /// Reconciliation engine settings.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,

    /// Audit log settings.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_domain_name() -> String {
    "Paygate".to_string()
}

fn default_domain_version() -> String {
    "1".to_string()
}

const fn default_ttl_secs() -> u64 {
    3600
}

/// Signing key and EIP-712 domain configuration.
///
/// The key is the service's single long-lived secp256k1 secret, hex-encoded.
/// It is the one value with no default: an empty key fails validation before
/// first use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignerConfig {
    /// Hex-encoded 32-byte secp256k1 secret key (with or without `0x`).
    #[serde(default)]
    pub key: String,

    /// EIP-712 domain name.
    ///
    /// Default: `"Paygate"`
    #[serde(default = "default_domain_name")]
    pub domain_name: String,

    /// EIP-712 domain version.
    ///
    /// Default: `"1"`
    #[serde(default = "default_domain_version")]
    pub domain_version: String,

    /// The paymaster contract the service sponsors through.
    ///
    /// Used as the EIP-712 verifying contract and as the sponsoring
    /// address in policy lookups.
    #[serde(default)]
    pub paymaster: Address,

    /// Default authorization lifetime in seconds (`validUntil = now + ttl`).
    ///
    /// Default: 3600
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            domain_name: default_domain_name(),
            domain_version: default_domain_version(),
            paymaster: Address::ZERO,
            ttl_secs: default_ttl_secs(),
        }
    }
}

/// The canonical v0.7 entry point, deployed at the same address on every
/// supported chain.
const fn default_entry_point() -> Address {
    address!("0000000071727De22E5E9d8BAf0edAc6f37da032")
}

/// Entry-point contract configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryPointConfig {
    /// Entry-point contract address, applied on all chains.
    ///
    /// Default: the canonical v0.7 deployment.
    #[serde(default = "default_entry_point")]
    pub address: Address,
}

impl Default for EntryPointConfig {
    fn default() -> Self {
        Self {
            address: default_entry_point(),
        }
    }
}

/// Per-chain RPC endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainConfig {
    /// HTTP JSON-RPC endpoint URL.
    pub rpc_url: String,
}

const fn default_interval_secs() -> u64 {
    300
}

const fn default_staleness_secs() -> u64 {
    900
}

const fn default_batch_size() -> u64 {
    50
}

const fn default_chunk_size() -> u64 {
    2000
}

const fn default_safety_buffer() -> u64 {
    100
}

const fn default_sample_depth() -> u64 {
    1000
}

/// Reconciliation engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconciliationConfig {
    /// Seconds between reconciliation cycles.
    ///
    /// Default: 300
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Heartbeat age in seconds after which a running job is considered
    /// abandoned and takeable.
    ///
    /// Default: 900
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: u64,

    /// Maximum signed operations fetched per cycle.
    ///
    /// Default: 50
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Block-range chunk size for log queries. Bounded to stay under
    /// provider result-size limits.
    ///
    /// Default: 2000
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Blocks subtracted from the estimated start (and added to the end)
    /// of the search range.
    ///
    /// Default: 100
    #[serde(default = "default_safety_buffer")]
    pub safety_buffer: u64,

    /// How many blocks back the block-time sample is taken for linear
    /// extrapolation.
    ///
    /// Default: 1000
    #[serde(default = "default_sample_depth")]
    pub sample_depth: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            staleness_secs: default_staleness_secs(),
            batch_size: default_batch_size(),
            chunk_size: default_chunk_size(),
            safety_buffer: default_safety_buffer(),
            sample_depth: default_sample_depth(),
        }
    }
}

fn default_audit_directory() -> String {
    "~/.paygate/audit".to_string()
}

/// Audit log configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditConfig {
    /// Directory for the audit log and its HMAC key file.
    ///
    /// Default: `~/.paygate/audit`
    #[serde(default = "default_audit_directory")]
    pub directory: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            directory: default_audit_directory(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level filter (`trace`, `debug`, `info`, `warn`, `error`).
    ///
    /// Default: `"info"`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `"pretty"` or `"json"`.
    ///
    /// Default: `"pretty"`
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional log file path; stderr when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileNotFound`] when the file does not exist,
    /// [`ConfigError::ParseFailed`] on invalid TOML, or a validation error
    /// from [`Config::validate`].
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::file_not_found(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::parse_failed(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            ConfigError::parse_failed(format!("invalid TOML in {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for an empty signing key or
    /// paymaster address, and [`ConfigError::InvalidValue`] for zero
    /// timers/sizes or a chain-table key that is not a decimal chain id.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.signer.key.trim().is_empty() {
            return Err(ConfigError::missing_field("signer.key"));
        }
        if self.signer.paymaster == Address::ZERO {
            return Err(ConfigError::missing_field("signer.paymaster"));
        }
        if self.signer.ttl_secs == 0 {
            return Err(ConfigError::invalid_value("signer.ttl_secs", "0"));
        }
        if self.reconciliation.interval_secs == 0 {
            return Err(ConfigError::invalid_value("reconciliation.interval_secs", "0"));
        }
        if self.reconciliation.staleness_secs == 0 {
            return Err(ConfigError::invalid_value(
                "reconciliation.staleness_secs",
                "0",
            ));
        }
        if self.reconciliation.batch_size == 0 {
            return Err(ConfigError::invalid_value("reconciliation.batch_size", "0"));
        }
        if self.reconciliation.chunk_size == 0 {
            return Err(ConfigError::invalid_value("reconciliation.chunk_size", "0"));
        }
        for (key, chain) in &self.chains {
            if key.parse::<u64>().is_err() {
                return Err(ConfigError::invalid_value("chains", key.clone()));
            }
            if chain.rpc_url.is_empty() {
                return Err(ConfigError::invalid_value(
                    format!("chains.{key}.rpc_url"),
                    "<empty>",
                ));
            }
        }
        Ok(())
    }

    /// The configured RPC endpoints keyed by numeric chain id.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a chain-table key that is
    /// not a decimal chain id.
    pub fn endpoints(&self) -> ConfigResult<HashMap<u64, String>> {
        let mut out = HashMap::with_capacity(self.chains.len());
        for (key, chain) in &self.chains {
            let chain_id: u64 = key
                .parse()
                .map_err(|_| ConfigError::invalid_value("chains", key.clone()))?;
            out.insert(chain_id, chain.rpc_url.clone());
        }
        Ok(out)
    }

    /// Generates a commented default configuration in TOML format.
    #[must_use]
    pub fn default_toml() -> String {
        r#"[signer]
key = ""
domain_name = "Paygate"
domain_version = "1"
paymaster = "0x0000000000000000000000000000000000000000"
ttl_secs = 3600

[entry_point]
address = "0x0000000071727De22E5E9d8BAf0edAc6f37da032"

[chains]
# 8453 = { rpc_url = "https://mainnet.base.org" }

[reconciliation]
interval_secs = 300
staleness_secs = 900
batch_size = 50
chunk_size = 2000
safety_buffer = 100
sample_depth = 1000

[audit]
directory = "~/.paygate/audit"

[logging]
level = "info"
format = "pretty"
"#
        .to_string()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.signer.key =
            "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318".to_string();
        config.signer.paymaster = Address::from([0xaa; 20]);
        config
            .chains
            .insert("8453".to_string(), ChainConfig {
                rpc_url: "https://mainnet.base.org".to_string(),
            });
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.signer.domain_name, "Paygate");
        assert_eq!(config.signer.ttl_secs, 3600);
        assert_eq!(config.entry_point.address, default_entry_point());
        assert_eq!(config.reconciliation.interval_secs, 300);
        assert_eq!(config.reconciliation.staleness_secs, 900);
        assert_eq!(config.reconciliation.batch_size, 50);
        assert_eq!(config.reconciliation.chunk_size, 2000);
        assert_eq!(config.reconciliation.sample_depth, 1000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_requires_key_and_paymaster() {
        let mut config = valid_config();
        config.signer.key = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { ref field }) if field == "signer.key"
        ));

        let mut config = valid_config();
        config.signer.paymaster = Address::ZERO;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { ref field }) if field == "signer.paymaster"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_timers() {
        let mut config = valid_config();
        config.reconciliation.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.signer.ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_numeric_chain_key() {
        let mut config = valid_config();
        config.chains.insert(
            "base".to_string(),
            ChainConfig {
                rpc_url: "https://mainnet.base.org".to_string(),
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoints_parses_chain_ids() {
        let config = valid_config();
        let endpoints = config.endpoints().expect("endpoints");
        assert_eq!(
            endpoints.get(&8453).map(String::as_str),
            Some("https://mainnet.base.org")
        );
    }

    #[test]
    fn test_default_toml_parses_back() {
        let config: Config = toml::from_str(&Config::default_toml()).expect("valid TOML");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_toml_roundtrip_with_chains() {
        let toml_str = r#"
            [signer]
            key = "ab"
            paymaster = "0x00000000000000000000000000000000000000aa"
            ttl_secs = 600

            [chains]
            1 = { rpc_url = "https://eth.example" }
            8453 = { rpc_url = "https://base.example" }

            [reconciliation]
            batch_size = 10
        "#;
        let config: Config = toml::from_str(toml_str).expect("valid TOML");
        assert_eq!(config.signer.ttl_secs, 600);
        assert_eq!(config.reconciliation.batch_size, 10);
        assert_eq!(config.reconciliation.chunk_size, 2000);
        assert_eq!(config.chains.len(), 2);
    }
}
