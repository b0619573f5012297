//! Error types for the Paygate sponsorship service.
//!
//! This module provides the error types for all failure modes in the
//! Paygate system, organized by domain:
//!
//! - [`InputError`] - Malformed operation input (bad numeric strings, missing fields)
//! - [`ConfigError`] - Configuration failures (missing key, missing RPC URL)
//! - [`StoreError`] - Persistence failures and illegal state transitions
//! - [`ChainError`] - Chain-read failures (RPC transport, decoding)
//! - [`SignError`] - Paymaster signing failures
//! - [`PolicyError`] - Rule evaluation failures (not denials)
//! - [`SponsorError`] - Submission outcomes, including structured rejections
//! - [`ReconError`] - Reconciliation job failures
//! - [`PaygateError`] - Top-level error that wraps all error types
//!
//! The taxonomy follows a strict discipline: input and configuration errors
//! are fatal and surfaced before any side effect; authorization rejections
//! are expected outcomes carried as structured, itemized reasons; chain-read
//! errors are recovered per item by the reconciliation engine.

use alloy_primitives::{Address, U256};
use std::fmt;

/// Top-level error type for the Paygate sponsorship service.
///
/// Wraps all domain-specific error types with automatic conversion
/// via the `#[from]` attribute.
#[derive(Debug, thiserror::Error)]
pub enum PaygateError {
    /// Operation input was malformed.
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// Configuration was missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persistence operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Chain read failed.
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// Signing operation failed.
    #[error("signing error: {0}")]
    Sign(#[from] SignError),

    /// Policy evaluation failed (not a denial, an evaluation failure).
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Sponsorship submission failed or was rejected.
    #[error("sponsorship error: {0}")]
    Sponsor(#[from] SponsorError),

    /// Reconciliation job failed.
    #[error("reconciliation error: {0}")]
    Recon(#[from] ReconError),
}

// ============================================================================
// InputError
// ============================================================================

/// Errors caused by malformed operation input.
///
/// These are fatal and rejected before any side effect.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InputError {
    /// A numeric field could not be parsed.
    #[error("malformed numeric value for {field}: {value}")]
    MalformedNumber {
        /// The field that failed to parse.
        field: String,
        /// The offending value.
        value: String,
    },

    /// A required operation field is missing.
    #[error("missing required field: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },

    /// An address string is not a valid 20-byte hex address.
    #[error("invalid address: {address}")]
    InvalidAddress {
        /// The malformed address string.
        address: String,
    },
}

impl InputError {
    /// Create a `MalformedNumber` error.
    #[must_use]
    pub fn malformed_number(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::MalformedNumber {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a `MissingField` error.
    #[must_use]
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create an `InvalidAddress` error.
    #[must_use]
    pub fn invalid_address(address: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
        }
    }
}

// ============================================================================
// ConfigError
// ============================================================================

/// Errors that occur during configuration loading and validation.
///
/// Configuration errors are fatal at startup or first use and are never
/// silently defaulted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path that was not found.
        path: String,
    },

    /// Failed to parse the configuration file.
    #[error("failed to parse configuration: {context}")]
    ParseFailed {
        /// Context about the parsing failure.
        context: String,
    },

    /// A configuration value is invalid.
    #[error("invalid value for {field}: {value}")]
    InvalidValue {
        /// The field name with the invalid value.
        field: String,
        /// The invalid value.
        value: String,
    },

    /// A required configuration field is missing.
    #[error("missing required field: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },

    /// No RPC endpoint is configured for a chain.
    #[error("no RPC endpoint configured for chain {chain_id}")]
    NoEndpoint {
        /// The chain id without an endpoint.
        chain_id: u64,
    },
}

impl ConfigError {
    /// Create a `FileNotFound` error.
    #[must_use]
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Create a `ParseFailed` error.
    #[must_use]
    pub fn parse_failed(context: impl Into<String>) -> Self {
        Self::ParseFailed {
            context: context.into(),
        }
    }

    /// Create an `InvalidValue` error.
    #[must_use]
    pub fn invalid_value(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a `MissingField` error.
    #[must_use]
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

// ============================================================================
// StoreError
// ============================================================================

/// Errors that occur during persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with the given id does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// The kind of record (e.g., "operation", "policy").
        kind: &'static str,
        /// The id that was not found.
        id: i64,
    },

    /// A status transition is not allowed by the operation state machine.
    #[error("illegal transition for operation {id}: {from} -> {to}")]
    IllegalTransition {
        /// The operation id.
        id: i64,
        /// The current status.
        from: String,
        /// The requested status.
        to: String,
    },

    /// The underlying storage failed.
    #[error("storage failure: {context}")]
    Backend {
        /// Context about the failure.
        context: String,
    },
}

impl StoreError {
    /// Create a `NotFound` error.
    #[must_use]
    pub const fn not_found(kind: &'static str, id: i64) -> Self {
        Self::NotFound { kind, id }
    }

    /// Create an `IllegalTransition` error.
    #[must_use]
    pub fn illegal_transition(id: i64, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::IllegalTransition {
            id,
            from: from.into(),
            to: to.into(),
        }
    }

    /// Create a `Backend` error with context.
    #[must_use]
    pub fn backend(context: impl Into<String>) -> Self {
        Self::Backend {
            context: context.into(),
        }
    }
}

// ============================================================================
// ChainError
// ============================================================================

/// Errors that occur during chain reads.
///
/// These are transient/external errors: the reconciliation engine recovers
/// from them per item, and the rule engine surfaces them as evaluation
/// failures. They are never silently ignored.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The HTTP transport failed.
    #[error("transport failure: {context}")]
    Transport {
        /// Context about the transport failure.
        context: String,
    },

    /// The RPC node returned an error response.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// A response could not be decoded.
    #[error("failed to decode response: {context}")]
    Decode {
        /// Context about the decoding failure.
        context: String,
    },

    /// No RPC endpoint is configured for the requested chain.
    #[error("no RPC endpoint configured for chain {chain_id}")]
    NoEndpoint {
        /// The chain id without an endpoint.
        chain_id: u64,
    },
}

impl ChainError {
    /// Create a `Transport` error with context.
    #[must_use]
    pub fn transport(context: impl Into<String>) -> Self {
        Self::Transport {
            context: context.into(),
        }
    }

    /// Create an `Rpc` error.
    #[must_use]
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    /// Create a `Decode` error with context.
    #[must_use]
    pub fn decode(context: impl Into<String>) -> Self {
        Self::Decode {
            context: context.into(),
        }
    }
}

// ============================================================================
// SignError
// ============================================================================

/// Errors that occur while producing the paymaster authorization.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// The configured key material is not a valid secp256k1 scalar.
    #[error("invalid key material")]
    InvalidKey,

    /// The signing operation itself failed.
    #[error("signature failed: {context}")]
    SignatureFailed {
        /// Context about why signing failed.
        context: String,
    },

    /// The requested validity window is not well-ordered.
    #[error("invalid validity window: validAfter={valid_after}, validUntil={valid_until}")]
    InvalidWindow {
        /// Lower bound of the window.
        valid_after: u64,
        /// Upper bound of the window.
        valid_until: u64,
    },
}

impl SignError {
    /// Create a `SignatureFailed` error with context.
    #[must_use]
    pub fn signature_failed(context: impl Into<String>) -> Self {
        Self::SignatureFailed {
            context: context.into(),
        }
    }
}

// ============================================================================
// PolicyError
// ============================================================================

/// Errors that occur during rule evaluation.
///
/// Note: these are evaluation failures, not denials. Denials are carried
/// as structured reasons in [`SponsorError::Rejected`].
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The (metric, scope, interval) combination is not supported.
    #[error("unsupported rule configuration: metric={metric}, scope={scope}, interval={interval}")]
    UnsupportedRule {
        /// The rule metric.
        metric: String,
        /// The rule scope.
        scope: String,
        /// The rule interval.
        interval: String,
    },

    /// A token-balance rule is missing its token address.
    #[error("token-balance rule {rule_id} has no token address")]
    MissingToken {
        /// The misconfigured rule id.
        rule_id: i64,
    },

    /// Reading historical usage failed.
    #[error("usage query failed: {0}")]
    Store(#[from] StoreError),

    /// Reading live chain state failed.
    #[error("chain read failed: {0}")]
    Chain(#[from] ChainError),
}

impl PolicyError {
    /// Create an `UnsupportedRule` error.
    #[must_use]
    pub fn unsupported_rule(
        metric: impl Into<String>,
        scope: impl Into<String>,
        interval: impl Into<String>,
    ) -> Self {
        Self::UnsupportedRule {
            metric: metric.into(),
            scope: scope.into(),
            interval: interval.into(),
        }
    }
}

// ============================================================================
// SponsorError
// ============================================================================

/// Why a single policy candidate was passed over during submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The policy's remaining budget cannot cover the operation.
    BudgetExceeded {
        /// Remaining headroom under the budget ceiling, in wei.
        headroom: U256,
        /// Worst-case cost of the candidate operation, in wei.
        required: U256,
    },
    /// Every active rule of the policy was violated (or failed to evaluate).
    RulesViolated {
        /// Per-rule failure descriptions, in rule creation order.
        violations: Vec<String>,
    },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BudgetExceeded { headroom, required } => {
                write!(
                    f,
                    "budget exceeded: headroom {headroom} wei, required {required} wei"
                )
            }
            Self::RulesViolated { violations } => {
                write!(f, "all rules violated: {}", violations.join("; "))
            }
        }
    }
}

/// A per-policy failure recorded while resolving sponsorship candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyFailure {
    /// The policy that was passed over.
    pub policy_id: i64,
    /// Why it was passed over.
    pub reason: FailureReason,
}

impl fmt::Display for PolicyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "policy {}: {}", self.policy_id, self.reason)
    }
}

/// Errors surfaced by the sponsorship submission contract.
///
/// All variants are explicit structured values; a caller never sees a
/// generic failure.
#[derive(Debug, thiserror::Error)]
pub enum SponsorError {
    /// Operation input was malformed (rejected before any side effect).
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// Configuration was missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persisting the operation record failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Producing the paymaster authorization failed.
    #[error("signing error: {0}")]
    Sign(#[from] SignError),

    /// No active policy admits the sender on this chain.
    #[error("no eligible policy for sender {sender} on chain {chain_id}")]
    NoEligiblePolicy {
        /// The sponsoring paymaster address.
        paymaster: Address,
        /// The chain id of the request.
        chain_id: u64,
        /// The sender that no policy admits.
        sender: Address,
    },

    /// Every eligible policy rejected the operation.
    #[error("sponsorship rejected: {}", format_failures(failures))]
    Rejected {
        /// Per-policy failure reasons, in candidate (newest-first) order.
        failures: Vec<PolicyFailure>,
    },
}

impl SponsorError {
    /// Returns `true` if this error is an authorization rejection rather
    /// than a system failure.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::NoEligiblePolicy { .. } | Self::Rejected { .. })
    }

    /// A human-readable summary suitable for the operation's status note.
    #[must_use]
    pub fn rejection_note(&self) -> String {
        self.to_string()
    }
}

fn format_failures(failures: &[PolicyFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}

// ============================================================================
// ReconError
// ============================================================================

/// Errors from the reconciliation engine's lock and batch machinery.
#[derive(Debug, thiserror::Error)]
pub enum ReconError {
    /// Acquiring or releasing the job lock failed.
    #[error("job lock failure: {0}")]
    Lock(#[source] StoreError),

    /// Fetching the batch of unresolved operations failed.
    #[error("batch fetch failure: {0}")]
    Batch(#[source] StoreError),
}

// ============================================================================
// Result type aliases
// ============================================================================

/// A `Result` type alias using [`PaygateError`] as the error type.
pub type Result<T> = std::result::Result<T, PaygateError>;

/// A `Result` type alias for input validation.
pub type InputResult<T> = std::result::Result<T, InputError>;

/// A `Result` type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A `Result` type alias for persistence operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A `Result` type alias for chain reads.
pub type ChainResult<T> = std::result::Result<T, ChainError>;

/// A `Result` type alias for signing operations.
pub type SignResult<T> = std::result::Result<T, SignError>;

/// A `Result` type alias for rule evaluation.
pub type PolicyResult<T> = std::result::Result<T, PolicyError>;

/// A `Result` type alias for sponsorship submission.
pub type SponsorResult<T> = std::result::Result<T, SponsorError>;

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_paygate_error_from_input_error() {
        let err: PaygateError = InputError::malformed_number("nonce", "0xzz").into();
        assert!(matches!(
            err,
            PaygateError::Input(InputError::MalformedNumber { .. })
        ));
        assert_eq!(
            err.to_string(),
            "input error: malformed numeric value for nonce: 0xzz"
        );
    }

    #[test]
    fn test_paygate_error_from_config_error() {
        let err: PaygateError = ConfigError::missing_field("signer.key").into();
        assert_eq!(
            err.to_string(),
            "configuration error: missing required field: signer.key"
        );
    }

    #[test]
    fn test_store_error_illegal_transition_display() {
        let err = StoreError::illegal_transition(7, "executed", "pending");
        assert_eq!(
            err.to_string(),
            "illegal transition for operation 7: executed -> pending"
        );
    }

    #[test]
    fn test_chain_error_display() {
        assert_eq!(
            ChainError::rpc(-32602, "invalid params").to_string(),
            "rpc error -32602: invalid params"
        );
        assert_eq!(
            ChainError::NoEndpoint { chain_id: 8453 }.to_string(),
            "no RPC endpoint configured for chain 8453"
        );
    }

    #[test]
    fn test_policy_error_unsupported_rule_display() {
        let err = PolicyError::unsupported_rule("token_balance", "policy", "daily");
        assert_eq!(
            err.to_string(),
            "unsupported rule configuration: metric=token_balance, scope=policy, interval=daily"
        );
    }

    #[test]
    fn test_failure_reason_display() {
        let budget = FailureReason::BudgetExceeded {
            headroom: U256::from(50u64),
            required: U256::from(60u64),
        };
        assert_eq!(
            budget.to_string(),
            "budget exceeded: headroom 50 wei, required 60 wei"
        );

        let rules = FailureReason::RulesViolated {
            violations: vec!["rule 1: gas over limit".to_string()],
        };
        assert_eq!(rules.to_string(), "all rules violated: rule 1: gas over limit");
    }

    #[test]
    fn test_sponsor_error_rejected_is_itemized() {
        let err = SponsorError::Rejected {
            failures: vec![
                PolicyFailure {
                    policy_id: 1,
                    reason: FailureReason::BudgetExceeded {
                        headroom: U256::from(50u64),
                        required: U256::from(60u64),
                    },
                },
                PolicyFailure {
                    policy_id: 2,
                    reason: FailureReason::RulesViolated {
                        violations: vec!["rule 9: count over limit".to_string()],
                    },
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("policy 1"));
        assert!(msg.contains("policy 2"));
        assert!(msg.contains("headroom 50 wei"));
        assert!(err.is_rejection());
    }

    #[test]
    fn test_no_eligible_policy_is_rejection() {
        let err = SponsorError::NoEligiblePolicy {
            paymaster: Address::ZERO,
            chain_id: 1,
            sender: Address::ZERO,
        };
        assert!(err.is_rejection());
        assert!(err.to_string().contains("no eligible policy"));
    }

    #[test]
    fn test_system_errors_are_not_rejections() {
        let err: SponsorError = StoreError::backend("disk full").into();
        assert!(!err.is_rejection());
    }

    #[test]
    fn test_errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PaygateError>();
        assert_send_sync::<InputError>();
        assert_send_sync::<ConfigError>();
        assert_send_sync::<StoreError>();
        assert_send_sync::<ChainError>();
        assert_send_sync::<SignError>();
        assert_send_sync::<PolicyError>();
        assert_send_sync::<SponsorError>();
        assert_send_sync::<ReconError>();
    }
}
