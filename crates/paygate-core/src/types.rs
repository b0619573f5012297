//! Core types for the Paygate sponsorship service.
//!
//! This module provides the foundational types used across all Paygate crates:
//!
//! - [`UserOperation`] - Unpacked v0.7 account-abstraction operation
//! - [`Policy`] / [`PolicyStatus`] - Administrator-defined spending policy
//! - [`PolicyRule`] and its [`RuleMetric`] / [`RuleScope`] / [`Comparator`] /
//!   [`RuleInterval`] dimensions
//! - [`SponsoredOperation`] / [`OpStatus`] - A sponsored operation and its
//!   lifecycle state machine
//! - [`ReconciliationJob`] / [`JobStatus`] - The exclusive reconciliation job
//! - [`StatusChange`] - Append-only audit row for every status transition
//!
//! # Examples
//!
//! ```
//! use paygate_core::types::{OpStatus, UserOperation};
//! use alloy_primitives::U256;
//!
//! let op = UserOperation {
//!     call_gas_limit: U256::from(100_000u64),
//!     verification_gas_limit: U256::from(60_000u64),
//!     pre_verification_gas: U256::from(21_000u64),
//!     max_fee_per_gas: U256::from(2_000_000_000u64),
//!     ..Default::default()
//! };
//! assert_eq!(op.max_cost(), U256::from(181_000u64) * U256::from(2_000_000_000u64));
//! assert!(OpStatus::Pending.can_transition(OpStatus::Signed));
//! assert!(!OpStatus::Executed.can_transition(OpStatus::Pending));
//! ```

use alloy_primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// UserOperation
// ============================================================================

/// An unpacked v0.7 account-abstraction operation, as submitted for
/// sponsorship.
///
/// All quantity fields are `U256`; packing into the on-chain 32-byte words
/// (`accountGasLimits`, `gasFees`) happens only at hash and signature time,
/// with truncation to 128 bits per sub-field matching the wire format.
///
/// The paymaster fields are optional on input: the service fills them in when
/// it agrees to sponsor the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// The smart account sending the operation.
    pub sender: Address,

    /// Anti-replay nonce (key ‖ sequence, per the entry point's nonce manager).
    pub nonce: U256,

    /// Factory address and calldata for counterfactual deployment.
    ///
    /// Empty when the account is already deployed.
    #[serde(default)]
    pub init_code: Bytes,

    /// The calldata the account executes.
    #[serde(default)]
    pub call_data: Bytes,

    /// Gas limit for the account's execution phase.
    pub call_gas_limit: U256,

    /// Gas limit for the account's verification phase.
    pub verification_gas_limit: U256,

    /// Gas paid to the bundler to cover calldata and overhead.
    pub pre_verification_gas: U256,

    /// Maximum total fee per gas (EIP-1559).
    pub max_fee_per_gas: U256,

    /// Maximum priority fee per gas (EIP-1559).
    pub max_priority_fee_per_gas: U256,

    /// The sponsoring paymaster contract, once assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,

    /// Gas limit for the paymaster's validation phase.
    #[serde(default)]
    pub paymaster_verification_gas_limit: U256,

    /// Gas limit for the paymaster's post-operation phase.
    #[serde(default)]
    pub paymaster_post_op_gas_limit: U256,

    /// Paymaster-supplied authorization bytes (validity window + signature).
    #[serde(default)]
    pub paymaster_data: Bytes,

    /// The account's own signature over the operation hash.
    ///
    /// Not produced by this service; carried through so the stored payload
    /// snapshot matches what the caller submitted.
    #[serde(default)]
    pub signature: Bytes,
}

impl UserOperation {
    /// Worst-case cost of this operation in wei.
    ///
    /// Sum of all five gas limits multiplied by the maximum fee per gas.
    /// This is the amount debited from a policy's budget until the actual
    /// cost is known from reconciliation.
    #[must_use]
    pub fn max_cost(&self) -> U256 {
        let total_gas = self.call_gas_limit
            + self.verification_gas_limit
            + self.pre_verification_gas
            + self.paymaster_verification_gas_limit
            + self.paymaster_post_op_gas_limit;
        total_gas * self.max_fee_per_gas
    }

    /// Returns `true` if the operation deploys its account.
    #[must_use]
    pub fn deploys_account(&self) -> bool {
        !self.init_code.is_empty()
    }
}

impl Default for UserOperation {
    fn default() -> Self {
        Self {
            sender: Address::ZERO,
            nonce: U256::ZERO,
            init_code: Bytes::new(),
            call_data: Bytes::new(),
            call_gas_limit: U256::ZERO,
            verification_gas_limit: U256::ZERO,
            pre_verification_gas: U256::ZERO,
            max_fee_per_gas: U256::ZERO,
            max_priority_fee_per_gas: U256::ZERO,
            paymaster: None,
            paymaster_verification_gas_limit: U256::ZERO,
            paymaster_post_op_gas_limit: U256::ZERO,
            paymaster_data: Bytes::new(),
            signature: Bytes::new(),
        }
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Lifecycle status of a [`Policy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    /// The policy sponsors new operations.
    #[default]
    Active,
    /// The policy is retained for accounting but sponsors nothing.
    Inactive,
}

impl PolicyStatus {
    /// Returns the string representation of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An administrator-defined spending policy.
///
/// Created by an external management surface; consumed read-only here.
/// A policy admits a sender when it is active, its validity window contains
/// the present moment, and the sender is either covered by the public flag
/// or present in the whitelist. Address comparison is canonical: parsing
/// into [`Address`] removes any case sensitivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Unique policy id.
    pub id: i64,

    /// The paymaster contract this policy sponsors through.
    pub paymaster: Address,

    /// The chain this policy applies to.
    pub chain_id: u64,

    /// Lifecycle status.
    pub status: PolicyStatus,

    /// Budget ceiling in wei. Committed costs are debited against this.
    pub budget_wei: U256,

    /// When `true`, any sender is admitted.
    pub public: bool,

    /// Senders admitted when the policy is not public.
    ///
    /// `None` means no whitelist exists; a non-public policy without a
    /// whitelist admits nobody.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<Vec<Address>>,

    /// Start of the validity window.
    pub valid_from: DateTime<Utc>,

    /// End of the validity window; `None` means open-ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,

    /// Creation time, used for newest-first candidate ordering.
    pub created_at: DateTime<Utc>,
}

impl Policy {
    /// Returns `true` if this policy admits `sender` at time `now`.
    ///
    /// Checks, in order: active status, validity window, then the public
    /// flag or whitelist membership.
    #[must_use]
    pub fn admits(&self, sender: Address, now: DateTime<Utc>) -> bool {
        if self.status != PolicyStatus::Active {
            return false;
        }
        if now < self.valid_from {
            return false;
        }
        if let Some(valid_to) = self.valid_to {
            if now > valid_to {
                return false;
            }
        }
        if self.public {
            return true;
        }
        self.whitelist
            .as_ref()
            .is_some_and(|list| list.contains(&sender))
    }
}

// ============================================================================
// PolicyRule
// ============================================================================

/// What a rule measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMetric {
    /// Wei spent on gas, summed from effective operation costs.
    GasSpent,
    /// Number of sponsored operations.
    TransactionCount,
    /// Live ERC-20 balance of the sender.
    TokenBalance,
}

impl RuleMetric {
    /// Returns the string representation of this metric.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GasSpent => "gas_spent",
            Self::TransactionCount => "transaction_count",
            Self::TokenBalance => "token_balance",
        }
    }
}

impl fmt::Display for RuleMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What population a rule aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    /// Each operation tested individually.
    Operation,
    /// All operations of the requesting sender on the chain.
    Wallet,
    /// All operations sponsored by the owning policy.
    Policy,
}

impl RuleScope {
    /// Returns the string representation of this scope.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Operation => "operation",
            Self::Wallet => "wallet",
            Self::Policy => "policy",
        }
    }
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The comparator a rule's threshold is stated with.
///
/// A rule expresses the *permitted* relation (e.g. "gas spent ≤ N"). The
/// evaluation engine inverts it into a violation predicate; see the policy
/// crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// Less than or equal.
    Le,
    /// Strictly less than.
    Lt,
    /// Greater than or equal.
    Ge,
    /// Strictly greater than.
    Gt,
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
}

impl Comparator {
    /// Returns the mathematical symbol for this comparator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Le => "<=",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Gt => ">",
            Self::Eq => "=",
            Self::Ne => "!=",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The time window a rule aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleInterval {
    /// Instantaneous: live state, no history.
    Now,
    /// Calendar-day buckets.
    Daily,
    /// ISO-week buckets.
    Weekly,
    /// Calendar-month buckets.
    Monthly,
    /// One unbounded aggregate.
    Lifetime,
}

impl RuleInterval {
    /// Returns the string representation of this interval.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Now => "now",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Lifetime => "lifetime",
        }
    }
}

impl fmt::Display for RuleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One rule of a [`Policy`].
///
/// Rules of the same policy are evaluated in creation order; the first rule
/// that is not violated admits the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Unique rule id.
    pub id: i64,

    /// The owning policy.
    pub policy_id: i64,

    /// What this rule measures.
    pub metric: RuleMetric,

    /// What population it aggregates over.
    pub scope: RuleScope,

    /// The permitted relation against the threshold.
    pub comparator: Comparator,

    /// The aggregation window.
    pub interval: RuleInterval,

    /// The threshold value (wei for gas, a count, or token base units).
    pub threshold: U256,

    /// Token contract address. Required for [`RuleMetric::TokenBalance`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Address>,

    /// Start of the rule's validity window.
    pub valid_from: DateTime<Utc>,

    /// End of the rule's validity window; `None` means open-ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,

    /// Creation time; drives evaluation order.
    pub created_at: DateTime<Utc>,
}

impl PolicyRule {
    /// Returns `true` if this rule's validity window contains `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if now < self.valid_from {
            return false;
        }
        match self.valid_to {
            Some(valid_to) => now <= valid_to,
            None => true,
        }
    }

    /// A short human-readable description, used in rejection reports.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "rule {}: {} per {} {} {} {}",
            self.id, self.metric, self.scope, self.interval, self.comparator, self.threshold
        )
    }
}

// ============================================================================
// SponsoredOperation
// ============================================================================

/// Lifecycle status of a [`SponsoredOperation`].
///
/// The transition table is closed:
///
/// ```text
/// pending -> signed | validation_failed
/// signed  -> executed | failed | expired
/// ```
///
/// `executed`, `failed`, `validation_failed` and `expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    /// Persisted, awaiting validation and signing.
    #[default]
    Pending,
    /// Authorization signed; awaiting chain outcome.
    Signed,
    /// Found on-chain with a successful outcome.
    Executed,
    /// Found on-chain with a failed outcome.
    Failed,
    /// Rejected during validation; never signed.
    ValidationFailed,
    /// Authorization expired without an on-chain outcome.
    Expired,
}

impl OpStatus {
    /// Returns the string representation of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Signed => "signed",
            Self::Executed => "executed",
            Self::Failed => "failed",
            Self::ValidationFailed => "validation_failed",
            Self::Expired => "expired",
        }
    }

    /// Returns `true` if the state machine permits moving to `to`.
    #[must_use]
    pub const fn can_transition(&self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Signed | Self::ValidationFailed)
                | (Self::Signed, Self::Executed | Self::Failed | Self::Expired)
        )
    }

    /// Returns `true` if no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Executed | Self::Failed | Self::ValidationFailed | Self::Expired
        )
    }
}

impl fmt::Display for OpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A sponsored operation record.
///
/// Mutated only by the sponsorship orchestrator and the reconciliation
/// engine; every status transition is mirrored into [`StatusChange`] rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsoredOperation {
    /// Unique operation id.
    pub id: i64,

    /// The policy that accepted it; set once accepted.
    pub policy_id: Option<i64>,

    /// The chain the operation targets.
    pub chain_id: u64,

    /// The sending smart account.
    pub sender: Address,

    /// Canonical operation hash; set after signing.
    pub hash: Option<B256>,

    /// Lifecycle status.
    pub status: OpStatus,

    /// Snapshot of the operation payload. After signing this is overwritten
    /// with the exact signed representation returned to the caller.
    pub payload: serde_json::Value,

    /// Worst-case cost at submission time, in wei.
    pub estimated_max_cost: U256,

    /// Actual cost learned from reconciliation, in wei.
    pub actual_cost: Option<U256>,

    /// Lower bound of the signed validity window (unix seconds).
    pub valid_after: u64,

    /// Upper bound of the signed validity window (unix seconds).
    pub valid_until: u64,

    /// Free-text status note (rejection reasons, reconciliation errors).
    pub note: Option<String>,

    /// Creation time.
    pub created_at: DateTime<Utc>,

    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl SponsoredOperation {
    /// The cost this operation contributes to budget accounting:
    /// the actual cost once known, otherwise the estimate.
    #[must_use]
    pub fn effective_cost(&self) -> U256 {
        self.actual_cost.unwrap_or(self.estimated_max_cost)
    }

    /// Returns `true` if the signed validity window has closed at `now`
    /// (unix seconds).
    #[must_use]
    pub const fn is_expired_at(&self, now: u64) -> bool {
        self.valid_until != 0 && now > self.valid_until
    }
}

// ============================================================================
// ReconciliationJob
// ============================================================================

/// Lifecycle status of a [`ReconciliationJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// The job holds the exclusive reconciliation lock.
    Running,
    /// The job finished its batch.
    Completed,
    /// The job hit a fatal error or was taken over as stale.
    Failed,
}

impl JobStatus {
    /// Returns the string representation of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The exclusive reconciliation job record.
///
/// At most one job is `running` cluster-wide; the heartbeat distinguishes
/// "still working" from "crashed mid-batch".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationJob {
    /// Unique job id.
    pub id: i64,

    /// Lifecycle status.
    pub status: JobStatus,

    /// When the job started.
    pub started_at: DateTime<Utc>,

    /// When the job finished; `None` while running.
    pub finished_at: Option<DateTime<Utc>>,

    /// Last heartbeat; updated after every processed operation.
    pub heartbeat_at: DateTime<Utc>,

    /// Operations in this job's batch.
    pub total: u64,

    /// Operations processed so far.
    pub processed: u64,

    /// Operations whose reconciliation failed.
    pub failed: u64,

    /// Free-text note set on failure.
    pub note: Option<String>,
}

impl ReconciliationJob {
    /// Returns `true` if this job's heartbeat is older than `staleness`
    /// at time `now`, making it takeable by a new cycle.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, staleness: Duration) -> bool {
        now - self.heartbeat_at > staleness
    }
}

// ============================================================================
// StatusChange
// ============================================================================

/// Append-only audit row recording one field mutation on a
/// [`SponsoredOperation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// The mutated operation.
    pub operation_id: i64,

    /// The field that changed (e.g. `"status"`).
    pub field: String,

    /// The previous value.
    pub old_value: String,

    /// The new value.
    pub new_value: String,

    /// When the change happened.
    pub changed_at: DateTime<Utc>,
}

// ============================================================================
// Unit Tests
// ============================================================================
