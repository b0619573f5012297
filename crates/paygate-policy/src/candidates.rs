//! Policy candidate resolution and budget accounting.
//!
//! Candidates are the policies of one (paymaster, chain) pair that admit
//! the sender, evaluated newest-first. Each candidate is checked in two
//! stages: budget headroom, then rules. The first policy clearing both
//! sponsors the operation; otherwise the caller gets every candidate's
//! failure reason, itemized.
//!
//! Budget accounting is pessimistic: committed cost sums the effective cost
//! of every operation the policy accepted in states {pending, signed,
//! executed}, so an operation holds its worst-case estimate against the
//! budget until reconciliation learns the actual cost.

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use paygate_chain::erc20::BalanceReader;
use paygate_core::error::{FailureReason, PolicyFailure, SponsorError, SponsorResult, StoreResult};
use paygate_core::store::{OperationStore, PolicyStore, UsageScope};
use paygate_core::types::{Policy, PolicyRule, UserOperation};
use tracing::debug;

use crate::rules::{find_passing_rule, RuleContext};

/// A policy's decision to sponsor an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acceptance {
    /// The accepting policy.
    pub policy: Policy,
    /// The rule that admitted the operation; `None` for a zero-rule policy.
    pub rule: Option<PolicyRule>,
}

/// Resolves which policy, if any, sponsors a submitted operation.
#[derive(Clone, Copy)]
pub struct CandidateResolver<'a> {
    policies: &'a dyn PolicyStore,
    operations: &'a dyn OperationStore,
}

impl<'a> CandidateResolver<'a> {
    /// Creates a resolver over the given stores.
    #[must_use]
    pub const fn new(policies: &'a dyn PolicyStore, operations: &'a dyn OperationStore) -> Self {
        Self {
            policies,
            operations,
        }
    }

    /// Total cost committed against a policy's budget, in wei.
    ///
    /// # Errors
    ///
    /// Returns [`paygate_core::error::StoreError`] when the usage query
    /// fails.
    pub fn committed(&self, policy_id: i64) -> StoreResult<U256> {
        let rows = self.operations.usage(&UsageScope::Policy(policy_id))?;
        Ok(rows.iter().fold(U256::ZERO, |acc, row| acc + row.cost))
    }

    /// Remaining budget headroom of a policy, saturating at zero.
    ///
    /// # Errors
    ///
    /// Returns [`paygate_core::error::StoreError`] when the usage query
    /// fails.
    pub fn headroom(&self, policy: &Policy) -> StoreResult<U256> {
        Ok(policy.budget_wei.saturating_sub(self.committed(policy.id)?))
    }

    /// Resolves the sponsoring policy for `op` on `chain_id`.
    ///
    /// Candidates that admit the sender are evaluated newest-first,
    /// sequentially. A zero-rule policy accepts as soon as it clears the
    /// budget.
    ///
    /// # Errors
    ///
    /// Returns [`SponsorError::NoEligiblePolicy`] when no active policy
    /// admits the sender at all, [`SponsorError::Rejected`] with itemized
    /// per-policy reasons when every candidate declines, and
    /// [`SponsorError::Store`] on persistence failure.
    pub async fn resolve(
        &self,
        paymaster: Address,
        chain_id: u64,
        op: &UserOperation,
        reader: &(impl BalanceReader + ?Sized),
        now: DateTime<Utc>,
    ) -> SponsorResult<Acceptance> {
        let candidates: Vec<Policy> = self
            .policies
            .policies_for(paymaster, chain_id)?
            .into_iter()
            .filter(|policy| policy.admits(op.sender, now))
            .collect();
        if candidates.is_empty() {
            return Err(SponsorError::NoEligiblePolicy {
                paymaster,
                chain_id,
                sender: op.sender,
            });
        }

        let required = op.max_cost();
        let mut failures = Vec::with_capacity(candidates.len());
        for policy in candidates {
            let headroom = self.headroom(&policy)?;
            if required > headroom {
                debug!(
                    policy_id = policy.id,
                    %headroom,
                    %required,
                    "candidate passed over: budget exceeded"
                );
                failures.push(PolicyFailure {
                    policy_id: policy.id,
                    reason: FailureReason::BudgetExceeded { headroom, required },
                });
                continue;
            }

            let rules: Vec<PolicyRule> = self
                .policies
                .rules_for(policy.id)?
                .into_iter()
                .filter(|rule| rule.is_active(now))
                .collect();
            if rules.is_empty() {
                debug!(policy_id = policy.id, "accepted by zero-rule policy");
                return Ok(Acceptance { policy, rule: None });
            }

            let ctx = RuleContext {
                chain_id,
                policy_id: policy.id,
                sender: op.sender,
                candidate_cost: required,
                now,
            };
            match find_passing_rule(&rules, &ctx, self.operations, reader).await {
                Ok(rule) => {
                    debug!(policy_id = policy.id, rule_id = rule.id, "accepted");
                    return Ok(Acceptance {
                        policy,
                        rule: Some(rule),
                    });
                }
                Err(violations) => {
                    failures.push(PolicyFailure {
                        policy_id: policy.id,
                        reason: FailureReason::RulesViolated { violations },
                    });
                }
            }
        }
        Err(SponsorError::Rejected { failures })
    }
}

impl std::fmt::Debug for CandidateResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateResolver").finish_non_exhaustive()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
