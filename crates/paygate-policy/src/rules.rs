//! Rule evaluation.
//!
//! A rule states the *permitted* relation ("gas spent per wallet daily
//! <= N"). Evaluation inverts the comparator into a violation predicate and
//! measures the rule's metric over its scope and interval:
//!
//! - gas-spent and transaction-count rules aggregate historical usage rows
//!   from the store; wallet and policy scopes bucket rows by calendar day,
//!   ISO week or calendar month, and a violating aggregate in *any* bucket
//!   fails the rule; lifetime is a single aggregate; operation scope tests
//!   every row individually, the candidate included.
//! - token-balance rules compare the sender's live ERC-20 balance, exact
//!   `U256` comparison, no decimals applied.
//!
//! A (metric, scope, interval) combination outside that matrix is a
//! [`PolicyError::UnsupportedRule`]. It fails that rule alone; the caller
//! continues with the next rule.

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Datelike, Utc};
use paygate_chain::erc20::BalanceReader;
use paygate_core::error::{PolicyError, PolicyResult};
use paygate_core::store::{OperationStore, UsageRow, UsageScope};
use paygate_core::types::{Comparator, PolicyRule, RuleInterval, RuleMetric, RuleScope};
use std::collections::BTreeMap;
use tracing::debug;

// ============================================================================
// Comparator inversion
// ============================================================================

/// The violation predicate derived from a rule's permitted relation.
pub trait ComparatorExt {
    /// Returns `true` when `value` against `threshold` violates the
    /// permitted relation: `<=` is violated by `>`, `<` by `>=`, `>=` by
    /// `<`, `>` by `<=`, `=` by `!=`, and `!=` by `=`.
    fn violation(self, value: U256, threshold: U256) -> bool;
}

impl ComparatorExt for Comparator {
    fn violation(self, value: U256, threshold: U256) -> bool {
        match self {
            Self::Le => value > threshold,
            Self::Lt => value >= threshold,
            Self::Ge => value < threshold,
            Self::Gt => value <= threshold,
            Self::Eq => value != threshold,
            Self::Ne => value == threshold,
        }
    }
}

// ============================================================================
// Evaluation context
// ============================================================================

/// Everything a rule needs to know about the candidate operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleContext {
    /// The chain the operation targets.
    pub chain_id: u64,
    /// The policy whose rule is being evaluated.
    pub policy_id: i64,
    /// The sending account.
    pub sender: Address,
    /// Worst-case cost of the candidate, in wei. Only consulted by
    /// operation-scope rules; wallet and policy scopes see the candidate
    /// through its already-persisted pending row.
    pub candidate_cost: U256,
    /// Evaluation time.
    pub now: DateTime<Utc>,
}

// ============================================================================
// Evaluation
// ============================================================================

/// Evaluates one rule. `Ok(true)` means the rule is satisfied (no
/// violation); `Ok(false)` means it is violated.
///
/// # Errors
///
/// Returns [`PolicyError::UnsupportedRule`] for a combination outside the
/// supported matrix, [`PolicyError::MissingToken`] for a token-balance rule
/// without a token address, and [`PolicyError::Store`] /
/// [`PolicyError::Chain`] when reading usage or live balances fails.
pub async fn evaluate_rule(
    rule: &PolicyRule,
    ctx: &RuleContext,
    store: &dyn OperationStore,
    reader: &(impl BalanceReader + ?Sized),
) -> PolicyResult<bool> {
    use RuleInterval::{Daily, Lifetime, Monthly, Now, Weekly};

    let satisfied = match (rule.metric, rule.scope, rule.interval) {
        (RuleMetric::TokenBalance, RuleScope::Wallet, Now) => {
            let token = rule
                .token
                .ok_or(PolicyError::MissingToken { rule_id: rule.id })?;
            let balance = reader.token_balance(token, ctx.sender).await?;
            !rule.comparator.violation(balance, rule.threshold)
        }

        (RuleMetric::GasSpent, RuleScope::Operation, Daily | Weekly | Monthly | Lifetime) => {
            let rows = store.usage(&wallet_scope(ctx))?;
            rows.iter()
                .map(|row| row.cost)
                .chain(std::iter::once(ctx.candidate_cost))
                .all(|cost| !rule.comparator.violation(cost, rule.threshold))
        }

        (RuleMetric::GasSpent, RuleScope::Wallet, interval @ (Daily | Weekly | Monthly | Lifetime)) => {
            let rows = store.usage(&wallet_scope(ctx))?;
            no_bucket_violates(rule, &rows, interval, sum_costs)
        }

        (RuleMetric::GasSpent, RuleScope::Policy, interval @ (Daily | Weekly | Monthly | Lifetime)) => {
            let rows = store.usage(&UsageScope::Policy(ctx.policy_id))?;
            no_bucket_violates(rule, &rows, interval, sum_costs)
        }

        (
            RuleMetric::TransactionCount,
            RuleScope::Wallet,
            interval @ (Daily | Weekly | Monthly | Lifetime),
        ) => {
            let rows = store.usage(&wallet_scope(ctx))?;
            no_bucket_violates(rule, &rows, interval, count_rows)
        }

        (
            RuleMetric::TransactionCount,
            RuleScope::Policy,
            interval @ (Daily | Weekly | Monthly | Lifetime),
        ) => {
            let rows = store.usage(&UsageScope::Policy(ctx.policy_id))?;
            no_bucket_violates(rule, &rows, interval, count_rows)
        }

        (metric, scope, interval) => {
            return Err(PolicyError::unsupported_rule(
                metric.as_str(),
                scope.as_str(),
                interval.as_str(),
            ));
        }
    };

    debug!(
        rule_id = rule.id,
        policy_id = ctx.policy_id,
        satisfied,
        "rule evaluated"
    );
    Ok(satisfied)
}

/// Finds the first rule (creation order) that evaluates satisfied.
///
/// Violations and evaluation failures of earlier rules do not stop the
/// scan; they are collected and returned only when no rule passes.
///
/// # Errors
///
/// Returns the per-rule failure descriptions, in order, when every rule is
/// violated or failed to evaluate.
pub async fn find_passing_rule(
    rules: &[PolicyRule],
    ctx: &RuleContext,
    store: &dyn OperationStore,
    reader: &(impl BalanceReader + ?Sized),
) -> Result<PolicyRule, Vec<String>> {
    let mut failures = Vec::with_capacity(rules.len());
    for rule in rules {
        match evaluate_rule(rule, ctx, store, reader).await {
            Ok(true) => return Ok(rule.clone()),
            Ok(false) => failures.push(format!("{} violated", rule.describe())),
            Err(e) => failures.push(format!("rule {}: {e}", rule.id)),
        }
    }
    Err(failures)
}

// ============================================================================
// Bucketing
// ============================================================================

fn wallet_scope(ctx: &RuleContext) -> UsageScope {
    UsageScope::Wallet {
        chain_id: ctx.chain_id,
        sender: ctx.sender,
    }
}

fn sum_costs(rows: &[&UsageRow]) -> U256 {
    rows.iter().fold(U256::ZERO, |acc, row| acc + row.cost)
}

fn count_rows(rows: &[&UsageRow]) -> U256 {
    U256::from(rows.len())
}

/// Aggregates rows per interval bucket and tests every bucket; a rolling
/// rule is violated as soon as *any* bucket's aggregate violates it.
fn no_bucket_violates(
    rule: &PolicyRule,
    rows: &[UsageRow],
    interval: RuleInterval,
    aggregate: fn(&[&UsageRow]) -> U256,
) -> bool {
    let mut buckets: BTreeMap<(i32, u32), Vec<&UsageRow>> = BTreeMap::new();
    for row in rows {
        buckets.entry(bucket_key(row.at, interval)).or_default().push(row);
    }
    buckets
        .values()
        .all(|bucket| !rule.comparator.violation(aggregate(bucket), rule.threshold))
}

fn bucket_key(at: DateTime<Utc>, interval: RuleInterval) -> (i32, u32) {
    match interval {
        RuleInterval::Daily => (at.year(), at.ordinal()),
        RuleInterval::Weekly => {
            let week = at.iso_week();
            (week.year(), week.week())
        }
        RuleInterval::Monthly => (at.year(), at.month()),
        // one aggregate over everything
        RuleInterval::Now | RuleInterval::Lifetime => (0, 0),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
