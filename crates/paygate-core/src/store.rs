//! Persistence contracts for the Paygate sponsorship service.
//!
//! Persistence is an external collaborator; the engines consume it through
//! three narrow traits:
//!
//! - [`PolicyStore`] - read-only access to policies and their rules
//! - [`OperationStore`] - sponsored-operation lifecycle and usage queries
//! - [`JobStore`] - the exclusive reconciliation job with heartbeats
//!
//! [`MemoryStore`] implements all three behind a single mutex, which makes
//! the job acquire an atomic check-and-create. It backs every test and is
//! sufficient for single-process deployments.
//!
//! Note on isolation: the trait contract does not serialize a budget check
//! against a concurrent pending insert. Two concurrent submissions on the
//! same policy may both observe headroom before either commits. A stricter
//! store should wrap that sequence in a serializable transaction or a
//! per-policy advisory lock.

use crate::error::{StoreError, StoreResult};
use crate::types::{
    JobStatus, OpStatus, Policy, PolicyRule, ReconciliationJob, SponsoredOperation, StatusChange,
};
use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

// ============================================================================
// Query types
// ============================================================================

/// The population a usage query aggregates over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageScope {
    /// All operations of one sender on one chain, across policies.
    Wallet {
        /// The chain the operations target.
        chain_id: u64,
        /// The sending account.
        sender: Address,
    },
    /// All operations accepted by one policy.
    Policy(i64),
}

/// One row of historical usage: when the operation was created and what it
/// costs for budget purposes (actual cost once known, estimate otherwise).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRow {
    /// Creation time of the operation.
    pub at: DateTime<Utc>,
    /// Effective cost in wei.
    pub cost: U256,
}

/// Outcome of a reconciliation job acquire attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobAcquire {
    /// The lock was taken; a fresh `running` job exists.
    Acquired(ReconciliationJob),
    /// Another job is running with a fresh heartbeat; skip this cycle.
    Busy,
}

// ============================================================================
// Traits
// ============================================================================

/// Read-only access to policies and rules.
pub trait PolicyStore: Send + Sync {
    /// Active and inactive policies for a (paymaster, chain) pair,
    /// ordered newest-first by creation time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the underlying storage fails.
    fn policies_for(&self, paymaster: Address, chain_id: u64) -> StoreResult<Vec<Policy>>;

    /// All rules of a policy, in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the underlying storage fails.
    fn rules_for(&self, policy_id: i64) -> StoreResult<Vec<PolicyRule>>;
}

/// Sponsored-operation lifecycle and usage queries.
///
/// Every transition method enforces the operation state machine
/// ([`OpStatus::can_transition`]) and appends a [`StatusChange`] row; an
/// illegal transition is a [`StoreError::IllegalTransition`].
pub trait OperationStore: Send + Sync {
    /// Persist a new `pending` operation. This happens before any
    /// validation: no sponsorship work proceeds without a traceable record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the underlying storage fails.
    fn insert_pending(
        &self,
        chain_id: u64,
        sender: Address,
        payload: serde_json::Value,
        estimated_max_cost: U256,
    ) -> StoreResult<SponsoredOperation>;

    /// Fetch one operation by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id.
    fn get(&self, id: i64) -> StoreResult<SponsoredOperation>;

    /// `pending → signed`: record the accepting policy, the canonical hash,
    /// the exact signed payload, and the signer's validity bounds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalTransition`] when the operation is not
    /// `pending`, or [`StoreError::NotFound`].
    #[allow(clippy::too_many_arguments)]
    fn mark_signed(
        &self,
        id: i64,
        policy_id: i64,
        hash: B256,
        payload: serde_json::Value,
        valid_after: u64,
        valid_until: u64,
    ) -> StoreResult<SponsoredOperation>;

    /// `pending → validation_failed`, with the itemized rejection reasons
    /// as the note.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalTransition`] or [`StoreError::NotFound`].
    fn mark_validation_failed(&self, id: i64, note: &str) -> StoreResult<SponsoredOperation>;

    /// `signed → executed`, recording the actual on-chain cost.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalTransition`] or [`StoreError::NotFound`].
    fn mark_executed(&self, id: i64, actual_cost: U256) -> StoreResult<SponsoredOperation>;

    /// `signed → failed`, recording the actual cost when known.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalTransition`] or [`StoreError::NotFound`].
    fn mark_failed(&self, id: i64, actual_cost: Option<U256>) -> StoreResult<SponsoredOperation>;

    /// `signed → expired`: the validity window closed without an outcome.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalTransition`] or [`StoreError::NotFound`].
    fn mark_expired(&self, id: i64) -> StoreResult<SponsoredOperation>;

    /// Append to the operation's note without changing status. Used for
    /// per-item reconciliation errors.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`].
    fn append_note(&self, id: i64, note: &str) -> StoreResult<()>;

    /// Usage rows for a scope, over operations in states
    /// {`pending`, `signed`, `executed`}.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the underlying storage fails.
    fn usage(&self, scope: &UsageScope) -> StoreResult<Vec<UsageRow>>;

    /// Up to `limit` operations in state `signed`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the underlying storage fails.
    fn signed_batch(&self, limit: u64) -> StoreResult<Vec<SponsoredOperation>>;

    /// The append-only audit rows of one operation, in order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the underlying storage fails.
    fn status_changes(&self, id: i64) -> StoreResult<Vec<StatusChange>>;
}

/// The exclusive reconciliation job record.
pub trait JobStore: Send + Sync {
    /// Atomic check-and-create of the `running` job.
    ///
    /// A running job with a heartbeat fresher than `staleness` yields
    /// [`JobAcquire::Busy`]. A stale one is forcibly marked `failed` before
    /// a new job is created.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the underlying storage fails.
    fn acquire(&self, now: DateTime<Utc>, staleness: Duration) -> StoreResult<JobAcquire>;

    /// Record the batch size of a freshly acquired job.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`].
    fn begin(&self, id: i64, total: u64) -> StoreResult<()>;

    /// Refresh the heartbeat and counters. Called after every operation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`].
    fn heartbeat(&self, id: i64, processed: u64, failed: u64) -> StoreResult<()>;

    /// Release the lock by marking the job `completed` or `failed`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`].
    fn finish(&self, id: i64, status: JobStatus, note: Option<&str>) -> StoreResult<()>;
}

// ============================================================================
// MemoryStore
// ============================================================================

#[derive(Debug, Default)]
struct Inner {
    policies: Vec<Policy>,
    rules: Vec<PolicyRule>,
    operations: Vec<SponsoredOperation>,
    changes: Vec<StatusChange>,
    jobs: Vec<ReconciliationJob>,
    next_operation_id: i64,
    next_job_id: i64,
}

/// In-memory implementation of all three store traits.
///
/// One mutex guards everything, so [`JobStore::acquire`] is atomic and the
/// budget-check race documented at module level cannot occur in-process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a policy. Policies come from an external management surface;
    /// this is its stand-in.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the lock is poisoned.
    pub fn add_policy(&self, policy: Policy) -> StoreResult<()> {
        self.lock()?.policies.push(policy);
        Ok(())
    }

    /// Seeds a rule.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the lock is poisoned.
    pub fn add_rule(&self, rule: PolicyRule) -> StoreResult<()> {
        self.lock()?.rules.push(rule);
        Ok(())
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::backend("memory store mutex poisoned"))
    }
}

impl Inner {
    fn operation_mut(&mut self, id: i64) -> StoreResult<&mut SponsoredOperation> {
        self.operations
            .iter_mut()
            .find(|op| op.id == id)
            .ok_or(StoreError::not_found("operation", id))
    }

    fn job_mut(&mut self, id: i64) -> StoreResult<&mut ReconciliationJob> {
        self.jobs
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or(StoreError::not_found("job", id))
    }

    /// Applies a status transition, enforcing the state machine and
    /// appending the audit row.
    fn transition(
        changes: &mut Vec<StatusChange>,
        op: &mut SponsoredOperation,
        to: OpStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        if !op.status.can_transition(to) {
            return Err(StoreError::illegal_transition(
                op.id,
                op.status.as_str(),
                to.as_str(),
            ));
        }
        changes.push(StatusChange {
            operation_id: op.id,
            field: "status".to_string(),
            old_value: op.status.as_str().to_string(),
            new_value: to.as_str().to_string(),
            changed_at: now,
        });
        op.status = to;
        op.updated_at = now;
        Ok(())
    }
}

impl PolicyStore for MemoryStore {
    fn policies_for(&self, paymaster: Address, chain_id: u64) -> StoreResult<Vec<Policy>> {
        let inner = self.lock()?;
        let mut policies: Vec<Policy> = inner
            .policies
            .iter()
            .filter(|p| p.paymaster == paymaster && p.chain_id == chain_id)
            .cloned()
            .collect();
        policies.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(policies)
    }

    fn rules_for(&self, policy_id: i64) -> StoreResult<Vec<PolicyRule>> {
        let inner = self.lock()?;
        let mut rules: Vec<PolicyRule> = inner
            .rules
            .iter()
            .filter(|r| r.policy_id == policy_id)
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rules)
    }
}

impl OperationStore for MemoryStore {
    fn insert_pending(
        &self,
        chain_id: u64,
        sender: Address,
        payload: serde_json::Value,
        estimated_max_cost: U256,
    ) -> StoreResult<SponsoredOperation> {
        let mut inner = self.lock()?;
        inner.next_operation_id += 1;
        let now = Utc::now();
        let op = SponsoredOperation {
            id: inner.next_operation_id,
            policy_id: None,
            chain_id,
            sender,
            hash: None,
            status: OpStatus::Pending,
            payload,
            estimated_max_cost,
            actual_cost: None,
            valid_after: 0,
            valid_until: 0,
            note: None,
            created_at: now,
            updated_at: now,
        };
        inner.operations.push(op.clone());
        Ok(op)
    }

    fn get(&self, id: i64) -> StoreResult<SponsoredOperation> {
        let inner = self.lock()?;
        inner
            .operations
            .iter()
            .find(|op| op.id == id)
            .cloned()
            .ok_or(StoreError::not_found("operation", id))
    }

    fn mark_signed(
        &self,
        id: i64,
        policy_id: i64,
        hash: B256,
        payload: serde_json::Value,
        valid_after: u64,
        valid_until: u64,
    ) -> StoreResult<SponsoredOperation> {
        let mut inner = self.lock()?;
        let Inner {
            operations,
            changes,
            ..
        } = &mut *inner;
        let now = Utc::now();
        let op = operations
            .iter_mut()
            .find(|op| op.id == id)
            .ok_or(StoreError::not_found("operation", id))?;
        Inner::transition(changes, op, OpStatus::Signed, now)?;
        op.policy_id = Some(policy_id);
        op.hash = Some(hash);
        op.payload = payload;
        op.valid_after = valid_after;
        op.valid_until = valid_until;
        Ok(op.clone())
    }

    fn mark_validation_failed(&self, id: i64, note: &str) -> StoreResult<SponsoredOperation> {
        let mut inner = self.lock()?;
        let Inner {
            operations,
            changes,
            ..
        } = &mut *inner;
        let now = Utc::now();
        let op = operations
            .iter_mut()
            .find(|op| op.id == id)
            .ok_or(StoreError::not_found("operation", id))?;
        Inner::transition(changes, op, OpStatus::ValidationFailed, now)?;
        op.note = Some(note.to_string());
        Ok(op.clone())
    }

    fn mark_executed(&self, id: i64, actual_cost: U256) -> StoreResult<SponsoredOperation> {
        let mut inner = self.lock()?;
        let Inner {
            operations,
            changes,
            ..
        } = &mut *inner;
        let now = Utc::now();
        let op = operations
            .iter_mut()
            .find(|op| op.id == id)
            .ok_or(StoreError::not_found("operation", id))?;
        Inner::transition(changes, op, OpStatus::Executed, now)?;
        op.actual_cost = Some(actual_cost);
        Ok(op.clone())
    }

    fn mark_failed(&self, id: i64, actual_cost: Option<U256>) -> StoreResult<SponsoredOperation> {
        let mut inner = self.lock()?;
        let Inner {
            operations,
            changes,
            ..
        } = &mut *inner;
        let now = Utc::now();
        let op = operations
            .iter_mut()
            .find(|op| op.id == id)
            .ok_or(StoreError::not_found("operation", id))?;
        Inner::transition(changes, op, OpStatus::Failed, now)?;
        if actual_cost.is_some() {
            op.actual_cost = actual_cost;
        }
        Ok(op.clone())
    }

    fn mark_expired(&self, id: i64) -> StoreResult<SponsoredOperation> {
        let mut inner = self.lock()?;
        let Inner {
            operations,
            changes,
            ..
        } = &mut *inner;
        let now = Utc::now();
        let op = operations
            .iter_mut()
            .find(|op| op.id == id)
            .ok_or(StoreError::not_found("operation", id))?;
        Inner::transition(changes, op, OpStatus::Expired, now)?;
        Ok(op.clone())
    }

    fn append_note(&self, id: i64, note: &str) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let op = inner.operation_mut(id)?;
        match &mut op.note {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(note);
            }
            None => op.note = Some(note.to_string()),
        }
        op.updated_at = Utc::now();
        Ok(())
    }

    fn usage(&self, scope: &UsageScope) -> StoreResult<Vec<UsageRow>> {
        let inner = self.lock()?;
        let rows = inner
            .operations
            .iter()
            .filter(|op| {
                matches!(
                    op.status,
                    OpStatus::Pending | OpStatus::Signed | OpStatus::Executed
                )
            })
            .filter(|op| match scope {
                UsageScope::Wallet { chain_id, sender } => {
                    op.chain_id == *chain_id && op.sender == *sender
                }
                UsageScope::Policy(policy_id) => op.policy_id == Some(*policy_id),
            })
            .map(|op| UsageRow {
                at: op.created_at,
                cost: op.effective_cost(),
            })
            .collect();
        Ok(rows)
    }

    fn signed_batch(&self, limit: u64) -> StoreResult<Vec<SponsoredOperation>> {
        let inner = self.lock()?;
        let mut batch: Vec<SponsoredOperation> = inner
            .operations
            .iter()
            .filter(|op| op.status == OpStatus::Signed)
            .cloned()
            .collect();
        batch.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        batch.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(batch)
    }

    fn status_changes(&self, id: i64) -> StoreResult<Vec<StatusChange>> {
        let inner = self.lock()?;
        Ok(inner
            .changes
            .iter()
            .filter(|c| c.operation_id == id)
            .cloned()
            .collect())
    }
}

impl JobStore for MemoryStore {
    fn acquire(&self, now: DateTime<Utc>, staleness: Duration) -> StoreResult<JobAcquire> {
        let mut inner = self.lock()?;
        if let Some(running) = inner
            .jobs
            .iter_mut()
            .find(|job| job.status == JobStatus::Running)
        {
            if !running.is_stale(now, staleness) {
                return Ok(JobAcquire::Busy);
            }
            running.status = JobStatus::Failed;
            running.finished_at = Some(now);
            running.note = Some("taken over after stale heartbeat".to_string());
        }
        inner.next_job_id += 1;
        let job = ReconciliationJob {
            id: inner.next_job_id,
            status: JobStatus::Running,
            started_at: now,
            finished_at: None,
            heartbeat_at: now,
            total: 0,
            processed: 0,
            failed: 0,
            note: None,
        };
        inner.jobs.push(job.clone());
        Ok(JobAcquire::Acquired(job))
    }

    fn begin(&self, id: i64, total: u64) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let job = inner.job_mut(id)?;
        job.total = total;
        Ok(())
    }

    fn heartbeat(&self, id: i64, processed: u64, failed: u64) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let job = inner.job_mut(id)?;
        job.heartbeat_at = Utc::now();
        job.processed = processed;
        job.failed = failed;
        Ok(())
    }

    fn finish(&self, id: i64, status: JobStatus, note: Option<&str>) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let job = inner.job_mut(id)?;
        job.status = status;
        job.finished_at = Some(Utc::now());
        if let Some(note) = note {
            job.note = Some(note.to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use crate::types::PolicyStatus;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    fn pending_op(store: &MemoryStore) -> SponsoredOperation {
        store
            .insert_pending(
                8453,
                addr(0x11),
                serde_json::json!({"sender": "0x11"}),
                U256::from(100u64),
            )
            .expect("insert")
    }

    mod operation_lifecycle_tests {
        use super::*;

        #[test]
        fn test_insert_pending_assigns_ids() {
            let store = MemoryStore::new();
            let a = pending_op(&store);
            let b = pending_op(&store);
            assert_ne!(a.id, b.id);
            assert_eq!(a.status, OpStatus::Pending);
            assert!(a.policy_id.is_none());
        }

        #[test]
        fn test_mark_signed_records_everything() {
            let store = MemoryStore::new();
            let op = pending_op(&store);
            let hash = B256::from([0xab; 32]);
            let signed = store
                .mark_signed(op.id, 7, hash, serde_json::json!({"signed": true}), 0, 9999)
                .expect("sign");
            assert_eq!(signed.status, OpStatus::Signed);
            assert_eq!(signed.policy_id, Some(7));
            assert_eq!(signed.hash, Some(hash));
            assert_eq!(signed.valid_until, 9999);

            let changes = store.status_changes(op.id).expect("changes");
            assert_eq!(changes.len(), 1);
            assert_eq!(changes[0].field, "status");
            assert_eq!(changes[0].old_value, "pending");
            assert_eq!(changes[0].new_value, "signed");
        }

        #[test]
        fn test_illegal_transitions_rejected() {
            let store = MemoryStore::new();
            let op = pending_op(&store);

            // pending -> executed is not legal
            let err = store.mark_executed(op.id, U256::from(1u64)).unwrap_err();
            assert!(matches!(err, StoreError::IllegalTransition { .. }));

            // terminal states stay terminal
            store
                .mark_validation_failed(op.id, "rejected")
                .expect("fail");
            let err = store
                .mark_signed(op.id, 1, B256::ZERO, serde_json::json!({}), 0, 1)
                .unwrap_err();
            assert!(matches!(err, StoreError::IllegalTransition { .. }));
        }

        #[test]
        fn test_full_lifecycle_audit_trail() {
            let store = MemoryStore::new();
            let op = pending_op(&store);
            store
                .mark_signed(op.id, 1, B256::ZERO, serde_json::json!({}), 0, 1)
                .expect("sign");
            store
                .mark_executed(op.id, U256::from(42u64))
                .expect("execute");

            let changes = store.status_changes(op.id).expect("changes");
            let transitions: Vec<(&str, &str)> = changes
                .iter()
                .map(|c| (c.old_value.as_str(), c.new_value.as_str()))
                .collect();
            assert_eq!(
                transitions,
                vec![("pending", "signed"), ("signed", "executed")]
            );
            assert_eq!(
                store.get(op.id).expect("get").actual_cost,
                Some(U256::from(42u64))
            );
        }

        #[test]
        fn test_append_note_concatenates() {
            let store = MemoryStore::new();
            let op = pending_op(&store);
            store.append_note(op.id, "first").expect("note");
            store.append_note(op.id, "second").expect("note");
            assert_eq!(
                store.get(op.id).expect("get").note.as_deref(),
                Some("first; second")
            );
        }

        #[test]
        fn test_unknown_operation_is_not_found() {
            let store = MemoryStore::new();
            assert!(matches!(
                store.get(99).unwrap_err(),
                StoreError::NotFound { kind: "operation", id: 99 }
            ));
        }
    }

    mod usage_tests {
        use super::*;

        #[test]
        fn test_usage_filters_terminal_rejections() {
            let store = MemoryStore::new();
            let kept = pending_op(&store);
            let rejected = pending_op(&store);
            store
                .mark_validation_failed(rejected.id, "no")
                .expect("fail");

            let rows = store
                .usage(&UsageScope::Wallet {
                    chain_id: 8453,
                    sender: addr(0x11),
                })
                .expect("usage");
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].cost, kept.estimated_max_cost);
        }

        #[test]
        fn test_usage_policy_scope_requires_acceptance() {
            let store = MemoryStore::new();
            let op = pending_op(&store);
            assert!(store
                .usage(&UsageScope::Policy(7))
                .expect("usage")
                .is_empty());

            store
                .mark_signed(op.id, 7, B256::ZERO, serde_json::json!({}), 0, 1)
                .expect("sign");
            assert_eq!(store.usage(&UsageScope::Policy(7)).expect("usage").len(), 1);
        }

        #[test]
        fn test_usage_prefers_actual_cost() {
            let store = MemoryStore::new();
            let op = pending_op(&store);
            store
                .mark_signed(op.id, 7, B256::ZERO, serde_json::json!({}), 0, 1)
                .expect("sign");
            store
                .mark_executed(op.id, U256::from(33u64))
                .expect("execute");
            let rows = store.usage(&UsageScope::Policy(7)).expect("usage");
            assert_eq!(rows[0].cost, U256::from(33u64));
        }

        #[test]
        fn test_signed_batch_oldest_first_and_bounded() {
            let store = MemoryStore::new();
            let mut ids = Vec::new();
            for _ in 0..3 {
                let op = pending_op(&store);
                store
                    .mark_signed(op.id, 1, B256::ZERO, serde_json::json!({}), 0, 1)
                    .expect("sign");
                ids.push(op.id);
            }
            let batch = store.signed_batch(2).expect("batch");
            assert_eq!(batch.len(), 2);
            assert_eq!(batch[0].id, ids[0]);
            assert_eq!(batch[1].id, ids[1]);
        }
    }

    mod policy_store_tests {
        use super::*;

        fn policy(id: i64, created_offset_mins: i64) -> Policy {
            Policy {
                id,
                paymaster: addr(0xaa),
                chain_id: 8453,
                status: PolicyStatus::Active,
                budget_wei: U256::from(1000u64),
                public: true,
                whitelist: None,
                valid_from: Utc::now() - Duration::days(1),
                valid_to: None,
                created_at: Utc::now() - Duration::minutes(created_offset_mins),
            }
        }

        #[test]
        fn test_policies_newest_first() {
            let store = MemoryStore::new();
            store.add_policy(policy(1, 60)).expect("add");
            store.add_policy(policy(2, 10)).expect("add");
            store.add_policy(policy(3, 30)).expect("add");

            let policies = store.policies_for(addr(0xaa), 8453).expect("list");
            let ids: Vec<i64> = policies.iter().map(|p| p.id).collect();
            assert_eq!(ids, vec![2, 3, 1]);
        }

        #[test]
        fn test_policies_filtered_by_paymaster_and_chain() {
            let store = MemoryStore::new();
            store.add_policy(policy(1, 1)).expect("add");
            assert!(store.policies_for(addr(0xbb), 8453).expect("list").is_empty());
            assert!(store.policies_for(addr(0xaa), 1).expect("list").is_empty());
        }
    }

    mod job_store_tests {
        use super::*;

        #[test]
        fn test_acquire_then_busy() {
            let store = MemoryStore::new();
            let now = Utc::now();
            let staleness = Duration::minutes(15);

            let first = store.acquire(now, staleness).expect("acquire");
            assert!(matches!(first, JobAcquire::Acquired(_)));

            let second = store.acquire(now, staleness).expect("acquire");
            assert_eq!(second, JobAcquire::Busy);
        }

        #[test]
        fn test_stale_job_taken_over() {
            let store = MemoryStore::new();
            let staleness = Duration::minutes(15);
            let start = Utc::now();

            let JobAcquire::Acquired(job) = store.acquire(start, staleness).expect("acquire")
            else {
                panic!("expected acquire");
            };

            // heartbeat 20 minutes old: takeable
            let later = start + Duration::minutes(20);
            let retry = store.acquire(later, staleness).expect("acquire");
            assert!(matches!(retry, JobAcquire::Acquired(_)));

            // the abandoned job was force-failed
            let inner = store.lock().expect("lock");
            let old = inner.jobs.iter().find(|j| j.id == job.id).expect("job");
            assert_eq!(old.status, JobStatus::Failed);
            assert!(old.note.as_deref().unwrap_or("").contains("stale"));
        }

        #[test]
        fn test_fresh_job_not_taken_over() {
            let store = MemoryStore::new();
            let staleness = Duration::minutes(15);
            let start = Utc::now();
            store.acquire(start, staleness).expect("acquire");

            // heartbeat 5 minutes old: still busy
            let later = start + Duration::minutes(5);
            assert_eq!(store.acquire(later, staleness).expect("acquire"), JobAcquire::Busy);
        }

        #[test]
        fn test_heartbeat_and_finish() {
            let store = MemoryStore::new();
            let JobAcquire::Acquired(job) = store
                .acquire(Utc::now(), Duration::minutes(15))
                .expect("acquire")
            else {
                panic!("expected acquire");
            };
            store.begin(job.id, 10).expect("begin");
            store.heartbeat(job.id, 4, 1).expect("heartbeat");
            store
                .finish(job.id, JobStatus::Completed, None)
                .expect("finish");

            let inner = store.lock().expect("lock");
            let done = inner.jobs.iter().find(|j| j.id == job.id).expect("job");
            assert_eq!(done.status, JobStatus::Completed);
            assert_eq!(done.total, 10);
            assert_eq!(done.processed, 4);
            assert_eq!(done.failed, 1);
            assert!(done.finished_at.is_some());
        }
    }
}
