//! Reconciliation engine.
//!
//! Signed operations leave the service's hands: a bundler may or may not
//! include them before the authorization expires. Each cycle takes the
//! exclusive job lock, fetches a batch of `signed` operations oldest-first,
//! and settles each one against the chain: found and successful becomes
//! `executed` with the actual cost, found and failed becomes `failed`,
//! expired without a trace becomes `expired`, and anything still inside its
//! validity window is left for the next cycle.
//!
//! Per-operation errors (a dead RPC node, a malformed log) are recorded on
//! the operation and counted; they never abort the batch. The heartbeat is
//! refreshed after every operation so a crashed cycle is detectably stale.

use alloy_primitives::Address;
use chrono::{Duration, Utc};
use tracing::{debug, error, info, warn};

use paygate_chain::events::decode_outcome;
use paygate_chain::search::{find_inclusion, SearchParams};
use paygate_chain::EndpointRegistry;
use paygate_core::config::ReconciliationConfig;
use paygate_core::error::{PaygateError, ReconError, StoreError};
use paygate_core::store::{JobAcquire, JobStore, OperationStore};
use paygate_core::types::{JobStatus, OpStatus, SponsoredOperation};

use crate::audit::AuditLogger;

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another job holds the lock with a fresh heartbeat.
    Skipped,
    /// The cycle ran its batch to completion.
    Completed {
        /// The finished job's id.
        job_id: i64,
        /// Operations processed.
        processed: u64,
        /// Operations whose reconciliation errored.
        failed: u64,
    },
}

/// The reconciliation engine.
pub struct Reconciler<'a> {
    operations: &'a dyn OperationStore,
    jobs: &'a dyn JobStore,
    chains: &'a EndpointRegistry,
    entry_point: Address,
    config: ReconciliationConfig,
    audit: Option<&'a AuditLogger>,
}

impl<'a> Reconciler<'a> {
    /// Wires the engine to its collaborators.
    pub const fn new(
        operations: &'a dyn OperationStore,
        jobs: &'a dyn JobStore,
        chains: &'a EndpointRegistry,
        entry_point: Address,
        config: ReconciliationConfig,
        audit: Option<&'a AuditLogger>,
    ) -> Self {
        Self {
            operations,
            jobs,
            chains,
            entry_point,
            config,
            audit,
        }
    }

    /// Runs one reconciliation cycle under the exclusive job lock.
    ///
    /// # Errors
    ///
    /// Returns [`ReconError::Lock`] when the lock machinery fails and
    /// [`ReconError::Batch`] when the batch fetch fails; per-operation
    /// failures are counted, not returned.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, ReconError> {
        let now = Utc::now();
        let staleness = Duration::seconds(
            i64::try_from(self.config.staleness_secs).unwrap_or(i64::MAX),
        );
        let job = match self.jobs.acquire(now, staleness).map_err(ReconError::Lock)? {
            JobAcquire::Acquired(job) => job,
            JobAcquire::Busy => {
                debug!("reconciliation lock busy, skipping cycle");
                return Ok(CycleOutcome::Skipped);
            }
        };

        let batch = match self.operations.signed_batch(self.config.batch_size) {
            Ok(batch) => batch,
            Err(e) => {
                let note = e.to_string();
                if let Err(finish_err) =
                    self.jobs.finish(job.id, JobStatus::Failed, Some(&note))
                {
                    warn!(job_id = job.id, error = %finish_err, "failed to release job");
                }
                return Err(ReconError::Batch(e));
            }
        };
        let total = u64::try_from(batch.len()).unwrap_or(u64::MAX);
        self.jobs.begin(job.id, total).map_err(ReconError::Lock)?;
        info!(job_id = job.id, total, "reconciliation cycle started");

        let mut processed = 0u64;
        let mut failed = 0u64;
        for op in batch {
            if let Err(e) = self.reconcile_op(&op).await {
                failed += 1;
                let note = format!("reconciliation error: {e}");
                warn!(operation_id = op.id, chain_id = op.chain_id, %note, "operation not settled");
                if let Err(note_err) = self.operations.append_note(op.id, &note) {
                    warn!(operation_id = op.id, error = %note_err, "failed to record note");
                }
            }
            processed += 1;
            if let Err(e) = self.jobs.heartbeat(job.id, processed, failed) {
                warn!(job_id = job.id, error = %e, "heartbeat update failed");
            }
        }

        self.jobs
            .finish(job.id, JobStatus::Completed, None)
            .map_err(ReconError::Lock)?;
        info!(job_id = job.id, processed, failed, "reconciliation cycle finished");
        Ok(CycleOutcome::Completed {
            job_id: job.id,
            processed,
            failed,
        })
    }

    /// Settles one signed operation against its chain.
    async fn reconcile_op(&self, op: &SponsoredOperation) -> Result<(), PaygateError> {
        let reader = self.chains.reader(op.chain_id)?;
        let Some(hash) = op.hash else {
            return Err(StoreError::backend(format!(
                "signed operation {} has no hash",
                op.id
            ))
            .into());
        };

        let signed_at = u64::try_from(op.created_at.timestamp().max(0)).unwrap_or(0);
        let params = SearchParams {
            chunk_size: self.config.chunk_size,
            safety_buffer: self.config.safety_buffer,
            sample_depth: self.config.sample_depth,
        };
        let found = find_inclusion(
            reader.as_ref(),
            self.entry_point,
            hash,
            signed_at,
            op.valid_until,
            &params,
        )
        .await?;

        match found {
            Some(log) => {
                let outcome = decode_outcome(&log)?;
                if let Ok(Some(tx)) = reader.transaction(log.transaction_hash).await {
                    debug!(
                        operation_id = op.id,
                        bundler = %tx.from,
                        gas_price = %tx.gas_price,
                        "including transaction"
                    );
                }
                if outcome.success {
                    self.operations.mark_executed(op.id, outcome.actual_gas_cost)?;
                    self.audit_transition(op, OpStatus::Executed, None);
                    info!(
                        operation_id = op.id,
                        actual_cost = %outcome.actual_gas_cost,
                        block = outcome.block_number,
                        "operation executed"
                    );
                } else {
                    self.operations
                        .mark_failed(op.id, Some(outcome.actual_gas_cost))?;
                    self.audit_transition(op, OpStatus::Failed, Some("on-chain failure"));
                    info!(
                        operation_id = op.id,
                        actual_cost = %outcome.actual_gas_cost,
                        block = outcome.block_number,
                        "operation failed on-chain"
                    );
                }
            }
            None => {
                let now_secs = u64::try_from(Utc::now().timestamp().max(0)).unwrap_or(0);
                if op.is_expired_at(now_secs) {
                    self.operations.mark_expired(op.id)?;
                    self.audit_transition(op, OpStatus::Expired, None);
                    info!(operation_id = op.id, "operation expired without inclusion");
                } else {
                    debug!(operation_id = op.id, "still within validity window");
                }
            }
        }
        Ok(())
    }

    fn audit_transition(&self, op: &SponsoredOperation, to: OpStatus, note: Option<&str>) {
        if let Some(audit) = self.audit {
            if let Err(e) =
                audit.log_transition(op.id, op.chain_id, op.hash, OpStatus::Signed, to, note)
            {
                warn!(operation_id = op.id, error = %e, "audit log append failed");
            }
        }
    }

    /// Runs cycles forever at the configured interval. Cycle failures are
    /// logged and the next tick proceeds.
    pub async fn run_scheduler(&self) {
        let period = std::time::Duration::from_secs(self.config.interval_secs);
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            match self.run_cycle().await {
                Ok(CycleOutcome::Skipped) => {}
                Ok(CycleOutcome::Completed {
                    job_id,
                    processed,
                    failed,
                }) => {
                    debug!(job_id, processed, failed, "cycle complete");
                }
                Err(e) => {
                    error!(error = %e, "reconciliation cycle failed");
                }
            }
        }
    }
}

impl std::fmt::Debug for Reconciler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("entry_point", &self.entry_point)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
