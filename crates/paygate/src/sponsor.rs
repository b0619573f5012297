//! Sponsorship orchestrator.
//!
//! Submission runs a fixed pipeline: persist the operation as `pending`
//! before anything else, resolve a policy candidate, sign the paymaster
//! authorization, hash the exact signed representation, and record the
//! `signed` transition. Rejections land as `validation_failed` with the
//! itemized reasons in the status note; either way the submission leaves a
//! traceable record behind.

use alloy_primitives::{Address, B256};
use chrono::Utc;
use tracing::{info, warn};

use paygate_chain::userop::operation_hash;
use paygate_chain::EndpointRegistry;
use paygate_core::error::{ConfigError, SponsorResult, StoreError};
use paygate_core::store::{OperationStore, PolicyStore};
use paygate_core::types::{OpStatus, Policy, PolicyRule, SponsoredOperation, UserOperation};
use paygate_crypto::PaymasterSigner;
use paygate_policy::CandidateResolver;

use crate::audit::AuditLogger;

/// A granted sponsorship: the stored record plus everything the caller
/// needs to submit the operation to a bundler.
#[derive(Debug, Clone)]
pub struct SponsorGrant {
    /// The stored operation record, now `signed`.
    pub operation: SponsoredOperation,
    /// The operation with paymaster fields filled in, exactly as hashed.
    pub signed: UserOperation,
    /// The canonical operation hash.
    pub hash: B256,
    /// The accepting policy.
    pub policy: Policy,
    /// The rule that admitted the operation; `None` for a zero-rule policy.
    pub rule: Option<PolicyRule>,
}

/// The sponsorship orchestrator.
pub struct Sponsor<'a> {
    policies: &'a dyn PolicyStore,
    operations: &'a dyn OperationStore,
    chains: &'a EndpointRegistry,
    signer: &'a PaymasterSigner,
    entry_point: Address,
    audit: Option<&'a AuditLogger>,
}

impl<'a> Sponsor<'a> {
    /// Wires the orchestrator to its collaborators.
    pub const fn new(
        policies: &'a dyn PolicyStore,
        operations: &'a dyn OperationStore,
        chains: &'a EndpointRegistry,
        signer: &'a PaymasterSigner,
        entry_point: Address,
        audit: Option<&'a AuditLogger>,
    ) -> Self {
        Self {
            policies,
            operations,
            chains,
            signer,
            entry_point,
            audit,
        }
    }

    /// Submits an operation for sponsorship.
    ///
    /// # Errors
    ///
    /// Rejections ([`paygate_core::error::SponsorError::NoEligiblePolicy`],
    /// [`paygate_core::error::SponsorError::Rejected`]) are recorded on the
    /// stored operation before being returned. System failures (store,
    /// config, signing) surface as-is.
    pub async fn submit_operation(
        &self,
        chain_id: u64,
        op: &UserOperation,
    ) -> SponsorResult<SponsorGrant> {
        let payload = to_payload(op)?;
        let record = self
            .operations
            .insert_pending(chain_id, op.sender, payload, op.max_cost())?;
        info!(
            operation_id = record.id,
            chain_id,
            sender = %op.sender,
            "operation persisted as pending"
        );

        let reader = self
            .chains
            .reader(chain_id)
            .map_err(|_| ConfigError::NoEndpoint { chain_id })?;

        let now = Utc::now();
        let resolver = CandidateResolver::new(self.policies, self.operations);
        let acceptance = match resolver
            .resolve(self.signer.paymaster(), chain_id, op, reader.as_ref(), now)
            .await
        {
            Ok(acceptance) => acceptance,
            Err(e) if e.is_rejection() => {
                let note = e.rejection_note();
                self.operations.mark_validation_failed(record.id, &note)?;
                self.audit_transition(
                    record.id,
                    chain_id,
                    None,
                    OpStatus::Pending,
                    OpStatus::ValidationFailed,
                    Some(&note),
                );
                info!(operation_id = record.id, chain_id, %note, "sponsorship rejected");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let mut signed = op.clone();
        signed.paymaster = Some(self.signer.paymaster());
        let now_secs = u64::try_from(now.timestamp().max(0)).unwrap_or(0);
        let auth = self.signer.authorize(chain_id, &signed, now_secs, None)?;
        signed.paymaster_data = auth.data.clone();

        let hash = operation_hash(&signed, self.entry_point, chain_id);
        let signed_payload = to_payload(&signed)?;
        let record = self.operations.mark_signed(
            record.id,
            acceptance.policy.id,
            hash,
            signed_payload,
            auth.valid_after,
            auth.valid_until,
        )?;
        self.audit_transition(
            record.id,
            chain_id,
            Some(hash),
            OpStatus::Pending,
            OpStatus::Signed,
            None,
        );
        info!(
            operation_id = record.id,
            chain_id,
            policy_id = acceptance.policy.id,
            hash = %hash,
            valid_until = auth.valid_until,
            "sponsorship granted"
        );

        Ok(SponsorGrant {
            operation: record,
            signed,
            hash,
            policy: acceptance.policy,
            rule: acceptance.rule,
        })
    }

    /// A failed audit append must not roll back an already-committed
    /// transition; it is logged and the submission proceeds.
    fn audit_transition(
        &self,
        operation_id: i64,
        chain_id: u64,
        hash: Option<B256>,
        from: OpStatus,
        to: OpStatus,
        note: Option<&str>,
    ) {
        if let Some(audit) = self.audit {
            if let Err(e) = audit.log_transition(operation_id, chain_id, hash, from, to, note) {
                warn!(operation_id, error = %e, "audit log append failed");
            }
        }
    }
}

impl std::fmt::Debug for Sponsor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sponsor")
            .field("entry_point", &self.entry_point)
            .field("paymaster", &self.signer.paymaster())
            .finish_non_exhaustive()
    }
}

fn to_payload(op: &UserOperation) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(op).map_err(|e| StoreError::backend(format!("payload serialization: {e}")))
}

// ============================================================================
// Unit Tests
// ============================================================================
