//! The proposal gate: the only doorway between raw proposer output and a
//! [`CorrectionProposal`] the applier will accept.
//!
//! A rejected payload is persisted (retry 0 is the original), the proposer
//! is asked to revise with the rejection reason as context, and the cycle
//! repeats up to a bounded number of revisions. A proposal that never
//! passes the gate ends the attempt with a terminal error.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::errors::{ProposalError, ProposalResult};
use crate::domain::models::iteration::artifact;
use crate::domain::models::path::TargetPath;
use crate::domain::models::proposal::{CorrectionAction, CorrectionProposal, USE_REFERENCE_DATA};
use crate::domain::ports::proposer::{ProposalRequest, Proposer, RevisionRequest};
use crate::domain::ports::storage::ArtifactStorage;
use crate::services::retry::RetryPolicy;

struct GateState {
    payload: Value,
    last_error: Option<String>,
}

/// Admits or rejects raw proposals against the correction contract.
pub struct ProposalGate {
    proposer: Arc<dyn Proposer>,
    storage: Arc<dyn ArtifactStorage>,
    retry: RetryPolicy,
}

impl ProposalGate {
    /// `retry_limit` is the number of revision rounds granted after the
    /// initial payload fails.
    pub fn new(
        proposer: Arc<dyn Proposer>,
        storage: Arc<dyn ArtifactStorage>,
        retry_limit: u32,
    ) -> Self {
        Self {
            proposer,
            storage,
            retry: RetryPolicy::new(retry_limit + 1, Duration::ZERO),
        }
    }

    /// Validates `raw` against the contract, revising through the proposer
    /// when it fails, and returns the admitted proposal.
    pub async fn admit(
        &self,
        request: &ProposalRequest,
        raw: Value,
    ) -> ProposalResult<CorrectionProposal> {
        let state = Mutex::new(GateState {
            payload: raw,
            last_error: None,
        });

        let attempted = self
            .retry
            .execute(
                |err: &ProposalError| matches!(err, ProposalError::ContractViolation(_)),
                |attempt| {
                    let state = &state;
                    async move {
                        let mut state = state.lock().await;
                        if attempt > 1 {
                            let contract_error =
                                state.last_error.clone().unwrap_or_default();
                            debug!(attempt, "asking the proposer to revise");
                            let revised = self
                                .proposer
                                .revise(&RevisionRequest {
                                    contract_error,
                                    invalid_payload: state.payload.clone(),
                                    request: request.clone(),
                                })
                                .await
                                .map_err(|err| {
                                    ProposalError::ProposerUnavailable(err.to_string())
                                })?;
                            state.payload = revised;
                        }

                        match Self::check(&state.payload) {
                            Ok(proposal) => Ok(proposal),
                            Err(err) => {
                                let reason = err.to_string();
                                warn!(attempt, %reason, "proposal rejected by the gate");
                                self.persist_rejection(request, attempt - 1, &state.payload)
                                    .await?;
                                state.last_error = Some(reason);
                                Err(err)
                            }
                        }
                    }
                },
            )
            .await;

        attempted.result.map_err(|err| match err {
            ProposalError::ContractViolation(last_error) => ProposalError::RetriesExhausted {
                retries: attempted.attempts - 1,
                last_error,
            },
            other => other,
        })
    }

    /// Saves a rejected payload as `correction-proposal-retry-{n}.json`.
    async fn persist_rejection(
        &self,
        request: &ProposalRequest,
        retry: u32,
        payload: &Value,
    ) -> ProposalResult<()> {
        let key = crate::domain::models::iteration::Iteration::new(request.iteration)
            .key(&request.document_id, &artifact::proposal_retry(retry));
        self.storage
            .save_json(&key, payload)
            .await
            .map_err(|err| ProposalError::Storage(err.to_string()))
    }

    /// Pure contract check: shape, required fields, and action/path
    /// compatibility. No document access, no I/O.
    pub fn check(raw: &Value) -> ProposalResult<CorrectionProposal> {
        let proposal: CorrectionProposal = serde_json::from_value(raw.clone())
            .map_err(|err| ProposalError::ContractViolation(err.to_string()))?;

        if proposal.action.reasoning().trim().is_empty() {
            return Err(ProposalError::ContractViolation(
                "reasoning must not be empty".to_string(),
            ));
        }

        let path: TargetPath = proposal
            .action
            .target_path()
            .parse()
            .map_err(|err| ProposalError::ContractViolation(format!("{err}")))?;

        match &proposal.action {
            CorrectionAction::UpdateField { new_value, .. } => {
                if path.is_collection() {
                    if new_value.as_str() != Some(USE_REFERENCE_DATA) {
                        return Err(ProposalError::ContractViolation(format!(
                            "update_field on a bare collection path '{path}' is only \
                             allowed with the {USE_REFERENCE_DATA} sentinel"
                        )));
                    }
                } else if !path.addresses_field() {
                    return Err(ProposalError::ContractViolation(format!(
                        "update_field requires a field-bearing path, got '{path}'"
                    )));
                }
            }
            CorrectionAction::AddToArray { new_value, .. } => {
                if !path.is_collection() {
                    return Err(ProposalError::ContractViolation(format!(
                        "add_to_array requires a bare collection path, got '{path}'"
                    )));
                }
                if !new_value.is_object() && !new_value.is_string() {
                    return Err(ProposalError::ContractViolation(
                        "add_to_array new_value must be a record".to_string(),
                    ));
                }
            }
            CorrectionAction::RemoveFromArray { current_value, .. } => {
                if path.is_collection() {
                    if !current_value.as_ref().is_some_and(Value::is_object) {
                        return Err(ProposalError::ContractViolation(
                            "remove_from_array on a bare collection requires a record \
                             predicate in current_value"
                                .to_string(),
                        ));
                    }
                } else if matches!(path, TargetPath::Field { .. }) {
                    // A plain field is not an array entry.
                    return Err(ProposalError::ContractViolation(format!(
                        "remove_from_array cannot target the field path '{path}'"
                    )));
                }
            }
            CorrectionAction::ManualInterventionRequired { .. } => {}
        }

        for update in proposal.action.additional_updates() {
            let update_path: TargetPath = update
                .target_path
                .parse()
                .map_err(|err| ProposalError::ContractViolation(format!("{err}")))?;
            if !update_path.addresses_field() {
                return Err(ProposalError::ContractViolation(format!(
                    "additional update paths must address a field, got '{update_path}'"
                )));
            }
        }

        Ok(proposal)
    }
}
