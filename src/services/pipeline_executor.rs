//! Runs correction pipelines step by step.
//!
//! Each step gets a bounded number of attempts with a fixed pause and a
//! per-attempt timeout. Failures that retrying cannot fix (missing
//! document, bad credentials, contract violations) short-circuit the rest
//! of the pipeline, and every failed run carries a recovery suggestion
//! telling the caller what to do about it.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::errors::{EngineError, EngineResult, PortError};
use crate::domain::models::config::EngineConfig;
use crate::domain::models::iteration::artifact;
use crate::domain::models::pipeline::{
    PipelineKind, PipelineRun, RecoverySuggestion, StepName, StepRecord,
};
use crate::domain::models::search::{SearchClassification, SearchStrategy};
use crate::domain::models::session::CorrectionSession;
use crate::domain::models::validation;
use crate::domain::ports::document_store::DocumentStore;
use crate::domain::ports::proposer::{ProposalRequest, Proposer};
use crate::domain::ports::storage::ArtifactStorage;
use crate::domain::ports::validation_service::ValidationService;
use crate::services::patch_applier::PatchApplier;
use crate::services::proposal_gate::ProposalGate;
use crate::services::reference_fallback::ReferenceFallbackResolver;
use crate::services::retry::RetryPolicy;
use crate::services::search_engine::SearchEngine;

/// Executes the canned pipelines against a correction session.
pub struct PipelineExecutor {
    proposer: Arc<dyn Proposer>,
    validation: Arc<dyn ValidationService>,
    store: Arc<dyn DocumentStore>,
    storage: Arc<dyn ArtifactStorage>,
    gate: ProposalGate,
    search: SearchEngine,
    fallback: ReferenceFallbackResolver,
    applier: PatchApplier,
    retry: RetryPolicy,
    step_timeout: Duration,
}

impl PipelineExecutor {
    pub fn new(
        proposer: Arc<dyn Proposer>,
        validation: Arc<dyn ValidationService>,
        store: Arc<dyn DocumentStore>,
        storage: Arc<dyn ArtifactStorage>,
        fallback: ReferenceFallbackResolver,
        config: &EngineConfig,
    ) -> Self {
        let gate = ProposalGate::new(
            proposer.clone(),
            storage.clone(),
            config.proposal_retry_limit,
        );
        Self {
            proposer,
            validation,
            store,
            storage,
            gate,
            search: SearchEngine::new(),
            fallback,
            applier: PatchApplier::new(),
            retry: RetryPolicy::new(
                config.max_step_attempts,
                Duration::from_millis(config.step_retry_pause_ms),
            ),
            step_timeout: Duration::from_secs(config.step_timeout_secs),
        }
    }

    /// Runs every step of the pipeline in order, stopping at the first
    /// step that exhausts its attempts or fails terminally.
    pub async fn run(&self, kind: PipelineKind, session: &mut CorrectionSession) -> PipelineRun {
        info!(
            pipeline = %kind,
            document_id = %session.document_id,
            session_id = %session.session_id,
            "starting pipeline"
        );
        let mut run = PipelineRun::new(kind);
        let cell = Mutex::new(session);

        for &step in kind.steps() {
            debug!(step = %step, "running step");
            let attempted = self
                .retry
                .execute(
                    |err: &EngineError| err.is_retryable(),
                    |_attempt| {
                        let cell = &cell;
                        async move {
                            let mut guard = cell.lock().await;
                            match tokio::time::timeout(
                                self.step_timeout,
                                self.run_step(step, &mut **guard),
                            )
                            .await
                            {
                                Ok(result) => result,
                                Err(_) => {
                                    Err(EngineError::Port(PortError::Timeout(self.step_timeout)))
                                }
                            }
                        }
                    },
                )
                .await;

            match attempted.result {
                Ok(output) => {
                    info!(step = %step, attempts = attempted.attempts, %output, "step succeeded");
                    run.steps.push(StepRecord {
                        name: step,
                        attempts: attempted.attempts,
                        succeeded: true,
                        output,
                        error: None,
                    });
                    // A clean validation report leaves nothing to correct;
                    // the remaining steps have no error to work on.
                    if step == StepName::LocateError && cell.lock().await.current_error.is_none() {
                        info!("no errors to correct; skipping the remaining steps");
                        break;
                    }
                }
                Err(err) => {
                    let suggestion = suggest_recovery(step, &err);
                    warn!(
                        step = %step,
                        attempts = attempted.attempts,
                        error = %err,
                        suggestion = ?suggestion,
                        "pipeline failed"
                    );
                    run.steps.push(StepRecord {
                        name: step,
                        attempts: attempted.attempts,
                        succeeded: false,
                        output: String::new(),
                        error: Some(err.to_string()),
                    });
                    run.failed_at = Some(step);
                    run.recovery_suggestion = Some(suggestion);
                    return run;
                }
            }
        }

        run.succeeded = true;
        run.remaining_errors = cell.into_inner().error_count();
        info!(
            pipeline = %kind,
            remaining_errors = ?run.remaining_errors,
            "pipeline finished"
        );
        run
    }

    async fn run_step(
        &self,
        step: StepName,
        session: &mut CorrectionSession,
    ) -> EngineResult<String> {
        match step {
            StepName::Validate | StepName::Revalidate => self.validate_step(session).await,
            StepName::LocateError => self.locate_step(session).await,
            StepName::ProposePatch => self.propose_step(session).await,
            StepName::ValidateProposal => self.gate_step(session).await,
            StepName::ApplyPatch => self.apply_step(session).await,
            StepName::Upload => self.upload_step(session).await,
        }
    }

    async fn validate_step(&self, session: &mut CorrectionSession) -> EngineResult<String> {
        let messages = self.validation.validate(&session.document_id).await?;
        let errors = validation::error_count(&messages);
        let others = messages.len() - errors;
        session.last_validation = Some(messages);
        Ok(format!("{errors} error(s), {others} other message(s)"))
    }

    async fn locate_step(&self, session: &mut CorrectionSession) -> EngineResult<String> {
        let messages = session.last_validation.as_deref().ok_or_else(|| {
            EngineError::MissingPrerequisite {
                missing_step: StepName::Validate,
                required_artifact: "validation report".to_string(),
            }
        })?;
        let Some(error) = validation::first_error(messages).cloned() else {
            return Ok("no ERROR-level messages to locate".to_string());
        };

        let iteration = session.begin_iteration();
        session.current_error = Some(error.clone());

        let raw = self.proposer.analyze(&error).await?;
        let strategy: SearchStrategy = serde_json::from_value(raw)
            .map_err(|err| EngineError::Step(format!("unparseable search strategy: {err}")))?;
        if !strategy.should_investigate {
            debug!("analysis advises against investigation; searching anyway");
        }

        let mut report = self.search.search(&session.document_id, &session.snapshot, &strategy);
        if report.classification == SearchClassification::EmptyCollection {
            if let Some(collection) = strategy.search_value.as_deref() {
                report.context.fallback = Some(self.fallback.resolve(collection));
            }
        }

        let key = iteration.key(&session.document_id, artifact::SEARCH_REPORT);
        self.save_json(&key, &report).await?;

        let summary = format!(
            "iteration {}: {:?} with {} hit(s)",
            iteration.number(),
            report.classification,
            report.results_count
        );
        session.search_report = Some(report);
        Ok(summary)
    }

    async fn propose_step(&self, session: &mut CorrectionSession) -> EngineResult<String> {
        let request = proposal_request(session)?;
        let raw = self.proposer.propose(&request).await?;
        session.raw_proposal = Some(raw);
        Ok("correction drafted".to_string())
    }

    async fn gate_step(&self, session: &mut CorrectionSession) -> EngineResult<String> {
        let raw = session.raw_proposal.clone().ok_or_else(|| {
            EngineError::MissingPrerequisite {
                missing_step: StepName::ProposePatch,
                required_artifact: format!("{}.json", artifact::PROPOSAL),
            }
        })?;
        let request = proposal_request(session)?;
        let proposal = self.gate.admit(&request, raw).await?;

        let key = session
            .iteration
            .key(&session.document_id, artifact::PROPOSAL);
        self.save_json(&key, &proposal).await?;

        let summary = format!(
            "admitted {} at '{}'",
            proposal.action.kind(),
            proposal.action.target_path()
        );
        session.proposal = Some(proposal);
        Ok(summary)
    }

    async fn apply_step(&self, session: &mut CorrectionSession) -> EngineResult<String> {
        let proposal = session.proposal.clone().ok_or_else(|| {
            EngineError::MissingPrerequisite {
                missing_step: StepName::ValidateProposal,
                required_artifact: format!("{}.json", artifact::PROPOSAL),
            }
        })?;

        // Full backup before any mutation, so the caller can roll back.
        let backup = session.snapshot.clone();
        let backup_key = session
            .iteration
            .key(&session.document_id, artifact::SNAPSHOT_BACKUP);
        self.save_json(&backup_key, &backup.to_value()).await?;
        if let Some(messages) = &session.last_validation {
            let key = session
                .iteration
                .key(&session.document_id, artifact::VALIDATION_BACKUP);
            self.save_json(&key, messages).await?;
        }

        let patch = self
            .applier
            .apply(&mut session.snapshot, &proposal, &self.fallback)?;
        session.backup = Some(backup);

        let key = session
            .iteration
            .key(&session.document_id, artifact::APPLIED_PATCH);
        self.save_json(&key, &patch).await?;

        let summary = if patch.manual_intervention {
            format!(
                "manual intervention recorded for '{}'; document unchanged",
                patch.target_path
            )
        } else {
            format!("applied {} at '{}'", patch.action, patch.target_path)
        };
        session.applied = Some(patch);
        Ok(summary)
    }

    async fn upload_step(&self, session: &mut CorrectionSession) -> EngineResult<String> {
        let comment = format!("automated correction, iteration {}", session.iteration.number());
        let ack = self
            .store
            .update(
                &session.document_id,
                &session.snapshot,
                &session.document_name,
                Some(&comment),
            )
            .await?;
        Ok(format!(
            "uploaded; server-side validation flag: {}",
            ack.is_successfully_validated
        ))
    }

    async fn save_json<T: serde::Serialize>(&self, key: &str, value: &T) -> EngineResult<()> {
        let value: Value = serde_json::to_value(value).map_err(PortError::from)?;
        self.storage.save_json(key, &value).await?;
        Ok(())
    }
}

/// Builds the proposer request from the session's current iteration state.
fn proposal_request(session: &CorrectionSession) -> EngineResult<ProposalRequest> {
    let search_report =
        session
            .search_report
            .clone()
            .ok_or_else(|| EngineError::MissingPrerequisite {
                missing_step: StepName::LocateError,
                required_artifact: format!("{}.json", artifact::SEARCH_REPORT),
            })?;
    let error = session
        .current_error
        .clone()
        .ok_or_else(|| EngineError::MissingPrerequisite {
            missing_step: StepName::LocateError,
            required_artifact: "selected validation error".to_string(),
        })?;
    Ok(ProposalRequest {
        iteration: session.iteration.number(),
        document_id: session.document_id.clone(),
        error,
        search_report,
    })
}

/// Maps a step failure to advice the caller can act on.
fn suggest_recovery(step: StepName, err: &EngineError) -> RecoverySuggestion {
    match err {
        EngineError::MissingPrerequisite {
            missing_step,
            required_artifact,
        } => RecoverySuggestion::MissingPrerequisite {
            missing_step: *missing_step,
            required_artifact: required_artifact.clone(),
        },
        EngineError::Port(PortError::DocumentNotFound(_)) => RecoverySuggestion::DocumentNotFound,
        EngineError::Port(PortError::AuthenticationFailed(_)) => {
            RecoverySuggestion::AuthenticationFailed {
                config_issue: "client_secret".to_string(),
            }
        }
        other => {
            let message = other.to_string();
            let lower = message.to_lowercase();
            if lower.contains("authentication") || lower.contains("client_secret") {
                RecoverySuggestion::AuthenticationFailed {
                    config_issue: "client_secret".to_string(),
                }
            } else if (lower.contains("not found") || lower.contains("does not exist"))
                && (lower.contains("document") || lower.contains("snapshot"))
            {
                RecoverySuggestion::DocumentNotFound
            } else if lower.contains("validation")
                || matches!(
                    step,
                    StepName::Validate | StepName::Revalidate | StepName::ValidateProposal
                )
            {
                RecoverySuggestion::ValidationError { context: message }
            } else {
                RecoverySuggestion::Unknown { failed_step: step }
            }
        }
    }
}
