//! End-to-end convergence tests over mocked ports.
//!
//! These drive the real pipeline executor and convergence loop with
//! scripted proposer/validation/store doubles and the in-memory artifact
//! storage, covering the happy path, multi-error documents, the iteration
//! ceiling, and the terminal failure paths.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use planmend::domain::errors::{PortError, PortResult};
use planmend::domain::models::{
    CorrectionSession, EngineConfig, LoopOutcome, PipelineKind, RecoverySuggestion, Snapshot,
    StepName, ValidationMessage,
};
use planmend::domain::ports::{
    ArtifactStorage, DocumentStore, ProposalRequest, Proposer, RevisionRequest, UploadAck,
    ValidationService,
};
use planmend::services::{ConvergenceLoop, PipelineExecutor, ReferenceFallbackResolver};
use planmend::MemoryStorage;

/// Proposer that keys its strategy and proposal on the duplicate id named
/// in the validation error.
struct KeyedProposer;

fn duplicate_id(message: &str) -> &str {
    // Messages look like "Duplicate demand id 'D1'".
    message
        .split('\'')
        .nth(1)
        .unwrap_or_default()
}

#[async_trait]
impl Proposer for KeyedProposer {
    async fn analyze(&self, error: &ValidationMessage) -> PortResult<Value> {
        Ok(json!({
            "search_mode": "value",
            "search_value": duplicate_id(&error.message),
            "error_type": "duplicate_id"
        }))
    }

    async fn propose(&self, request: &ProposalRequest) -> PortResult<Value> {
        let id = duplicate_id(&request.error.message);
        // The later duplicate gets a suffixed id; D1 lives at index 1,
        // D2 at index 3 in the fixture document.
        let index = if id == "D1" { 1 } else { 3 };
        Ok(json!({
            "iteration": request.iteration,
            "document_id": request.document_id,
            "original_error": request.error,
            "error_analyzed": {
                "search_mode": "value",
                "search_value": id,
                "error_type": "duplicate_id",
                "results_count": request.search_report.results_count
            },
            "correction_proposal": {
                "action": "update_field",
                "target_path": format!("demands[{index}].demandId"),
                "current_value": id,
                "new_value": format!("{id}_2"),
                "reasoning": "rename the later duplicate to restore uniqueness"
            }
        }))
    }

    async fn revise(&self, request: &RevisionRequest) -> PortResult<Value> {
        Ok(request.invalid_payload.clone())
    }
}

/// Proposer whose drafts never satisfy the contract, even after revision.
struct HopelessProposer {
    revisions: AtomicU32,
}

#[async_trait]
impl Proposer for HopelessProposer {
    async fn analyze(&self, _: &ValidationMessage) -> PortResult<Value> {
        Ok(json!({
            "search_mode": "value",
            "search_value": "D1",
            "error_type": "duplicate_id"
        }))
    }

    async fn propose(&self, request: &ProposalRequest) -> PortResult<Value> {
        Ok(invalid_proposal(request))
    }

    async fn revise(&self, request: &RevisionRequest) -> PortResult<Value> {
        self.revisions.fetch_add(1, Ordering::SeqCst);
        Ok(request.invalid_payload.clone())
    }
}

fn invalid_proposal(request: &ProposalRequest) -> Value {
    json!({
        "iteration": request.iteration,
        "document_id": request.document_id,
        "original_error": request.error,
        "error_analyzed": {
            "search_mode": "value",
            "search_value": "D1",
            "error_type": "duplicate_id",
            "results_count": 2
        },
        "correction_proposal": {
            "action": "update_field",
            "target_path": "demands[1].demandId",
            "current_value": "D1",
            "new_value": "D1_2",
            "reasoning": "   "
        }
    })
}

/// Plays back one validation report per call, repeating the last.
struct ScriptedValidation {
    reports: Mutex<VecDeque<Vec<ValidationMessage>>>,
}

impl ScriptedValidation {
    fn new(reports: Vec<Vec<ValidationMessage>>) -> Self {
        Self {
            reports: Mutex::new(reports.into()),
        }
    }
}

#[async_trait]
impl ValidationService for ScriptedValidation {
    async fn validate(&self, _: &str) -> PortResult<Vec<ValidationMessage>> {
        let mut reports = self.reports.lock().unwrap();
        if reports.len() > 1 {
            Ok(reports.pop_front().unwrap_or_default())
        } else {
            Ok(reports.front().cloned().unwrap_or_default())
        }
    }
}

struct RecordingStore {
    uploads: AtomicU32,
    fail_with: Option<fn() -> PortError>,
}

impl RecordingStore {
    fn new() -> Self {
        Self {
            uploads: AtomicU32::new(0),
            fail_with: None,
        }
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn create(&self, _: &str) -> PortResult<String> {
        Ok("snap-1".to_string())
    }
    async fn fetch(&self, _: &str) -> PortResult<Snapshot> {
        Ok(Snapshot::new())
    }
    async fn update(
        &self,
        _: &str,
        _: &Snapshot,
        _: &str,
        _: Option<&str>,
    ) -> PortResult<UploadAck> {
        if let Some(fail) = self.fail_with {
            return Err(fail());
        }
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(UploadAck {
            is_successfully_validated: true,
            server_response: json!({}),
        })
    }
}

fn two_duplicate_snapshot() -> Snapshot {
    serde_json::from_value(json!({
        "demands": [
            {"demandId": "D1", "quantity": 10},
            {"demandId": "D1", "quantity": 20},
            {"demandId": "D2", "quantity": 5},
            {"demandId": "D2", "quantity": 8}
        ]
    }))
    .unwrap()
}

fn error(id: &str) -> ValidationMessage {
    ValidationMessage::error(format!("Duplicate demand id '{id}'"))
}

fn config() -> EngineConfig {
    EngineConfig {
        step_retry_pause_ms: 0,
        ..EngineConfig::default()
    }
}

fn engine(
    proposer: Arc<dyn Proposer>,
    validation: Arc<dyn ValidationService>,
    store: Arc<RecordingStore>,
    storage: Arc<MemoryStorage>,
) -> ConvergenceLoop {
    let config = config();
    let executor = PipelineExecutor::new(
        proposer,
        validation,
        store,
        storage,
        ReferenceFallbackResolver::new(false),
        &config,
    );
    ConvergenceLoop::new(executor, &config)
}

#[tokio::test]
async fn single_error_document_converges_in_one_round() {
    let validation = Arc::new(ScriptedValidation::new(vec![vec![error("D1")], vec![]]));
    let store = Arc::new(RecordingStore::new());
    let storage = Arc::new(MemoryStorage::new());
    let engine = engine(
        Arc::new(KeyedProposer),
        validation,
        store.clone(),
        storage.clone(),
    );

    let mut session = CorrectionSession::new("snap-1", "plan-week-34", two_duplicate_snapshot());
    let report = engine.run(PipelineKind::FullCorrection, &mut session).await;

    assert_eq!(report.outcome, LoopOutcome::Converged { iterations: 1 });
    assert_eq!(report.runs.len(), 1);
    assert_eq!(report.runs[0].steps.len(), 7);
    assert_eq!(store.uploads.load(Ordering::SeqCst), 1);
    assert_eq!(
        session.snapshot.collection("demands").unwrap()[1]["demandId"],
        "D1_2"
    );
    assert!(storage
        .exists("snap-1/iteration-1/applied-patch.json")
        .await
        .unwrap());
}

#[tokio::test]
async fn already_valid_document_converges_without_corrections() {
    // Only a warning: nothing to correct, so the first round converges
    // right after the locate step.
    let validation = Arc::new(ScriptedValidation::new(vec![vec![
        ValidationMessage::warning("late delivery on order O7"),
    ]]));
    let store = Arc::new(RecordingStore::new());
    let storage = Arc::new(MemoryStorage::new());
    let engine = engine(
        Arc::new(KeyedProposer),
        validation,
        store.clone(),
        storage.clone(),
    );

    let mut session = CorrectionSession::new("snap-1", "plan-week-34", two_duplicate_snapshot());
    let report = engine.run(PipelineKind::FullCorrection, &mut session).await;

    assert_eq!(report.outcome, LoopOutcome::Converged { iterations: 1 });
    assert_eq!(report.runs.len(), 1);
    assert!(report.runs[0].succeeded);
    assert_eq!(report.runs[0].steps.len(), 2);
    assert_eq!(store.uploads.load(Ordering::SeqCst), 0);
    // No iteration was started and nothing was persisted or mutated.
    assert!(storage.list("snap-1/").await.unwrap().is_empty());
    assert_eq!(
        session.snapshot.collection("demands").unwrap()[1]["demandId"],
        "D1"
    );
}

#[tokio::test]
async fn multi_error_document_needs_one_round_per_error() {
    // Round 1 fixes D1 and re-validation still reports D2; round 2 fixes
    // D2 and the report comes back clean.
    let validation = Arc::new(ScriptedValidation::new(vec![
        vec![error("D1"), error("D2")],
        vec![error("D2")],
        vec![error("D2")],
        vec![],
    ]));
    let store = Arc::new(RecordingStore::new());
    let storage = Arc::new(MemoryStorage::new());
    let engine = engine(
        Arc::new(KeyedProposer),
        validation,
        store.clone(),
        storage.clone(),
    );

    let mut session = CorrectionSession::new("snap-1", "plan-week-34", two_duplicate_snapshot());
    let report = engine.run(PipelineKind::FullCorrection, &mut session).await;

    assert_eq!(report.outcome, LoopOutcome::Converged { iterations: 2 });
    assert_eq!(report.runs.len(), 2);
    assert_eq!(store.uploads.load(Ordering::SeqCst), 2);
    let demands = session.snapshot.collection("demands").unwrap();
    assert_eq!(demands[1]["demandId"], "D1_2");
    assert_eq!(demands[3]["demandId"], "D2_2");
    // Each round left its own artifact directory.
    assert!(storage
        .exists("snap-1/iteration-1/correction-proposal.json")
        .await
        .unwrap());
    assert!(storage
        .exists("snap-1/iteration-2/correction-proposal.json")
        .await
        .unwrap());
}

#[tokio::test]
async fn iteration_ceiling_bounds_a_document_that_never_converges() {
    // The validation report never clears, so the loop exhausts all five
    // rounds and reports partial success with the corrections kept.
    let validation = Arc::new(ScriptedValidation::new(vec![vec![error("D1")]]));
    let store = Arc::new(RecordingStore::new());
    let engine = engine(
        Arc::new(KeyedProposer),
        validation,
        store.clone(),
        Arc::new(MemoryStorage::new()),
    );

    let mut session = CorrectionSession::new("snap-1", "plan-week-34", two_duplicate_snapshot());
    let report = engine.run(PipelineKind::FullCorrection, &mut session).await;

    assert_eq!(
        report.outcome,
        LoopOutcome::ErrorsRemaining {
            iterations: 5,
            remaining_errors: 1
        }
    );
    assert_eq!(report.runs.len(), 5);
    assert_eq!(store.uploads.load(Ordering::SeqCst), 5);
    assert!(report.runs.iter().all(|run| run.succeeded));
    // The last applied correction stays in place.
    assert_eq!(
        session.snapshot.collection("demands").unwrap()[1]["demandId"],
        "D1_2"
    );
}

#[tokio::test]
async fn non_looping_pipelines_run_exactly_once() {
    let validation = Arc::new(ScriptedValidation::new(vec![vec![error("D1")]]));
    let store = Arc::new(RecordingStore::new());
    let engine = engine(
        Arc::new(KeyedProposer),
        validation,
        store.clone(),
        Arc::new(MemoryStorage::new()),
    );

    let mut session = CorrectionSession::new("snap-1", "plan-week-34", two_duplicate_snapshot());
    let report = engine.run(PipelineKind::AnalyzeOnly, &mut session).await;

    assert_eq!(
        report.outcome,
        LoopOutcome::ErrorsRemaining {
            iterations: 1,
            remaining_errors: 1
        }
    );
    assert_eq!(report.runs.len(), 1);
    assert_eq!(store.uploads.load(Ordering::SeqCst), 0);
    // Diagnosis only; the document was never touched.
    assert_eq!(
        session.snapshot.collection("demands").unwrap()[1]["demandId"],
        "D1"
    );
}

#[tokio::test]
async fn missing_document_stops_the_loop_with_a_recovery_suggestion() {
    let validation = Arc::new(ScriptedValidation::new(vec![vec![error("D1")]]));
    let store = Arc::new(RecordingStore {
        uploads: AtomicU32::new(0),
        fail_with: Some(|| PortError::DocumentNotFound("snap-1".into())),
    });
    let engine = engine(
        Arc::new(KeyedProposer),
        validation,
        store,
        Arc::new(MemoryStorage::new()),
    );

    let mut session = CorrectionSession::new("snap-1", "plan-week-34", two_duplicate_snapshot());
    let report = engine.run(PipelineKind::FullCorrection, &mut session).await;

    assert_eq!(
        report.outcome,
        LoopOutcome::PipelineFailed {
            iterations: 1,
            failed_at: StepName::Upload,
            recovery_suggestion: Some(RecoverySuggestion::DocumentNotFound),
        }
    );
    assert_eq!(report.runs.len(), 1);
    // The local snapshot keeps the applied fix; the backup allows a
    // caller-side rollback.
    assert!(session.rollback());
    assert_eq!(
        session.snapshot.collection("demands").unwrap()[1]["demandId"],
        "D1"
    );
}

#[tokio::test]
async fn exhausted_proposal_gate_fails_the_run_with_retry_artifacts() {
    let proposer = Arc::new(HopelessProposer {
        revisions: AtomicU32::new(0),
    });
    let validation = Arc::new(ScriptedValidation::new(vec![vec![error("D1")]]));
    let storage = Arc::new(MemoryStorage::new());
    let engine = engine(
        proposer.clone(),
        validation,
        Arc::new(RecordingStore::new()),
        storage.clone(),
    );

    let mut session = CorrectionSession::new("snap-1", "plan-week-34", two_duplicate_snapshot());
    let report = engine.run(PipelineKind::FullCorrection, &mut session).await;

    match report.outcome {
        LoopOutcome::PipelineFailed {
            iterations,
            failed_at,
            ..
        } => {
            assert_eq!(iterations, 1);
            assert_eq!(failed_at, StepName::ValidateProposal);
        }
        other => panic!("expected a failed pipeline, got {other:?}"),
    }
    assert_eq!(proposer.revisions.load(Ordering::SeqCst), 5);
    // Every rejected draft was persisted for audit, the original included.
    for retry in 0..=5 {
        let key = format!("snap-1/iteration-1/correction-proposal-retry-{retry}.json");
        assert!(storage.exists(&key).await.unwrap(), "missing {key}");
    }
    // The document was never touched.
    assert_eq!(
        session.snapshot.collection("demands").unwrap()[1]["demandId"],
        "D1"
    );
}
