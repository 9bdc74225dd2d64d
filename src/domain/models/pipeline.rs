//! Pipeline definitions and run records.
//!
//! A pipeline is an ordered list of named steps; four canned pipelines
//! cover the full correction cycle and its partial variants. Run records
//! capture per-step attempts and, on failure, a machine-readable recovery
//! suggestion.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One step of a correction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    /// Fetch the current validation report.
    Validate,
    /// Pick the first error and search the document for its location.
    LocateError,
    /// Ask the proposer for a correction.
    ProposePatch,
    /// Gate the raw proposal against the correction contract.
    ValidateProposal,
    /// Apply the gated proposal to the in-memory snapshot.
    ApplyPatch,
    /// Push the mutated snapshot back to the document store.
    Upload,
    /// Fetch the validation report again to measure progress.
    Revalidate,
}

impl StepName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::LocateError => "locate_error",
            Self::ProposePatch => "propose_patch",
            Self::ValidateProposal => "validate_proposal",
            Self::ApplyPatch => "apply_patch",
            Self::Upload => "upload",
            Self::Revalidate => "revalidate",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canned pipelines the executor knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    /// The complete cycle, from fresh validation to re-validation.
    FullCorrection,
    /// Same cycle, starting from an already-known validation report.
    CorrectionFromValidation,
    /// Diagnosis only: stop after the proposal is gated.
    AnalyzeOnly,
    /// Apply an already-gated proposal and push it.
    ApplyAndUpload,
}

impl PipelineKind {
    /// Ordered steps for this pipeline.
    pub fn steps(self) -> &'static [StepName] {
        use StepName::{
            ApplyPatch, LocateError, ProposePatch, Revalidate, Upload, Validate, ValidateProposal,
        };
        match self {
            Self::FullCorrection => &[
                Validate,
                LocateError,
                ProposePatch,
                ValidateProposal,
                ApplyPatch,
                Upload,
                Revalidate,
            ],
            Self::CorrectionFromValidation => &[
                LocateError,
                ProposePatch,
                ValidateProposal,
                ApplyPatch,
                Upload,
                Revalidate,
            ],
            Self::AnalyzeOnly => &[Validate, LocateError, ProposePatch, ValidateProposal],
            Self::ApplyAndUpload => &[ApplyPatch, Upload, Revalidate],
        }
    }

    /// Whether the convergence loop may run this pipeline repeatedly.
    /// Diagnosis and apply-only pipelines run exactly once.
    pub fn participates_in_loop(self) -> bool {
        matches!(self, Self::FullCorrection | Self::CorrectionFromValidation)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullCorrection => "full_correction",
            Self::CorrectionFromValidation => "correction_from_validation",
            Self::AnalyzeOnly => "analyze_only",
            Self::ApplyAndUpload => "apply_and_upload",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable hint attached to a failed run, telling the caller what
/// to fix before trying again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecoverySuggestion {
    /// An earlier step's artifact is missing; run that step first.
    MissingPrerequisite {
        missing_step: StepName,
        required_artifact: String,
    },
    /// The target document does not exist on the server.
    DocumentNotFound,
    /// Credentials are wrong or missing.
    AuthenticationFailed { config_issue: String },
    /// A validation-shaped failure; the context carries the message.
    ValidationError { context: String },
    /// Nothing recognizable; points at the step that failed.
    Unknown { failed_step: StepName },
}

/// Outcome of one step, including how many attempts it took.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: StepName,
    pub attempts: u32,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Record of one pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub pipeline: PipelineKind,
    pub steps: Vec<StepRecord>,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<StepName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_suggestion: Option<RecoverySuggestion>,
    /// `ERROR`-level messages left after the final validation step, when
    /// the pipeline got that far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_errors: Option<usize>,
}

impl PipelineRun {
    pub fn new(pipeline: PipelineKind) -> Self {
        Self {
            pipeline,
            steps: Vec::new(),
            succeeded: false,
            failed_at: None,
            recovery_suggestion: None,
            remaining_errors: None,
        }
    }
}

/// Terminal state of a convergence loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoopOutcome {
    /// The document reached zero errors.
    Converged { iterations: u32 },
    /// The iteration ceiling was hit with errors still present. The work
    /// done so far is kept; this is partial success, not failure.
    ErrorsRemaining {
        iterations: u32,
        remaining_errors: usize,
    },
    /// A pipeline run failed terminally before the loop could finish.
    PipelineFailed {
        iterations: u32,
        failed_at: StepName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recovery_suggestion: Option<RecoverySuggestion>,
    },
}

/// Full loop result: the terminal outcome plus every run that happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopReport {
    pub outcome: LoopOutcome,
    pub runs: Vec<PipelineRun>,
}
