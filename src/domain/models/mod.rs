//! Domain models for the patch engine.

pub mod config;
pub mod document;
pub mod iteration;
pub mod path;
pub mod pipeline;
pub mod proposal;
pub mod search;
pub mod session;
pub mod validation;

pub use config::{ApiConfig, EngineConfig, LoggingConfig, StorageConfig, StorageMode};
pub use document::Snapshot;
pub use iteration::{artifact, Iteration};
pub use path::TargetPath;
pub use pipeline::{
    LoopOutcome, LoopReport, PipelineKind, PipelineRun, RecoverySuggestion, StepName, StepRecord,
};
pub use proposal::{
    AdditionalUpdate, AppliedPatch, AppliedUpdate, CorrectionAction, CorrectionProposal,
    ErrorAnalysis, USE_REFERENCE_DATA,
};
pub use search::{
    CrossReferences, EnrichedContext, FallbackAdvice, FieldPattern, NeighborWindow, NumericStats,
    RelatedRecords, SearchClassification, SearchHit, SearchMode, SearchReport, SearchStrategy,
};
pub use session::CorrectionSession;
pub use validation::{Severity, ValidationMessage};
