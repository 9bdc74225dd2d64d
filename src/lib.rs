//! Planmend - Self-Correcting Patch Engine
//!
//! Planmend repairs planning snapshots that fail server-side validation.
//! It analyzes each validation error, locates the offending data in the
//! nested JSON document, asks a proposer for a structured correction,
//! admits the proposal through a revision-driven contract gate, applies
//! it, and re-validates until the document converges or an iteration
//! ceiling is hit.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Snapshot, path, and proposal models plus
//!   the outbound ports (proposer, validation service, document store,
//!   artifact storage)
//! - **Service Layer** (`services`): Path resolution, search, patching,
//!   proposal gating, pipeline execution, and the convergence loop
//! - **Infrastructure Layer** (`infrastructure`): Planning service HTTP
//!   client, artifact storage backends, configuration, and logging
//!
//! # Example
//!
//! ```ignore
//! use planmend::domain::models::{CorrectionSession, PipelineKind};
//! use planmend::services::{ConvergenceLoop, PipelineExecutor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Wire ports, build an executor, and run a full correction
//!     Ok(())
//! }
//! ```

pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{EngineError, PatchError, PathError, PortError, ProposalError};
pub use domain::models::{
    AppliedPatch, CorrectionAction, CorrectionProposal, CorrectionSession, EngineConfig,
    Iteration, LoopOutcome, LoopReport, PipelineKind, PipelineRun, SearchReport, Snapshot,
    StepName, TargetPath, ValidationMessage,
};
pub use domain::ports::{ArtifactStorage, DocumentStore, Proposer, ValidationService};
pub use infrastructure::config::ConfigLoader;
pub use infrastructure::planning_api::PlanningApiClient;
pub use infrastructure::storage::{LocalStorage, MemoryStorage, ObjectStorage};
pub use services::{ConvergenceLoop, PatchApplier, PipelineExecutor, ProposalGate, SearchEngine};
