//! Engine services: path resolution, search, gating, patching, and the
//! pipeline/loop machinery that ties them together.

pub mod convergence_loop;
pub mod patch_applier;
pub mod path_resolver;
pub mod pipeline_executor;
pub mod proposal_gate;
pub mod reference_fallback;
pub mod retry;
pub mod search_engine;

pub use convergence_loop::ConvergenceLoop;
pub use patch_applier::PatchApplier;
pub use path_resolver::PathResolver;
pub use pipeline_executor::PipelineExecutor;
pub use proposal_gate::ProposalGate;
pub use reference_fallback::ReferenceFallbackResolver;
pub use retry::{Attempted, RetryPolicy};
pub use search_engine::SearchEngine;
