//! Drives a pipeline repeatedly until the document converges.
//!
//! One iteration fixes at most one error, so a document with several
//! errors needs several rounds. The loop is bounded; hitting the ceiling
//! with errors left is reported as partial success and every applied
//! correction stays in place.

use tracing::{info, warn};

use crate::domain::models::config::EngineConfig;
use crate::domain::models::pipeline::{LoopOutcome, LoopReport, PipelineKind, StepName};
use crate::domain::models::session::CorrectionSession;
use crate::services::pipeline_executor::PipelineExecutor;

/// Bounded validate/correct/re-validate loop over a [`PipelineExecutor`].
pub struct ConvergenceLoop {
    executor: PipelineExecutor,
    max_iterations: u32,
}

impl ConvergenceLoop {
    pub fn new(executor: PipelineExecutor, config: &EngineConfig) -> Self {
        Self {
            executor,
            max_iterations: config.max_loop_iterations.max(1),
        }
    }

    /// Runs the pipeline until the document has no errors left, a run
    /// fails terminally, or the iteration ceiling is reached. Pipelines
    /// that do not participate in looping run exactly once.
    pub async fn run(&self, kind: PipelineKind, session: &mut CorrectionSession) -> LoopReport {
        let ceiling = if kind.participates_in_loop() {
            self.max_iterations
        } else {
            1
        };
        let mut runs = Vec::new();

        for round in 1..=ceiling {
            info!(round, ceiling, pipeline = %kind, "convergence round");
            let run = self.executor.run(kind, session).await;

            if !run.succeeded {
                let failed_at = run.failed_at.unwrap_or(StepName::Validate);
                let recovery_suggestion = run.recovery_suggestion.clone();
                runs.push(run);
                warn!(round, %failed_at, "loop stopped by a failed pipeline");
                return LoopReport {
                    outcome: LoopOutcome::PipelineFailed {
                        iterations: round,
                        failed_at,
                        recovery_suggestion,
                    },
                    runs,
                };
            }

            let remaining = run
                .remaining_errors
                .or_else(|| session.error_count())
                .unwrap_or(0);
            runs.push(run);

            if remaining == 0 {
                info!(round, "document converged");
                return LoopReport {
                    outcome: LoopOutcome::Converged { iterations: round },
                    runs,
                };
            }

            if round == ceiling {
                warn!(
                    round,
                    remaining, "iteration ceiling reached with errors remaining"
                );
                return LoopReport {
                    outcome: LoopOutcome::ErrorsRemaining {
                        iterations: round,
                        remaining_errors: remaining,
                    },
                    runs,
                };
            }
        }

        // Unreachable: the ceiling arm above always returns.
        LoopReport {
            outcome: LoopOutcome::Converged {
                iterations: ceiling,
            },
            runs,
        }
    }
}
