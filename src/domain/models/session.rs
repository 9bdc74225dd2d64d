//! Mutable state of one correction session: the snapshot being repaired
//! and everything the pipeline steps have produced so far.

use serde_json::Value;
use uuid::Uuid;

use crate::domain::models::document::Snapshot;
use crate::domain::models::iteration::Iteration;
use crate::domain::models::proposal::{AppliedPatch, CorrectionProposal};
use crate::domain::models::search::SearchReport;
use crate::domain::models::validation::{self, ValidationMessage};

/// State threaded through pipeline steps. Steps read what their
/// predecessors left behind and write their own results back.
#[derive(Debug, Clone)]
pub struct CorrectionSession {
    /// Correlation id for logs.
    pub session_id: Uuid,
    pub document_id: String,
    pub document_name: String,
    pub snapshot: Snapshot,
    /// Current iteration; advanced each time a new error is picked up.
    pub iteration: Iteration,
    pub last_validation: Option<Vec<ValidationMessage>>,
    /// The error picked up by the current iteration.
    pub current_error: Option<ValidationMessage>,
    pub search_report: Option<SearchReport>,
    /// Raw proposer output awaiting the gate.
    pub raw_proposal: Option<Value>,
    /// The gated proposal awaiting application.
    pub proposal: Option<CorrectionProposal>,
    pub applied: Option<AppliedPatch>,
    /// Full snapshot copy taken before the most recent apply.
    pub backup: Option<Snapshot>,
}

impl CorrectionSession {
    pub fn new(
        document_id: impl Into<String>,
        document_name: impl Into<String>,
        snapshot: Snapshot,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            document_id: document_id.into(),
            document_name: document_name.into(),
            snapshot,
            iteration: Iteration::default(),
            last_validation: None,
            current_error: None,
            search_report: None,
            raw_proposal: None,
            proposal: None,
            applied: None,
            backup: None,
        }
    }

    /// `ERROR`-level messages in the most recent validation report. `None`
    /// when no validation has run yet.
    pub fn error_count(&self) -> Option<usize> {
        self.last_validation
            .as_deref()
            .map(validation::error_count)
    }

    /// Starts the next iteration and clears the per-iteration products.
    pub fn begin_iteration(&mut self) -> Iteration {
        self.iteration = self.iteration.next();
        self.current_error = None;
        self.search_report = None;
        self.raw_proposal = None;
        self.proposal = None;
        self.applied = None;
        self.iteration
    }

    /// Restores the snapshot from the pre-apply backup, if one exists.
    /// Returns whether anything was restored.
    pub fn rollback(&mut self) -> bool {
        match self.backup.take() {
            Some(backup) => {
                self.snapshot = backup;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_iteration_advances_and_clears() {
        let mut session = CorrectionSession::new("snap-1", "test", Snapshot::new());
        session.raw_proposal = Some(serde_json::json!({}));
        let iteration = session.begin_iteration();
        assert_eq!(iteration.number(), 1);
        assert!(session.raw_proposal.is_none());
        assert_eq!(session.begin_iteration().number(), 2);
    }

    #[test]
    fn rollback_restores_backup_once() {
        let snapshot: Snapshot =
            serde_json::from_value(serde_json::json!({"demands": []})).unwrap();
        let mut session = CorrectionSession::new("snap-1", "test", Snapshot::new());
        session.backup = Some(snapshot.clone());
        assert!(session.rollback());
        assert_eq!(session.snapshot, snapshot);
        assert!(!session.rollback());
    }

    #[test]
    fn error_count_requires_a_validation_report() {
        let mut session = CorrectionSession::new("snap-1", "test", Snapshot::new());
        assert_eq!(session.error_count(), None);
        session.last_validation = Some(vec![
            ValidationMessage::error("e1"),
            ValidationMessage::warning("w1"),
        ]);
        assert_eq!(session.error_count(), Some(1));
    }
}
