//! Iteration counter and the stable artifact key layout.
//!
//! Every artifact of a correction attempt lands under
//! `{document_id}/iteration-{n}/{artifact}.json`, so a whole run can be
//! audited or replayed from storage alone.

use serde::{Deserialize, Serialize};

/// Artifact base names within an iteration folder.
pub mod artifact {
    /// The locate step's search report.
    pub const SEARCH_REPORT: &str = "search-report";
    /// The gated correction proposal (canonical copy).
    pub const PROPOSAL: &str = "correction-proposal";
    /// The audit record of the applied patch.
    pub const APPLIED_PATCH: &str = "applied-patch";
    /// Full snapshot backup taken before mutation.
    pub const SNAPSHOT_BACKUP: &str = "snapshot-data";
    /// Validation report in force when the backup was taken.
    pub const VALIDATION_BACKUP: &str = "snapshot-validation";

    /// Name for the nth rejected proposal payload. Retry 0 is the original
    /// invalid proposal; later numbers are failed revisions.
    pub fn proposal_retry(retry: u32) -> String {
        format!("{PROPOSAL}-retry-{retry}")
    }
}

/// A 1-based iteration counter. Iteration 0 means no error has been picked
/// up yet.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Iteration(u32);

impl Iteration {
    pub fn new(number: u32) -> Self {
        Self(number)
    }

    pub fn number(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Storage key for an artifact of this iteration.
    pub fn key(self, document_id: &str, artifact: &str) -> String {
        format!("{document_id}/iteration-{}/{artifact}.json", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_stable_and_predictable() {
        let iteration = Iteration::new(3);
        assert_eq!(
            iteration.key("snap-1", artifact::SEARCH_REPORT),
            "snap-1/iteration-3/search-report.json"
        );
        assert_eq!(
            iteration.key("snap-1", artifact::SNAPSHOT_BACKUP),
            "snap-1/iteration-3/snapshot-data.json"
        );
    }

    #[test]
    fn retry_artifacts_number_from_zero() {
        assert_eq!(artifact::proposal_retry(0), "correction-proposal-retry-0");
        assert_eq!(artifact::proposal_retry(4), "correction-proposal-retry-4");
    }

    #[test]
    fn iteration_advances() {
        let first = Iteration::default().next();
        assert_eq!(first.number(), 1);
        assert_eq!(first.next().number(), 2);
    }
}
