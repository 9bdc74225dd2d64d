//! Port for the correction proposer.
//!
//! The proposer is a black box (an LLM in production, a canned fake in
//! tests). It receives the validation error plus everything the search
//! found, and answers with raw JSON; the proposal gate decides whether
//! that JSON is admissible.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::PortResult;
use crate::domain::models::search::SearchReport;
use crate::domain::models::validation::ValidationMessage;

/// Everything a proposer needs to draft a correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalRequest {
    pub iteration: u32,
    pub document_id: String,
    pub error: ValidationMessage,
    pub search_report: SearchReport,
}

/// A request to fix a proposal the gate rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionRequest {
    /// Why the gate rejected the previous payload.
    pub contract_error: String,
    /// The rejected payload itself.
    pub invalid_payload: Value,
    /// The original request, so the proposer keeps its context.
    pub request: ProposalRequest,
}

/// Drafts corrections for validation errors.
#[async_trait]
pub trait Proposer: Send + Sync {
    /// Turns a raw validation message into a search strategy. The reply is
    /// raw JSON matching [`SearchStrategy`]; the locate step parses it.
    ///
    /// [`SearchStrategy`]: crate::domain::models::search::SearchStrategy
    async fn analyze(&self, error: &ValidationMessage) -> PortResult<Value>;

    /// Drafts a correction proposal. The reply is raw JSON; only the
    /// proposal gate may turn it into a [`CorrectionProposal`].
    ///
    /// [`CorrectionProposal`]: crate::domain::models::proposal::CorrectionProposal
    async fn propose(&self, request: &ProposalRequest) -> PortResult<Value>;

    /// Asks for a revised proposal after a gate rejection.
    async fn revise(&self, request: &RevisionRequest) -> PortResult<Value>;
}
