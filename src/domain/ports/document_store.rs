//! Port for the remote document store holding planning snapshots.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::PortResult;
use crate::domain::models::document::Snapshot;

/// Server acknowledgement of an uploaded snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadAck {
    /// Whether the server judged the uploaded document valid.
    pub is_successfully_validated: bool,
    /// The raw server response, kept for audit.
    pub server_response: Value,
}

/// Remote storage for planning snapshots.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates an empty document and returns its id.
    async fn create(&self, name: &str) -> PortResult<String>;

    /// Downloads the document's current data.
    async fn fetch(&self, document_id: &str) -> PortResult<Snapshot>;

    /// Uploads new data for the document.
    async fn update(
        &self,
        document_id: &str,
        snapshot: &Snapshot,
        name: &str,
        comment: Option<&str>,
    ) -> PortResult<UploadAck>;
}
