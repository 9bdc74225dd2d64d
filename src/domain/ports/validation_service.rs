//! Port for the planning service's validation endpoint.

use async_trait::async_trait;

use crate::domain::errors::PortResult;
use crate::domain::models::validation::ValidationMessage;

/// Fetches the current validation report for a document.
#[async_trait]
pub trait ValidationService: Send + Sync {
    /// All validation messages for the document, errors and warnings alike.
    async fn validate(&self, document_id: &str) -> PortResult<Vec<ValidationMessage>>;
}
