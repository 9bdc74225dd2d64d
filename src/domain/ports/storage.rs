//! Port for artifact storage.
//!
//! Artifacts (search reports, proposals, backups) are addressed by
//! slash-separated string keys; backends map those keys to files or blobs.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::PortResult;

/// Key/value persistence for run artifacts.
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Reads a JSON artifact. `Ok(None)` when the key does not exist.
    async fn load_json(&self, key: &str) -> PortResult<Option<Value>>;

    /// Writes a JSON artifact, overwriting any previous value.
    async fn save_json(&self, key: &str, value: &Value) -> PortResult<()>;

    /// Reads a text artifact. `Ok(None)` when the key does not exist.
    async fn load_text(&self, key: &str) -> PortResult<Option<String>>;

    /// Writes a text artifact, overwriting any previous value.
    async fn save_text(&self, key: &str, content: &str) -> PortResult<()>;

    /// Whether the key exists.
    async fn exists(&self, key: &str) -> PortResult<bool>;

    /// Keys under the given prefix, in unspecified order.
    async fn list(&self, prefix: &str) -> PortResult<Vec<String>>;
}
