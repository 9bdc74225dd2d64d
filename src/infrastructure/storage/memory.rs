//! In-memory artifact storage.
//!
//! Backs unit tests and dry runs where nothing should touch disk or the
//! network. Keys behave exactly like the other backends' keys.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::errors::{PortError, PortResult};
use crate::domain::ports::storage::ArtifactStorage;

/// Artifact storage over a process-local map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ArtifactStorage for MemoryStorage {
    async fn load_json(&self, key: &str) -> PortResult<Option<Value>> {
        match self.entries.read().await.get(key) {
            Some(text) => {
                let value = serde_json::from_str(text)
                    .map_err(|err| PortError::Serialization(err.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn save_json(&self, key: &str, value: &Value) -> PortResult<()> {
        let text = serde_json::to_string_pretty(value)
            .map_err(|err| PortError::Serialization(err.to_string()))?;
        self.entries.write().await.insert(key.to_string(), text);
        Ok(())
    }

    async fn load_text(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn save_text(&self, key: &str, content: &str) -> PortResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), content.to_string());
        Ok(())
    }

    async fn exists(&self, key: &str) -> PortResult<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn list(&self, prefix: &str) -> PortResult<Vec<String>> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
