//! Filesystem artifact storage.
//!
//! Keys map directly to paths under a base directory, so an iteration's
//! artifacts land in `{base}/{document_id}/iteration-{n}/`. Parent
//! directories are created on write.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::domain::errors::{PortError, PortResult};
use crate::domain::ports::storage::ArtifactStorage;

/// Artifact storage rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base: PathBuf,
}

impl LocalStorage {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Resolves a key to a path, rejecting anything that would escape the
    /// base directory.
    fn resolve(&self, key: &str) -> PortResult<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative.components().any(|component| {
            matches!(component, Component::ParentDir | Component::RootDir | Component::Prefix(_))
        });
        if escapes || key.is_empty() {
            return Err(PortError::Storage(format!(
                "invalid artifact key '{key}'"
            )));
        }
        Ok(self.base.join(relative))
    }

    async fn write(&self, key: &str, content: &str) -> PortResult<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| PortError::Storage(err.to_string()))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|err| PortError::Storage(err.to_string()))?;
        debug!(key, path = %path.display(), "artifact written");
        Ok(())
    }

    async fn read(&self, key: &str) -> PortResult<Option<String>> {
        let path = self.resolve(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PortError::Storage(err.to_string())),
        }
    }
}

#[async_trait]
impl ArtifactStorage for LocalStorage {
    async fn load_json(&self, key: &str) -> PortResult<Option<Value>> {
        match self.read(key).await? {
            Some(content) => {
                let value = serde_json::from_str(&content)
                    .map_err(|err| PortError::Serialization(err.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn save_json(&self, key: &str, value: &Value) -> PortResult<()> {
        let content = serde_json::to_string_pretty(value)
            .map_err(|err| PortError::Serialization(err.to_string()))?;
        self.write(key, &content).await
    }

    async fn load_text(&self, key: &str) -> PortResult<Option<String>> {
        self.read(key).await
    }

    async fn save_text(&self, key: &str, content: &str) -> PortResult<()> {
        self.write(key, content).await
    }

    async fn exists(&self, key: &str) -> PortResult<bool> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }

    async fn list(&self, prefix: &str) -> PortResult<Vec<String>> {
        // Iterative walk; async recursion would need boxing.
        let mut keys = Vec::new();
        let mut pending = vec![self.base.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(PortError::Storage(err.to_string())),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|err| PortError::Storage(err.to_string()))?
            {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.base) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
