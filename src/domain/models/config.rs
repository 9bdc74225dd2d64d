//! Engine configuration model with defaults matching the documented
//! operational limits.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the patch engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Whether Plan B (wholesale replacement from a reference snapshot)
    /// may be proposed when the document itself offers no signal.
    pub use_reference_data_fallback: bool,
    /// Ceiling on convergence-loop iterations.
    pub max_loop_iterations: u32,
    /// Attempts per pipeline step, first try included.
    pub max_step_attempts: u32,
    /// Fixed pause between step attempts, in milliseconds.
    pub step_retry_pause_ms: u64,
    /// Per-step timeout, in seconds.
    pub step_timeout_secs: u64,
    /// Revision retries the proposal gate grants before giving up.
    pub proposal_retry_limit: u32,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_reference_data_fallback: true,
            max_loop_iterations: 5,
            max_step_attempts: 3,
            step_retry_pause_ms: 1000,
            step_timeout_secs: 90,
            proposal_retry_limit: 5,
            storage: StorageConfig::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Which artifact storage backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    Local,
    Object,
}

/// Artifact storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub mode: StorageMode,
    /// Base directory for local mode.
    pub local_path: String,
    /// Object store endpoint for object mode.
    pub endpoint: String,
    /// Container (bucket) name for object mode.
    pub container: String,
    /// Bearer token for object mode, if the store requires one.
    pub access_token: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mode: StorageMode::Local,
            local_path: "runtime-data".to_string(),
            endpoint: String::new(),
            container: String::new(),
            access_token: None,
        }
    }
}

/// Planning service connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URI of the planning service.
    pub base_uri: String,
    /// Token endpoint for the client-credentials grant. Empty means
    /// `{base_uri}/auth/token`.
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    /// HTTP timeout, in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_uri: String::new(),
            token_uri: String::new(),
            client_id: String::new(),
            client_secret: None,
            timeout_secs: 90,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
