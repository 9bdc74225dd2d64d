//! Layered configuration loading.
//!
//! Precedence, lowest to highest: built-in defaults, a YAML file, then
//! `PLANMEND_`-prefixed environment variables (nested keys separated by
//! `__`, e.g. `PLANMEND_STORAGE__MODE=object`).

use std::path::Path;

use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use tracing::debug;

use crate::domain::models::config::{EngineConfig, StorageMode};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "planmend.yaml";

/// Loads and validates [`EngineConfig`].
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads from `planmend.yaml` (if present) and the environment.
    pub fn load() -> Result<EngineConfig> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Loads from an explicit YAML file (if present) and the environment.
    pub fn load_from(path: &Path) -> Result<EngineConfig> {
        let figment = Figment::from(Serialized::defaults(EngineConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("PLANMEND_").split("__"));

        let config: EngineConfig = figment
            .extract()
            .context("failed to load engine configuration")?;
        validate(&config)?;
        debug!(config_file = %path.display(), "configuration loaded");
        Ok(config)
    }
}

fn validate(config: &EngineConfig) -> Result<()> {
    if config.max_loop_iterations == 0 {
        bail!("max_loop_iterations must be at least 1");
    }
    if config.max_step_attempts == 0 {
        bail!("max_step_attempts must be at least 1");
    }
    if config.step_timeout_secs == 0 {
        bail!("step_timeout_secs must be greater than 0");
    }
    if !matches!(config.logging.format.as_str(), "pretty" | "json") {
        bail!(
            "logging.format must be 'pretty' or 'json', got '{}'",
            config.logging.format
        );
    }
    match config.storage.mode {
        StorageMode::Local => {
            if config.storage.local_path.trim().is_empty() {
                bail!("storage.local_path must be set in local mode");
            }
        }
        StorageMode::Object => {
            if config.storage.endpoint.trim().is_empty() {
                bail!("storage.endpoint must be set in object mode");
            }
            if config.storage.container.trim().is_empty() {
                bail!("storage.container must be set in object mode");
            }
        }
    }
    if !config.api.base_uri.trim().is_empty() && config.api.client_id.trim().is_empty() {
        bail!("api.client_id must be set when api.base_uri is configured");
    }
    Ok(())
}
