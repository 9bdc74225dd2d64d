//! Tracing subscriber initialization.

use anyhow::{bail, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::domain::models::config::LoggingConfig;

/// Initializes the global tracing subscriber.
///
/// The `RUST_LOG` environment variable overrides the configured level.
/// Returns an error when the configuration is invalid; a subscriber that
/// is already installed (tests, embedding applications) is not an error.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let default_level = parse_level(&config.level)?;
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let result = match config.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .try_init(),
        "pretty" => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        other => bail!("unknown log format '{other}' (expected 'pretty' or 'json')"),
    };

    // A pre-existing global subscriber wins silently.
    let _ = result;
    Ok(())
}

fn parse_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => bail!("unknown log level '{other}'"),
    }
}
