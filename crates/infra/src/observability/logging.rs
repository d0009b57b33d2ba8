//! `tracing-subscriber` initialization
//!
//! `RUST_LOG` takes precedence over the configured level so a single run
//! can be made more verbose without touching the config file.

use superapp_domain::{LogFormat, LoggingConfig, Result, SuperAppError};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// # Errors
/// `SuperAppError::Config` when the level directive is invalid or a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
    installed.map_err(|e| SuperAppError::Config(format!("Failed to install tracing subscriber: {e}")))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            SuperAppError::Config(format!("Invalid log level '{}': {e}", config.level))
        }),
    }
}
