//! Logging initialization.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::PipelineError;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level when set. Safe to call once
/// per process; a second call reports a configuration error.
pub fn init(config: &LoggingConfig) -> Result<(), PipelineError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| PipelineError::Config(format!("invalid log level '{}': {e}", config.level)))?;

    let result = match config.format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        _ => fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
    };
    result.map_err(|e| PipelineError::Config(format!("failed to install logger: {e}")))
}
