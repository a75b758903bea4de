//! Tracing subscriber setup for binaries and tools embedding the checker.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ConfigError;

/// Installs a global fmt subscriber filtered by `level` (an `EnvFilter` directive such as
/// `"info"` or `"sombra_check=debug"`).
pub fn init_logging(level: &str) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_new(level).map_err(|e| ConfigError::Invalid {
        field: "log_level",
        reason: e.to_string(),
    })?;
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| ConfigError::Invalid {
            field: "log_level",
            reason: "logging already initialized".into(),
        })
}
