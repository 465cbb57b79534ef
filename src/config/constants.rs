//! Process-level constants and environment lookups

use std::path::PathBuf;
use std::time::Duration;

/// Prefix shared by every configuration environment variable
pub const ENV_PREFIX: &str = "OKX_BOT_";

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Path of the YAML configuration file
///
/// Environment variable: `OKX_BOT_CONFIG`
pub fn config_path() -> PathBuf {
    std::env::var(format!("{}CONFIG", ENV_PREFIX))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Time allowed for the decision loop to persist its final state on shutdown
/// (default: 10 seconds)
///
/// Environment variable: `OKX_BOT_SHUTDOWN_TIMEOUT_SECS`
pub fn shutdown_timeout() -> Duration {
    let secs = std::env::var(format!("{}SHUTDOWN_TIMEOUT_SECS", ENV_PREFIX))
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);
    Duration::from_secs(secs)
}
