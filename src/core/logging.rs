//! Tracing setup for the bot process
//!
//! Two targets matter here: the bot itself (`okx_bot`) and the HTTP request
//! spans emitted by `tower_http`'s `TraceLayer`. Each gets its own level so
//! request logging can be silenced without losing decision-loop output.
//!
//! | Variable | Default | Effect |
//! |----------|---------|--------|
//! | `RUST_LOG` | unset | Full filter directive, replaces both levels below |
//! | `OKX_BOT_LOG_LEVEL` | `info` | Level for the `okx_bot` target |
//! | `OKX_BOT_HTTP_LOG_LEVEL` | `info` | Level for the `tower_http` target |
//! | `LOG_FORMAT` | `json` | `json` for log shipping, `pretty` for a terminal |

use std::env;
use std::fmt;
use std::str::FromStr;

use tracing_subscriber::{fmt as ts_fmt, prelude::*, EnvFilter};

use crate::config::constants::ENV_PREFIX;

/// Level applied to both targets when nothing else is configured
pub const DEFAULT_LEVEL: &str = "info";

const APP_TARGET: &str = "okx_bot";
const HTTP_TARGET: &str = "tower_http";

/// Output encoding of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{}' (expected json or pretty)", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

/// Resolved logging settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub app_level: String,
    pub http_level: String,
    /// Raw `RUST_LOG` directive; wins over the per-target levels
    pub directive_override: Option<String>,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_level: DEFAULT_LEVEL.to_string(),
            http_level: DEFAULT_LEVEL.to_string(),
            directive_override: None,
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Read settings from the process environment
    ///
    /// Unknown `LOG_FORMAT` values fall back to JSON.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let level = |key: &str, fallback: String| {
            env::var(format!("{}{}", ENV_PREFIX, key))
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(fallback)
        };

        Self {
            app_level: level("LOG_LEVEL", defaults.app_level),
            http_level: level("HTTP_LOG_LEVEL", defaults.http_level),
            directive_override: env::var("RUST_LOG").ok().filter(|v| !v.trim().is_empty()),
            format: env::var("LOG_FORMAT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        }
    }

    /// Filter directive in `EnvFilter` syntax
    pub fn directive(&self) -> String {
        match &self.directive_override {
            Some(raw) => raw.clone(),
            None => format!(
                "{}={},{}={}",
                APP_TARGET, self.app_level, HTTP_TARGET, self.http_level
            ),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(self.directive())
            .unwrap_or_else(|_| EnvFilter::new(Self::default().directive()))
    }
}

/// Install the global subscriber from environment settings
///
/// Returns `false` if a subscriber was already installed.
pub fn init_logging() -> bool {
    init_logging_with_config(&LoggingConfig::from_env())
}

/// Install the global subscriber with explicit settings
pub fn init_logging_with_config(config: &LoggingConfig) -> bool {
    let output = match config.format {
        LogFormat::Json => ts_fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .boxed(),
        LogFormat::Pretty => ts_fmt::layer()
            .pretty()
            .with_file(false)
            .with_line_number(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(output)
        .try_init()
        .is_ok()
}

/// Initialize logging for tests; ignores double-init from parallel tests
#[cfg(test)]
pub fn init_test_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
