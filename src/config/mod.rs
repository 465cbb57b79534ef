//! Configuration module for bot settings and YAML loading
//!
//! This module provides:
//! - Configuration types (`AppConfig`, `TradingConfig`, `RiskConfig`, ...)
//! - YAML loading with `OKX_BOT_*` environment overrides
//! - Process-level constants

pub mod constants;
mod loader;
mod types;

// Re-export types
pub use types::{ApiConfig, AppConfig, RiskConfig, RuntimeConfig, SignalConfig, TradingConfig};

// Re-export loader functions
pub use loader::{
    apply_env_overrides, load_config, load_config_from_env, load_config_from_str,
    load_config_or_default,
};
