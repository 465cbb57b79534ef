//! Configuration loader for YAML files and environment overrides
//!
//! Load order:
//! 1. Built-in defaults
//! 2. YAML file (`OKX_BOT_CONFIG`, default `config.yaml`), if present
//! 3. `OKX_BOT_*` environment variables
//! 4. Validation

use std::fmt::Display;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use tracing::info;

use crate::error::AppError;

use super::constants::{config_path, ENV_PREFIX};
use super::types::AppConfig;

/// Load configuration from a YAML file
///
/// # Returns
/// * `Ok(AppConfig)` - Successfully loaded and validated configuration
/// * `Err(AppError)` - File not found, parse error, or validation failure
pub fn load_config(path: &Path) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Err(AppError::Config(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let config = parse_file(path)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a YAML string (useful for testing)
pub fn load_config_from_str(yaml_content: &str) -> Result<AppConfig, AppError> {
    let config: AppConfig = serde_yaml::from_str(yaml_content)
        .map_err(|e| AppError::Config(format!("YAML parse error: {}", e)))?;

    config.validate()?;
    Ok(config)
}

/// Parse `path` if it exists, otherwise fall back to built-in defaults
///
/// Not validated; callers apply overrides first and validate the result.
pub fn load_config_or_default(path: &Path) -> Result<AppConfig, AppError> {
    if path.exists() {
        info!(path = %path.display(), "Loading configuration file");
        parse_file(path)
    } else {
        info!(path = %path.display(), "No configuration file, using defaults");
        Ok(AppConfig::default())
    }
}

/// Load the process configuration: YAML file if present, then env overrides
pub fn load_config_from_env() -> Result<AppConfig, AppError> {
    let mut config = load_config_or_default(&config_path())?;
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Override configuration fields from `OKX_BOT_*` environment variables
///
/// Unset variables leave the field untouched; unparsable values are errors.
pub fn apply_env_overrides(config: &mut AppConfig) -> Result<(), AppError> {
    let trading = &mut config.trading;
    override_with(&mut trading.mode, "MODE")?;
    override_with(&mut trading.symbol, "SYMBOL")?;
    override_with(&mut trading.timeframe, "TIMEFRAME")?;
    override_bool(&mut trading.live_enabled, "LIVE_ENABLED")?;

    let risk = &mut config.risk;
    override_with(&mut risk.equity_usdt, "EQUITY_USDT")?;
    override_with(&mut risk.risk_per_trade, "RISK_PER_TRADE")?;
    override_with(&mut risk.max_daily_loss, "MAX_DAILY_LOSS")?;
    override_with(&mut risk.max_exposure_pct, "MAX_EXPOSURE_PCT")?;
    override_with(&mut risk.cooldown_minutes, "COOLDOWN_MINUTES")?;

    let signal = &mut config.signal;
    override_with(&mut signal.atr_period, "ATR_PERIOD")?;
    override_with(&mut signal.atr_mult_sl, "ATR_MULT_SL")?;
    override_with(&mut signal.ema_fast, "EMA_FAST")?;
    override_with(&mut signal.ema_slow, "EMA_SLOW")?;

    let runtime = &mut config.runtime;
    override_with(&mut runtime.state_path, "STATE_PATH")?;
    override_with(&mut runtime.recent_orders_limit, "RECENT_ORDERS_LIMIT")?;
    override_bool(&mut runtime.loop_enabled, "LOOP_ENABLED")?;
    override_with(&mut runtime.cycle_interval_secs, "CYCLE_INTERVAL_SECS")?;

    let api = &mut config.api;
    override_with(&mut api.host, "HOST")?;
    override_with(&mut api.port, "PORT")?;

    Ok(())
}

fn parse_file(path: &Path) -> Result<AppConfig, AppError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    serde_yaml::from_reader(reader).map_err(|e| {
        AppError::Config(format!("YAML parse error in '{}': {}", path.display(), e))
    })
}

fn env_value(key: &str) -> Option<(String, String)> {
    let name = format!("{}{}", ENV_PREFIX, key);
    std::env::var(&name).ok().map(|value| (name, value))
}

fn override_with<T>(field: &mut T, key: &str) -> Result<(), AppError>
where
    T: FromStr,
    T::Err: Display,
{
    if let Some((name, value)) = env_value(key) {
        *field = value
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("invalid {}='{}': {}", name, value, e)))?;
    }
    Ok(())
}

fn override_bool(field: &mut bool, key: &str) -> Result<(), AppError> {
    if let Some((name, value)) = env_value(key) {
        *field = match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                return Err(AppError::Config(format!(
                    "invalid {}='{}': expected true or false",
                    name, value
                )))
            }
        };
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
