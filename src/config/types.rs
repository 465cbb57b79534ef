//! Configuration types for bot settings
//!
//! All sections are loaded from YAML and may be partially specified; any
//! missing field falls back to its default. Environment overrides are
//! applied afterwards by the loader.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::state::{BootstrapDefaults, TradingMode, DEFAULT_RECENT_ORDERS_LIMIT};
use crate::error::AppError;

// ============================================================================
// Configuration Structs
// ============================================================================

/// What the bot trades and in which mode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TradingConfig {
    /// paper | demo | live
    pub mode: TradingMode,
    /// Instrument id (e.g., "BTC-USDT")
    pub symbol: String,
    /// Candle interval (e.g., "15m")
    pub timeframe: String,
    /// Explicit opt-in required for `mode: live`
    pub live_enabled: bool,
}

/// Portfolio and risk limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskConfig {
    /// Account equity in USDT used for position sizing
    pub equity_usdt: f64,
    /// Fraction of equity risked per trade (0.0025 = 0.25%)
    pub risk_per_trade: f64,
    /// Max realized loss per day as a fraction of equity
    pub max_daily_loss: f64,
    /// Max exposure in the traded asset as a fraction of equity
    pub max_exposure_pct: f64,
    /// Minimum pause between entries
    pub cooldown_minutes: u32,
}

/// Indicator parameters for the signal engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignalConfig {
    pub atr_period: u32,
    /// Stop-loss distance as a multiple of ATR
    pub atr_mult_sl: f64,
    pub ema_fast: u32,
    pub ema_slow: u32,
}

/// State persistence and decision loop settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Location of the persisted runtime state
    pub state_path: PathBuf,
    /// How many orders `recent_orders` retains
    pub recent_orders_limit: usize,
    /// Run the decision loop alongside the HTTP server
    pub loop_enabled: bool,
    /// Seconds between decision cycles
    pub cycle_interval_secs: u64,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub trading: TradingConfig,
    pub risk: RiskConfig,
    pub signal: SignalConfig,
    pub runtime: RuntimeConfig,
    pub api: ApiConfig,
}

// ============================================================================
// Defaults
// ============================================================================

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            mode: TradingMode::Paper,
            symbol: "BTC-USDT".to_string(),
            timeframe: "15m".to_string(),
            live_enabled: false,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            equity_usdt: 1000.0,
            risk_per_trade: 0.0025,
            max_daily_loss: 0.01,
            max_exposure_pct: 0.2,
            cooldown_minutes: 15,
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            atr_mult_sl: 2.0,
            ema_fast: 20,
            ema_slow: 50,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("state/runtime.json"),
            recent_orders_limit: DEFAULT_RECENT_ORDERS_LIMIT,
            loop_enabled: false,
            cycle_interval_secs: 60,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

impl TradingConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.mode == TradingMode::Live && !self.live_enabled {
            return Err(AppError::Config(
                "mode 'live' requires trading.live_enabled = true".to_string(),
            ));
        }

        if self.symbol.trim().is_empty() {
            return Err(AppError::Config("trading.symbol cannot be empty".to_string()));
        }

        if self.timeframe.trim().is_empty() {
            return Err(AppError::Config("trading.timeframe cannot be empty".to_string()));
        }

        Ok(())
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.equity_usdt <= 0.0 {
            return Err(AppError::Config(format!(
                "risk.equity_usdt must be > 0, got {}",
                self.equity_usdt
            )));
        }

        for (name, value) in [
            ("risk_per_trade", self.risk_per_trade),
            ("max_daily_loss", self.max_daily_loss),
            ("max_exposure_pct", self.max_exposure_pct),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(AppError::Config(format!(
                    "risk.{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }
}

impl SignalConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.atr_period == 0 {
            return Err(AppError::Config("signal.atr_period must be > 0".to_string()));
        }

        if self.atr_mult_sl <= 0.0 {
            return Err(AppError::Config(format!(
                "signal.atr_mult_sl must be > 0, got {}",
                self.atr_mult_sl
            )));
        }

        if self.ema_fast == 0 || self.ema_fast >= self.ema_slow {
            return Err(AppError::Config(format!(
                "signal.ema_fast ({}) must be > 0 and < ema_slow ({})",
                self.ema_fast, self.ema_slow
            )));
        }

        Ok(())
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.state_path.as_os_str().is_empty() {
            return Err(AppError::Config("runtime.state_path cannot be empty".to_string()));
        }

        if self.recent_orders_limit == 0 {
            return Err(AppError::Config(
                "runtime.recent_orders_limit must be >= 1".to_string(),
            ));
        }

        if self.cycle_interval_secs == 0 {
            return Err(AppError::Config(
                "runtime.cycle_interval_secs must be >= 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl ApiConfig {
    /// Socket address the HTTP server binds to
    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| {
                AppError::Config(format!(
                    "invalid api address '{}:{}': {}",
                    self.host, self.port, e
                ))
            })
    }
}

impl AppConfig {
    /// Validate all configuration rules
    pub fn validate(&self) -> Result<(), AppError> {
        self.trading.validate()?;
        self.risk.validate()?;
        self.signal.validate()?;
        self.runtime.validate()?;
        self.api.bind_addr()?;
        Ok(())
    }

    /// Defaults used when no runtime state has been persisted yet
    pub fn bootstrap_defaults(&self) -> BootstrapDefaults {
        BootstrapDefaults {
            mode: self.trading.mode,
            symbol: self.trading.symbol.clone(),
            timeframe: self.trading.timeframe.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
