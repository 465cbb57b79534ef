//! Runtime state model
//!
//! `RuntimeState` is the single record persisted by [`StateStore`](crate::core::store::StateStore).
//! It describes what the bot is doing (mode, status), what it is trading
//! (symbol, timeframe) and the latest trading artifacts (signal, intent,
//! recent orders, last error).
//!
//! Serialized as JSON with snake_case enum values. Every field is always
//! written; optional fields are written as explicit `null`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::core::store::StoreError;

/// Default retention for `recent_orders`
pub const DEFAULT_RECENT_ORDERS_LIMIT: usize = 100;

// ============================================================================
// Enums
// ============================================================================

/// Trading mode of the bot
///
/// `Live` is never the default; configuration must opt in explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    #[default]
    Paper,
    Demo,
    Live,
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingMode::Paper => write!(f, "paper"),
            TradingMode::Demo => write!(f, "demo"),
            TradingMode::Live => write!(f, "live"),
        }
    }
}

impl FromStr for TradingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "paper" => Ok(TradingMode::Paper),
            "demo" => Ok(TradingMode::Demo),
            "live" => Ok(TradingMode::Live),
            other => Err(format!(
                "unknown trading mode '{}' (expected paper, demo or live)",
                other
            )),
        }
    }
}

/// Lifecycle status of the bot loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    #[default]
    NotRunning,
    Running,
    Paused,
    Error,
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotStatus::NotRunning => write!(f, "not_running"),
            BotStatus::Running => write!(f, "running"),
            BotStatus::Paused => write!(f, "paused"),
            BotStatus::Error => write!(f, "error"),
        }
    }
}

/// Direction suggested by the signal engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalDirection {
    Long,
    Short,
    Flat,
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
}

/// Exchange-side order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

// ============================================================================
// Trading artifacts
// ============================================================================

/// Indicator snapshot produced by one signal evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    /// When the indicators were computed (candle close time)
    pub computed_at: DateTime<Utc>,
    pub direction: SignalDirection,
    /// Close price of the evaluated candle
    pub close: Decimal,
    pub ema_fast: Decimal,
    pub ema_slow: Decimal,
    pub atr: Decimal,
    /// Stop distance derived from ATR, if the signal is actionable
    pub stop_distance: Option<Decimal>,
}

/// Order the bot intends to place but has not yet submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub intent_id: Uuid,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Size in base asset
    pub size: Decimal,
    /// Required when `order_type` is `Limit`
    pub limit_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    /// Short human-readable explanation of why the intent exists
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl OrderIntent {
    /// Create a market intent with a fresh id and the current timestamp
    pub fn market(side: OrderSide, size: Decimal, reason: impl Into<String>) -> Self {
        Self {
            intent_id: Uuid::new_v4(),
            side,
            order_type: OrderType::Market,
            size,
            limit_price: None,
            stop_loss: None,
            reason: reason.into(),
            created_at: Utc::now(),
        }
    }
}

/// Order submitted to the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub client_order_id: Uuid,
    /// Exchange-assigned id, once acknowledged
    pub exchange_order_id: Option<String>,
    pub side: OrderSide,
    pub size: Decimal,
    pub fill_price: Option<Decimal>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl OrderRecord {
    /// Create a freshly submitted order record
    pub fn submitted(side: OrderSide, size: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4(),
            exchange_order_id: None,
            side,
            size,
            fill_price: None,
            status: OrderStatus::Submitted,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// RuntimeState
// ============================================================================

/// Values used to build the initial state when none is persisted yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapDefaults {
    pub mode: TradingMode,
    pub symbol: String,
    pub timeframe: String,
}

/// The persisted runtime state of the bot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeState {
    pub mode: TradingMode,
    pub status: BotStatus,
    pub symbol: String,
    pub timeframe: String,
    pub updated_at: DateTime<Utc>,
    pub latest_signal: Option<SignalSnapshot>,
    pub latest_intent: Option<OrderIntent>,
    /// Newest-last, bounded by the service's retention limit
    #[serde(default, deserialize_with = "null_as_empty")]
    pub recent_orders: Vec<OrderRecord>,
    pub last_error: Option<String>,
}

impl RuntimeState {
    /// Initial state for a bot that has never run
    pub fn bootstrap(defaults: &BootstrapDefaults) -> Self {
        Self {
            mode: defaults.mode,
            status: BotStatus::NotRunning,
            symbol: defaults.symbol.clone(),
            timeframe: defaults.timeframe.clone(),
            updated_at: Utc::now(),
            latest_signal: None,
            latest_intent: None,
            recent_orders: Vec::new(),
            last_error: None,
        }
    }

    /// Append an order, evicting the oldest entries beyond `limit`
    pub fn push_order(&mut self, order: OrderRecord, limit: usize) {
        self.recent_orders.push(order);
        self.trim_orders(limit);
    }

    /// Keep only the newest `limit` orders
    pub fn trim_orders(&mut self, limit: usize) {
        if self.recent_orders.len() > limit {
            let excess = self.recent_orders.len() - limit;
            self.recent_orders.drain(..excess);
        }
    }

    /// Validate the record before it is persisted or accepted from disk
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.symbol.trim().is_empty() {
            return Err(StoreError::Validation("symbol cannot be empty".to_string()));
        }

        if self.timeframe.trim().is_empty() {
            return Err(StoreError::Validation("timeframe cannot be empty".to_string()));
        }

        if let Some(intent) = &self.latest_intent {
            if intent.size <= Decimal::ZERO {
                return Err(StoreError::Validation(format!(
                    "intent {} size must be > 0, got {}",
                    intent.intent_id, intent.size
                )));
            }
            if intent.order_type == OrderType::Limit && intent.limit_price.is_none() {
                return Err(StoreError::Validation(format!(
                    "limit intent {} has no limit_price",
                    intent.intent_id
                )));
            }
        }

        if let Some(order) = self.recent_orders.iter().find(|o| o.size <= Decimal::ZERO) {
            return Err(StoreError::Validation(format!(
                "order {} size must be > 0, got {}",
                order.client_order_id, order.size
            )));
        }

        Ok(())
    }
}

/// Earlier versions of the service wrote `"recent_orders": null`
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<OrderRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<OrderRecord>>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Tests
// ============================================================================
