//! Core module - runtime state model, durable store, state service,
//! decision loop and logging
//!
//! Prefer importing from `crate::core`:
//! ```ignore
//! use okx_bot::core::{StateService, StateStore, RuntimeState};
//! ```

pub mod logging;
pub mod runtime;
pub mod service;
pub mod state;
pub mod store;

// Explicit re-exports for state module
pub use state::{
    BootstrapDefaults, BotStatus, OrderIntent, OrderRecord, OrderSide, OrderStatus, OrderType,
    RuntimeState, SignalDirection, SignalSnapshot, TradingMode, DEFAULT_RECENT_ORDERS_LIMIT,
};

// Explicit re-exports for store module
pub use store::{StateStore, StoreError};

// Explicit re-exports for service module
pub use service::StateService;

// Explicit re-exports for runtime module
pub use runtime::{
    apply_cycle_result, decision_loop, CycleError, CycleHandler, CycleOutcome, IdleCycle,
};

// Explicit re-exports for logging module
pub use logging::{init_logging, init_logging_with_config, LogFormat, LoggingConfig, DEFAULT_LEVEL};
