//! OKX Bot - runtime state service
//!
//! Crash-consistent, single-file system-of-record for one trading bot:
//! - Durable state store with atomic temp-file-then-rename writes
//! - Runtime state model with bootstrap and update policy
//! - Decision loop driver for the (future) signal and execution engines
//! - HTTP query API (`/health`, `/state`, `/config`)

pub mod config;
pub mod core;
pub mod error;
pub mod server;

pub use error::AppError;
