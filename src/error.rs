//! Application-wide error types using thiserror
//!
//! Store-level failures keep their own type (`StoreError`) so callers can
//! match on them; everything that reaches the binary is wrapped in AppError.

use thiserror::Error;

use crate::core::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {0}")]
    Server(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
