//! Error handling for the feed pipeline

use thiserror::Error;

/// Feed-related errors
///
/// Only `Connection`, `Cancelled` and `ReconnectExhausted` ever cross a watcher boundary.
/// The other variants are absorbed inside the watchers and show up as
/// recovered outcomes in their stats.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Transient fetch failure: {0}")]
    TransientFetch(String),

    #[error("Price out of range: {0}")]
    PriceOutOfRange(#[from] PriceError),

    #[error("Reconnect attempts exhausted after {0} tries")]
    ReconnectExhausted(u32),

    #[error("Connect cancelled by disconnect")]
    Cancelled,
}

impl FeedError {
    pub fn connection(msg: impl Into<String>) -> Self {
        FeedError::Connection(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        FeedError::TransientFetch(msg.into())
    }
}

/// Price-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriceError {
    #[error("Invalid sqrtPriceX96: must be greater than zero")]
    NonPositiveSqrtPrice,

    #[error("Computed price is not finite")]
    NotFinite,

    #[error("Computed price {price} outside [{min}, {max}]")]
    OutOfRange { price: f64, min: f64, max: f64 },
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Feed error: {0}")]
    FeedError(#[from] FeedError),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
}
