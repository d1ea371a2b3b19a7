//! Gasfeed - multi-chain gas fee and price feed
//! Built with Domain-Driven Design principles

pub mod domain;
pub mod infrastructure;
pub mod application;
pub mod shared;

// Re-export main types for convenience
pub use application::{FeedHub, FeedReport};
pub use domain::fees::ChainSeries;
pub use domain::simulation::{compare, simulate};
pub use infrastructure::blockchain::{ChainFeedWatcher, EthersConnector, PriceOracleWatcher};
pub use shared::types::{FeedEvent, FeeObservation, PriceObservation};
