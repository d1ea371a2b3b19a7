//! Live EVM data over websocket JSON-RPC

pub mod chain_feed;
pub mod client;
pub mod ethers_client;
pub mod failover;
pub mod price_oracle;
pub mod stats;

pub use chain_feed::ChainFeedWatcher;
pub use client::{BlockHeader, ChainClient, ChainConnector, PoolClient, PoolConnector, SwapUpdate};
pub use ethers_client::EthersConnector;
pub use failover::{endpoint_index, EndpointRing, ReconnectPolicy};
pub use price_oracle::{OracleState, PriceOracleWatcher};
pub use stats::{WatcherStats, WatcherStatsSnapshot};
