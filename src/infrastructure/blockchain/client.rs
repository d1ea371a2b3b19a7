use async_trait::async_trait;
use ethers::types::U256;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::shared::errors::FeedError;

/// Header fields needed to build a fee observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub base_fee_per_gas: Option<u128>,
}

/// Price-relevant part of a pool `Swap` event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapUpdate {
    pub sqrt_price_x96: U256,
    pub block_number: Option<u64>,
}

/// New heads; an `Err` item is a single bad block, the stream goes on.
/// The stream closing means the subscription is gone.
pub type HeaderStream = mpsc::Receiver<Result<BlockHeader, FeedError>>;

/// Swap events of one pool, same conventions as [`HeaderStream`]
pub type SwapStream = mpsc::Receiver<Result<SwapUpdate, FeedError>>;

/// A live connection to one chain endpoint.
///
/// Dropping the last handle releases the connection.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Latest known block
    async fn latest_block(&self) -> Result<BlockHeader, FeedError>;

    /// Subscribe to new block headers
    async fn subscribe_blocks(&self) -> Result<HeaderStream, FeedError>;
}

/// Opens chain connections
#[async_trait]
pub trait ChainConnector: Send + Sync {
    async fn connect_chain(&self, rpc_url: &str) -> Result<Arc<dyn ChainClient>, FeedError>;
}

/// A live binding to one liquidity pool on one endpoint
#[async_trait]
pub trait PoolClient: Send + Sync {
    /// Liveness check
    async fn chain_id(&self) -> Result<u64, FeedError>;

    /// Address of the pool's token0, hex encoded
    async fn token0(&self) -> Result<String, FeedError>;

    /// Current sqrtPriceX96 from `slot0`
    async fn sqrt_price_x96(&self) -> Result<U256, FeedError>;

    async fn subscribe_swaps(&self) -> Result<SwapStream, FeedError>;
}

/// Opens pool bindings
#[async_trait]
pub trait PoolConnector: Send + Sync {
    async fn connect_pool(
        &self,
        rpc_url: &str,
        pool_address: &str,
    ) -> Result<Arc<dyn PoolClient>, FeedError>;
}
