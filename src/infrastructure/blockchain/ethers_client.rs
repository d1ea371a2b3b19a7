//! Websocket JSON-RPC adapters built on ethers

use async_trait::async_trait;
use ethers::abi::RawLog;
use ethers::contract::{abigen, EthEvent};
use ethers::providers::{Middleware, Provider, Ws};
use ethers::types::{Address, Block, BlockNumber, Filter, Log, H256, I256, U256};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::client::{
    BlockHeader, ChainClient, ChainConnector, HeaderStream, PoolClient, PoolConnector, SwapStream,
    SwapUpdate,
};
use crate::shared::errors::FeedError;
use crate::shared::utils::mask_url;

const STREAM_BUFFER: usize = 256;

abigen!(
    UniswapV3Pool,
    r#"[
        function token0() external view returns (address)
        function slot0() external view returns (uint160 sqrtPriceX96, int24 tick, uint16 observationIndex, uint16 observationCardinality, uint16 observationCardinalityNext, uint8 feeProtocol, bool unlocked)
    ]"#,
);

/// Uniswap V3 `Swap` event
#[derive(Clone, Debug, EthEvent)]
#[ethevent(name = "Swap", abi = "Swap(address,address,int256,int256,uint160,uint128,int24)")]
struct PoolSwapEvent {
    #[ethevent(indexed)]
    pub sender: Address,
    #[ethevent(indexed)]
    pub recipient: Address,
    pub amount0: I256,
    pub amount1: I256,
    pub sqrt_price_x96: U256,
    pub liquidity: U256,
    pub tick: i32,
}

/// Opens `Provider<Ws>` connections for both chain and pool watchers
#[derive(Debug, Clone, Copy, Default)]
pub struct EthersConnector;

impl EthersConnector {
    pub fn new() -> Self {
        Self
    }

    async fn open(rpc_url: &str) -> Result<Arc<Provider<Ws>>, FeedError> {
        debug!(url = %mask_url(rpc_url), "Opening websocket provider");
        let provider = Provider::<Ws>::connect(rpc_url).await.map_err(|e| {
            FeedError::connection(format!("{}: {}", mask_url(rpc_url), e))
        })?;
        Ok(Arc::new(provider))
    }
}

#[async_trait]
impl ChainConnector for EthersConnector {
    async fn connect_chain(&self, rpc_url: &str) -> Result<Arc<dyn ChainClient>, FeedError> {
        let provider = Self::open(rpc_url).await?;
        Ok(Arc::new(EthersChainClient { provider }))
    }
}

#[async_trait]
impl PoolConnector for EthersConnector {
    async fn connect_pool(
        &self,
        rpc_url: &str,
        pool_address: &str,
    ) -> Result<Arc<dyn PoolClient>, FeedError> {
        let address: Address = pool_address
            .parse()
            .map_err(|_| FeedError::connection(format!("invalid pool address {}", pool_address)))?;
        let provider = Self::open(rpc_url).await?;
        let pool = UniswapV3Pool::new(address, Arc::clone(&provider));
        Ok(Arc::new(EthersPoolClient { provider, pool, address }))
    }
}

/// Chain client over one websocket provider
pub struct EthersChainClient {
    provider: Arc<Provider<Ws>>,
}

#[async_trait]
impl ChainClient for EthersChainClient {
    async fn latest_block(&self) -> Result<BlockHeader, FeedError> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| FeedError::transient(format!("eth_getBlockByNumber failed: {}", e)))?
            .ok_or_else(|| FeedError::transient("latest block not available"))?;
        header_from_block(&block)
    }

    async fn subscribe_blocks(&self) -> Result<HeaderStream, FeedError> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let (ready_tx, ready_rx) = oneshot::channel();
        let provider = Arc::clone(&self.provider);

        tokio::spawn(async move {
            let mut stream = match provider.subscribe_blocks().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(FeedError::connection(format!(
                        "newHeads subscription failed: {}",
                        e
                    ))));
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    block = stream.next() => match block {
                        Some(block) => {
                            if tx.send(header_from_block(&block)).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            warn!("newHeads stream ended");
                            break;
                        }
                    }
                }
            }
        });

        ready_rx
            .await
            .map_err(|_| FeedError::connection("block subscription task ended early"))??;
        Ok(rx)
    }
}

/// Pool client bound to one Uniswap V3 pool
pub struct EthersPoolClient {
    provider: Arc<Provider<Ws>>,
    pool: UniswapV3Pool<Provider<Ws>>,
    address: Address,
}

#[async_trait]
impl PoolClient for EthersPoolClient {
    async fn chain_id(&self) -> Result<u64, FeedError> {
        let chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| FeedError::connection(format!("eth_chainId failed: {}", e)))?;
        Ok(chain_id.low_u64())
    }

    async fn token0(&self) -> Result<String, FeedError> {
        let token0 = self
            .pool
            .token_0()
            .call()
            .await
            .map_err(|e| FeedError::connection(format!("token0() failed: {}", e)))?;
        Ok(format!("{:?}", token0))
    }

    async fn sqrt_price_x96(&self) -> Result<U256, FeedError> {
        let slot0 = self
            .pool
            .slot_0()
            .call()
            .await
            .map_err(|e| FeedError::transient(format!("slot0() failed: {}", e)))?;
        Ok(slot0.0)
    }

    async fn subscribe_swaps(&self) -> Result<SwapStream, FeedError> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let (ready_tx, ready_rx) = oneshot::channel();
        let provider = Arc::clone(&self.provider);
        let filter = Filter::new()
            .address(self.address)
            .topic0(PoolSwapEvent::signature());

        tokio::spawn(async move {
            let mut stream = match provider.subscribe_logs(&filter).await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(FeedError::connection(format!(
                        "Swap log subscription failed: {}",
                        e
                    ))));
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    log = stream.next() => match log {
                        Some(log) => {
                            if tx.send(swap_from_log(log)).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            warn!("Swap log stream ended");
                            break;
                        }
                    }
                }
            }
        });

        ready_rx
            .await
            .map_err(|_| FeedError::connection("swap subscription task ended early"))??;
        Ok(rx)
    }
}

fn header_from_block(block: &Block<H256>) -> Result<BlockHeader, FeedError> {
    let number = block
        .number
        .ok_or_else(|| FeedError::transient("block without number"))?;
    Ok(BlockHeader {
        number: number.as_u64(),
        base_fee_per_gas: block.base_fee_per_gas.map(u256_to_u128),
    })
}

fn swap_from_log(log: Log) -> Result<SwapUpdate, FeedError> {
    let block_number = log.block_number.map(|n| n.as_u64());
    let raw_log = RawLog {
        topics: log.topics,
        data: log.data.to_vec(),
    };
    let event = PoolSwapEvent::decode_log(&raw_log)
        .map_err(|e| FeedError::transient(format!("undecodable Swap log: {}", e)))?;
    Ok(SwapUpdate {
        sqrt_price_x96: event.sqrt_price_x96,
        block_number,
    })
}

fn u256_to_u128(value: U256) -> u128 {
    if value > U256::from(u128::MAX) {
        u128::MAX
    } else {
        value.as_u128()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode, Token};
    use ethers::types::{Bytes, U64};

    #[test]
    fn test_header_from_block() {
        let block = Block::<H256> {
            number: Some(U64::from(19_000_000u64)),
            base_fee_per_gas: Some(U256::from(30_000_000_000u64)),
            ..Default::default()
        };
        let header = header_from_block(&block).unwrap();
        assert_eq!(header.number, 19_000_000);
        assert_eq!(header.base_fee_per_gas, Some(30_000_000_000));
    }

    #[test]
    fn test_pending_block_is_rejected() {
        let block = Block::<H256>::default();
        assert!(matches!(header_from_block(&block), Err(FeedError::TransientFetch(_))));
    }

    #[test]
    fn test_oversized_base_fee_saturates() {
        assert_eq!(u256_to_u128(U256::MAX), u128::MAX);
        assert_eq!(u256_to_u128(U256::from(7u64)), 7);
    }

    #[test]
    fn test_swap_log_decodes_sqrt_price() {
        let q = U256::from(2u64).pow(U256::from(96u64));
        let data = encode(&[
            Token::Int(I256::from(-5).into_raw()),
            Token::Int(I256::from(7).into_raw()),
            Token::Uint(q),
            Token::Uint(U256::from(1_000u64)),
            Token::Int(I256::from(-200).into_raw()),
        ]);
        let log = Log {
            topics: vec![PoolSwapEvent::signature(), H256::zero(), H256::zero()],
            data: Bytes::from(data),
            block_number: Some(U64::from(5u64)),
            ..Default::default()
        };

        let update = swap_from_log(log).unwrap();
        assert_eq!(update.sqrt_price_x96, q);
        assert_eq!(update.block_number, Some(5));
    }

    #[test]
    fn test_foreign_log_is_transient_error() {
        let log = Log {
            topics: vec![H256::repeat_byte(0xab)],
            ..Default::default()
        };
        assert!(matches!(swap_from_log(log), Err(FeedError::TransientFetch(_))));
    }
}
