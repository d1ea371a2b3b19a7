//! Configuration sections consumed by the feed components
//!
//! Every field has a default matching the production setup, so a config file
//! only needs to name what it changes.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::shared::types::NetworkId;

/// ETH/USDC 0.05% pool, the most liquid one
pub const DEFAULT_POOL: &str = "0x88e6A0c2dDD26FEEb64F039a2c41296FcB3f5640";
/// WETH on mainnet
pub const WETH_ADDRESS: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";

/// One chain to watch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub id: NetworkId,
    #[serde(default)]
    pub display_name: Option<String>,
    /// EIP-155 chain id, informational
    #[serde(default)]
    pub chain_id: Option<u64>,
    pub rpc_url: String,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_native_decimals")]
    pub native_decimals: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl NetworkConfig {
    pub fn new(id: &str, rpc_url: &str) -> Self {
        Self {
            id: NetworkId::new(id),
            display_name: None,
            chain_id: None,
            rpc_url: rpc_url.to_string(),
            gas_limit: default_gas_limit(),
            native_decimals: default_native_decimals(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }

    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(self.id.as_str())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Ethereum, Polygon and Arbitrum on public websocket endpoints
    pub fn defaults() -> Vec<NetworkConfig> {
        vec![
            NetworkConfig {
                display_name: Some("Ethereum".to_string()),
                chain_id: Some(1),
                ..NetworkConfig::new("ethereum", "wss://0xrpc.io/eth")
            },
            NetworkConfig {
                display_name: Some("Polygon".to_string()),
                chain_id: Some(137),
                ..NetworkConfig::new("polygon", "wss://polygon-bor-rpc.publicnode.com")
            },
            NetworkConfig {
                display_name: Some("Arbitrum".to_string()),
                chain_id: Some(42161),
                ..NetworkConfig::new("arbitrum", "wss://arbitrum-one-rpc.publicnode.com")
            },
        ]
    }
}

/// Accepted price window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for PriceBounds {
    fn default() -> Self {
        Self { min: 500.0, max: 20_000.0 }
    }
}

impl PriceBounds {
    pub fn contains(&self, price: f64) -> bool {
        price.is_finite() && price >= self.min && price <= self.max
    }
}

/// Uniswap V3 pool price oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub pool_address: String,
    /// The pool whose advertised orientation is not trusted
    pub default_pool_address: String,
    /// Address of the asset quoted as "base" (WETH)
    pub base_asset_address: String,
    /// Orientation advertised for the pool, if any
    pub base_is_token0: Option<bool>,
    pub endpoints: Vec<String>,
    pub bounds: PriceBounds,
    /// base decimals minus quote decimals (18 - 6 for WETH/USDC)
    pub decimals_diff: i32,
    pub fallback_price: f64,
    pub reconnect_base_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    pub connect_timeout_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            pool_address: DEFAULT_POOL.to_string(),
            default_pool_address: DEFAULT_POOL.to_string(),
            base_asset_address: WETH_ADDRESS.to_string(),
            base_is_token0: None,
            endpoints: vec![
                "wss://ethereum-rpc.publicnode.com".to_string(),
                "wss://eth-mainnet.ws.alchemyapi.io/v2/demo".to_string(),
            ],
            bounds: PriceBounds::default(),
            decimals_diff: 12,
            fallback_price: 3700.0,
            reconnect_base_delay_ms: 5000,
            max_reconnect_attempts: 5,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl OracleConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }
}

/// History store sizing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub history_length: usize,
    pub candle_interval_ms: i64,
    pub channel_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_length: 100,
            candle_interval_ms: 15 * 60 * 1000,
            channel_capacity: 1024,
        }
    }
}

/// Transfer used by the cost comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Native units to transfer, as typed by a user
    pub amount: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            amount: "0.1".to_string(),
        }
    }
}

fn default_gas_limit() -> u64 {
    21_000
}

fn default_native_decimals() -> u32 {
    18
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}
