//! Common types used across the application

use serde::{Deserialize, Serialize};
use std::fmt;

/// One gwei in wei
pub const GWEI: u128 = 1_000_000_000;

/// Network identifier ("ethereum", "polygon", ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(String);

impl NetworkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetworkId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Fee sample taken from a single block.
///
/// Fees are in the chain's smallest unit (wei). `total_fee` is always
/// `base_fee + priority_fee`; the fields are private so that holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeObservation {
    network: NetworkId,
    timestamp_ms: i64,
    base_fee: u128,
    priority_fee: u128,
    total_fee: u128,
    block_height: u64,
}

impl FeeObservation {
    pub fn new(
        network: NetworkId,
        timestamp_ms: i64,
        base_fee: u128,
        priority_fee: u128,
        block_height: u64,
    ) -> Self {
        Self {
            network,
            timestamp_ms,
            base_fee,
            priority_fee,
            total_fee: base_fee.saturating_add(priority_fee),
            block_height,
        }
    }

    pub fn network(&self) -> &NetworkId {
        &self.network
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn base_fee(&self) -> u128 {
        self.base_fee
    }

    pub fn priority_fee(&self) -> u128 {
        self.priority_fee
    }

    pub fn total_fee(&self) -> u128 {
        self.total_fee
    }

    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    pub fn levels(&self) -> FeeLevels {
        FeeLevels {
            base_fee: self.base_fee,
            priority_fee: self.priority_fee,
        }
    }
}

/// Current base/priority fee pair of a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeLevels {
    pub base_fee: u128,
    pub priority_fee: u128,
}

/// Quote-per-base price (USDC per ETH for the default pool)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub price: f64,
    pub received_at_ms: i64,
}

impl PriceObservation {
    pub fn new(price: f64, received_at_ms: i64) -> Self {
        Self { price, received_at_ms }
    }
}

/// Open-high-low-close summary of total fee over one time bucket, in gwei
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcBar {
    /// Bucket start, unix seconds
    pub window_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Simulated cost of a transfer on one network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub network: NetworkId,
    pub gas_limit: u64,
    /// Gas cost in the smallest fee unit (wei)
    pub gas_cost_base: u128,
    /// Gas cost in the native display unit (ETH, MATIC)
    pub gas_cost_native: f64,
    pub gas_cost_quote: f64,
    pub transfer_value_quote: f64,
    pub total_cost_quote: f64,
}

/// Who produced a status event
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeedSource {
    Chain(NetworkId),
    PriceOracle,
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedSource::Chain(network) => write!(f, "chain:{}", network),
            FeedSource::PriceOracle => f.write_str("price-oracle"),
        }
    }
}

/// Connectivity status reported by watchers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting { attempt: u32 },
    ReconnectExhausted,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

/// Everything a watcher can push to the hub
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Fee {
        network: NetworkId,
        observation: FeeObservation,
    },
    Price(PriceObservation),
    Status {
        source: FeedSource,
        status: ConnectionStatus,
    },
}

/// Result of handling one block or swap event inside a watcher
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// Event turned into an observation
    Delivered,
    /// Event failed but the stream stays alive
    Recovered(crate::shared::errors::FeedError),
    /// The stream cannot continue
    Fatal(crate::shared::errors::FeedError),
}
