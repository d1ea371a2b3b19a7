//! Fee domain - per-chain history, candles and the priority fee heuristic

mod candles;
mod series;

pub use candles::{aggregate, bucket_key, DEFAULT_CANDLE_INTERVAL_MS};
pub use series::{ChainSeries, DEFAULT_HISTORY_LENGTH};

use crate::shared::types::{FeeObservation, NetworkId, GWEI};

/// Priority fee estimate from a header alone: 10% of base fee, at least 1 gwei.
///
/// Real tips need per-transaction data; this stays an approximation.
pub fn estimate_priority_fee(base_fee: u128) -> u128 {
    (base_fee / 10).max(GWEI)
}

/// Build an observation from a block's base fee (missing base fee counts as 0)
pub fn observation_from_block(
    network: NetworkId,
    block_height: u64,
    base_fee: Option<u128>,
    timestamp_ms: i64,
) -> FeeObservation {
    let base_fee = base_fee.unwrap_or(0);
    FeeObservation::new(
        network,
        timestamp_ms,
        base_fee,
        estimate_priority_fee(base_fee),
        block_height,
    )
}
