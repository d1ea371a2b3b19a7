//! Which of the pool's tokens is the base asset

use tracing::warn;

/// Token orientation of a two-token pool relative to the base asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    BaseIsToken0,
    BaseIsToken1,
}

impl Orientation {
    pub fn from_base_is_token0(base_is_token0: bool) -> Self {
        if base_is_token0 {
            Orientation::BaseIsToken0
        } else {
            Orientation::BaseIsToken1
        }
    }

    pub fn base_is_token0(&self) -> bool {
        matches!(self, Orientation::BaseIsToken0)
    }
}

/// Inputs of the orientation decision
#[derive(Debug, Clone, Copy)]
pub struct OrientationInput<'a> {
    pub pool_address: &'a str,
    pub default_pool_address: &'a str,
    pub token0_address: &'a str,
    pub base_asset_address: &'a str,
    /// Orientation the configuration claims for this pool
    pub advertised_base_is_token0: Option<bool>,
}

/// Decide the orientation from the on-chain token0.
///
/// Only the default pool gets its advertised orientation overridden when the
/// on-chain comparison disagrees. Other pools keep what they advertise, and a
/// pool advertising nothing uses the comparison.
pub fn resolve_orientation(input: OrientationInput<'_>) -> Orientation {
    let observed = input.token0_address.eq_ignore_ascii_case(input.base_asset_address);
    let is_default_pool = input.pool_address.eq_ignore_ascii_case(input.default_pool_address);

    let base_is_token0 = match input.advertised_base_is_token0 {
        Some(advertised) if advertised != observed && is_default_pool => {
            warn!(
                pool = %input.pool_address,
                advertised,
                observed,
                "Advertised pool orientation disagrees with token0, using on-chain value"
            );
            observed
        }
        Some(advertised) => advertised,
        None => observed,
    };

    Orientation::from_base_is_token0(base_is_token0)
}
