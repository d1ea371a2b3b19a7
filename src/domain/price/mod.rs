//! Price domain - Uniswap V3 sqrt price math, pool orientation, quote board

mod orientation;
mod quote_board;
mod sqrt_price;

pub use orientation::{resolve_orientation, Orientation, OrientationInput};
pub use quote_board::QuoteBoard;
pub use sqrt_price::{sqrt_price_x96_to_price, DerivedPrice, PriceDerivation};

use crate::shared::config::OracleConfig;

impl From<&OracleConfig> for PriceDerivation {
    fn from(cfg: &OracleConfig) -> Self {
        Self {
            decimals_diff: cfg.decimals_diff,
            bounds: cfg.bounds,
            fallback_price: cfg.fallback_price,
        }
    }
}
