//! sqrtPriceX96 -> price conversion
//!
//! All intermediate math is done on `U512` so that squaring a 160-bit
//! sqrt price and scaling by 2^192 / 10^D never rounds. Only the two final
//! operands are converted to `f64`, right before the division.

use ethers::types::{U256, U512};

use super::Orientation;
use crate::shared::config::PriceBounds;
use crate::shared::errors::PriceError;

/// Raw price from a pool's sqrtPriceX96, without bounds checking.
///
/// * base is token0: `Q^2 * 10^D / 2^192`
/// * base is token1: `2^192 * 10^D / Q^2`
///
/// A negative `decimals_diff` moves the power of ten to the other side.
pub fn sqrt_price_x96_to_price(
    sqrt_price_x96: U256,
    orientation: Orientation,
    decimals_diff: i32,
) -> Result<f64, PriceError> {
    if sqrt_price_x96.is_zero() {
        return Err(PriceError::NonPositiveSqrtPrice);
    }

    let q = U512::from(sqrt_price_x96);
    let q_squared = q.checked_mul(q).ok_or(PriceError::NotFinite)?;
    let q192 = U512::one() << 192;
    let scale = checked_exp10(decimals_diff.unsigned_abs()).ok_or(PriceError::NotFinite)?;

    let (mut numerator, mut denominator) = match orientation {
        Orientation::BaseIsToken0 => (q_squared, q192),
        Orientation::BaseIsToken1 => (q192, q_squared),
    };
    if decimals_diff >= 0 {
        numerator = numerator.checked_mul(scale).ok_or(PriceError::NotFinite)?;
    } else {
        denominator = denominator.checked_mul(scale).ok_or(PriceError::NotFinite)?;
    }

    let price = u512_to_f64(numerator) / u512_to_f64(denominator);
    if !price.is_finite() {
        return Err(PriceError::NotFinite);
    }
    Ok(price)
}

fn checked_exp10(exponent: u32) -> Option<U512> {
    let ten = U512::from(10u8);
    (0..exponent).try_fold(U512::one(), |acc, _| acc.checked_mul(ten))
}

/// Nearest-below f64 of a U512 (keeps the top 64 significant bits)
fn u512_to_f64(value: U512) -> f64 {
    let bits = value.bits();
    if bits <= 64 {
        return value.low_u64() as f64;
    }
    let shift = bits - 64;
    (value >> shift).low_u64() as f64 * 2f64.powi(shift as i32)
}

/// Price rules of one oracle: decimals, accepted bounds and the fallback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceDerivation {
    pub decimals_diff: i32,
    pub bounds: PriceBounds,
    pub fallback_price: f64,
}

/// Outcome of a derivation; `rejected` is set when the fallback was used
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedPrice {
    pub price: f64,
    pub rejected: Option<PriceError>,
}

impl DerivedPrice {
    pub fn is_fallback(&self) -> bool {
        self.rejected.is_some()
    }
}

impl PriceDerivation {
    /// Compute and validate; any rejection turns into the fallback price.
    pub fn derive(&self, sqrt_price_x96: U256, orientation: Orientation) -> DerivedPrice {
        match self.checked(sqrt_price_x96, orientation) {
            Ok(price) => DerivedPrice { price, rejected: None },
            Err(err) => DerivedPrice {
                price: self.fallback_price,
                rejected: Some(err),
            },
        }
    }

    pub fn fallback(&self) -> DerivedPrice {
        DerivedPrice {
            price: self.fallback_price,
            rejected: None,
        }
    }

    fn checked(&self, sqrt_price_x96: U256, orientation: Orientation) -> Result<f64, PriceError> {
        let price = sqrt_price_x96_to_price(sqrt_price_x96, orientation, self.decimals_diff)?;
        if !self.bounds.contains(price) {
            return Err(PriceError::OutOfRange {
                price,
                min: self.bounds.min,
                max: self.bounds.max,
            });
        }
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q96() -> f64 {
        2f64.powi(96)
    }

    /// sqrtPriceX96 encoding `price` for a WETH(18)/USDC(6) pool
    fn sqrt_price_for(price: f64, orientation: Orientation) -> U256 {
        let raw_ratio = match orientation {
            Orientation::BaseIsToken0 => price / 1e12,
            Orientation::BaseIsToken1 => 1e12 / price,
        };
        U256::from((raw_ratio.sqrt() * q96()) as u128)
    }

    fn derivation() -> PriceDerivation {
        PriceDerivation {
            decimals_diff: 12,
            bounds: PriceBounds::default(),
            fallback_price: 3700.0,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        let rel = ((actual - expected) / expected).abs();
        assert!(rel < 1e-6, "expected {expected}, got {actual} (rel err {rel})");
    }

    #[test]
    fn test_price_base_token0() {
        let q = sqrt_price_for(3000.0, Orientation::BaseIsToken0);
        let price = sqrt_price_x96_to_price(q, Orientation::BaseIsToken0, 12).unwrap();
        assert_close(price, 3000.0);
    }

    #[test]
    fn test_price_base_token1() {
        let q = sqrt_price_for(3000.0, Orientation::BaseIsToken1);
        let price = sqrt_price_x96_to_price(q, Orientation::BaseIsToken1, 12).unwrap();
        assert_close(price, 3000.0);
    }

    #[test]
    fn test_negative_decimals_diff_divides() {
        // 1:1 raw ratio, quote has 12 more decimals than base
        let q = U256::from(1u128 << 96);
        let price = sqrt_price_x96_to_price(q, Orientation::BaseIsToken0, -12).unwrap();
        assert_close(price, 1e-12);
    }

    #[test]
    fn test_zero_sqrt_price_rejected() {
        assert_eq!(
            sqrt_price_x96_to_price(U256::zero(), Orientation::BaseIsToken0, 12),
            Err(PriceError::NonPositiveSqrtPrice)
        );
        let derived = derivation().derive(U256::zero(), Orientation::BaseIsToken0);
        assert_eq!(derived.price, 3700.0);
        assert_eq!(derived.rejected, Some(PriceError::NonPositiveSqrtPrice));
    }

    #[test]
    fn test_out_of_range_uses_fallback() {
        let q = sqrt_price_for(50.0, Orientation::BaseIsToken0);
        let derived = derivation().derive(q, Orientation::BaseIsToken0);
        assert_eq!(derived.price, 3700.0);
        assert!(matches!(derived.rejected, Some(PriceError::OutOfRange { .. })));
    }

    #[test]
    fn test_wrong_orientation_falls_back() {
        // a real 3000 quote read the wrong way round is ~1/3000 * 1e24
        let q = sqrt_price_for(3000.0, Orientation::BaseIsToken1);
        let derived = derivation().derive(q, Orientation::BaseIsToken0);
        assert!(derived.is_fallback());
    }

    #[test]
    fn test_in_range_price_passes_through() {
        let q = sqrt_price_for(2500.0, Orientation::BaseIsToken1);
        let derived = derivation().derive(q, Orientation::BaseIsToken1);
        assert!(!derived.is_fallback());
        assert_close(derived.price, 2500.0);
    }

    #[test]
    fn test_max_sqrt_price_does_not_overflow() {
        let derived = derivation().derive(U256::MAX, Orientation::BaseIsToken0);
        assert!(derived.is_fallback());
    }

    #[test]
    fn test_huge_decimals_diff_falls_back() {
        let q = sqrt_price_for(3000.0, Orientation::BaseIsToken0);
        assert_eq!(
            sqrt_price_x96_to_price(q, Orientation::BaseIsToken0, 160),
            Err(PriceError::NotFinite)
        );
        assert!(sqrt_price_x96_to_price(q, Orientation::BaseIsToken1, -160).is_err());

        let derived = PriceDerivation {
            decimals_diff: 160,
            ..derivation()
        }
        .derive(q, Orientation::BaseIsToken0);
        assert_eq!(derived.price, 3700.0);
        assert_eq!(derived.rejected, Some(PriceError::NotFinite));
    }

    #[test]
    fn test_checked_exp10() {
        assert_eq!(checked_exp10(0), Some(U512::one()));
        assert_eq!(checked_exp10(12), Some(U512::from(1_000_000_000_000u64)));
        assert!(checked_exp10(154).is_some());
        assert_eq!(checked_exp10(155), None);
    }

    #[test]
    fn test_u512_to_f64() {
        assert_eq!(u512_to_f64(U512::from(12345u64)), 12345.0);
        assert_eq!(u512_to_f64(U512::one() << 192), 2f64.powi(192));
    }
}
