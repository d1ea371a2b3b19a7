//! Last known quote price as seen by consumers

use crate::shared::config::PriceBounds;
use crate::shared::types::PriceObservation;

/// Holds the price used for simulations.
///
/// An invalid incoming price never replaces a valid one. Until the first valid
/// price arrives the board reports the fallback.
#[derive(Debug, Clone)]
pub struct QuoteBoard {
    bounds: PriceBounds,
    fallback_price: f64,
    current: Option<PriceObservation>,
    rejected: u64,
}

impl QuoteBoard {
    pub fn new(bounds: PriceBounds, fallback_price: f64) -> Self {
        Self {
            bounds,
            fallback_price,
            current: None,
            rejected: 0,
        }
    }

    /// Returns `true` when the observation was accepted
    pub fn offer(&mut self, observation: PriceObservation) -> bool {
        if self.bounds.contains(observation.price) {
            self.current = Some(observation);
            return true;
        }

        self.rejected += 1;
        if self.current.is_none() {
            self.current = Some(PriceObservation::new(self.fallback_price, observation.received_at_ms));
        }
        false
    }

    pub fn price(&self) -> Option<f64> {
        self.current.map(|o| o.price)
    }

    pub fn current(&self) -> Option<PriceObservation> {
        self.current
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Percent change of `new_price` against the current quote
    pub fn change_pct(&self, new_price: f64) -> f64 {
        match self.price() {
            Some(old) if old > 0.0 => ((new_price - old) / old) * 100.0,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> QuoteBoard {
        QuoteBoard::new(PriceBounds::default(), 3700.0)
    }

    #[test]
    fn test_valid_price_is_accepted() {
        let mut board = board();
        assert!(board.offer(PriceObservation::new(3012.5, 1)));
        assert_eq!(board.price(), Some(3012.5));
    }

    #[test]
    fn test_invalid_price_keeps_previous() {
        let mut board = board();
        board.offer(PriceObservation::new(3000.0, 1));
        assert!(!board.offer(PriceObservation::new(f64::NAN, 2)));
        assert!(!board.offer(PriceObservation::new(50_000.0, 3)));
        assert_eq!(board.price(), Some(3000.0));
        assert_eq!(board.rejected(), 2);
    }

    #[test]
    fn test_first_invalid_price_adopts_fallback() {
        let mut board = board();
        assert_eq!(board.price(), None);
        board.offer(PriceObservation::new(10.0, 1));
        assert_eq!(board.price(), Some(3700.0));
    }

    #[test]
    fn test_change_pct() {
        let mut board = board();
        assert_eq!(board.change_pct(3000.0), 0.0);
        board.offer(PriceObservation::new(2000.0, 1));
        assert_eq!(board.change_pct(2200.0), 10.0);
    }
}
