//! Candlestick aggregation over a fee snapshot

use crate::shared::types::{FeeObservation, OhlcBar};

/// 15 minute candles
pub const DEFAULT_CANDLE_INTERVAL_MS: i64 = 15 * 60 * 1000;

/// Group an ascending fee series into OHLC bars of `interval_ms`.
///
/// Buckets are keyed by `floor(ts / interval) * interval` and closed as soon
/// as a point with a different key shows up, so the input must already be
/// sorted (a `ChainSeries` snapshot is). Values are total fee in gwei.
pub fn aggregate(series: &[FeeObservation], interval_ms: i64) -> Vec<OhlcBar> {
    if interval_ms <= 0 || series.is_empty() {
        return Vec::new();
    }

    let mut bars = Vec::new();
    let mut current: Option<(i64, BarBuilder)> = None;

    for point in series {
        let key = bucket_key(point.timestamp_ms(), interval_ms);
        let fee = to_gwei(point.total_fee());

        if let Some((current_key, builder)) = current.as_mut() {
            if *current_key == key {
                builder.push(fee);
                continue;
            }
        }

        if let Some((closed_key, builder)) = current.take() {
            bars.push(builder.finish(closed_key));
        }
        current = Some((key, BarBuilder::open(fee)));
    }

    if let Some((key, builder)) = current {
        bars.push(builder.finish(key));
    }

    bars
}

/// Start of the bucket holding `timestamp_ms`
pub fn bucket_key(timestamp_ms: i64, interval_ms: i64) -> i64 {
    timestamp_ms.div_euclid(interval_ms) * interval_ms
}

fn to_gwei(wei: u128) -> f64 {
    wei as f64 / 1e9
}

struct BarBuilder {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

impl BarBuilder {
    fn open(fee: f64) -> Self {
        Self { open: fee, high: fee, low: fee, close: fee }
    }

    fn push(&mut self, fee: f64) {
        self.high = self.high.max(fee);
        self.low = self.low.min(fee);
        self.close = fee;
    }

    fn finish(self, key_ms: i64) -> OhlcBar {
        OhlcBar {
            window_start: key_ms.div_euclid(1000),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fees::ChainSeries;
    use crate::shared::types::GWEI;

    const INTERVAL: i64 = 900_000;

    fn point(ts: i64, total_gwei: u128) -> FeeObservation {
        FeeObservation::new("ethereum".into(), ts, total_gwei * GWEI - GWEI, GWEI, 0)
    }

    #[test]
    fn test_empty_input_yields_no_bars() {
        assert!(aggregate(&[], INTERVAL).is_empty());
        assert!(aggregate(&[point(1, 10)], 0).is_empty());
    }

    #[test]
    fn test_two_adjacent_windows() {
        // window A starts at 1_800_000 ms, window B at 2_700_000 ms
        let a = 2 * INTERVAL;
        let b = 3 * INTERVAL;
        let mut series = ChainSeries::new(100);
        for (ts, fee) in [
            (a + 1_000, 20),
            (a + 60_000, 35),
            (a + 120_000, 15),
            (a + 899_999, 25),
            (b, 40),
            (b + 30_000, 50),
            (b + 45_000, 30),
        ] {
            series.insert(point(ts, fee));
        }

        let bars = aggregate(&series.snapshot(), INTERVAL);
        assert_eq!(bars.len(), 2);

        assert_eq!(bars[0].window_start, a / 1000);
        assert_eq!(bars[0].open, 20.0);
        assert_eq!(bars[0].high, 35.0);
        assert_eq!(bars[0].low, 15.0);
        assert_eq!(bars[0].close, 25.0);

        assert_eq!(bars[1].window_start, b / 1000);
        assert_eq!(bars[1].open, 40.0);
        assert_eq!(bars[1].high, 50.0);
        assert_eq!(bars[1].low, 30.0);
        assert_eq!(bars[1].close, 30.0);
    }

    #[test]
    fn test_gap_produces_no_empty_bar() {
        let bars = aggregate(&[point(0, 10), point(5 * INTERVAL + 1, 12)], INTERVAL);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].window_start, 5 * INTERVAL / 1000);
    }

    #[test]
    fn test_same_timestamp_uses_scan_order() {
        let bars = aggregate(&[point(10, 7), point(10, 3), point(10, 5)], INTERVAL);
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].open, 7.0);
        assert_eq!(bars[0].close, 5.0);
        assert_eq!(bars[0].low, 3.0);
    }

    #[test]
    fn test_aggregation_is_repeatable() {
        let series: Vec<FeeObservation> =
            (0..50).map(|i| point(i * 60_000, 10 + (i as u128 * 7) % 13)).collect();
        assert_eq!(aggregate(&series, INTERVAL), aggregate(&series, INTERVAL));
    }

    #[test]
    fn test_bucket_key_floors() {
        assert_eq!(bucket_key(899_999, INTERVAL), 0);
        assert_eq!(bucket_key(900_000, INTERVAL), INTERVAL);
        assert_eq!(bucket_key(-1, INTERVAL), -INTERVAL);
    }
}
