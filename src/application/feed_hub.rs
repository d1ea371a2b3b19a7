//! Single consumer of feed events and the read side of the pipeline

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::fees::{aggregate, ChainSeries};
use crate::domain::price::QuoteBoard;
use crate::domain::simulation::{compare, Comparison, SimulationInput};
use crate::shared::config::{NetworkConfig, OracleConfig, StoreConfig};
use crate::shared::types::{
    ConnectionStatus, FeeLevels, FeeObservation, FeedEvent, FeedSource, NetworkId, OhlcBar,
};

/// Event counters since start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HubCounters {
    pub fee_events: u64,
    pub price_events: u64,
    pub status_events: u64,
    pub rejected_prices: u64,
}

/// Everything the hub knows; mutated only by the consumer task
#[derive(Debug, Clone)]
pub struct FeedState {
    history_length: usize,
    series: HashMap<NetworkId, ChainSeries>,
    quotes: QuoteBoard,
    statuses: BTreeMap<FeedSource, ConnectionStatus>,
    last_update_ms: Option<i64>,
    counters: HubCounters,
}

impl FeedState {
    pub fn new(store: &StoreConfig, networks: &[NetworkConfig], oracle: &OracleConfig) -> Self {
        let series = networks
            .iter()
            .map(|network| (network.id.clone(), ChainSeries::new(store.history_length)))
            .collect();

        Self {
            history_length: store.history_length,
            series,
            quotes: QuoteBoard::new(oracle.bounds, oracle.fallback_price),
            statuses: BTreeMap::new(),
            last_update_ms: None,
            counters: HubCounters::default(),
        }
    }

    pub fn apply(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Fee {
                network,
                observation,
            } => {
                self.counters.fee_events += 1;
                self.last_update_ms = Some(observation.timestamp_ms());
                let history_length = self.history_length;
                self.series
                    .entry(network)
                    .or_insert_with(|| ChainSeries::new(history_length))
                    .insert(observation);
            }
            FeedEvent::Price(observation) => {
                self.counters.price_events += 1;
                self.last_update_ms = Some(observation.received_at_ms);
                let change_pct = self.quotes.change_pct(observation.price);
                if self.quotes.offer(observation) {
                    debug!(price = observation.price, change_pct, "Quote price updated");
                } else {
                    self.counters.rejected_prices += 1;
                    warn!(
                        price = observation.price,
                        kept = ?self.quotes.price(),
                        "Invalid quote price, keeping current"
                    );
                }
            }
            FeedEvent::Status { source, status } => {
                self.counters.status_events += 1;
                info!(source = %source, ?status, "Feed status");
                self.statuses.insert(source, status);
            }
        }
    }

    pub fn snapshot(&self, network: &NetworkId) -> Vec<FeeObservation> {
        self.series
            .get(network)
            .map(ChainSeries::snapshot)
            .unwrap_or_default()
    }

    pub fn current_levels(&self, network: &NetworkId) -> Option<FeeLevels> {
        self.series.get(network).and_then(ChainSeries::current_levels)
    }

    pub fn quote_price(&self) -> Option<f64> {
        self.quotes.price()
    }

    pub fn statuses(&self) -> Vec<(FeedSource, ConnectionStatus)> {
        self.statuses
            .iter()
            .map(|(source, status)| (source.clone(), *status))
            .collect()
    }

    /// True when at least one chain feed is live
    pub fn is_connected(&self) -> bool {
        self.statuses
            .iter()
            .any(|(source, status)| matches!(source, FeedSource::Chain(_)) && status.is_connected())
    }

    pub fn last_update_ms(&self) -> Option<i64> {
        self.last_update_ms
    }

    pub fn counters(&self) -> HubCounters {
        self.counters
    }

    /// Cost of sending `amount` on each network at current levels.
    ///
    /// Networks without data count with zero fees, a missing quote as 0.
    pub fn compare(&self, networks: &[NetworkConfig], amount: &str) -> Comparison {
        let inputs: Vec<SimulationInput> = networks
            .iter()
            .map(|network| SimulationInput {
                network: network.id.clone(),
                gas_limit: network.gas_limit,
                levels: self.current_levels(&network.id).unwrap_or_default(),
                native_decimals: network.native_decimals,
            })
            .collect();
        compare(&inputs, amount, self.quote_price().unwrap_or(0.0))
    }
}

/// Owns the consumer task and answers queries from consistent snapshots
pub struct FeedHub {
    networks: Vec<NetworkConfig>,
    state: Arc<RwLock<FeedState>>,
    sender: mpsc::Sender<FeedEvent>,
    consumer: JoinHandle<()>,
}

impl FeedHub {
    pub fn spawn(store: &StoreConfig, networks: Vec<NetworkConfig>, oracle: &OracleConfig) -> Self {
        let (sender, events) = mpsc::channel(store.channel_capacity.max(1));
        let state = Arc::new(RwLock::new(FeedState::new(store, &networks, oracle)));
        let consumer = tokio::spawn(consume(events, Arc::clone(&state)));

        Self {
            networks,
            state,
            sender,
            consumer,
        }
    }

    /// Sink for watchers
    pub fn sender(&self) -> mpsc::Sender<FeedEvent> {
        self.sender.clone()
    }

    pub fn networks(&self) -> &[NetworkConfig] {
        &self.networks
    }

    pub async fn snapshot(&self, network: &NetworkId) -> Vec<FeeObservation> {
        self.state.read().await.snapshot(network)
    }

    pub async fn current_levels(&self, network: &NetworkId) -> Option<FeeLevels> {
        self.state.read().await.current_levels(network)
    }

    pub async fn candles(&self, network: &NetworkId, interval_ms: i64) -> Vec<OhlcBar> {
        let snapshot = self.snapshot(network).await;
        aggregate(&snapshot, interval_ms)
    }

    pub async fn quote_price(&self) -> Option<f64> {
        self.state.read().await.quote_price()
    }

    pub async fn compare(&self, amount: &str) -> Comparison {
        self.state.read().await.compare(&self.networks, amount)
    }

    pub async fn statuses(&self) -> Vec<(FeedSource, ConnectionStatus)> {
        self.state.read().await.statuses()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.is_connected()
    }

    pub async fn last_update_ms(&self) -> Option<i64> {
        self.state.read().await.last_update_ms()
    }

    pub async fn counters(&self) -> HubCounters {
        self.state.read().await.counters()
    }

    /// Copy of the whole state
    pub async fn state(&self) -> FeedState {
        self.state.read().await.clone()
    }

    pub fn shutdown(self) {
        self.consumer.abort();
    }
}

async fn consume(mut events: mpsc::Receiver<FeedEvent>, state: Arc<RwLock<FeedState>>) {
    while let Some(event) = events.recv().await {
        state.write().await.apply(event);
    }
    debug!("All feed senders dropped, hub consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::types::{PriceObservation, GWEI};
    use std::time::Duration;

    fn fee(network: &str, ts: i64, base_gwei: u128) -> FeedEvent {
        FeedEvent::Fee {
            network: network.into(),
            observation: FeeObservation::new(
                network.into(),
                ts,
                base_gwei * GWEI,
                GWEI,
                ts as u64,
            ),
        }
    }

    fn state() -> FeedState {
        FeedState::new(
            &StoreConfig::default(),
            &NetworkConfig::defaults(),
            &OracleConfig::default(),
        )
    }

    #[test]
    fn test_apply_fee_keeps_series_sorted() {
        let mut state = state();
        state.apply(fee("ethereum", 2_000, 20));
        state.apply(fee("ethereum", 1_000, 10));

        let eth: NetworkId = "ethereum".into();
        let timestamps: Vec<i64> = state.snapshot(&eth).iter().map(|o| o.timestamp_ms()).collect();
        assert_eq!(timestamps, vec![1_000, 2_000]);
        // last inserted, not last in time
        assert_eq!(state.current_levels(&eth).map(|l| l.base_fee), Some(10 * GWEI));
        assert_eq!(state.last_update_ms(), Some(1_000));
        assert_eq!(state.counters().fee_events, 2);
    }

    #[test]
    fn test_unknown_network_gets_a_series() {
        let mut state = state();
        state.apply(fee("base", 1, 1));
        assert_eq!(state.snapshot(&"base".into()).len(), 1);
    }

    #[test]
    fn test_invalid_price_keeps_previous() {
        let mut state = state();
        state.apply(FeedEvent::Price(PriceObservation::new(50.0, 1)));
        assert_eq!(state.quote_price(), Some(3700.0));

        state.apply(FeedEvent::Price(PriceObservation::new(3000.0, 2)));
        state.apply(FeedEvent::Price(PriceObservation::new(f64::NAN, 3)));
        assert_eq!(state.quote_price(), Some(3000.0));
        assert_eq!(state.counters().rejected_prices, 2);
    }

    #[test]
    fn test_is_connected_tracks_chain_sources_only() {
        let mut state = state();
        state.apply(FeedEvent::Status {
            source: FeedSource::PriceOracle,
            status: ConnectionStatus::Connected,
        });
        assert!(!state.is_connected());

        state.apply(FeedEvent::Status {
            source: FeedSource::Chain("polygon".into()),
            status: ConnectionStatus::Connected,
        });
        assert!(state.is_connected());
        assert_eq!(state.statuses().len(), 2);

        state.apply(FeedEvent::Status {
            source: FeedSource::Chain("polygon".into()),
            status: ConnectionStatus::Disconnected,
        });
        assert!(!state.is_connected());
    }

    #[test]
    fn test_compare_uses_current_levels() {
        let mut state = state();
        state.apply(fee("ethereum", 1, 30));
        state.apply(fee("polygon", 1, 100));
        state.apply(fee("arbitrum", 1, 0));
        state.apply(FeedEvent::Price(PriceObservation::new(3000.0, 1)));

        let comparison = state.compare(&NetworkConfig::defaults(), "0.1");
        assert_eq!(comparison.results.len(), 3);
        assert_eq!(
            comparison.cheapest_result().map(|r| r.network.as_str()),
            Some("arbitrum")
        );
        assert_eq!(comparison.results[0].gas_cost_base, 31 * GWEI * 21_000);
    }

    #[tokio::test]
    async fn test_hub_consumes_events() {
        let networks = NetworkConfig::defaults();
        let hub = FeedHub::spawn(&StoreConfig::default(), networks, &OracleConfig::default());
        let sender = hub.sender();

        sender.send(fee("ethereum", 0, 10)).await.unwrap();
        sender.send(fee("ethereum", 60_000, 30)).await.unwrap();
        sender
            .send(FeedEvent::Price(PriceObservation::new(2500.0, 60_000)))
            .await
            .unwrap();

        for _ in 0..100 {
            if hub.counters().await.price_events == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let eth: NetworkId = "ethereum".into();
        assert_eq!(hub.snapshot(&eth).await.len(), 2);
        assert_eq!(hub.quote_price().await, Some(2500.0));

        let bars = hub.candles(&eth, 900_000).await;
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].open, 11.0);
        assert_eq!(bars[0].close, 31.0);

        let comparison = hub.compare("1").await;
        assert_eq!(comparison.results.len(), 3);
        hub.shutdown();
    }
}
