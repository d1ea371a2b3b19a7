//! Periodic feed report

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::feed_hub::{FeedHub, FeedState, HubCounters};
use crate::domain::fees::aggregate;
use crate::domain::simulation::Comparison;
use crate::shared::config::NetworkConfig;
use crate::shared::types::{ConnectionStatus, FeeLevels, NetworkId, OhlcBar};
use crate::shared::utils::{format_gwei, format_native, format_usd};

#[derive(Debug, Clone, Serialize)]
pub struct NetworkReport {
    pub network: NetworkId,
    pub name: String,
    pub native_decimals: u32,
    pub levels: Option<FeeLevels>,
    pub points: usize,
    pub latest_bar: Option<OhlcBar>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub source: String,
    pub status: ConnectionStatus,
}

/// Everything worth showing about the feed at one instant
#[derive(Debug, Clone, Serialize)]
pub struct FeedReport {
    pub generated_at: DateTime<Utc>,
    pub connected: bool,
    pub quote_price: Option<f64>,
    pub amount: String,
    pub candle_interval_ms: i64,
    pub networks: Vec<NetworkReport>,
    pub comparison: Comparison,
    pub statuses: Vec<StatusEntry>,
    pub counters: HubCounters,
}

impl FeedReport {
    pub async fn collect(hub: &FeedHub, amount: &str, candle_interval_ms: i64) -> Self {
        let state = hub.state().await;
        Self::from_state(&state, hub.networks(), amount, candle_interval_ms)
    }

    pub fn from_state(
        state: &FeedState,
        networks: &[NetworkConfig],
        amount: &str,
        candle_interval_ms: i64,
    ) -> Self {
        let network_reports = networks
            .iter()
            .map(|network| {
                let snapshot = state.snapshot(&network.id);
                NetworkReport {
                    network: network.id.clone(),
                    name: network.name().to_string(),
                    native_decimals: network.native_decimals,
                    levels: state.current_levels(&network.id),
                    points: snapshot.len(),
                    latest_bar: aggregate(&snapshot, candle_interval_ms).last().copied(),
                }
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            connected: state.is_connected(),
            quote_price: state.quote_price(),
            amount: amount.to_string(),
            candle_interval_ms,
            networks: network_reports,
            comparison: state.compare(networks, amount),
            statuses: state
                .statuses()
                .into_iter()
                .map(|(source, status)| StatusEntry {
                    source: source.to_string(),
                    status,
                })
                .collect(),
            counters: state.counters(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable summary through tracing
    pub fn log(&self) {
        info!("📊 ===== Gas feed report =====");
        info!(
            "💵 Quote: {} | connected: {}",
            self.quote_price.map(format_usd).unwrap_or_else(|| "n/a".to_string()),
            self.connected
        );

        for network in &self.networks {
            match network.levels {
                Some(levels) => info!(
                    "⛽ {:<10} base {} gwei | priority {} gwei | {} points{}",
                    network.name,
                    format_gwei(levels.base_fee),
                    format_gwei(levels.priority_fee),
                    network.points,
                    network
                        .latest_bar
                        .map(|bar| format!(
                            " | bar o{:.2} h{:.2} l{:.2} c{:.2}",
                            bar.open, bar.high, bar.low, bar.close
                        ))
                        .unwrap_or_default()
                ),
                None => info!("⛽ {:<10} no data yet", network.name),
            }
        }

        info!("🧮 Sending {} native units:", self.amount);
        for (i, result) in self.comparison.results.iter().enumerate() {
            let marker = if self.comparison.cheapest == Some(i) { " ✅ cheapest" } else { "" };
            let decimals = self.networks.get(i).map(|n| n.native_decimals).unwrap_or(18);
            info!(
                "   {:<10} gas {} ({}) | total {}{}",
                result.network.as_str(),
                format_native(result.gas_cost_base, decimals),
                format_usd(result.gas_cost_quote),
                format_usd(result.total_cost_quote),
                marker
            );
        }
    }
}
