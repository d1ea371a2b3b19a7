// src/app.rs
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use gasfeed::application::{FeedHub, FeedReport};
use gasfeed::infrastructure::blockchain::{ChainFeedWatcher, EthersConnector, PriceOracleWatcher};
use gasfeed::shared::config::{NetworkConfig, OracleConfig, StoreConfig};
use gasfeed::shared::utils::mask_url;

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct AppCfg {
    pub store: StoreConfig,
    pub networks: Vec<NetworkConfig>,
    pub oracle: OracleConfig,
    pub amount: String,
    pub report_secs: u64,
    pub json: bool,
}

impl AppCfg {
    pub fn from_config(cfg: Config) -> Self {
        Self {
            store: cfg.store,
            networks: cfg.networks,
            oracle: cfg.oracle,
            amount: cfg.simulation.amount,
            report_secs: cfg.report.interval_secs,
            json: cfg.report.json,
        }
    }

    pub fn candle_interval_ms(&self) -> i64 {
        self.store.candle_interval_ms
    }
}

pub async fn run(app_cfg: AppCfg) -> Result<()> {
    info!("🚀 Starting gas feed");
    for network in &app_cfg.networks {
        info!(
            network = %network.id,
            chain_id = ?network.chain_id,
            url = %mask_url(&network.rpc_url),
            gas_limit = network.gas_limit,
            "Watching {}",
            network.name()
        );
    }

    let hub = FeedHub::spawn(&app_cfg.store, app_cfg.networks.clone(), &app_cfg.oracle);
    let connector = Arc::new(EthersConnector::new());

    let watchers: Vec<ChainFeedWatcher> = app_cfg
        .networks
        .iter()
        .map(|network| ChainFeedWatcher::new(network.clone(), connector.clone(), hub.sender()))
        .collect();
    let oracle = PriceOracleWatcher::new(app_cfg.oracle.clone(), connector.clone(), hub.sender());

    let chain_connects = watchers.iter().map(|watcher| async move {
        if let Err(e) = watcher.connect().await {
            warn!(network = %watcher.network(), error = %e, "Chain feed unavailable, continuing without it");
        }
    });
    let (_, oracle_result) = tokio::join!(futures_util::future::join_all(chain_connects), oracle.connect());
    if let Err(e) = oracle_result {
        warn!(error = %e, "Price oracle unavailable, using fallback price until it connects");
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(app_cfg.report_secs.max(1)));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = oracle.refresh().await {
                    warn!(error = %e, "Price refresh failed");
                }
                let report = FeedReport::collect(&hub, &app_cfg.amount, app_cfg.candle_interval_ms()).await;
                if app_cfg.json {
                    match report.to_json().context("serialize report") {
                        Ok(json) => println!("{}", json),
                        Err(e) => error!("{:#}", e),
                    }
                } else {
                    report.log();
                }
            }
        }
    }

    for watcher in &watchers {
        watcher.disconnect().await;
    }
    oracle.disconnect().await;

    for watcher in &watchers {
        let stats = watcher.stats();
        info!(network = %watcher.network(), delivered = stats.delivered, recovered = stats.recovered, "Chain feed stats");
    }
    let stats = oracle.stats();
    info!(delivered = stats.delivered, recovered = stats.recovered, fallbacks = stats.fallbacks, "Price oracle stats");

    hub.shutdown();
    info!("👋 Gas feed stopped");
    Ok(())
}
