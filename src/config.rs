use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::{fs, path::Path};

use gasfeed::shared::config::{NetworkConfig, OracleConfig, SimulationConfig, StoreConfig};
use gasfeed::shared::errors::AppError;

/// 10^77 is the largest power of ten below 2^256
const MAX_DECIMALS_DIFF: u32 = 77;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportCfg {
    pub interval_secs: u64,
    pub json: bool,
}

impl Default for ReportCfg {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub networks: Vec<NetworkConfig>,
    pub oracle: OracleConfig,
    pub simulation: SimulationConfig,
    pub report: ReportCfg,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            networks: NetworkConfig::defaults(),
            oracle: OracleConfig::default(),
            simulation: SimulationConfig::default(),
            report: ReportCfg::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Self = toml::from_str(&s).context("parse Config.toml")?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.networks.is_empty() {
            return Err(AppError::ConfigError("no networks configured".into()));
        }
        let mut seen = HashSet::new();
        for network in &self.networks {
            if !seen.insert(&network.id) {
                return Err(AppError::ConfigError(format!("duplicate network {}", network.id)));
            }
            if network.rpc_url.trim().is_empty() {
                return Err(AppError::ConfigError(format!("network {} has no rpc_url", network.id)));
            }
        }
        if self.oracle.endpoints.is_empty() {
            return Err(AppError::ConfigError("oracle.endpoints is empty".into()));
        }
        if self.oracle.decimals_diff.unsigned_abs() > MAX_DECIMALS_DIFF {
            return Err(AppError::ConfigError(format!(
                "oracle.decimals_diff {} outside ±{}",
                self.oracle.decimals_diff, MAX_DECIMALS_DIFF
            )));
        }
        let bounds = self.oracle.bounds;
        if !(bounds.min.is_finite() && bounds.max.is_finite() && bounds.min < bounds.max) {
            return Err(AppError::ConfigError(format!(
                "invalid price bounds [{}, {}]",
                bounds.min, bounds.max
            )));
        }
        if self.store.history_length == 0 {
            return Err(AppError::ConfigError("store.history_length must be > 0".into()));
        }
        if self.store.channel_capacity == 0 {
            return Err(AppError::ConfigError("store.channel_capacity must be > 0".into()));
        }
        if self.store.candle_interval_ms <= 0 {
            return Err(AppError::ConfigError("store.candle_interval_ms must be > 0".into()));
        }
        if self.report.interval_secs == 0 {
            return Err(AppError::ConfigError("report.interval_secs must be > 0".into()));
        }
        Ok(())
    }

    /// Keep only the named networks, in the order given
    pub fn select_networks(&mut self, ids: &[String]) -> Result<(), AppError> {
        let mut selected = Vec::with_capacity(ids.len());
        for id in ids {
            let network = self
                .networks
                .iter()
                .find(|n| n.id.as_str() == id)
                .ok_or_else(|| AppError::UnknownNetwork(id.clone()))?;
            selected.push(network.clone());
        }
        self.networks = selected;
        Ok(())
    }
}
