mod app;
mod config;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Live gas fees, OHLC candles and transfer cost comparison across EVM chains")]
struct Args {
    /// Path to config file (optional)
    #[arg(long)]
    config: Option<String>,

    /// Amount of native token to simulate sending
    #[arg(long)]
    amount: Option<String>,

    /// Candle interval in minutes
    #[arg(long)]
    interval_mins: Option<u64>,

    /// Seconds between reports
    #[arg(long)]
    report_secs: Option<u64>,

    /// Only watch these networks (comma-separated ids)
    #[arg(long)]
    networks: Option<String>,

    /// Log filter, e.g. "info" or "gasfeed=debug"
    #[arg(long)]
    log_level: Option<String>,

    /// Print reports as JSON instead of log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match &args.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Priority: CLI args > Config file > Defaults
    let mut cfg = match &args.config {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::default(),
    };

    if let Some(networks) = &args.networks {
        let ids: Vec<String> = networks
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        cfg.select_networks(&ids)?;
    }
    if let Some(amount) = args.amount {
        cfg.simulation.amount = amount;
    }
    if let Some(mins) = args.interval_mins {
        cfg.store.candle_interval_ms = (mins as i64).saturating_mul(60_000);
    }
    if let Some(secs) = args.report_secs {
        cfg.report.interval_secs = secs;
    }
    if args.json {
        cfg.report.json = true;
    }
    cfg.validate()?;

    app::run(app::AppCfg::from_config(cfg)).await
}
