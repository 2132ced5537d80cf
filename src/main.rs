//! Liquidation Risk Monitor
//!
//! Watches a fixed list of lending-pool accounts and keeps their health
//! factors current.
//! Features:
//! - Event-driven refreshes from Chainlink and Uniswap Anchored View updates
//! - Periodic refresh and ranking of the riskiest accounts
//! - Reconnecting WebSocket subscriptions

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use monitor_chain::{connect, EventListener};
use monitor_core::{
    load_accounts, resolve_aggregators, AccountStore, Monitor, MonitorConfig, RiskTracker,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON account list: [{"account", "collateralAssets", "debtAssets"}]
    accounts: PathBuf,

    /// Monitor configuration file (TOML)
    #[arg(short, long, env = "MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before clap reads env-backed args
    dotenvy::dotenv().ok();
    let args = Args::parse();

    init_tracing(args.log_format);
    info!("Starting Liquidation Risk Monitor");

    let config = MonitorConfig::load(args.config.as_deref())?;
    config.log_config();
    let resolved = config.resolve().context("Invalid monitor configuration")?;

    let accounts = load_accounts(&args.accounts)?;
    if accounts.is_empty() {
        info!("Account list is empty, only prices will be logged");
    }

    // Chain boundary
    let connector = connect(&resolved.ws_url, resolved.lending_pool).await?;
    let feeds = resolve_aggregators(&resolved.feeds, connector.as_ref()).await;
    let events = Arc::new(EventListener::new(
        resolved.ws_url.clone(),
        resolved.lending_pool,
        feeds.clone(),
    ));

    // Account store owns the tracked accounts
    let tracker = RiskTracker::new(
        accounts,
        resolved.settings.native_unit.clone(),
        resolved.settings.failure_policy,
    );
    let (store, mut store_task) = AccountStore::spawn(tracker, connector.clone());

    let monitor = Arc::new(Monitor::new(
        connector,
        events,
        store,
        feeds,
        resolved.eth_usd_feed,
        resolved.settings,
    ));

    info!("Bootstrapping...");
    monitor.bootstrap().await?;

    info!("Starting main event loop...");
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        info!("Ctrl-C received, shutting down");
    };

    tokio::select! {
        result = monitor.clone().run_until(ctrl_c) => {
            result?;
        }
        result = &mut store_task => {
            match result {
                Ok(Ok(())) => anyhow::bail!("account store stopped unexpectedly"),
                Ok(Err(e)) => {
                    error!(error = %e, "Account store failed");
                    return Err(e.into());
                }
                Err(e) => return Err(e).context("account store task panicked"),
            }
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,monitor_core=debug,monitor_chain=debug"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}
