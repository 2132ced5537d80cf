//! Turns the raw config file into typed, environment-expanded values.

use alloy::primitives::Address;
use monitor_chain::{AnchoredView, FeedRegistry, PriceFeed, PricePair};
use regex_lite::Regex;
use tracing::{info, warn};

use super::settings::{MonitorConfig, MonitorSettings};
use crate::error::ConfigError;

/// Fallback used when `ws_url` cannot be resolved from the environment.
pub const INFURA_PROJECT_ENV: &str = "INFURA_PROJECT_ID";

/// Everything the monitor needs to start.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// WebSocket endpoint
    pub ws_url: String,
    /// Lending pool address
    pub lending_pool: Address,
    /// Aggregator polled by the periodic loop
    pub eth_usd_feed: Address,
    /// Feeds to subscribe to
    pub feeds: FeedRegistry,
    /// Loop settings
    pub settings: MonitorSettings,
}

impl MonitorConfig {
    /// Expand `${VAR}` placeholders and parse every address and pair.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let ws_url = resolve_ws_url(&self.rpc.ws_url)?;
        let lending_pool = parse_address("contracts.lending_pool", &self.contracts.lending_pool)?;
        let eth_usd_feed = parse_address("contracts.eth_usd_feed", &self.contracts.eth_usd_feed)?;

        let mut chainlink = Vec::with_capacity(self.oracles.len());
        for oracle in &self.oracles {
            let address = parse_address("oracles.address", &oracle.address)?;
            let pair: PricePair = oracle.pair.parse()?;
            chainlink.push(PriceFeed::new(address, pair));
        }

        let mut feeds = FeedRegistry::new(chainlink);
        if let Some(view) = &self.contracts.anchored_view {
            let address = parse_address("contracts.anchored_view", view)?;
            feeds = feeds.with_anchored_view(AnchoredView::new(
                address,
                self.anchored_view.symbols.iter().cloned(),
            ));
        }

        if self.monitor.native_unit.trim().is_empty() {
            return Err(ConfigError::Invalid("monitor.native_unit is empty".into()));
        }
        let mut settings = self.monitor.clone();
        settings.native_unit = settings.native_unit.trim().to_uppercase();

        let native_feeds = feeds
            .chainlink_feeds()
            .iter()
            .filter(|feed| feed.pair.is_quoted_in(&settings.native_unit))
            .count();
        if native_feeds == 0 {
            warn!(
                native_unit = %settings.native_unit,
                "No oracle is quoted in the native unit, price updates will not refresh accounts"
            );
        }

        Ok(ResolvedConfig {
            ws_url,
            lending_pool,
            eth_usd_feed,
            feeds,
            settings,
        })
    }
}

fn resolve_ws_url(raw: &str) -> Result<String, ConfigError> {
    let expanded = expand_env(raw)?;
    if !expanded.is_empty() && !expanded.contains("${") {
        return Ok(expanded);
    }

    match std::env::var(INFURA_PROJECT_ENV) {
        Ok(project_id) if !project_id.is_empty() => {
            info!("Using Infura endpoint from {}", INFURA_PROJECT_ENV);
            Ok(format!("wss://mainnet.infura.io/ws/v3/{project_id}"))
        }
        _ => Err(ConfigError::Invalid(format!(
            "rpc.ws_url `{raw}` is unresolved; set WS_URL or {INFURA_PROJECT_ENV}"
        ))),
    }
}

fn parse_address(field: &str, raw: &str) -> Result<Address, ConfigError> {
    let value = expand_env(raw)?;
    value.trim().parse().map_err(|_| ConfigError::InvalidAddress {
        field: field.to_string(),
        value,
    })
}

/// Expand `${VAR_NAME}` patterns with environment variable values.
/// Unset variables are left in place.
pub fn expand_env(s: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::Invalid(e.to_string()))?;
    let mut result = s.to_string();

    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }

    Ok(result)
}
