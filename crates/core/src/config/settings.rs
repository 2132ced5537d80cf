//! Monitor configuration file.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working mainnet setup that reads its endpoint from `WS_URL`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::tracker::FailurePolicy;

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "MONITOR_CONFIG";

/// Top-level monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Endpoint settings
    #[serde(default)]
    pub rpc: RpcSettings,

    /// Contract addresses
    #[serde(default)]
    pub contracts: ContractSettings,

    /// Loop timing and behavior flags
    #[serde(default)]
    pub monitor: MonitorSettings,

    /// Symbols tracked on the anchored view
    #[serde(default)]
    pub anchored_view: AnchoredViewSettings,

    /// Chainlink aggregators to subscribe to
    #[serde(default = "default_oracles")]
    pub oracles: Vec<OracleConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            rpc: RpcSettings::default(),
            contracts: ContractSettings::default(),
            monitor: MonitorSettings::default(),
            anchored_view: AnchoredViewSettings::default(),
            oracles: default_oracles(),
        }
    }
}

/// Node endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcSettings {
    /// WebSocket URL, `${VAR}` placeholders are expanded
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
}

fn default_ws_url() -> String {
    "${WS_URL}".to_string()
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
        }
    }
}

/// Contract addresses, as hex strings so they can carry `${VAR}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractSettings {
    /// Lending pool queried for account data
    #[serde(default = "default_lending_pool")]
    pub lending_pool: String,

    /// Aggregator polled every cycle for the reference price
    #[serde(default = "default_eth_usd_feed")]
    pub eth_usd_feed: String,

    /// Uniswap Anchored View; no subscription when unset
    #[serde(default = "default_anchored_view")]
    pub anchored_view: Option<String>,
}

fn default_lending_pool() -> String {
    "0x7d2768dE32b0b80b7a3454c06BdAc94A69DDc7A9".to_string()
}
fn default_eth_usd_feed() -> String {
    "0x37bC7498f4FF12C19678ee8fE19d713b87F6a9e6".to_string()
}
fn default_anchored_view() -> Option<String> {
    Some("0x6D2299C48a8dD07a872FDd0F8233924872Ad1071".to_string())
}

impl Default for ContractSettings {
    fn default() -> Self {
        Self {
            lending_pool: default_lending_pool(),
            eth_usd_feed: default_eth_usd_feed(),
            anchored_view: default_anchored_view(),
        }
    }
}

/// Monitor loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Delay between periodic top-N refreshes
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Number of riskiest accounts refreshed each cycle
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Unit the pool reports values in; only pairs quoted in it trigger refreshes
    #[serde(default = "default_native_unit")]
    pub native_unit: String,

    /// Skip the initial full refresh and price snapshot
    #[serde(default)]
    pub fast_init: bool,

    /// Log every new block
    #[serde(default)]
    pub monitor_blocks: bool,

    /// Log every pending transaction hash
    #[serde(default)]
    pub monitor_pending_tx: bool,

    /// Behavior when one account query fails inside a batch
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// First delay before re-subscribing a dropped stream
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// Upper bound for the doubling reconnect delay
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_secs: u64,
}

fn default_poll_interval() -> u64 {
    300
}
fn default_top_n() -> usize {
    10
}
fn default_native_unit() -> String {
    "ETH".to_string()
}
fn default_reconnect_delay() -> u64 {
    5
}
fn default_max_reconnect_delay() -> u64 {
    60
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            top_n: default_top_n(),
            native_unit: default_native_unit(),
            fast_init: false,
            monitor_blocks: false,
            monitor_pending_tx: false,
            failure_policy: FailurePolicy::default(),
            reconnect_delay_secs: default_reconnect_delay(),
            max_reconnect_delay_secs: default_max_reconnect_delay(),
        }
    }
}

impl MonitorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.max_reconnect_delay_secs.max(self.reconnect_delay_secs))
    }
}

/// Anchored view symbols.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchoredViewSettings {
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
}

fn default_symbols() -> Vec<String> {
    [
        "ETH", "BTC", "DAI", "LINK", "USDT", "AAVE", "UNI", "YFI", "COMP", "MKR", "SUSHI", "USDC",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for AnchoredViewSettings {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
        }
    }
}

/// One Chainlink feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Proxy or aggregator address; proxies are resolved at startup
    pub address: String,
    /// Pair it prices, e.g. `"AAVE/ETH"`
    pub pair: String,
}

fn default_oracles() -> Vec<OracleConfig> {
    [
        ("0x37bC7498f4FF12C19678ee8fE19d713b87F6a9e6", "ETH/USD"),
        ("0x6Df09E975c830ECae5bd4eD9d90f3A95a4f88012", "AAVE/ETH"),
        ("0x773616E4d11A78F511299002da57A0a94577F1f4", "DAI/ETH"),
        ("0xDC530D9457755926550b59e8ECcdaE7624181557", "LINK/ETH"),
        ("0x986b5E1e1755e3C2440e960477f25201B0a8bbD4", "USDC/ETH"),
        ("0xEe9F2375b4bdF6387aa8265dD4FB8F16512A1d46", "USDT/ETH"),
    ]
    .iter()
    .map(|(address, pair)| OracleConfig {
        address: address.to_string(),
        pair: pair.to_string(),
    })
    .collect()
}

impl MonitorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load from `path`, else from `$MONITOR_CONFIG`, else built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.is_empty() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// Log the effective configuration at startup.
    pub fn log_config(&self) {
        tracing::info!(
            lending_pool = %self.contracts.lending_pool,
            eth_usd_feed = %self.contracts.eth_usd_feed,
            anchored_view = ?self.contracts.anchored_view,
            "Contract addresses"
        );
        tracing::info!(
            poll_interval_secs = self.monitor.poll_interval_secs,
            top_n = self.monitor.top_n,
            native_unit = %self.monitor.native_unit,
            failure_policy = ?self.monitor.failure_policy,
            "Monitor settings"
        );
        tracing::info!(
            fast_init = self.monitor.fast_init,
            monitor_blocks = self.monitor.monitor_blocks,
            monitor_pending_tx = self.monitor.monitor_pending_tx,
            "Monitor flags"
        );
        tracing::info!(
            oracles = self.oracles.len(),
            anchored_symbols = self.anchored_view.symbols.len(),
            "Price feeds"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.monitor.poll_interval(), Duration::from_secs(300));
        assert_eq!(config.monitor.top_n, 10);
        assert_eq!(config.monitor.native_unit, "ETH");
        assert_eq!(config.monitor.failure_policy, FailurePolicy::Isolate);
        assert!(!config.monitor.fast_init);
        assert_eq!(config.anchored_view.symbols.len(), 12);
        assert_eq!(config.oracles.len(), 6);
        assert_eq!(config.oracles[0].pair, "ETH/USD");
        assert!(config.oracles.iter().any(|o| o.pair == "AAVE/ETH"));
        assert_eq!(config.rpc.ws_url, "${WS_URL}");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = MonitorConfig::from_toml("").unwrap();
        assert_eq!(config.monitor.top_n, 10);
        assert_eq!(config.oracles.len(), 6);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [rpc]
            ws_url = "ws://localhost:8546"

            [monitor]
            top_n = 3
            fast_init = true
            failure_policy = "abort"

            [[oracles]]
            address = "0x6Df09E975c830ECae5bd4eD9d90f3A95a4f88012"
            pair = "AAVE/ETH"

            [[oracles]]
            address = "0x773616E4d11A78F511299002da57A0a94577F1f4"
            pair = "DAI/ETH"
        "#;

        let config = MonitorConfig::from_toml(toml).unwrap();
        assert_eq!(config.rpc.ws_url, "ws://localhost:8546");
        assert_eq!(config.monitor.top_n, 3);
        assert!(config.monitor.fast_init);
        assert_eq!(config.monitor.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.monitor.poll_interval_secs, 300);
        assert_eq!(config.oracles.len(), 2);
        assert_eq!(config.oracles[1].pair, "DAI/ETH");
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let result = MonitorConfig::from_toml("[monitor]\ntop_n = \"ten\"");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = MonitorConfig::load(Some(Path::new("/nonexistent/monitor.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_max_reconnect_delay_never_below_initial() {
        let settings = MonitorSettings {
            reconnect_delay_secs: 30,
            max_reconnect_delay_secs: 10,
            ..Default::default()
        };
        assert_eq!(settings.max_reconnect_delay(), Duration::from_secs(30));
    }
}
