//! Monitor configuration.
//!
//! This module provides:
//! - The TOML config file with per-field defaults ([`MonitorConfig`])
//! - Environment expansion and address/pair parsing ([`ResolvedConfig`])

mod resolved;
mod settings;

pub use resolved::{expand_env, ResolvedConfig, INFURA_PROJECT_ENV};
pub use settings::{
    AnchoredViewSettings, ContractSettings, MonitorConfig, MonitorSettings, OracleConfig,
    RpcSettings, CONFIG_ENV,
};
