//! Liquidation risk monitor core logic.
//!
//! This crate provides:
//! - Tracked accounts loaded from a JSON account list
//! - Risk tracking: scoped refreshes and health factor ranking
//! - A single-writer account store fed by event handlers and the poll loop
//! - Monitor orchestration with reconnecting subscriptions
//! - TOML configuration with environment expansion

mod account;
mod clock;
pub mod config;
mod error;
mod monitor;
mod store;
mod tracker;

#[cfg(test)]
mod testing;

pub use account::{load_accounts, parse_accounts, AccountDescriptor, HealthDelta, TrackedAccount};
pub use clock::{Clock, TokioClock};
pub use config::{MonitorConfig, MonitorSettings, ResolvedConfig};
pub use error::{ConfigError, MonitorError, Result};
pub use monitor::{resolve_aggregators, Monitor};
pub use store::{AccountStore, StoreHandle};
pub use tracker::{rank_by_risk, refresh_account, FailurePolicy, RefreshSummary, RiskTracker};
