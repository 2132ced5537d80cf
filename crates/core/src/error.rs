//! Error types for configuration and the monitoring pipeline.

use monitor_chain::ChainError;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed or missing startup input. Always fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Account list is not valid JSON or misses required fields
    #[error("malformed account list: {0}")]
    AccountList(#[from] serde_json::Error),

    /// Monitor configuration is not valid TOML
    #[error("malformed monitor config: {0}")]
    Toml(#[from] toml::de::Error),

    /// An address field could not be parsed
    #[error("invalid address `{value}` for {field}")]
    InvalidAddress { field: String, value: String },

    /// A price pair could not be parsed
    #[error(transparent)]
    InvalidPair(#[from] monitor_chain::InvalidPair),

    /// Any other invalid setting
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that stop the monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The account store task is gone; no further refreshes can run.
    #[error("account store stopped")]
    StoreClosed,
}

pub type Result<T> = std::result::Result<T, MonitorError>;
