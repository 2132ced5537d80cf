//! Error types for chain reads and subscriptions.

use alloy::primitives::Address;
use thiserror::Error;

/// Errors surfaced by the chain boundary.
#[derive(Error, Debug)]
pub enum ChainError {
    /// A read call failed (transport error, revert, timeout, dropped connection).
    #[error("chain query `{method}` failed: {reason}")]
    Query { method: &'static str, reason: String },

    /// A subscription could not be opened or its stream faulted.
    #[error("subscription to {target} failed: {reason}")]
    Subscription { target: String, reason: String },

    /// An oracle answered with a negative value.
    #[error("oracle {feed} returned a negative answer")]
    NegativeAnswer { feed: Address },
}

impl ChainError {
    /// Wrap any displayable transport error as a query failure.
    pub fn query(method: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Query {
            method,
            reason: err.to_string(),
        }
    }

    /// Wrap any displayable transport error as a subscription failure.
    pub fn subscription(target: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Subscription {
            target: target.into(),
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
