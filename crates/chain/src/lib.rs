//! Chain boundary for the liquidation risk monitor.
//!
//! This crate provides:
//! - Contract bindings for the lending pool, Chainlink aggregators and the
//!   Uniswap Anchored View
//! - The [`ChainConnector`] and [`EventSource`] capabilities and their
//!   Alloy-backed implementations
//! - Price pairs, the feed registry and fixed-point conversions

mod connector;
mod contracts;
mod error;
mod event_listener;
mod feeds;
mod pair;
mod provider;
pub mod units;

pub use connector::{AccountPosition, ChainConnector, EventSource, LiquidationEvent};
pub use contracts::event_signatures;
pub use error::{ChainError, Result};
pub use event_listener::EventListener;
pub use feeds::{symbol_hash, AnchoredView, FeedRegistry, FeedSource, PriceFeed, PriceObservation};
pub use pair::{InvalidPair, PricePair};
pub use provider::{connect, RpcConnector};
pub use units::to_decimal_price;
