//! Price feed registry and the observations the feeds produce.

use alloy::primitives::{keccak256, Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::pair::PricePair;
use crate::units::{fixed_to_f64, to_decimal_price, ANCHORED_VIEW_DECIMALS, USD};

/// Which oracle network produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedSource {
    /// Chainlink aggregator (`AnswerUpdated`)
    Chainlink,
    /// Uniswap Anchored View (`PriceUpdated`)
    AnchoredView,
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chainlink => f.write_str("chainlink"),
            Self::AnchoredView => f.write_str("anchored-view"),
        }
    }
}

/// A Chainlink aggregator and the pair it prices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceFeed {
    pub address: Address,
    pub pair: PricePair,
}

impl PriceFeed {
    pub fn new(address: Address, pair: PricePair) -> Self {
        Self { address, pair }
    }
}

/// Uniswap Anchored View contract with the symbols being tracked.
#[derive(Debug, Clone)]
pub struct AnchoredView {
    pub address: Address,
    symbols: Vec<String>,
    by_hash: HashMap<B256, String>,
}

impl AnchoredView {
    pub fn new(address: Address, symbols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let symbols: Vec<String> = symbols
            .into_iter()
            .map(|s| s.into().to_uppercase())
            .collect();
        let by_hash = symbols
            .iter()
            .map(|s| (symbol_hash(s), s.clone()))
            .collect();

        Self {
            address,
            symbols,
            by_hash,
        }
    }

    /// Tracked symbols in configuration order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Symbol hash lookup table, cloned into subscription streams.
    pub fn hash_table(&self) -> HashMap<B256, String> {
        self.by_hash.clone()
    }
}

/// The anchored view keys its prices by `keccak256(symbol)`.
pub fn symbol_hash(symbol: &str) -> B256 {
    keccak256(symbol.as_bytes())
}

/// All feeds the monitor listens to.
#[derive(Debug, Clone, Default)]
pub struct FeedRegistry {
    chainlink: Vec<PriceFeed>,
    anchored_view: Option<AnchoredView>,
}

impl FeedRegistry {
    pub fn new(chainlink: Vec<PriceFeed>) -> Self {
        Self {
            chainlink,
            anchored_view: None,
        }
    }

    pub fn with_anchored_view(mut self, view: AnchoredView) -> Self {
        self.anchored_view = Some(view);
        self
    }

    pub fn chainlink_feeds(&self) -> &[PriceFeed] {
        &self.chainlink
    }

    pub fn anchored_view(&self) -> Option<&AnchoredView> {
        self.anchored_view.as_ref()
    }

    /// Pair priced by a Chainlink aggregator address.
    pub fn pair_for(&self, feed: &Address) -> Option<&PricePair> {
        self.chainlink
            .iter()
            .find(|f| &f.address == feed)
            .map(|f| &f.pair)
    }

    /// Aggregator address to pair table, cloned into subscription streams.
    pub fn pair_table(&self) -> HashMap<Address, PricePair> {
        self.chainlink
            .iter()
            .map(|f| (f.address, f.pair.clone()))
            .collect()
    }
}

/// A single price reading from either feed network. Consumed immediately to
/// decide which accounts to refresh, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceObservation {
    /// Network that produced the reading
    pub source: FeedSource,
    /// Emitting contract
    pub feed: Address,
    /// Asset and unit of the price
    pub pair: PricePair,
    /// Raw on-chain answer
    pub raw_price: U256,
    /// Block of the emitting log (0 for polls without a block)
    pub block_number: u64,
    /// Oracle-reported update time, when the event carries one
    pub updated_at: Option<DateTime<Utc>>,
}

impl PriceObservation {
    /// Decimal price under the precision rules of the producing network.
    pub fn price(&self) -> f64 {
        match self.source {
            FeedSource::Chainlink => to_decimal_price(self.raw_price, &self.pair),
            FeedSource::AnchoredView => fixed_to_f64(self.raw_price, ANCHORED_VIEW_DECIMALS),
        }
    }

    /// Anchored-view observations are always USD-quoted.
    pub fn anchored(feed: Address, symbol: &str, raw_price: U256, block_number: u64) -> Self {
        Self {
            source: FeedSource::AnchoredView,
            feed,
            pair: PricePair::new(symbol, USD),
            raw_price,
            block_number,
            updated_at: None,
        }
    }
}
