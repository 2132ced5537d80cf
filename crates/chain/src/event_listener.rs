//! WebSocket event listener for oracle price updates and pool events.

use alloy::primitives::{Address, B256, I256, U256};
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Filter, Log};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::connector::{EventSource, LiquidationEvent};
use crate::contracts::event_signatures;
use crate::error::{ChainError, Result};
use crate::feeds::{FeedRegistry, FeedSource, PriceObservation};
use crate::pair::PricePair;

/// Lookup tables moved into the price stream.
#[derive(Clone)]
struct FeedTables {
    pairs: HashMap<Address, PricePair>,
    anchored_view: Option<(Address, HashMap<B256, String>)>,
}

/// WebSocket event listener. Each subscription opens its own connection and
/// keeps the provider alive in the stream state.
pub struct EventListener {
    /// WebSocket URL
    ws_url: String,
    /// Lending pool address
    pool_address: Address,
    /// Registered price feeds
    feeds: FeedRegistry,
}

impl EventListener {
    /// Create a new event listener.
    pub fn new(ws_url: impl Into<String>, pool_address: Address, feeds: FeedRegistry) -> Self {
        Self {
            ws_url: ws_url.into(),
            pool_address,
            feeds,
        }
    }

    fn feed_addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self
            .feeds
            .chainlink_feeds()
            .iter()
            .map(|f| f.address)
            .collect();
        if let Some(view) = self.feeds.anchored_view() {
            addresses.push(view.address);
        }
        addresses
    }
}

#[async_trait]
impl EventSource for EventListener {
    async fn subscribe_price_updates(&self) -> Result<BoxStream<'static, PriceObservation>> {
        let addresses = self.feed_addresses();
        if addresses.is_empty() {
            // An address-less filter would match every log on chain.
            warn!("No price feeds registered, price subscription is idle");
            return Ok(stream::pending().boxed());
        }

        info!(feed_count = addresses.len(), "Subscribing to price updates");

        let provider = ProviderBuilder::new()
            .on_ws(WsConnect::new(&self.ws_url))
            .await
            .map_err(|e| ChainError::subscription("price feeds", e))?;

        let filter = Filter::new().address(addresses).event_signature(vec![
            event_signatures::ANSWER_UPDATED,
            event_signatures::PRICE_UPDATED,
        ]);

        let sub = provider
            .subscribe_logs(&filter)
            .await
            .map_err(|e| ChainError::subscription("price feeds", e))?;
        let inner_stream = sub.into_stream();

        let tables = FeedTables {
            pairs: self.feeds.pair_table(),
            anchored_view: self
                .feeds
                .anchored_view()
                .map(|v| (v.address, v.hash_table())),
        };

        // The provider must live in the stream state or the socket closes.
        let update_stream = stream::unfold(
            (provider, inner_stream, tables),
            |(provider, mut stream, tables)| async move {
                loop {
                    match stream.next().await {
                        Some(log) => {
                            if let Some(update) = parse_price_log(log, &tables) {
                                return Some((update, (provider, stream, tables)));
                            }
                            // skip logs we cannot attribute
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(update_stream.boxed())
    }

    async fn subscribe_liquidations(&self) -> Result<BoxStream<'static, LiquidationEvent>> {
        info!(pool = %self.pool_address, "Subscribing to pool liquidations");

        let provider = ProviderBuilder::new()
            .on_ws(WsConnect::new(&self.ws_url))
            .await
            .map_err(|e| ChainError::subscription("lending pool", e))?;

        let filter = Filter::new()
            .address(self.pool_address)
            .event_signature(event_signatures::LIQUIDATION_CALL);

        let sub = provider
            .subscribe_logs(&filter)
            .await
            .map_err(|e| ChainError::subscription("lending pool", e))?;
        let inner_stream = sub.into_stream();

        let event_stream = stream::unfold(
            (provider, inner_stream),
            |(provider, mut stream)| async move {
                loop {
                    match stream.next().await {
                        Some(log) => {
                            if let Some(event) = parse_liquidation_event(log) {
                                return Some((event, (provider, stream)));
                            }
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(event_stream.boxed())
    }

    async fn subscribe_blocks(&self) -> Result<BoxStream<'static, u64>> {
        info!("Subscribing to new block headers");

        let provider = ProviderBuilder::new()
            .on_ws(WsConnect::new(&self.ws_url))
            .await
            .map_err(|e| ChainError::subscription("new heads", e))?;

        let sub = provider
            .subscribe_blocks()
            .await
            .map_err(|e| ChainError::subscription("new heads", e))?;
        let inner_stream = sub.into_stream();

        let block_stream = stream::unfold(
            (provider, inner_stream),
            |(provider, mut stream)| async move {
                match stream.next().await {
                    Some(block) => Some((block.number, (provider, stream))),
                    None => None,
                }
            },
        );

        Ok(block_stream.boxed())
    }

    async fn subscribe_pending_transactions(&self) -> Result<BoxStream<'static, B256>> {
        info!("Subscribing to pending transactions");

        let provider = ProviderBuilder::new()
            .on_ws(WsConnect::new(&self.ws_url))
            .await
            .map_err(|e| ChainError::subscription("pending transactions", e))?;

        let sub = provider
            .subscribe_pending_transactions()
            .await
            .map_err(|e| ChainError::subscription("pending transactions", e))?;
        let inner_stream = sub.into_stream();

        let tx_stream = stream::unfold(
            (provider, inner_stream),
            |(provider, mut stream)| async move {
                match stream.next().await {
                    Some(hash) => Some((hash, (provider, stream))),
                    None => None,
                }
            },
        );

        Ok(tx_stream.boxed())
    }
}

/// Route a feed log to the matching parser.
fn parse_price_log(log: Log, tables: &FeedTables) -> Option<PriceObservation> {
    let sig = *log.topics().first()?;

    if sig == event_signatures::ANSWER_UPDATED {
        parse_answer_updated(log, &tables.pairs)
    } else if sig == event_signatures::PRICE_UPDATED {
        let (view, symbols) = tables.anchored_view.as_ref()?;
        if log.address() != *view {
            return None;
        }
        parse_price_updated(log, symbols)
    } else {
        None
    }
}

/// Parse AnswerUpdated(int256 indexed current, uint256 indexed roundId, uint256 updatedAt).
/// Topics: [sig, current, roundId], data: [updatedAt]
fn parse_answer_updated(log: Log, pairs: &HashMap<Address, PricePair>) -> Option<PriceObservation> {
    let feed = log.address();
    let pair = pairs.get(&feed)?;

    if log.topics().len() < 3 {
        warn!(feed = %feed, "Invalid oracle log: insufficient topics");
        return None;
    }

    let answer = I256::from_be_bytes(log.topics()[1].0);
    if answer.is_negative() {
        warn!(feed = %feed, pair = %pair, "Negative price from oracle");
        return None;
    }

    let updated_at = if log.data().data.len() >= 32 {
        let secs = U256::from_be_slice(&log.data().data[0..32]);
        u64::try_from(secs)
            .ok()
            .and_then(|s| i64::try_from(s).ok())
            .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
    } else {
        None
    };

    let block_number = log.block_number.unwrap_or(0);

    debug!(
        feed = %feed,
        pair = %pair,
        answer = %answer,
        block = block_number,
        "Parsed AnswerUpdated"
    );

    Some(PriceObservation {
        source: FeedSource::Chainlink,
        feed,
        pair: pair.clone(),
        raw_price: answer.into_raw(),
        block_number,
        updated_at,
    })
}

/// Parse PriceUpdated(bytes32 symbolHash, uint256 price).
/// The hash is read from topic 1 when indexed, otherwise from the first data word.
fn parse_price_updated(log: Log, symbols: &HashMap<B256, String>) -> Option<PriceObservation> {
    let view = log.address();
    let data = &log.data().data;

    let (hash, price) = if log.topics().len() >= 2 && data.len() >= 32 {
        (log.topics()[1], U256::from_be_slice(&data[0..32]))
    } else if data.len() >= 64 {
        (B256::from_slice(&data[0..32]), U256::from_be_slice(&data[32..64]))
    } else {
        warn!(view = %view, "Invalid PriceUpdated log");
        return None;
    };

    // Prices for symbols we do not track are dropped silently.
    let symbol = symbols.get(&hash)?;
    let block_number = log.block_number.unwrap_or(0);

    Some(PriceObservation::anchored(view, symbol, price, block_number))
}

/// Parse LiquidationCall(address indexed collateralAsset, address indexed debtAsset, address indexed user,
/// uint256 debtToCover, uint256 liquidatedCollateralAmount, address liquidator, bool receiveAToken)
fn parse_liquidation_event(log: Log) -> Option<LiquidationEvent> {
    if log.topics().len() < 4 {
        return None;
    }

    let collateral_asset = Address::from_slice(&log.topics()[1][12..]);
    let debt_asset = Address::from_slice(&log.topics()[2][12..]);
    let user = Address::from_slice(&log.topics()[3][12..]);

    let data = &log.data().data;
    if data.len() < 96 {
        return None;
    }

    Some(LiquidationEvent {
        collateral_asset,
        debt_asset,
        user,
        debt_to_cover: U256::from_be_slice(&data[0..32]),
        liquidated_collateral: U256::from_be_slice(&data[32..64]),
        liquidator: Address::from_slice(&data[76..96]),
        block_number: log.block_number.unwrap_or(0),
        tx_hash: log.transaction_hash.unwrap_or_default(),
    })
}
