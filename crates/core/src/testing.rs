//! In-memory chain fakes shared by the unit tests.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use monitor_chain::{
    AccountPosition, ChainConnector, ChainError, EventSource, LiquidationEvent, PriceObservation,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::watch;

use crate::clock::Clock;

pub fn addr(n: u8) -> Address {
    Address::with_last_byte(n)
}

/// Raw pool position from decimal inputs.
pub fn position(hf: f64, collateral: f64, debt: f64, threshold_bps: u64) -> AccountPosition {
    let wad = |v: f64| U256::from((v * 1e18) as u128);
    AccountPosition {
        total_collateral: wad(collateral),
        total_debt: wad(debt),
        liquidation_threshold: U256::from(threshold_bps),
        health_factor: wad(hf),
    }
}

/// Connector answering from fixed tables and recording every account query.
#[derive(Default)]
pub struct MockConnector {
    positions: Mutex<HashMap<Address, AccountPosition>>,
    failing: HashSet<Address>,
    prices: HashMap<Address, U256>,
    anchored: HashMap<String, U256>,
    aggregators: HashMap<Address, Address>,
    calls: Mutex<Vec<Address>>,
    price_calls: Mutex<usize>,
    block_calls: Mutex<usize>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(self, user: Address, hf: f64, collateral: f64, debt: f64, bps: u64) -> Self {
        self.set_position(user, hf, collateral, debt, bps);
        self
    }

    pub fn failing_for(mut self, user: Address) -> Self {
        self.failing.insert(user);
        self
    }

    pub fn with_price(mut self, feed: Address, raw: U256) -> Self {
        self.prices.insert(feed, raw);
        self
    }

    pub fn with_anchored_price(mut self, symbol: &str, raw: U256) -> Self {
        self.anchored.insert(symbol.to_string(), raw);
        self
    }

    pub fn with_aggregator(mut self, proxy: Address, aggregator: Address) -> Self {
        self.aggregators.insert(proxy, aggregator);
        self
    }

    pub fn set_position(&self, user: Address, hf: f64, collateral: f64, debt: f64, bps: u64) {
        self.positions
            .lock()
            .insert(user, position(hf, collateral, debt, bps));
    }

    pub fn calls(&self) -> Vec<Address> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn price_calls(&self) -> usize {
        *self.price_calls.lock()
    }

    pub fn block_calls(&self) -> usize {
        *self.block_calls.lock()
    }
}

#[async_trait]
impl ChainConnector for MockConnector {
    async fn get_account_position(&self, user: Address) -> monitor_chain::Result<AccountPosition> {
        self.calls.lock().push(user);
        if self.failing.contains(&user) {
            return Err(ChainError::query("getUserAccountData", "connection reset"));
        }
        self.positions
            .lock()
            .get(&user)
            .copied()
            .ok_or_else(|| ChainError::query("getUserAccountData", "unknown account"))
    }

    async fn get_latest_price(&self, feed: Address) -> monitor_chain::Result<U256> {
        *self.price_calls.lock() += 1;
        self.prices
            .get(&feed)
            .copied()
            .ok_or_else(|| ChainError::query("latestAnswer", "unknown feed"))
    }

    async fn get_feed_aggregator(&self, feed: Address) -> monitor_chain::Result<Address> {
        self.aggregators
            .get(&feed)
            .copied()
            .ok_or_else(|| ChainError::query("aggregator", "execution reverted"))
    }

    async fn get_anchored_price(&self, _view: Address, symbol: &str) -> monitor_chain::Result<U256> {
        self.anchored
            .get(symbol)
            .copied()
            .ok_or_else(|| ChainError::query("price", "unknown symbol"))
    }

    async fn get_block_number(&self) -> monitor_chain::Result<u64> {
        *self.block_calls.lock() += 1;
        Ok(12_000_000)
    }
}

/// Event source replaying queued events once, then staying silent.
#[derive(Default)]
pub struct MockEvents {
    prices: Mutex<Vec<PriceObservation>>,
    liquidations: Mutex<Vec<LiquidationEvent>>,
}

impl MockEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices(self, prices: Vec<PriceObservation>) -> Self {
        *self.prices.lock() = prices;
        self
    }

    pub fn with_liquidations(self, events: Vec<LiquidationEvent>) -> Self {
        *self.liquidations.lock() = events;
        self
    }
}

fn replay<T: Send + 'static>(items: Vec<T>) -> BoxStream<'static, T> {
    stream::iter(items).chain(stream::pending()).boxed()
}

#[async_trait]
impl EventSource for MockEvents {
    async fn subscribe_price_updates(&self) -> monitor_chain::Result<BoxStream<'static, PriceObservation>> {
        Ok(replay(std::mem::take(&mut *self.prices.lock())))
    }

    async fn subscribe_liquidations(&self) -> monitor_chain::Result<BoxStream<'static, LiquidationEvent>> {
        Ok(replay(std::mem::take(&mut *self.liquidations.lock())))
    }

    async fn subscribe_blocks(&self) -> monitor_chain::Result<BoxStream<'static, u64>> {
        Ok(replay(Vec::new()))
    }

    async fn subscribe_pending_transactions(&self) -> monitor_chain::Result<BoxStream<'static, B256>> {
        Ok(replay(Vec::new()))
    }
}

/// Event source whose price subscription never lasts: each attempt either
/// fails outright or delivers one observation and ends.
pub struct FailingEvents {
    delivers: Option<PriceObservation>,
}

impl FailingEvents {
    pub fn new() -> Self {
        Self { delivers: None }
    }

    pub fn ending_after(observation: PriceObservation) -> Self {
        Self {
            delivers: Some(observation),
        }
    }
}

#[async_trait]
impl EventSource for FailingEvents {
    async fn subscribe_price_updates(&self) -> monitor_chain::Result<BoxStream<'static, PriceObservation>> {
        match &self.delivers {
            Some(observation) => Ok(stream::iter(vec![observation.clone()]).boxed()),
            None => Err(ChainError::subscription("price updates", "connection refused")),
        }
    }

    async fn subscribe_liquidations(&self) -> monitor_chain::Result<BoxStream<'static, LiquidationEvent>> {
        Ok(replay(Vec::new()))
    }

    async fn subscribe_blocks(&self) -> monitor_chain::Result<BoxStream<'static, u64>> {
        Ok(replay(Vec::new()))
    }

    async fn subscribe_pending_transactions(&self) -> monitor_chain::Result<BoxStream<'static, B256>> {
        Ok(replay(Vec::new()))
    }
}

/// Clock that records requested sleeps and raises shutdown after `stop_after` of them.
pub struct ManualClock {
    sleeps: Mutex<Vec<Duration>>,
    stop_after: usize,
    shutdown: watch::Sender<bool>,
}

impl ManualClock {
    pub fn new(stop_after: usize, shutdown: watch::Sender<bool>) -> Self {
        Self {
            sleeps: Mutex::new(Vec::new()),
            stop_after,
            shutdown,
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    async fn sleep(&self, duration: Duration) {
        let count = {
            let mut sleeps = self.sleeps.lock();
            sleeps.push(duration);
            sleeps.len()
        };
        if count >= self.stop_after {
            let _ = self.shutdown.send(true);
        }
        tokio::task::yield_now().await;
    }
}
