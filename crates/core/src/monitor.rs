//! Monitor orchestration.
//!
//! Wires the event subscriptions and the periodic loop to the account store:
//! - Price updates refresh the accounts exposed to the changed asset
//! - Pool `LiquidationCall` events refresh the liquidated account
//! - Every poll interval the reference price is logged and the riskiest
//!   accounts are refreshed and ranked

use alloy::primitives::Address;
use futures::stream::BoxStream;
use futures::StreamExt;
use monitor_chain::{
    to_decimal_price, ChainConnector, EventSource, FeedRegistry, FeedSource, LiquidationEvent,
    PriceFeed, PriceObservation, PricePair,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::{Clock, TokioClock};
use crate::config::MonitorSettings;
use crate::error::{MonitorError, Result};
use crate::store::StoreHandle;

/// Swap Chainlink proxies for the aggregators behind them, since only the
/// aggregator emits `AnswerUpdated`. Addresses that are not proxies are kept.
pub async fn resolve_aggregators(feeds: &FeedRegistry, connector: &dyn ChainConnector) -> FeedRegistry {
    let mut resolved = Vec::with_capacity(feeds.chainlink_feeds().len());

    for feed in feeds.chainlink_feeds() {
        let address = match connector.get_feed_aggregator(feed.address).await {
            Ok(aggregator) if aggregator != Address::ZERO && aggregator != feed.address => {
                info!(pair = %feed.pair, proxy = %feed.address, aggregator = %aggregator, "Resolved feed proxy");
                aggregator
            }
            Ok(_) => feed.address,
            Err(e) => {
                debug!(pair = %feed.pair, feed = %feed.address, error = %e, "Not a proxy, using address as aggregator");
                feed.address
            }
        };
        resolved.push(PriceFeed::new(address, feed.pair.clone()));
    }

    let registry = FeedRegistry::new(resolved);
    match feeds.anchored_view() {
        Some(view) => registry.with_anchored_view(view.clone()),
        None => registry,
    }
}

/// Ties chain capabilities, the account store and the loop settings together.
pub struct Monitor {
    connector: Arc<dyn ChainConnector>,
    events: Arc<dyn EventSource>,
    store: StoreHandle,
    feeds: FeedRegistry,
    eth_usd_feed: Address,
    settings: MonitorSettings,
    clock: Arc<dyn Clock>,
}

impl Monitor {
    pub fn new(
        connector: Arc<dyn ChainConnector>,
        events: Arc<dyn EventSource>,
        store: StoreHandle,
        feeds: FeedRegistry,
        eth_usd_feed: Address,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            connector,
            events,
            store,
            feeds,
            eth_usd_feed,
            settings,
            clock: Arc::new(TokioClock),
        }
    }

    /// Replace the time source used by the poll loop and reconnect backoff.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Initial pass: full refresh and price snapshot, unless `fast_init` is set.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> Result<()> {
        let block = self.connector.get_block_number().await?;
        info!(block, "Connected to chain");

        if self.settings.fast_init {
            info!("Fast init enabled, skipping initial refresh");
            return Ok(());
        }

        let summary = self.store.refresh_all().await?;
        info!(
            refreshed = summary.refreshed,
            failed = summary.failed,
            "Initial refresh complete"
        );

        self.log_feed_prices(block).await;
        self.log_ranking().await
    }

    /// Run subscriptions and the poll loop until `shutdown` flips to `true`.
    ///
    /// Returns an error only when the poll loop cannot continue: the store is
    /// gone or a top-N refresh aborted.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut tasks = JoinSet::new();

        let this = self.clone();
        let rx = shutdown.clone();
        tasks.spawn(async move { this.supervise("price updates", rx, || this.price_session()).await });

        let this = self.clone();
        let rx = shutdown.clone();
        tasks.spawn(async move {
            this.supervise("liquidations", rx, || this.liquidation_session())
                .await
        });

        if self.settings.monitor_blocks {
            let this = self.clone();
            let rx = shutdown.clone();
            tasks.spawn(async move { this.supervise("blocks", rx, || this.block_session()).await });
        }

        if self.settings.monitor_pending_tx {
            let this = self.clone();
            let rx = shutdown.clone();
            tasks.spawn(async move {
                this.supervise("pending transactions", rx, || this.pending_tx_session())
                    .await
            });
        }

        let result = self.poll_loop(shutdown).await;
        tasks.shutdown().await;
        info!("Monitor stopped");
        result
    }

    /// Like [`run`](Self::run), stopping once `signal` completes. Subscriptions
    /// and the poll loop are wound down before this returns.
    pub async fn run_until<S>(self: Arc<Self>, signal: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let run = self.run(shutdown_rx);
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => return result,
            _ = signal => {
                info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            }
        }

        run.await
    }

    /// Periodic loop: log the reference price, wait, refresh the riskiest accounts.
    async fn poll_loop(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let interval = self.settings.poll_interval();

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            self.log_reference_price().await;

            tokio::select! {
                biased;
                _ = shutdown.changed() => return Ok(()),
                _ = self.clock.sleep(interval) => {}
            }

            let summary = self.store.refresh_top(self.settings.top_n).await?;
            debug!(
                refreshed = summary.refreshed,
                failed = summary.failed,
                "Periodic refresh complete"
            );
            self.log_ranking().await?;
        }
    }

    /// Forward every observation of `stream` to the store. Returns the number
    /// of observations handled once the stream ends.
    pub async fn process_price_stream(
        &self,
        mut stream: BoxStream<'static, PriceObservation>,
    ) -> Result<usize> {
        let mut handled = 0;
        while let Some(observation) = stream.next().await {
            self.on_price_update(observation)?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Log one price and queue a refresh for its pair.
    pub fn on_price_update(&self, observation: PriceObservation) -> Result<()> {
        info!(
            source = %observation.source,
            feed = %observation.feed,
            pair = %observation.pair,
            price = observation.price(),
            block = observation.block_number,
            updated_at = ?observation.updated_at,
            "Price update"
        );
        self.store.refresh_pair(observation.pair)
    }

    fn on_liquidation(&self, event: LiquidationEvent) -> Result<()> {
        warn!(
            user = %event.user,
            collateral_asset = %event.collateral_asset,
            debt_asset = %event.debt_asset,
            debt_to_cover = %event.debt_to_cover,
            liquidator = %event.liquidator,
            block = event.block_number,
            tx = %event.tx_hash,
            "Liquidation observed"
        );
        self.store.refresh_address(event.user)
    }

    async fn price_session(&self) -> Result<usize> {
        let stream = self.events.subscribe_price_updates().await?;
        info!(
            chainlink_feeds = self.feeds.chainlink_feeds().len(),
            anchored_view = self.feeds.anchored_view().is_some(),
            "Price subscription active"
        );
        self.process_price_stream(stream).await
    }

    async fn liquidation_session(&self) -> Result<usize> {
        let mut stream = self.events.subscribe_liquidations().await?;
        info!("Liquidation subscription active");

        let mut handled = 0;
        while let Some(event) = stream.next().await {
            self.on_liquidation(event)?;
            handled += 1;
        }
        Ok(handled)
    }

    async fn block_session(&self) -> Result<usize> {
        let mut stream = self.events.subscribe_blocks().await?;
        info!("Block subscription active");

        let mut handled = 0;
        while let Some(block) = stream.next().await {
            info!(block, "New block");
            handled += 1;
        }
        Ok(handled)
    }

    async fn pending_tx_session(&self) -> Result<usize> {
        let mut stream = self.events.subscribe_pending_transactions().await?;
        info!("Pending transaction subscription active");

        let mut handled = 0;
        while let Some(hash) = stream.next().await {
            info!(tx = %hash, "Pending transaction");
            handled += 1;
        }
        Ok(handled)
    }

    /// Keep a subscription alive: re-subscribe after it ends or fails, with a
    /// doubling delay that resets once a session delivers anything.
    async fn supervise<F, Fut>(&self, name: &'static str, mut shutdown: watch::Receiver<bool>, mut session: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<usize>>,
    {
        let initial = self.settings.reconnect_delay();
        let max = self.settings.max_reconnect_delay();
        let mut delay = initial;

        loop {
            if *shutdown.borrow() {
                return;
            }

            let outcome = tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                outcome = session() => outcome,
            };

            match outcome {
                Ok(handled) => {
                    if handled > 0 {
                        delay = initial;
                    }
                    warn!(stream = name, handled, delay_secs = delay.as_secs(), "Stream ended, reconnecting");
                }
                Err(MonitorError::StoreClosed) => {
                    error!(stream = name, "Account store closed, stopping stream");
                    return;
                }
                Err(e) => {
                    error!(stream = name, error = %e, delay_secs = delay.as_secs(), "Stream failed, reconnecting");
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                _ = self.clock.sleep(delay) => {}
            }
            delay = (delay * 2).min(max);
        }
    }

    async fn log_reference_price(&self) {
        let raw = match self.connector.get_latest_price(self.eth_usd_feed).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(feed = %self.eth_usd_feed, error = %e, "Reference price poll failed");
                return;
            }
        };
        let block = match self.connector.get_block_number().await {
            Ok(block) => Some(block),
            Err(e) => {
                warn!(error = %e, "Block number query failed");
                None
            }
        };

        let pair = self
            .feeds
            .pair_for(&self.eth_usd_feed)
            .cloned()
            .unwrap_or_else(|| PricePair::new("ETH", "USD"));
        info!(pair = %pair, price = to_decimal_price(raw, &pair), block = ?block, "Reference price");
    }

    async fn log_feed_prices(&self, block: u64) {
        for feed in self.feeds.chainlink_feeds() {
            match self.connector.get_latest_price(feed.address).await {
                Ok(raw) => {
                    let observation = PriceObservation {
                        source: FeedSource::Chainlink,
                        feed: feed.address,
                        pair: feed.pair.clone(),
                        raw_price: raw,
                        block_number: block,
                        updated_at: None,
                    };
                    info!(pair = %observation.pair, price = observation.price(), "Latest Chainlink price");
                }
                Err(e) => warn!(feed = %feed.address, pair = %feed.pair, error = %e, "Price query failed"),
            }
        }

        let Some(view) = self.feeds.anchored_view() else {
            return;
        };
        for symbol in view.symbols() {
            match self.connector.get_anchored_price(view.address, symbol).await {
                Ok(raw) => {
                    let observation = PriceObservation::anchored(view.address, symbol, raw, block);
                    info!(pair = %observation.pair, price = observation.price(), "Latest anchored view price");
                }
                Err(e) => warn!(symbol = %symbol, error = %e, "Anchored price query failed"),
            }
        }
    }

    async fn log_ranking(&self) -> Result<()> {
        let ranked = self.store.rank_by_risk(self.settings.top_n).await?;
        for (i, account) in ranked.iter().enumerate() {
            info!(
                rank = i + 1,
                account = %account.address,
                health_factor = account.health_factor,
                collateral_eth = account.total_collateral_value,
                debt_eth = account.total_debt_value,
                "Risk ranking"
            );
        }
        Ok(())
    }
}
