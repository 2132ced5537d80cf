//! Capabilities the monitor consumes from the chain.
//!
//! - [`ChainConnector`]: read-only contract calls over a persistent connection
//! - [`EventSource`]: push subscriptions (oracle updates, pool events, blocks)
//!
//! Both are traits so the risk model can be driven by in-memory fakes in tests.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::feeds::PriceObservation;
use crate::units::{bps_to_ratio, wad_to_f64};

/// Aggregate account position as returned by `getUserAccountData`.
/// All fields are raw integers; use the accessors for decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccountPosition {
    /// Collateral value in wei (18 decimals)
    pub total_collateral: U256,
    /// Debt value in wei (18 decimals)
    pub total_debt: U256,
    /// Weighted liquidation threshold (basis points)
    pub liquidation_threshold: U256,
    /// Health factor (18 decimals, `U256::MAX` without debt)
    pub health_factor: U256,
}

impl AccountPosition {
    pub fn collateral_value(&self) -> f64 {
        wad_to_f64(self.total_collateral)
    }

    pub fn debt_value(&self) -> f64 {
        wad_to_f64(self.total_debt)
    }

    pub fn liquidation_threshold_ratio(&self) -> f64 {
        bps_to_ratio(self.liquidation_threshold)
    }

    pub fn health_factor_value(&self) -> f64 {
        wad_to_f64(self.health_factor)
    }
}

/// `LiquidationCall` emitted by the lending pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationEvent {
    pub collateral_asset: Address,
    pub debt_asset: Address,
    pub user: Address,
    pub debt_to_cover: U256,
    pub liquidated_collateral: U256,
    pub liquidator: Address,
    pub block_number: u64,
    pub tx_hash: B256,
}

/// Read-only access to pool and oracle state.
#[async_trait]
pub trait ChainConnector: Send + Sync {
    /// Aggregate position of `user` in the lending pool.
    async fn get_account_position(&self, user: Address) -> Result<AccountPosition>;

    /// Latest raw answer of a Chainlink aggregator.
    async fn get_latest_price(&self, feed: Address) -> Result<U256>;

    /// Aggregator behind a Chainlink proxy. Fails when `feed` is not a proxy.
    async fn get_feed_aggregator(&self, feed: Address) -> Result<Address>;

    /// Latest raw anchored-view price for `symbol` (6 decimals).
    async fn get_anchored_price(&self, view: Address, symbol: &str) -> Result<U256>;

    /// Current block height, for logging.
    async fn get_block_number(&self) -> Result<u64>;
}

/// Push subscriptions. Streams end when the underlying connection closes;
/// callers decide whether to re-subscribe.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Price updates from every registered feed, both networks merged.
    async fn subscribe_price_updates(&self) -> Result<BoxStream<'static, PriceObservation>>;

    /// `LiquidationCall` events from the lending pool.
    async fn subscribe_liquidations(&self) -> Result<BoxStream<'static, LiquidationEvent>>;

    /// New block numbers.
    async fn subscribe_blocks(&self) -> Result<BoxStream<'static, u64>>;

    /// Hashes of transactions entering the mempool.
    async fn subscribe_pending_transactions(&self) -> Result<BoxStream<'static, B256>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_position_decimals() {
        let position = AccountPosition {
            total_collateral: U256::from(10_000_000_000_000_000_000u128), // 10 ETH
            total_debt: U256::from(4_000_000_000_000_000_000u128),        // 4 ETH
            liquidation_threshold: U256::from(8000u64),
            health_factor: U256::from(2_000_000_000_000_000_000u128),
        };

        assert_eq!(position.collateral_value(), 10.0);
        assert_eq!(position.debt_value(), 4.0);
        assert!((position.liquidation_threshold_ratio() - 0.8).abs() < 1e-12);
        assert_eq!(position.health_factor_value(), 2.0);
    }

    #[test]
    fn test_debt_free_position_is_infinitely_safe() {
        let position = AccountPosition {
            health_factor: U256::MAX,
            ..Default::default()
        };
        assert!(position.health_factor_value().is_infinite());
    }
}
