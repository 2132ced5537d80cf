//! Alloy-backed [`ChainConnector`] over one persistent WebSocket connection.

use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::connector::{AccountPosition, ChainConnector};
use crate::contracts::{IAggregator, IAggregatorProxy, ILendingPool, IUniswapAnchoredView};
use crate::error::{ChainError, Result};

/// Typed contract reads against the lending pool and price feeds.
#[derive(Clone)]
pub struct RpcConnector<P> {
    /// Shared provider (one connection for all reads)
    provider: Arc<P>,
    /// Lending pool address
    pool_address: Address,
}

impl<P> std::fmt::Debug for RpcConnector<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcConnector")
            .field("pool_address", &self.pool_address)
            .finish()
    }
}

impl<P: Provider + Clone + Send + Sync + 'static> RpcConnector<P> {
    /// Wrap an existing provider.
    pub fn new(provider: P, pool_address: Address) -> Self {
        Self {
            provider: Arc::new(provider),
            pool_address,
        }
    }
}

/// Open the WebSocket connection used for all contract reads and verify it
/// by fetching the current block.
pub async fn connect(ws_url: &str, pool_address: Address) -> Result<Arc<dyn ChainConnector>> {
    info!(pool = %pool_address, "Connecting to RPC provider");

    let provider = ProviderBuilder::new()
        .on_ws(WsConnect::new(ws_url))
        .await
        .map_err(|e| ChainError::query("connect", e))?;

    let connector = RpcConnector::new(provider, pool_address);
    let block = connector.get_block_number().await?;
    info!(block = block, "Provider connection verified");

    Ok(Arc::new(connector))
}

#[async_trait]
impl<P: Provider + Clone + Send + Sync + 'static> ChainConnector for RpcConnector<P> {
    async fn get_account_position(&self, user: Address) -> Result<AccountPosition> {
        debug!(user = %user, "Fetching account data");

        let pool = ILendingPool::new(self.pool_address, &*self.provider);
        let data = pool
            .getUserAccountData(user)
            .call()
            .await
            .map_err(|e| ChainError::query("getUserAccountData", e))?;

        Ok(AccountPosition {
            total_collateral: data.totalCollateralETH,
            total_debt: data.totalDebtETH,
            liquidation_threshold: data.currentLiquidationThreshold,
            health_factor: data.healthFactor,
        })
    }

    async fn get_latest_price(&self, feed: Address) -> Result<U256> {
        let aggregator = IAggregator::new(feed, &*self.provider);
        let answer = aggregator
            .latestAnswer()
            .call()
            .await
            .map_err(|e| ChainError::query("latestAnswer", e))?
            ._0;

        if answer.is_negative() {
            return Err(ChainError::NegativeAnswer { feed });
        }
        Ok(answer.into_raw())
    }

    async fn get_feed_aggregator(&self, feed: Address) -> Result<Address> {
        let proxy = IAggregatorProxy::new(feed, &*self.provider);
        let aggregator = proxy
            .aggregator()
            .call()
            .await
            .map_err(|e| ChainError::query("aggregator", e))?
            ._0;
        Ok(aggregator)
    }

    async fn get_anchored_price(&self, view: Address, symbol: &str) -> Result<U256> {
        let anchored_view = IUniswapAnchoredView::new(view, &*self.provider);
        let price = anchored_view
            .price(symbol.to_string())
            .call()
            .await
            .map_err(|e| ChainError::query("price", e))?
            ._0;
        Ok(price)
    }

    async fn get_block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::query("eth_blockNumber", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_connect_mainnet() {
        let url = std::env::var("WS_URL").unwrap();
        let pool: Address = "0x7d2768dE32b0b80b7a3454c06BdAc94A69DDc7A9".parse().unwrap();
        let connector = connect(&url, pool).await.unwrap();
        assert!(connector.get_block_number().await.unwrap() > 0);
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_resolve_aave_eth_proxy() {
        let url = std::env::var("WS_URL").unwrap();
        let pool: Address = "0x7d2768dE32b0b80b7a3454c06BdAc94A69DDc7A9".parse().unwrap();
        let proxy: Address = "0x6Df09E975c830ECae5bd4eD9d90f3A95a4f88012".parse().unwrap();
        let connector = connect(&url, pool).await.unwrap();

        let aggregator = connector.get_feed_aggregator(proxy).await.unwrap();
        assert_ne!(aggregator, Address::ZERO);
        assert_ne!(aggregator, proxy);
    }
}
