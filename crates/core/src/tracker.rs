//! Risk tracker: refreshes account metrics and ranks accounts by risk.
//!
//! Refreshes are scoped: a price change only re-queries accounts that hold the
//! changed asset, and only for pairs quoted in the native unit since the pool
//! reports every aggregate in that unit.

use alloy::primitives::Address;
use monitor_chain::{ChainConnector, ChainError, PricePair};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::account::{HealthDelta, TrackedAccount};

/// What to do when a single account query fails during a batch refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the batch and surface the error.
    Abort,
    /// Log the failure and continue with the next account.
    #[default]
    Isolate,
}

/// Outcome of a batch refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Accounts selected for refresh
    pub matched: usize,
    /// Accounts refreshed successfully
    pub refreshed: usize,
    /// Accounts whose query failed (isolate policy only)
    pub failed: usize,
}

/// Query the pool for `account` and overwrite its metrics in place.
pub async fn refresh_account(
    account: &mut TrackedAccount,
    connector: &dyn ChainConnector,
) -> Result<HealthDelta, ChainError> {
    let position = connector.get_account_position(account.address).await?;
    let delta = account.apply_position(&position);

    info!(
        account = %account.address,
        collateral = ?account.collateral_assets,
        debt = ?account.debt_assets,
        health_factor = account.health_factor,
        delta = delta.change(),
        "Account health factor"
    );
    debug!(
        account = %account.address,
        local_hf = account.local_health_factor(),
        collateral_eth = account.total_collateral_value,
        debt_eth = account.total_debt_value,
        liquidation_threshold = account.liquidation_threshold,
        "Account aggregates"
    );
    if account.is_liquidatable() {
        warn!(
            account = %account.address,
            health_factor = account.health_factor,
            "Account is eligible for liquidation"
        );
    }

    Ok(delta)
}

/// The `top_n` accounts with the lowest health factor, riskiest first.
/// Ties keep insertion order.
pub fn rank_by_risk(accounts: &[TrackedAccount], top_n: usize) -> Vec<&TrackedAccount> {
    ranked_indices(accounts, top_n)
        .into_iter()
        .map(|i| &accounts[i])
        .collect()
}

fn ranked_indices(accounts: &[TrackedAccount], top_n: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..accounts.len()).collect();
    // sort_by is stable
    indices.sort_by(|&a, &b| {
        accounts[a]
            .health_factor
            .total_cmp(&accounts[b].health_factor)
    });
    indices.truncate(top_n);
    indices
}

/// Owns the tracked account set. Accounts are never added or removed after
/// construction and keep their insertion order.
#[derive(Debug)]
pub struct RiskTracker {
    accounts: Vec<TrackedAccount>,
    native_unit: String,
    failure_policy: FailurePolicy,
}

impl RiskTracker {
    pub fn new(
        accounts: Vec<TrackedAccount>,
        native_unit: impl Into<String>,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            accounts,
            native_unit: native_unit.into(),
            failure_policy,
        }
    }

    pub fn accounts(&self) -> &[TrackedAccount] {
        &self.accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Refresh accounts exposed to the base asset of `pair`.
    ///
    /// Pairs not quoted in the native unit are ignored without any query.
    pub async fn refresh_accounts_for_pair(
        &mut self,
        pair: &PricePair,
        connector: &dyn ChainConnector,
    ) -> Result<RefreshSummary, ChainError> {
        if !pair.is_quoted_in(&self.native_unit) {
            debug!(pair = %pair, native = %self.native_unit, "Ignoring pair not quoted in native unit");
            return Ok(RefreshSummary::default());
        }

        let indices: Vec<usize> = self
            .accounts
            .iter()
            .enumerate()
            .filter(|(_, a)| a.holds_asset(pair.base()))
            .map(|(i, _)| i)
            .collect();

        debug!(pair = %pair, matched = indices.len(), "Refreshing accounts for pair");
        self.refresh_indices(indices, connector).await
    }

    /// Refresh every account in insertion order.
    pub async fn refresh_all(
        &mut self,
        connector: &dyn ChainConnector,
    ) -> Result<RefreshSummary, ChainError> {
        let indices = (0..self.accounts.len()).collect();
        self.refresh_indices(indices, connector).await
    }

    /// Refresh the `top_n` riskiest accounts, riskiest first.
    pub async fn refresh_top(
        &mut self,
        top_n: usize,
        connector: &dyn ChainConnector,
    ) -> Result<RefreshSummary, ChainError> {
        let indices = ranked_indices(&self.accounts, top_n);
        self.refresh_indices(indices, connector).await
    }

    /// Refresh a single account by address. Untracked addresses return `None`.
    pub async fn refresh_address(
        &mut self,
        address: &Address,
        connector: &dyn ChainConnector,
    ) -> Result<Option<HealthDelta>, ChainError> {
        let Some(account) = self.accounts.iter_mut().find(|a| &a.address == address) else {
            return Ok(None);
        };
        refresh_account(account, connector).await.map(Some)
    }

    /// The `top_n` riskiest accounts.
    pub fn rank_by_risk(&self, top_n: usize) -> Vec<&TrackedAccount> {
        rank_by_risk(&self.accounts, top_n)
    }

    async fn refresh_indices(
        &mut self,
        indices: Vec<usize>,
        connector: &dyn ChainConnector,
    ) -> Result<RefreshSummary, ChainError> {
        let mut summary = RefreshSummary {
            matched: indices.len(),
            ..Default::default()
        };

        // Sequential on purpose: ordering follows `indices`.
        for index in indices {
            let account = &mut self.accounts[index];
            match refresh_account(account, connector).await {
                Ok(_) => summary.refreshed += 1,
                Err(e) => match self.failure_policy {
                    FailurePolicy::Abort => return Err(e),
                    FailurePolicy::Isolate => {
                        warn!(account = %account.address, error = %e, "Account refresh failed");
                        summary.failed += 1;
                    }
                },
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{addr, MockConnector};

    fn account(n: u8, collateral: &[&str], debt: &[&str], hf: f64) -> TrackedAccount {
        let mut account = TrackedAccount::new(addr(n), collateral, debt);
        account.health_factor = hf;
        account
    }

    #[test]
    fn test_rank_by_risk_is_stable() {
        let accounts = vec![
            account(1, &["AAVE"], &[], 2.0), // A
            account(2, &["AAVE"], &[], 1.0), // B
            account(3, &["AAVE"], &[], 1.0), // C
            account(4, &["AAVE"], &[], 3.0), // D
        ];

        let ranked: Vec<Address> = rank_by_risk(&accounts, 2).iter().map(|a| a.address).collect();
        assert_eq!(ranked, vec![addr(2), addr(3)]);
    }

    #[test]
    fn test_rank_by_risk_handles_short_lists_and_sentinels() {
        let accounts = vec![
            account(1, &["AAVE"], &[], f64::INFINITY),
            account(2, &["AAVE"], &[], 0.9),
        ];

        let ranked = rank_by_risk(&accounts, 10);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].address, addr(2));
        assert_eq!(ranked[1].address, addr(1));
        assert!(rank_by_risk(&accounts, 0).is_empty());
    }

    #[test]
    fn test_ranking_does_not_reorder_accounts() {
        let tracker = RiskTracker::new(
            vec![account(1, &["AAVE"], &[], 2.0), account(2, &["AAVE"], &[], 1.0)],
            "ETH",
            FailurePolicy::Isolate,
        );
        let _ = tracker.rank_by_risk(2);
        assert_eq!(tracker.accounts()[0].address, addr(1));
    }

    #[tokio::test]
    async fn test_refresh_for_pair_only_touches_holders() {
        let connector = MockConnector::new()
            .with_position(addr(1), 1.25, 10.0, 6.0, 7000)
            .with_position(addr(2), 4.0, 10.0, 2.0, 8000)
            .with_position(addr(3), 2.0, 10.0, 4.0, 8000);

        let dai_holder = account(2, &["DAI"], &["USDC"], 5.0);
        let mut tracker = RiskTracker::new(
            vec![
                account(1, &["AAVE"], &["ETH"], 1.5),
                dai_holder.clone(),
                account(3, &["ETH"], &["AAVE"], 1.9),
            ],
            "ETH",
            FailurePolicy::Abort,
        );

        let pair: PricePair = "AAVE/ETH".parse().unwrap();
        let summary = tracker.refresh_accounts_for_pair(&pair, &connector).await.unwrap();

        assert_eq!(summary.matched, 2);
        assert_eq!(summary.refreshed, 2);
        assert_eq!(connector.calls(), vec![addr(1), addr(3)]);
        assert_eq!(tracker.accounts()[0].health_factor, 1.25);
        assert_eq!(tracker.accounts()[2].health_factor, 2.0);
        assert_eq!(tracker.accounts()[1], dai_holder);
    }

    #[tokio::test]
    async fn test_refresh_for_non_native_pair_is_noop() {
        let connector = MockConnector::new().with_position(addr(1), 1.25, 10.0, 6.0, 7000);
        let mut tracker = RiskTracker::new(
            vec![account(1, &["DAI"], &["ETH"], 1.5)],
            "ETH",
            FailurePolicy::Abort,
        );

        let pair: PricePair = "DAI/USD".parse().unwrap();
        let summary = tracker.refresh_accounts_for_pair(&pair, &connector).await.unwrap();

        assert_eq!(summary, RefreshSummary::default());
        assert_eq!(connector.call_count(), 0);
        assert_eq!(tracker.accounts()[0].health_factor, 1.5);
    }

    #[tokio::test]
    async fn test_abort_policy_surfaces_first_failure() {
        let connector = MockConnector::new()
            .with_position(addr(2), 1.125, 1.0, 1.0, 8000)
            .failing_for(addr(1));
        let mut tracker = RiskTracker::new(
            vec![account(1, &["AAVE"], &[], 1.0), account(2, &["AAVE"], &[], 1.0)],
            "ETH",
            FailurePolicy::Abort,
        );

        let result = tracker.refresh_all(&connector).await;
        assert!(matches!(result, Err(ChainError::Query { .. })));
        // second account never queried
        assert_eq!(connector.calls(), vec![addr(1)]);
    }

    #[tokio::test]
    async fn test_isolate_policy_continues_after_failure() {
        let connector = MockConnector::new()
            .with_position(addr(2), 1.125, 1.0, 1.0, 8000)
            .failing_for(addr(1));
        let mut tracker = RiskTracker::new(
            vec![account(1, &["AAVE"], &[], 1.0), account(2, &["AAVE"], &[], 1.0)],
            "ETH",
            FailurePolicy::Isolate,
        );

        let summary = tracker.refresh_all(&connector).await.unwrap();
        assert_eq!(summary.refreshed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(tracker.accounts()[0].health_factor, 1.0);
        assert_eq!(tracker.accounts()[1].health_factor, 1.125);
    }

    #[tokio::test]
    async fn test_refresh_top_queries_riskiest_first() {
        let connector = MockConnector::new()
            .with_position(addr(1), 3.0, 1.0, 1.0, 8000)
            .with_position(addr(2), 1.0, 1.0, 1.0, 8000)
            .with_position(addr(3), 2.0, 1.0, 1.0, 8000);
        let mut tracker = RiskTracker::new(
            vec![
                account(1, &["AAVE"], &[], 3.0),
                account(2, &["AAVE"], &[], 1.0),
                account(3, &["AAVE"], &[], 2.0),
            ],
            "ETH",
            FailurePolicy::Abort,
        );

        tracker.refresh_top(2, &connector).await.unwrap();
        assert_eq!(connector.calls(), vec![addr(2), addr(3)]);
    }

    #[tokio::test]
    async fn test_refresh_address_ignores_untracked() {
        let connector = MockConnector::new().with_position(addr(1), 1.375, 1.0, 1.0, 8000);
        let mut tracker = RiskTracker::new(
            vec![account(1, &["AAVE"], &[], 2.0)],
            "ETH",
            FailurePolicy::Abort,
        );

        assert!(tracker.refresh_address(&addr(9), &connector).await.unwrap().is_none());
        assert_eq!(connector.call_count(), 0);

        let delta = tracker.refresh_address(&addr(1), &connector).await.unwrap().unwrap();
        assert_eq!(delta.previous, 2.0);
        assert_eq!(delta.current, 1.375);
    }
}
