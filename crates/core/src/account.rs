//! Tracked accounts and the account list they are loaded from.

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use monitor_chain::AccountPosition;
use serde::Deserialize;
use smallvec::SmallVec;
use std::path::Path;
use tracing::info;

use crate::error::ConfigError;

/// One entry of the account list file.
///
/// ```json
/// { "account": "0x...", "collateralAssets": ["AAVE"], "debtAssets": ["ETH"] }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDescriptor {
    #[serde(alias = "address")]
    pub account: String,
    pub collateral_assets: Vec<String>,
    pub debt_assets: Vec<String>,
}

/// Previous and new health factor of one refresh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthDelta {
    pub previous: f64,
    pub current: f64,
}

impl HealthDelta {
    /// Signed change; zero when both sides are the no-debt sentinel.
    pub fn change(&self) -> f64 {
        if self.previous == self.current {
            0.0
        } else {
            self.current - self.previous
        }
    }
}

/// A monitored lending account with its last-known risk metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedAccount {
    /// Account address
    pub address: Address,
    /// Collateral asset symbols (upper-case)
    pub collateral_assets: SmallVec<[String; 4]>,
    /// Debt asset symbols (upper-case)
    pub debt_assets: SmallVec<[String; 4]>,
    /// Health factor (below 1.0 is liquidatable, +inf = no debt)
    pub health_factor: f64,
    /// Collateral value in ETH
    pub total_collateral_value: f64,
    /// Debt value in ETH
    pub total_debt_value: f64,
    /// Weighted liquidation threshold in [0, 1]
    pub liquidation_threshold: f64,
    /// Time of the last successful refresh
    pub last_refreshed: Option<DateTime<Utc>>,
}

impl TrackedAccount {
    /// Create an account with all numeric fields at zero.
    pub fn new<C, D>(address: Address, collateral_assets: C, debt_assets: D) -> Self
    where
        C: IntoIterator,
        C::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        Self {
            address,
            collateral_assets: normalize_symbols(collateral_assets),
            debt_assets: normalize_symbols(debt_assets),
            health_factor: 0.0,
            total_collateral_value: 0.0,
            total_debt_value: 0.0,
            liquidation_threshold: 0.0,
            last_refreshed: None,
        }
    }

    /// Whether `symbol` appears among the collateral or debt assets.
    pub fn holds_asset(&self, symbol: &str) -> bool {
        self.collateral_assets
            .iter()
            .chain(self.debt_assets.iter())
            .any(|s| s.eq_ignore_ascii_case(symbol))
    }

    /// Health factor computed from the stored aggregates.
    ///
    /// `collateral * threshold / debt`, or `+inf` when there is no debt.
    pub fn local_health_factor(&self) -> f64 {
        if self.total_debt_value == 0.0 {
            return f64::INFINITY;
        }
        self.total_collateral_value * self.liquidation_threshold / self.total_debt_value
    }

    /// Check if the account can be liquidated (HF < 1.0).
    pub fn is_liquidatable(&self) -> bool {
        self.health_factor < 1.0
    }

    /// Overwrite the numeric fields from a pool read.
    pub fn apply_position(&mut self, position: &AccountPosition) -> HealthDelta {
        let previous = self.health_factor;

        self.health_factor = position.health_factor_value();
        self.total_collateral_value = position.collateral_value();
        self.total_debt_value = position.debt_value();
        self.liquidation_threshold = position.liquidation_threshold_ratio();
        self.last_refreshed = Some(Utc::now());

        HealthDelta {
            previous,
            current: self.health_factor,
        }
    }
}

impl TryFrom<AccountDescriptor> for TrackedAccount {
    type Error = ConfigError;

    fn try_from(descriptor: AccountDescriptor) -> Result<Self, Self::Error> {
        let address = descriptor
            .account
            .parse()
            .map_err(|_| ConfigError::InvalidAddress {
                field: "account".to_string(),
                value: descriptor.account.clone(),
            })?;

        Ok(Self::new(
            address,
            descriptor.collateral_assets,
            descriptor.debt_assets,
        ))
    }
}

fn normalize_symbols<I>(symbols: I) -> SmallVec<[String; 4]>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    symbols
        .into_iter()
        .map(|s| s.as_ref().trim().to_uppercase())
        .collect()
}

/// Parse an account list from JSON text.
pub fn parse_accounts(json: &str) -> Result<Vec<TrackedAccount>, ConfigError> {
    let descriptors: Vec<AccountDescriptor> = serde_json::from_str(json)?;
    descriptors.into_iter().map(TrackedAccount::try_from).collect()
}

/// Load the account list file and log every tracked account.
pub fn load_accounts(path: impl AsRef<Path>) -> Result<Vec<TrackedAccount>, ConfigError> {
    let path = path.as_ref();
    info!(path = %path.display(), "Loading tracked accounts");

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let accounts = parse_accounts(&content)?;

    for account in &accounts {
        info!(
            account = %account.address,
            collateral = ?account.collateral_assets,
            debt = ?account.debt_assets,
            "Tracking account"
        );
    }
    info!(count = accounts.len(), "Tracked accounts loaded");

    Ok(accounts)
}
