//! Single-writer account store.
//!
//! The [`RiskTracker`] lives inside one task. Event handlers and the periodic
//! loop talk to it through a cloneable [`StoreHandle`], so refreshes never
//! interleave and the account list needs no lock.
//!
//! Fire-and-forget commands (pair and address refreshes) have nobody to report
//! to: under [`FailurePolicy::Abort`](crate::FailurePolicy::Abort) their first
//! failure stops the store task with that error. Commands with a reply return
//! the error to the caller instead.

use alloy::primitives::Address;
use monitor_chain::{ChainConnector, ChainError, PricePair};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::account::TrackedAccount;
use crate::error::{MonitorError, Result};
use crate::tracker::{RefreshSummary, RiskTracker};

type Reply<T> = oneshot::Sender<T>;

enum Command {
    RefreshPair(PricePair),
    RefreshAddress(Address),
    RefreshAll(Reply<std::result::Result<RefreshSummary, ChainError>>),
    RefreshTop {
        top_n: usize,
        reply: Reply<std::result::Result<RefreshSummary, ChainError>>,
    },
    RankByRisk {
        top_n: usize,
        reply: Reply<Vec<TrackedAccount>>,
    },
    Snapshot(Reply<Vec<TrackedAccount>>),
}

/// Owner task of the tracked accounts.
pub struct AccountStore {
    tracker: RiskTracker,
    connector: Arc<dyn ChainConnector>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl AccountStore {
    /// Start the store task. The task ends when every handle is dropped.
    pub fn spawn(
        tracker: RiskTracker,
        connector: Arc<dyn ChainConnector>,
    ) -> (StoreHandle, JoinHandle<Result<()>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = Self {
            tracker,
            connector,
            commands: rx,
        };
        let task = tokio::spawn(store.run());
        (StoreHandle { commands: tx }, task)
    }

    async fn run(mut self) -> Result<()> {
        info!(accounts = self.tracker.len(), "Account store started");

        while let Some(command) = self.commands.recv().await {
            let connector = self.connector.as_ref();
            match command {
                Command::RefreshPair(pair) => {
                    if let Err(e) = self.tracker.refresh_accounts_for_pair(&pair, connector).await {
                        error!(pair = %pair, error = %e, "Pair refresh aborted, stopping account store");
                        return Err(e.into());
                    }
                }
                Command::RefreshAddress(address) => {
                    match self.tracker.refresh_address(&address, connector).await {
                        Ok(None) => debug!(account = %address, "Address is not tracked"),
                        Ok(Some(_)) => {}
                        Err(e) => {
                            error!(account = %address, error = %e, "Account refresh aborted, stopping account store");
                            return Err(e.into());
                        }
                    }
                }
                Command::RefreshAll(reply) => {
                    let _ = reply.send(self.tracker.refresh_all(connector).await);
                }
                Command::RefreshTop { top_n, reply } => {
                    let _ = reply.send(self.tracker.refresh_top(top_n, connector).await);
                }
                Command::RankByRisk { top_n, reply } => {
                    let ranked = self.tracker.rank_by_risk(top_n).into_iter().cloned().collect();
                    let _ = reply.send(ranked);
                }
                Command::Snapshot(reply) => {
                    let _ = reply.send(self.tracker.accounts().to_vec());
                }
            }
        }

        info!("Account store stopped");
        Ok(())
    }
}

/// Cloneable sender side of the [`AccountStore`].
#[derive(Clone)]
pub struct StoreHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl StoreHandle {
    /// Queue a refresh of every account exposed to `pair`.
    pub fn refresh_pair(&self, pair: PricePair) -> Result<()> {
        self.send(Command::RefreshPair(pair))
    }

    /// Queue a refresh of one account; untracked addresses are ignored.
    pub fn refresh_address(&self, address: Address) -> Result<()> {
        self.send(Command::RefreshAddress(address))
    }

    /// Refresh every account and wait for the result.
    pub async fn refresh_all(&self) -> Result<RefreshSummary> {
        Ok(self.request(Command::RefreshAll).await??)
    }

    /// Refresh the `top_n` riskiest accounts and wait for the result.
    pub async fn refresh_top(&self, top_n: usize) -> Result<RefreshSummary> {
        Ok(self
            .request(|reply| Command::RefreshTop { top_n, reply })
            .await??)
    }

    /// The `top_n` riskiest accounts, riskiest first.
    pub async fn rank_by_risk(&self, top_n: usize) -> Result<Vec<TrackedAccount>> {
        self.request(|reply| Command::RankByRisk { top_n, reply })
            .await
    }

    /// Copy of every account in insertion order.
    pub async fn snapshot(&self) -> Result<Vec<TrackedAccount>> {
        self.request(Command::Snapshot).await
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| MonitorError::StoreClosed)
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx))?;
        rx.await.map_err(|_| MonitorError::StoreClosed)
    }
}
