//! Account Sync Service
//! Periodically overwrites the stored account with the broker's own figures

use crate::broker::Broker;
use crate::config::TradingConfig;
use crate::store::TradeStore;
use crate::types::{Account, AccountUpdate, PriceSource};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Broker account reconciler
pub struct AccountSync {
    broker: Arc<dyn Broker>,
    store: Arc<dyn TradeStore>,
    trading: TradingConfig,
}

impl AccountSync {
    pub fn new(broker: Arc<dyn Broker>, store: Arc<dyn TradeStore>, trading: TradingConfig) -> Self {
        Self { broker, store, trading }
    }

    /// Start the reconciliation loop
    pub async fn run(&self, interval: Duration) {
        info!("[AccountSync] Started (interval: {:?})", interval);

        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.reconcile().await {
                error!("[AccountSync] Reconciliation failed: {:#}", e);
            }
        }
    }

    /// Pull the broker summary into the owner's account.
    ///
    /// Only live summaries are applied; a simulated or last-known fallback
    /// would overwrite real figures with stale ones.
    pub async fn reconcile(&self) -> Result<Account> {
        let owner = &self.trading.owner_id;
        let account = self
            .store
            .ensure_account(owner, self.trading.starting_balance)
            .await
            .context("Failed to load account")?;

        if !self.broker.is_live() {
            return Ok(account);
        }

        let summary = self.broker.get_account_summary().await;
        if summary.source != PriceSource::Live {
            debug!("[AccountSync] Broker summary unavailable, keeping stored figures");
            return Ok(account);
        }

        let updated = self
            .store
            .update_account(owner, AccountUpdate::from_summary(&summary))
            .await
            .context("Failed to update account")?
            .unwrap_or(account);

        debug!(
            "[AccountSync] Balance {} | unrealized {} | margin {}",
            updated.balance, updated.unrealized_pl, updated.margin_used
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::FakeBroker;
    use rust_decimal_macros::dec;

    fn sync() -> (Arc<FakeBroker>, AccountSync) {
        let broker = Arc::new(FakeBroker::new(dec!(1987)));
        let store = Arc::new(MemoryStore::new());
        let sync = AccountSync::new(broker.clone(), store, TradingConfig::default());
        (broker, sync)
    }

    #[tokio::test]
    async fn test_paper_account_keeps_local_figures() {
        let (_, sync) = sync();
        let account = sync.reconcile().await.unwrap();
        assert_eq!(account.balance, dec!(10000));
        assert_eq!(account.owner_id, "default-user");
    }

    #[tokio::test]
    async fn test_live_summary_overwrites_account() {
        let (broker, sync) = sync();
        broker.set_live(true);

        let account = sync.reconcile().await.unwrap();
        assert_eq!(account.balance, dec!(25000));
        assert_eq!(account.unrealized_pl, dec!(12.5));
        assert_eq!(account.margin_used, dec!(400));
    }
}
