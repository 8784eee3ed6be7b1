//! Trade and account persistence
//!
//! The monitor and the desk only talk to `TradeStore`; `MemoryStore` keeps
//! everything in process. Each call is atomic per record: an update applies
//! all of its fields or none.

use crate::types::{Account, AccountUpdate, NewTrade, Trade, TradeStatus, TradeUpdate};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Storage for trades and per-owner accounts
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn get_trade(&self, id: Uuid) -> Result<Option<Trade>>;

    /// All trades of an owner, newest first
    async fn list_trades(&self, owner_id: &str) -> Result<Vec<Trade>>;

    /// Trades of an owner that are not closed, newest first
    async fn get_active_trades(&self, owner_id: &str) -> Result<Vec<Trade>>;

    async fn create_trade(&self, trade: NewTrade) -> Result<Trade>;

    /// Apply a partial update. Returns None if the trade does not exist;
    /// a closed trade is returned unchanged.
    async fn update_trade(&self, id: Uuid, update: TradeUpdate) -> Result<Option<Trade>>;

    /// Move a trade to closed with its final realized P&L.
    /// Closing an already-closed trade returns it unchanged.
    async fn close_trade(&self, id: Uuid, close_time: DateTime<Utc>, realized_pl: Decimal) -> Result<Option<Trade>>;

    async fn get_account(&self, owner_id: &str) -> Result<Option<Account>>;

    async fn create_account(&self, owner_id: &str, balance: Decimal) -> Result<Account>;

    /// Apply an account update. Returns None if the owner has no account.
    async fn update_account(&self, owner_id: &str, update: AccountUpdate) -> Result<Option<Account>>;

    /// Add realized P&L to the owner's balance, creating the account first if needed
    async fn credit_realized(&self, owner_id: &str, starting_balance: Decimal, amount: Decimal) -> Result<Account> {
        self.ensure_account(owner_id, starting_balance).await?;
        let update = AccountUpdate {
            balance_delta: amount,
            ..Default::default()
        };
        self.update_account(owner_id, update)
            .await?
            .ok_or_else(|| anyhow!("Account for {} disappeared", owner_id))
    }

    /// Fetch the owner's account, creating it with `starting_balance` if missing
    async fn ensure_account(&self, owner_id: &str, starting_balance: Decimal) -> Result<Account> {
        match self.get_account(owner_id).await? {
            Some(account) => Ok(account),
            None => self.create_account(owner_id, starting_balance).await,
        }
    }
}

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    trades: RwLock<HashMap<Uuid, Trade>>,
    accounts: RwLock<HashMap<String, Account>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut trades: Vec<Trade>) -> Vec<Trade> {
    trades.sort_by(|a, b| b.open_time.cmp(&a.open_time));
    trades
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn get_trade(&self, id: Uuid) -> Result<Option<Trade>> {
        Ok(self.trades.read().await.get(&id).cloned())
    }

    async fn list_trades(&self, owner_id: &str) -> Result<Vec<Trade>> {
        let trades = self.trades.read().await;
        Ok(newest_first(
            trades.values().filter(|t| t.owner_id == owner_id).cloned().collect(),
        ))
    }

    async fn get_active_trades(&self, owner_id: &str) -> Result<Vec<Trade>> {
        let trades = self.trades.read().await;
        Ok(newest_first(
            trades
                .values()
                .filter(|t| t.owner_id == owner_id && !t.is_closed())
                .cloned()
                .collect(),
        ))
    }

    async fn create_trade(&self, new: NewTrade) -> Result<Trade> {
        if new.lot_size <= Decimal::ZERO {
            bail!("Cannot create trade with non-positive lot size {}", new.lot_size);
        }

        let trade = Trade {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            broker_order_id: new.broker_order_id,
            instrument: new.instrument,
            side: new.side,
            lot_size: new.lot_size,
            entry_price: new.entry_price,
            current_price: new.entry_price,
            price_source: new.price_source,
            tp1: new.tp1,
            tp2: new.tp2,
            sl: new.sl,
            partial_close_percent: new.partial_close_percent,
            status: TradeStatus::Open,
            unrealized_pl: Decimal::ZERO,
            realized_pl: Decimal::ZERO,
            open_time: Utc::now(),
        };

        debug!("[Store] Created trade {} ({} {} lots)", trade.id, trade.side, trade.lot_size);
        self.trades.write().await.insert(trade.id, trade.clone());
        Ok(trade)
    }

    async fn update_trade(&self, id: Uuid, update: TradeUpdate) -> Result<Option<Trade>> {
        let mut trades = self.trades.write().await;
        Ok(trades.get_mut(&id).map(|trade| {
            trade.apply(&update);
            trade.clone()
        }))
    }

    async fn close_trade(&self, id: Uuid, close_time: DateTime<Utc>, realized_pl: Decimal) -> Result<Option<Trade>> {
        let mut trades = self.trades.write().await;
        Ok(trades.get_mut(&id).map(|trade| {
            if trade.close(close_time, realized_pl) {
                trade.unrealized_pl = Decimal::ZERO;
                debug!("[Store] Closed trade {} with realized P&L {}", id, realized_pl);
            }
            trade.clone()
        }))
    }

    async fn get_account(&self, owner_id: &str) -> Result<Option<Account>> {
        Ok(self.accounts.read().await.get(owner_id).cloned())
    }

    async fn create_account(&self, owner_id: &str, balance: Decimal) -> Result<Account> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .entry(owner_id.to_string())
            .or_insert_with(|| Account {
                id: Uuid::new_v4(),
                owner_id: owner_id.to_string(),
                balance,
                unrealized_pl: Decimal::ZERO,
                margin_used: Decimal::ZERO,
                last_updated: Utc::now(),
            });
        Ok(account.clone())
    }

    async fn update_account(&self, owner_id: &str, update: AccountUpdate) -> Result<Option<Account>> {
        let mut accounts = self.accounts.write().await;
        Ok(accounts.get_mut(owner_id).map(|account| {
            if let Some(balance) = update.balance {
                account.balance = balance;
            }
            account.balance += update.balance_delta;
            if let Some(pl) = update.unrealized_pl {
                account.unrealized_pl = pl;
            }
            if let Some(margin) = update.margin_used {
                account.margin_used = margin;
            }
            account.last_updated = Utc::now();
            account.clone()
        }))
    }
}
