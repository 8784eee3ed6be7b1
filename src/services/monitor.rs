//! Trade Monitor - drives every active trade through TP1, breakeven, TP2 / SL
//!
//! Each tick values every active trade at the current exit price and fires at
//! most one trigger per trade:
//! - TP1: close `partial_close_percent` of the position, move the stop to entry
//! - TP2: close what is left (only after TP1)
//! - SL: close what is left, at the original or breakeven stop
//!
//! Broker mutations run before the store commit. If one fails the trade is
//! left untouched and the trigger fires again on the next tick. Closes only
//! ever cover the trade's own units; the broker nets every trade on the
//! instrument into one position.

use crate::broker::{Broker, BrokerError};
use crate::config::{MonitorConfig, TradingConfig};
use crate::pnl::{add_leg, leg_pnl, lots_to_units, money, partial_close_lots, reached_stop, reached_target, remaining_lots};
use crate::services::metrics::Metrics;
use crate::store::TradeStore;
use crate::types::{AccountUpdate, Trade, TradeStatus, TradeUpdate};
use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Price level a trade crossed during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Tp1,
    Tp2,
    StopLoss,
}

impl Trigger {
    /// The single trigger `trade` fires at `price`, if any.
    ///
    /// TP1 is checked before TP2 and SL, so a price gapping past both take
    /// profits only fires TP1 this tick.
    pub fn evaluate(trade: &Trade, price: Decimal) -> Option<Trigger> {
        if trade.is_closed() {
            return None;
        }
        if !trade.tp1_hit() && reached_target(trade.side, price, trade.tp1) {
            return Some(Trigger::Tp1);
        }
        if trade.tp1_hit() && reached_target(trade.side, price, trade.tp2) {
            return Some(Trigger::Tp2);
        }
        if reached_stop(trade.side, price, trade.sl) {
            return Some(Trigger::StopLoss);
        }
        None
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Tp1 => "TP1",
            Trigger::Tp2 => "TP2",
            Trigger::StopLoss => "SL",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one monitor tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Active trades looked at
    pub evaluated: usize,
    /// Evaluations that failed (logged, retried next tick)
    pub errors: usize,
    /// Triggers that fired and were committed
    pub fired: Vec<(Uuid, Trigger)>,
}

impl TickReport {
    pub fn fired_for(&self, id: Uuid) -> Option<Trigger> {
        self.fired.iter().find(|(trade_id, _)| *trade_id == id).map(|(_, t)| *t)
    }
}

struct Runner {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodic evaluator of active trades
pub struct TradeMonitor {
    broker: Arc<dyn Broker>,
    store: Arc<dyn TradeStore>,
    trading: TradingConfig,
    config: MonitorConfig,
    metrics: Metrics,
    /// Serializes ticks so a manual `run_tick` never overlaps the scheduled one
    tick_lock: tokio::sync::Mutex<()>,
    runner: Mutex<Option<Runner>>,
}

impl TradeMonitor {
    pub fn new(
        broker: Arc<dyn Broker>,
        store: Arc<dyn TradeStore>,
        trading: TradingConfig,
        config: MonitorConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            broker,
            store,
            trading,
            config,
            metrics,
            tick_lock: tokio::sync::Mutex::new(()),
            runner: Mutex::new(None),
        }
    }

    /// Start the tick loop. Returns false if it was already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut runner = self.lock_runner();
        if runner.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!("[Monitor] Already running");
            return false;
        }

        let token = CancellationToken::new();
        let monitor = Arc::clone(self);
        let loop_token = token.clone();
        let handle = tokio::spawn(async move { monitor.run(loop_token).await });

        *runner = Some(Runner { token, handle });
        true
    }

    /// Stop the tick loop. A tick already in progress completes; no new tick
    /// starts once this returns.
    pub async fn stop(&self) {
        let runner = self.lock_runner().take();
        let Some(runner) = runner else {
            return;
        };

        runner.token.cancel();
        if let Err(e) = runner.handle.await {
            error!("[Monitor] Tick loop ended abnormally: {}", e);
        }
        info!("[Monitor] Stopped");
    }

    pub fn is_running(&self) -> bool {
        self.lock_runner()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    fn lock_runner(&self) -> std::sync::MutexGuard<'_, Option<Runner>> {
        match self.runner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn run(&self, token: CancellationToken) {
        info!(
            "[Monitor] Started for {} (interval: {:?})",
            self.trading.owner_id, self.config.interval
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    let report = self.run_tick().await;
                    if !report.fired.is_empty() || report.errors > 0 {
                        info!(
                            "[Monitor] Tick: {} trades, {} triggers, {} errors",
                            report.evaluated,
                            report.fired.len(),
                            report.errors
                        );
                    }
                }
            }
        }
    }

    /// Evaluate every active trade once
    pub async fn run_tick(&self) -> TickReport {
        let _tick = self.tick_lock.lock().await;
        self.metrics.inc_ticks();

        let mut report = TickReport::default();
        let trades = match self.store.get_active_trades(&self.trading.owner_id).await {
            Ok(trades) => trades,
            Err(e) => {
                error!("[Monitor] Failed to load active trades: {:#}", e);
                report.errors += 1;
                return report;
            }
        };

        let mut realized_delta = Decimal::ZERO;
        for trade in &trades {
            report.evaluated += 1;
            self.metrics.inc_trades_evaluated();

            match self.evaluate(trade).await {
                Ok(Some((trigger, realized))) => {
                    self.metrics.inc_trigger(trigger.as_str());
                    report.fired.push((trade.id, trigger));
                    realized_delta += realized;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("[Monitor] Trade {} evaluation failed: {:#}", trade.id, e);
                    self.metrics.inc_evaluation_errors();
                    report.errors += 1;
                }
            }
        }

        if let Err(e) = self.roll_up_account(realized_delta).await {
            warn!("[Monitor] Account rollup failed: {:#}", e);
        }

        report
    }

    /// Value one trade and act on its trigger.
    /// Returns the trigger and the realized P&L it added, or None if nothing
    /// was committed.
    async fn evaluate(&self, trade: &Trade) -> Result<Option<(Trigger, Decimal)>> {
        if trade.is_closed() {
            return Ok(None);
        }

        let quote = self.broker.get_current_price(&trade.instrument).await;
        if quote.is_simulated() {
            self.metrics.inc_simulated_quotes();
        }
        let price = quote.exit_price(trade.side);
        let unrealized = money(leg_pnl(trade.side, trade.entry_price, price, trade.lot_size));

        let valued = self
            .store
            .update_trade(trade.id, TradeUpdate::valuation(price, unrealized, quote.source))
            .await
            .context("Failed to persist valuation")?;
        let Some(trade) = valued else {
            debug!("[Monitor] Trade {} no longer exists, skipping", trade.id);
            return Ok(None);
        };
        if trade.is_closed() {
            return Ok(None);
        }

        let Some(trigger) = Trigger::evaluate(&trade, price) else {
            return Ok(None);
        };

        if quote.is_simulated() && self.broker.is_live() {
            if !self.config.allow_simulated_triggers {
                warn!(
                    "[Monitor] {} for trade {} reached on a simulated quote ({}), waiting for live price",
                    trigger, trade.id, price
                );
                return Ok(None);
            }
            warn!(
                "[Monitor] {} for trade {} firing on a simulated quote ({})",
                trigger, trade.id, price
            );
        }

        let realized = match trigger {
            Trigger::Tp1 => self.take_partial_profit(&trade, price).await?,
            Trigger::Tp2 | Trigger::StopLoss => self.close_remaining(&trade, price, trigger).await?,
        };

        Ok(realized.map(|realized| (trigger, realized)))
    }

    /// TP1: stop to breakeven, partial close, then one atomic commit
    async fn take_partial_profit(&self, trade: &Trade, price: Decimal) -> Result<Option<Decimal>> {
        if trade.partial_close_percent >= 100 {
            return self.close_all_at_tp1(trade, price).await;
        }

        let close_lots = partial_close_lots(trade.lot_size, trade.partial_close_percent);
        let remaining = remaining_lots(trade.lot_size, trade.partial_close_percent);

        // Must precede the partial close: a retried TP1 may repeat this call, never the close.
        if let Some(order_id) = &trade.broker_order_id {
            self.broker
                .modify_stop_loss(order_id, trade.entry_price)
                .await
                .map_err(|e| self.broker_failure("move stop to breakeven", trade, e))?;
        }

        self.close_units_at_broker(trade, close_lots, "partial close").await?;

        let realized = add_leg(trade.realized_pl, leg_pnl(trade.side, trade.entry_price, price, close_lots));
        let update = TradeUpdate {
            status: Some(TradeStatus::Tp1Hit),
            sl: Some(trade.entry_price),
            lot_size: Some(remaining),
            realized_pl: Some(realized),
            unrealized_pl: Some(money(leg_pnl(trade.side, trade.entry_price, price, remaining))),
            ..Default::default()
        };
        let stored = self
            .store
            .update_trade(trade.id, update)
            .await
            .context("Failed to commit TP1")?;
        if !stored.is_some_and(|t| t.status == TradeStatus::Tp1Hit) {
            self.closed_concurrently(trade, Trigger::Tp1);
            return Ok(None);
        }

        info!(
            "[Monitor] TP1 hit for trade {} at {}: closed {} lots, {} remaining, stop moved to {} | realized {}",
            trade.id, price, close_lots, remaining, trade.entry_price, realized
        );

        Ok(Some(realized - trade.realized_pl))
    }

    /// TP1 with a 100% partial: the whole position goes, the trade closes with TP1 recorded
    async fn close_all_at_tp1(&self, trade: &Trade, price: Decimal) -> Result<Option<Decimal>> {
        self.close_units_at_broker(trade, trade.lot_size, "close position").await?;

        let realized = add_leg(trade.realized_pl, leg_pnl(trade.side, trade.entry_price, price, trade.lot_size));
        let close_time = Utc::now();
        let update = TradeUpdate {
            status: Some(TradeStatus::Closed {
                close_time,
                tp1_hit: true,
            }),
            sl: Some(trade.entry_price),
            lot_size: Some(Decimal::ZERO),
            realized_pl: Some(realized),
            unrealized_pl: Some(Decimal::ZERO),
            ..Default::default()
        };
        let stored = self
            .store
            .update_trade(trade.id, update)
            .await
            .context("Failed to commit TP1 close")?;
        if !stored.is_some_and(|t| t.closed_with(close_time, realized)) {
            self.closed_concurrently(trade, Trigger::Tp1);
            return Ok(None);
        }

        info!(
            "[Monitor] TP1 hit for trade {} at {}: full position closed | realized {}",
            trade.id, price, realized
        );

        Ok(Some(realized - trade.realized_pl))
    }

    /// TP2 / SL: close the remaining lots and move to closed
    async fn close_remaining(&self, trade: &Trade, price: Decimal, trigger: Trigger) -> Result<Option<Decimal>> {
        self.close_units_at_broker(trade, trade.lot_size, "close position").await?;

        let realized = add_leg(trade.realized_pl, leg_pnl(trade.side, trade.entry_price, price, trade.lot_size));
        let close_time = Utc::now();
        let stored = self
            .store
            .close_trade(trade.id, close_time, realized)
            .await
            .with_context(|| format!("Failed to commit {} close", trigger))?;
        if !stored.is_some_and(|t| t.closed_with(close_time, realized)) {
            self.closed_concurrently(trade, trigger);
            return Ok(None);
        }

        info!(
            "[Monitor] {} hit for trade {} at {}: closed {} lots | realized {}",
            trigger, trade.id, price, trade.lot_size, realized
        );

        Ok(Some(realized - trade.realized_pl))
    }

    /// Close `lots` of this trade's units at the broker. An already-flat
    /// position counts as closed.
    async fn close_units_at_broker(&self, trade: &Trade, lots: Decimal, action: &str) -> Result<()> {
        let units = lots_to_units(lots, self.trading.contract_size);
        if units == 0 {
            debug!("[Monitor] {} for trade {} rounds to zero units, nothing to send", action, trade.id);
            return Ok(());
        }

        match self.broker.close_position(&trade.instrument, Some(units)).await {
            Ok(_) => Ok(()),
            Err(BrokerError::NoPosition) => {
                warn!(
                    "[Monitor] No {} position open at broker for trade {} ({}), recording it",
                    trade.instrument, trade.id, action
                );
                Ok(())
            }
            Err(e) => Err(self.broker_failure(action, trade, e)),
        }
    }

    fn closed_concurrently(&self, trade: &Trade, trigger: Trigger) {
        info!(
            "[Monitor] Trade {} was closed before its {} could be recorded, skipping",
            trade.id, trigger
        );
    }

    fn broker_failure(&self, action: &str, trade: &Trade, err: BrokerError) -> anyhow::Error {
        self.metrics.inc_broker_failures();
        anyhow::Error::new(err).context(format!("{} failed for trade {}", action, trade.id))
    }

    /// Roll active unrealized P&L into the owner's account. Without a live
    /// broker to reconcile against, realized legs also move the balance.
    async fn roll_up_account(&self, realized_delta: Decimal) -> Result<()> {
        let owner = &self.trading.owner_id;
        self.store
            .ensure_account(owner, self.trading.starting_balance)
            .await?;

        let active = self.store.get_active_trades(owner).await?;
        let unrealized: Decimal = active.iter().map(|t| t.unrealized_pl).sum();
        let balance_delta = if self.broker.is_live() {
            Decimal::ZERO
        } else {
            realized_delta
        };

        self.store
            .update_account(
                owner,
                AccountUpdate {
                    unrealized_pl: Some(unrealized),
                    balance_delta,
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }
}
