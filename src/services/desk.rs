//! Order desk - places new trades and closes them on request
//!
//! Manual closes go through the same idempotent store close the monitor uses,
//! so a close racing a TP2/SL trigger resolves to a single closed trade. Only
//! the trade's own units are closed at the broker. In paper mode the realized
//! P&L goes to the account balance, as it does for monitor exits.

use crate::broker::{Broker, BrokerError};
use crate::config::TradingConfig;
use crate::pnl::{add_leg, leg_pnl, lots_to_units, signed_units};
use crate::services::metrics::Metrics;
use crate::store::TradeStore;
use crate::types::{NewOrder, NewTrade, Trade, ValidationError};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Desk operation failure
#[derive(Debug, Error)]
pub enum DeskError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Trade {0} not found")]
    NotFound(Uuid),
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Entry point for user-initiated trading actions
pub struct Desk {
    broker: Arc<dyn Broker>,
    store: Arc<dyn TradeStore>,
    trading: TradingConfig,
    metrics: Metrics,
}

impl Desk {
    pub fn new(
        broker: Arc<dyn Broker>,
        store: Arc<dyn TradeStore>,
        trading: TradingConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            broker,
            store,
            trading,
            metrics,
        }
    }

    /// Validate and submit a market order, then record the trade as open
    pub async fn place_order(&self, owner_id: &str, order: NewOrder) -> Result<Trade, DeskError> {
        order.validate()?;

        let instrument = &self.trading.instrument;
        let quote = self.broker.get_current_price(instrument).await;
        let units = signed_units(order.side, order.lot_size, self.trading.contract_size);

        info!(
            "[Desk] {} {} lots {} | TP1 {} ({}%) TP2 {} SL {}",
            order.side, order.lot_size, instrument, order.tp1, order.partial_close_percent, order.tp2, order.sl
        );

        let fill = match self
            .broker
            .place_market_order(instrument, units, Some(order.tp2), Some(order.sl))
            .await
        {
            Ok(fill) => fill,
            Err(e) => {
                self.metrics.inc_broker_failures();
                warn!("[Desk] Order rejected: {}", e);
                return Err(e.into());
            }
        };

        let entry_price = fill.fill_price.unwrap_or_else(|| quote.entry_price(order.side));
        let trade = self
            .store
            .create_trade(NewTrade {
                owner_id: owner_id.to_string(),
                broker_order_id: Some(fill.order_id),
                instrument: instrument.clone(),
                side: order.side,
                lot_size: order.lot_size,
                entry_price,
                price_source: quote.source,
                tp1: order.tp1,
                tp2: order.tp2,
                sl: order.sl,
                partial_close_percent: order.partial_close_percent,
            })
            .await?;

        self.metrics.inc_orders_placed();
        info!(
            "[Desk] Trade {} opened at {}{}",
            trade.id,
            entry_price,
            if fill.paper { " (paper)" } else { "" }
        );

        Ok(trade)
    }

    /// Close a trade at the broker and record its final P&L.
    /// Closing an already-closed trade returns it unchanged.
    pub async fn close_trade(&self, id: Uuid) -> Result<Trade, DeskError> {
        let trade = self.store.get_trade(id).await?.ok_or(DeskError::NotFound(id))?;
        if trade.is_closed() {
            info!("[Desk] Trade {} already closed", id);
            return Ok(trade);
        }

        let units = lots_to_units(trade.lot_size, self.trading.contract_size);
        let closed_price = if units == 0 {
            None
        } else {
            match self.broker.close_position(&trade.instrument, Some(units)).await {
                Ok(close) => close.closed_price,
                Err(BrokerError::NoPosition) => {
                    warn!("[Desk] No {} position at broker for trade {}, recording close", trade.instrument, id);
                    None
                }
                Err(e) => {
                    self.metrics.inc_broker_failures();
                    return Err(e.into());
                }
            }
        };
        let price = match closed_price {
            Some(price) => price,
            None => self.broker.get_current_price(&trade.instrument).await.exit_price(trade.side),
        };

        let realized = add_leg(
            trade.realized_pl,
            leg_pnl(trade.side, trade.entry_price, price, trade.lot_size),
        );
        let close_time = Utc::now();
        let stored = self.store.close_trade(id, close_time, realized).await?;
        let closed = stored.ok_or(DeskError::NotFound(id))?;
        if !closed.closed_with(close_time, realized) {
            info!("[Desk] Trade {} was closed by the monitor first", id);
            return Ok(closed);
        }

        if !self.broker.is_live() {
            self.store
                .credit_realized(&trade.owner_id, self.trading.starting_balance, realized - trade.realized_pl)
                .await?;
        }

        self.metrics.inc_manual_closes();
        info!("[Desk] Trade {} closed at {} | realized {}", id, price, closed.realized_pl);

        Ok(closed)
    }

    /// All trades of an owner, newest first
    pub async fn list_trades(&self, owner_id: &str) -> Result<Vec<Trade>, DeskError> {
        Ok(self.store.list_trades(owner_id).await?)
    }

    /// Open and TP1-hit trades of an owner
    pub async fn active_trades(&self, owner_id: &str) -> Result<Vec<Trade>, DeskError> {
        Ok(self.store.get_active_trades(owner_id).await?)
    }
}
