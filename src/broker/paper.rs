//! Paper trading broker
//!
//! Fills orders locally at the current quote and tracks net units per
//! instrument. Market data and the account summary come from the wrapped
//! broker so paper fills use the same prices the monitor sees.

use super::errors::BrokerError;
use super::Broker;
use crate::types::{AccountSummary, Candle, Granularity, OrderFill, PositionClose, PriceSource, Quote, Side};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

/// Broker that simulates order execution
pub struct PaperBroker {
    market: Arc<dyn Broker>,
    /// Net signed units per instrument
    positions: Mutex<HashMap<String, i64>>,
}

impl PaperBroker {
    pub fn new(market: Arc<dyn Broker>) -> Self {
        Self {
            market,
            positions: Mutex::new(HashMap::new()),
        }
    }

    /// Net signed units currently held on `instrument`
    pub fn net_units(&self, instrument: &str) -> i64 {
        self.with_positions(|positions| positions.get(instrument).copied().unwrap_or(0))
    }

    fn with_positions<T>(&self, f: impl FnOnce(&mut HashMap<String, i64>) -> T) -> T {
        let mut positions = match self.positions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut positions)
    }
}

#[async_trait]
impl Broker for PaperBroker {
    fn is_live(&self) -> bool {
        false
    }

    async fn get_current_price(&self, instrument: &str) -> Quote {
        self.market.get_current_price(instrument).await
    }

    async fn get_candles(&self, instrument: &str, granularity: Granularity, count: usize) -> Vec<Candle> {
        self.market.get_candles(instrument, granularity, count).await
    }

    async fn place_market_order(
        &self,
        instrument: &str,
        units: i64,
        _take_profit: Option<Decimal>,
        _stop_loss: Option<Decimal>,
    ) -> Result<OrderFill, BrokerError> {
        if units == 0 {
            return Err(BrokerError::OrderRejected("units must be non-zero".to_string()));
        }

        let side = if units > 0 { Side::Buy } else { Side::Sell };
        let quote = self.market.get_current_price(instrument).await;
        let fill_price = quote.entry_price(side);

        let net = self.with_positions(|positions| {
            let net = positions.entry(instrument.to_string()).or_insert(0);
            *net += units;
            *net
        });

        let order_id = format!("paper-{}", Uuid::new_v4());
        info!(
            "[PAPER] Filled {} {} units of {} at {} (net {})",
            side, units.unsigned_abs(), instrument, fill_price, net
        );

        Ok(OrderFill {
            order_id,
            fill_price: Some(fill_price),
            paper: true,
        })
    }

    async fn close_position(
        &self,
        instrument: &str,
        partial_units: Option<u64>,
    ) -> Result<PositionClose, BrokerError> {
        let (closed, net) = self.with_positions(|positions| {
            let net = positions.get(instrument).copied().unwrap_or(0);
            if net == 0 {
                return Err(BrokerError::NoPosition);
            }

            let held = net.unsigned_abs();
            let closing = partial_units.map(|u| u.min(held)).unwrap_or(held);
            let remaining = held - closing;
            let signed_remaining = if net > 0 { remaining as i64 } else { -(remaining as i64) };

            if signed_remaining == 0 {
                positions.remove(instrument);
            } else {
                positions.insert(instrument.to_string(), signed_remaining);
            }
            Ok((closing, net))
        })?;

        let side = if net > 0 { Side::Buy } else { Side::Sell };
        let quote = self.market.get_current_price(instrument).await;
        let closed_price = quote.exit_price(side);

        info!("[PAPER] Closed {} units of {} at {}", closed, instrument, closed_price);

        Ok(PositionClose {
            closed_price: Some(closed_price),
            paper: true,
        })
    }

    async fn modify_stop_loss(&self, order_id: &str, new_price: Decimal) -> Result<(), BrokerError> {
        info!("[PAPER] Stop loss for {} moved to {}", order_id, new_price);
        Ok(())
    }

    async fn get_account_summary(&self) -> AccountSummary {
        let summary = self.market.get_account_summary().await;
        AccountSummary {
            source: PriceSource::Simulated,
            ..summary
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::OandaClient;
    use crate::config::BrokerConfig;
    use rust_decimal_macros::dec;

    fn paper() -> PaperBroker {
        let market = OandaClient::new(BrokerConfig::default()).unwrap();
        PaperBroker::new(Arc::new(market))
    }

    #[tokio::test]
    async fn test_paper_fill_tracks_position() {
        let broker = paper();

        let fill = broker
            .place_market_order("XAU_USD", 100_000, Some(dec!(1995)), Some(dec!(1980)))
            .await
            .unwrap();
        assert!(fill.paper);
        assert!(fill.order_id.starts_with("paper-"));
        assert!(fill.fill_price.is_some());
        assert_eq!(broker.net_units("XAU_USD"), 100_000);

        broker.close_position("XAU_USD", Some(75_000)).await.unwrap();
        assert_eq!(broker.net_units("XAU_USD"), 25_000);

        broker.close_position("XAU_USD", None).await.unwrap();
        assert_eq!(broker.net_units("XAU_USD"), 0);
    }

    #[tokio::test]
    async fn test_paper_close_without_position() {
        let broker = paper();
        let result = broker.close_position("XAU_USD", None).await;
        assert_eq!(result.unwrap_err(), BrokerError::NoPosition);
    }

    #[tokio::test]
    async fn test_paper_partial_close_is_capped() {
        let broker = paper();
        broker.place_market_order("XAU_USD", -50_000, None, None).await.unwrap();

        broker.close_position("XAU_USD", Some(80_000)).await.unwrap();
        assert_eq!(broker.net_units("XAU_USD"), 0);
    }

    #[tokio::test]
    async fn test_paper_is_never_live() {
        let broker = paper();
        assert!(!broker.is_live());
        assert!(broker.modify_stop_loss("paper-1", dec!(1987)).await.is_ok());
        assert_eq!(broker.get_account_summary().await.source, PriceSource::Simulated);
    }
}
