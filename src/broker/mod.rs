//! Broker client
//!
//! `Broker` is the seam between trading logic and the execution venue. The
//! OANDA client talks to the REST API; the paper broker fills locally on top
//! of the same market data.

pub mod errors;
pub mod oanda;
pub mod paper;
pub mod retry;
pub mod simulated;

pub use errors::BrokerError;
pub use oanda::OandaClient;
pub use paper::PaperBroker;
pub use retry::{with_retry, RetryConfig};
pub use simulated::MarketSimulator;

use crate::config::Config;
use crate::types::{AccountSummary, Candle, Granularity, OrderFill, PositionClose, Quote};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// Execution venue and market data source
#[async_trait]
pub trait Broker: Send + Sync {
    /// Whether orders reach a real account
    fn is_live(&self) -> bool;

    /// Current quote. Never fails: falls back to a simulated quote tagged as such.
    async fn get_current_price(&self, instrument: &str) -> Quote;

    /// Recent candles, oldest first. Never fails: falls back to simulated candles.
    async fn get_candles(&self, instrument: &str, granularity: Granularity, count: usize) -> Vec<Candle>;

    /// Submit a market order. Positive units buy, negative units sell.
    async fn place_market_order(
        &self,
        instrument: &str,
        units: i64,
        take_profit: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> Result<OrderFill, BrokerError>;

    /// Close `partial_units` of the instrument's position, or all of it when None
    async fn close_position(
        &self,
        instrument: &str,
        partial_units: Option<u64>,
    ) -> Result<PositionClose, BrokerError>;

    /// Replace the stop-loss attached to a broker trade
    async fn modify_stop_loss(&self, order_id: &str, new_price: Decimal) -> Result<(), BrokerError>;

    /// Account figures. Never fails: falls back to the last known summary.
    async fn get_account_summary(&self) -> AccountSummary;
}

/// Build the broker selected by configuration
pub fn build_broker(config: &Config) -> anyhow::Result<Arc<dyn Broker>> {
    let oanda: Arc<dyn Broker> = Arc::new(OandaClient::new(config.broker.clone())?);

    if config.paper_trading {
        info!("[Broker] Paper trading enabled - orders are filled locally");
        Ok(Arc::new(PaperBroker::new(oanda)))
    } else {
        info!(
            "[Broker] Live trading against {} (configured: {})",
            config.broker.base_url,
            config.broker.is_configured()
        );
        Ok(oanda)
    }
}
