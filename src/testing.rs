//! Scripted collaborators for service tests

use crate::broker::{Broker, BrokerError};
use crate::store::{MemoryStore, TradeStore};
use crate::types::{
    AccountSummary, Candle, Granularity, NewTrade, OrderFill, PositionClose, PriceSource, Quote, Side, Trade,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Broker call recorded by `FakeBroker`
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerCall {
    Order { units: i64 },
    Close { partial_units: Option<u64> },
    ModifyStop { order_id: String, price: Decimal },
}

/// Broker with a settable price and switchable failures.
///
/// Quotes have zero spread so the exit price equals the scripted price on
/// both sides.
pub struct FakeBroker {
    price: Mutex<Decimal>,
    source: Mutex<PriceSource>,
    live: AtomicBool,
    fail_orders: AtomicBool,
    fail_closes: AtomicBool,
    fail_stop_changes: AtomicBool,
    flat: AtomicBool,
    calls: Mutex<Vec<BrokerCall>>,
}

impl FakeBroker {
    pub fn new(price: Decimal) -> Self {
        Self {
            price: Mutex::new(price),
            source: Mutex::new(PriceSource::Live),
            live: AtomicBool::new(false),
            fail_orders: AtomicBool::new(false),
            fail_closes: AtomicBool::new(false),
            fail_stop_changes: AtomicBool::new(false),
            flat: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_price(&self, price: Decimal) {
        *self.price.lock().unwrap() = price;
    }

    pub fn set_source(&self, source: PriceSource) {
        *self.source.lock().unwrap() = source;
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }

    pub fn fail_orders(&self, fail: bool) {
        self.fail_orders.store(fail, Ordering::SeqCst);
    }

    pub fn fail_closes(&self, fail: bool) {
        self.fail_closes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_stop_changes(&self, fail: bool) {
        self.fail_stop_changes.store(fail, Ordering::SeqCst);
    }

    /// Report every close as "no position"
    pub fn set_flat(&self, flat: bool) {
        self.flat.store(flat, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<BrokerCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: BrokerCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn current(&self) -> Decimal {
        *self.price.lock().unwrap()
    }
}

#[async_trait]
impl Broker for FakeBroker {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn get_current_price(&self, instrument: &str) -> Quote {
        let price = self.current();
        let source = *self.source.lock().unwrap();
        Quote::new(instrument, price, price, source)
    }

    async fn get_candles(&self, _instrument: &str, _granularity: Granularity, _count: usize) -> Vec<Candle> {
        Vec::new()
    }

    async fn place_market_order(
        &self,
        _instrument: &str,
        units: i64,
        _take_profit: Option<Decimal>,
        _stop_loss: Option<Decimal>,
    ) -> Result<OrderFill, BrokerError> {
        self.record(BrokerCall::Order { units });
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(BrokerError::InsufficientMargin);
        }
        Ok(OrderFill {
            order_id: "fake-order".to_string(),
            fill_price: Some(self.current()),
            paper: false,
        })
    }

    async fn close_position(
        &self,
        _instrument: &str,
        partial_units: Option<u64>,
    ) -> Result<PositionClose, BrokerError> {
        self.record(BrokerCall::Close { partial_units });
        if self.fail_closes.load(Ordering::SeqCst) {
            return Err(BrokerError::Network("connection reset".to_string()));
        }
        if self.flat.load(Ordering::SeqCst) {
            return Err(BrokerError::NoPosition);
        }
        Ok(PositionClose {
            closed_price: Some(self.current()),
            paper: false,
        })
    }

    async fn modify_stop_loss(&self, order_id: &str, new_price: Decimal) -> Result<(), BrokerError> {
        self.record(BrokerCall::ModifyStop {
            order_id: order_id.to_string(),
            price: new_price,
        });
        if self.fail_stop_changes.load(Ordering::SeqCst) {
            return Err(BrokerError::Network("timeout".to_string()));
        }
        Ok(())
    }

    async fn get_account_summary(&self) -> AccountSummary {
        AccountSummary {
            balance: dec!(25000),
            unrealized_pl: dec!(12.5),
            margin_used: dec!(400),
            source: if self.is_live() { PriceSource::Live } else { PriceSource::Simulated },
        }
    }
}

/// Buy 1.0 lot at 1987, TP1 1990 (75%), TP2 1995, SL 1980
pub fn buy_ticket() -> NewTrade {
    NewTrade {
        owner_id: "default-user".to_string(),
        broker_order_id: Some("42".to_string()),
        instrument: "XAU_USD".to_string(),
        side: Side::Buy,
        lot_size: dec!(1.0),
        entry_price: dec!(1987.00),
        price_source: PriceSource::Live,
        tp1: dec!(1990.00),
        tp2: dec!(1995.00),
        sl: dec!(1980.00),
        partial_close_percent: 75,
    }
}

/// Sell 1.0 lot at 2000, TP1 1995 (75%), TP2 1990, SL 2005
pub fn sell_ticket() -> NewTrade {
    NewTrade {
        side: Side::Sell,
        entry_price: dec!(2000.00),
        tp1: dec!(1995.00),
        tp2: dec!(1990.00),
        sl: dec!(2005.00),
        ..buy_ticket()
    }
}

pub async fn seed(store: &MemoryStore, ticket: NewTrade) -> Trade {
    store.create_trade(ticket).await.unwrap()
}
