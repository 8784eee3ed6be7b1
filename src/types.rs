//! Core types for the trade automator

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Trading side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buy, -1 for sell
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" | "long" => Ok(Side::Buy),
            "sell" | "short" => Ok(Side::Sell),
            other => Err(format!("unknown side: {}", other)),
        }
    }
}

/// Where a price or account figure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Live,
    Simulated,
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceSource::Live => write!(f, "live"),
            PriceSource::Simulated => write!(f, "simulated"),
        }
    }
}

/// Top-of-book quote for an instrument
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub instrument: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub spread: Decimal,
    pub time: DateTime<Utc>,
    pub source: PriceSource,
}

impl Quote {
    pub fn new(instrument: &str, bid: Decimal, ask: Decimal, source: PriceSource) -> Self {
        Self {
            instrument: instrument.to_string(),
            bid,
            ask,
            spread: ask - bid,
            time: Utc::now(),
            source,
        }
    }

    /// Price a position on `side` can be closed at (bid for buy, ask for sell)
    pub fn exit_price(&self, side: Side) -> Decimal {
        match side {
            Side::Buy => self.bid,
            Side::Sell => self.ask,
        }
    }

    /// Price a position on `side` is opened at (ask for buy, bid for sell)
    pub fn entry_price(&self, side: Side) -> Decimal {
        match side {
            Side::Buy => self.ask,
            Side::Sell => self.bid,
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.source == PriceSource::Simulated
    }
}

/// Candle granularity supported by the broker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    #[default]
    M1,
    M5,
    M15,
    H1,
    H4,
    D,
}

impl Granularity {
    pub const ALL: [Granularity; 6] = [
        Granularity::M1,
        Granularity::M5,
        Granularity::M15,
        Granularity::H1,
        Granularity::H4,
        Granularity::D,
    ];

    /// Broker wire code
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::M1 => "M1",
            Granularity::M5 => "M5",
            Granularity::M15 => "M15",
            Granularity::H1 => "H1",
            Granularity::H4 => "H4",
            Granularity::D => "D",
        }
    }

    /// Length of one candle in seconds
    pub fn seconds(&self) -> i64 {
        match self {
            Granularity::M1 => 60,
            Granularity::M5 => 5 * 60,
            Granularity::M15 => 15 * 60,
            Granularity::H1 => 60 * 60,
            Granularity::H4 => 4 * 60 * 60,
            Granularity::D => 24 * 60 * 60,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Granularity::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unsupported granularity: {} (expected M1, M5, M15, H1, H4 or D)", s))
    }
}

/// OHLCV candle; `time` is the candle open in unix seconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    pub time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

/// Result of a filled market order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFill {
    /// Broker trade identifier used for later stop-loss modification
    pub order_id: String,
    /// None when the broker accepted the order without reporting a fill price
    pub fill_price: Option<Decimal>,
    pub paper: bool,
}

/// Result of a position close
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionClose {
    pub closed_price: Option<Decimal>,
    pub paper: bool,
}

/// Broker account summary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub balance: Decimal,
    #[serde(rename = "unrealizedPL")]
    pub unrealized_pl: Decimal,
    pub margin_used: Decimal,
    pub source: PriceSource,
}

/// Lifecycle state of a trade.
///
/// `tp1_hit` and the close time are carried by the variants, so a trade can
/// never be closed without a close time or report a TP1 hit while open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    Open,
    Tp1Hit,
    Closed {
        close_time: DateTime<Utc>,
        tp1_hit: bool,
    },
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "open",
            TradeStatus::Tp1Hit => "tp1_hit",
            TradeStatus::Closed { .. } => "closed",
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A managed position with two take-profit levels and a stop-loss
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub id: Uuid,
    pub owner_id: String,
    pub broker_order_id: Option<String>,
    pub instrument: String,
    pub side: Side,
    /// Remaining lots; reduced when TP1 partially closes the position
    pub lot_size: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub price_source: PriceSource,
    pub tp1: Decimal,
    pub tp2: Decimal,
    pub sl: Decimal,
    pub partial_close_percent: u8,
    pub status: TradeStatus,
    pub unrealized_pl: Decimal,
    pub realized_pl: Decimal,
    pub open_time: DateTime<Utc>,
}

impl Trade {
    pub fn tp1_hit(&self) -> bool {
        match self.status {
            TradeStatus::Open => false,
            TradeStatus::Tp1Hit => true,
            TradeStatus::Closed { tp1_hit, .. } => tp1_hit,
        }
    }

    /// The stop is relocated to entry exactly when TP1 fires
    pub fn sl_moved_to_breakeven(&self) -> bool {
        self.tp1_hit()
    }

    pub fn close_time(&self) -> Option<DateTime<Utc>> {
        match self.status {
            TradeStatus::Closed { close_time, .. } => Some(close_time),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.status, TradeStatus::Closed { .. })
    }

    /// Whether this trade was closed by the close carrying `close_time` and `realized_pl`
    pub fn closed_with(&self, close_time: DateTime<Utc>, realized_pl: Decimal) -> bool {
        self.close_time() == Some(close_time) && self.realized_pl == realized_pl
    }

    /// Apply a partial update. Closed trades are never mutated.
    pub fn apply(&mut self, update: &TradeUpdate) {
        if self.is_closed() {
            return;
        }
        if let Some(price) = update.current_price {
            self.current_price = price;
        }
        if let Some(source) = update.price_source {
            self.price_source = source;
        }
        if let Some(pl) = update.unrealized_pl {
            self.unrealized_pl = pl;
        }
        if let Some(lots) = update.lot_size {
            self.lot_size = lots;
        }
        if let Some(sl) = update.sl {
            self.sl = sl;
        }
        if let Some(pl) = update.realized_pl {
            self.realized_pl = pl;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
    }

    /// Move to the terminal state. Returns false if the trade was already closed.
    pub fn close(&mut self, close_time: DateTime<Utc>, realized_pl: Decimal) -> bool {
        if self.is_closed() {
            return false;
        }
        self.status = TradeStatus::Closed {
            close_time,
            tp1_hit: self.tp1_hit(),
        };
        self.realized_pl = realized_pl;
        true
    }

    pub fn view(&self) -> TradeView {
        TradeView::from(self)
    }
}

/// Partial set of trade fields written in one atomic store update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeUpdate {
    pub current_price: Option<Decimal>,
    pub price_source: Option<PriceSource>,
    pub unrealized_pl: Option<Decimal>,
    pub lot_size: Option<Decimal>,
    pub sl: Option<Decimal>,
    pub status: Option<TradeStatus>,
    pub realized_pl: Option<Decimal>,
}

impl TradeUpdate {
    /// Live valuation written every tick
    pub fn valuation(current_price: Decimal, unrealized_pl: Decimal, source: PriceSource) -> Self {
        Self {
            current_price: Some(current_price),
            price_source: Some(source),
            unrealized_pl: Some(unrealized_pl),
            ..Default::default()
        }
    }
}

/// Fields needed to create a trade record; id, open time and status are assigned by the store
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub owner_id: String,
    pub broker_order_id: Option<String>,
    pub instrument: String,
    pub side: Side,
    pub lot_size: Decimal,
    pub entry_price: Decimal,
    pub price_source: PriceSource,
    pub tp1: Decimal,
    pub tp2: Decimal,
    pub sl: Decimal,
    pub partial_close_percent: u8,
}

/// Flat JSON view of a trade
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeView {
    pub id: Uuid,
    pub owner_id: String,
    pub broker_order_id: Option<String>,
    pub instrument: String,
    pub side: Side,
    pub lot_size: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub price_source: PriceSource,
    pub tp1: Decimal,
    pub tp2: Decimal,
    pub sl: Decimal,
    pub partial_close_percent: u8,
    pub status: &'static str,
    pub tp1_hit: bool,
    pub sl_moved_to_breakeven: bool,
    #[serde(rename = "unrealizedPL")]
    pub unrealized_pl: Decimal,
    #[serde(rename = "realizedPL")]
    pub realized_pl: Decimal,
    pub open_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
}

impl From<&Trade> for TradeView {
    fn from(trade: &Trade) -> Self {
        Self {
            id: trade.id,
            owner_id: trade.owner_id.clone(),
            broker_order_id: trade.broker_order_id.clone(),
            instrument: trade.instrument.clone(),
            side: trade.side,
            lot_size: trade.lot_size,
            entry_price: trade.entry_price,
            current_price: trade.current_price,
            price_source: trade.price_source,
            tp1: trade.tp1,
            tp2: trade.tp2,
            sl: trade.sl,
            partial_close_percent: trade.partial_close_percent,
            status: trade.status.as_str(),
            tp1_hit: trade.tp1_hit(),
            sl_moved_to_breakeven: trade.sl_moved_to_breakeven(),
            unrealized_pl: trade.unrealized_pl,
            realized_pl: trade.realized_pl,
            open_time: trade.open_time,
            close_time: trade.close_time(),
        }
    }
}

/// Order ticket submitted by the user
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub side: Side,
    pub lot_size: Decimal,
    pub tp1: Decimal,
    pub tp2: Decimal,
    pub sl: Decimal,
    #[serde(default = "default_partial_close_percent")]
    pub partial_close_percent: u8,
}

fn default_partial_close_percent() -> u8 {
    75
}

/// Order ticket rejected before reaching the broker
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Lot size must be a positive number")]
    NonPositiveLotSize,
    #[error("{0} must be a positive number")]
    NonPositiveLevel(&'static str),
    #[error("Partial close percent must be between 1 and 100 (got {0})")]
    PartialCloseOutOfRange(u8),
    #[error("Invalid TP/SL levels for {} order", .0.as_str())]
    InvalidLevels(Side),
}

impl NewOrder {
    /// Check sizing and the TP/SL ordering for the side
    /// (buy: sl < tp1 < tp2, sell: sl > tp1 > tp2)
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.lot_size <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveLotSize);
        }
        for (name, level) in [("TP1", self.tp1), ("TP2", self.tp2), ("SL", self.sl)] {
            if level <= Decimal::ZERO {
                return Err(ValidationError::NonPositiveLevel(name));
            }
        }
        if !(1..=100).contains(&self.partial_close_percent) {
            return Err(ValidationError::PartialCloseOutOfRange(self.partial_close_percent));
        }

        let ordered = match self.side {
            Side::Buy => self.tp1 > self.sl && self.tp2 > self.tp1,
            Side::Sell => self.tp1 < self.sl && self.tp2 < self.tp1,
        };
        if !ordered {
            return Err(ValidationError::InvalidLevels(self.side));
        }

        Ok(())
    }
}

/// Per-owner account aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub owner_id: String,
    pub balance: Decimal,
    #[serde(rename = "unrealizedPL")]
    pub unrealized_pl: Decimal,
    pub margin_used: Decimal,
    pub last_updated: DateTime<Utc>,
}

/// Account mutation applied atomically by the store.
///
/// `balance` replaces the balance before `balance_delta` is added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountUpdate {
    pub balance: Option<Decimal>,
    pub balance_delta: Decimal,
    pub unrealized_pl: Option<Decimal>,
    pub margin_used: Option<Decimal>,
}

impl AccountUpdate {
    /// Overwrite with a broker summary
    pub fn from_summary(summary: &AccountSummary) -> Self {
        Self {
            balance: Some(summary.balance),
            balance_delta: Decimal::ZERO,
            unrealized_pl: Some(summary.unrealized_pl),
            margin_used: Some(summary.margin_used),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(side: Side, tp1: Decimal, tp2: Decimal, sl: Decimal) -> NewOrder {
        NewOrder {
            side,
            lot_size: dec!(1.0),
            tp1,
            tp2,
            sl,
            partial_close_percent: 75,
        }
    }

    fn open_trade() -> Trade {
        Trade {
            id: Uuid::new_v4(),
            owner_id: "default-user".to_string(),
            broker_order_id: Some("42".to_string()),
            instrument: "XAU_USD".to_string(),
            side: Side::Buy,
            lot_size: dec!(1.0),
            entry_price: dec!(1987.00),
            current_price: dec!(1987.00),
            price_source: PriceSource::Live,
            tp1: dec!(1990.00),
            tp2: dec!(1995.00),
            sl: dec!(1980.00),
            partial_close_percent: 75,
            status: TradeStatus::Open,
            unrealized_pl: Decimal::ZERO,
            realized_pl: Decimal::ZERO,
            open_time: Utc::now(),
        }
    }

    #[test]
    fn test_validate_buy_levels() {
        assert!(order(Side::Buy, dec!(1990), dec!(1995), dec!(1980)).validate().is_ok());
        assert_eq!(
            order(Side::Buy, dec!(1980), dec!(1995), dec!(1985)).validate(),
            Err(ValidationError::InvalidLevels(Side::Buy))
        );
        assert_eq!(
            order(Side::Buy, dec!(1990), dec!(1990), dec!(1980)).validate(),
            Err(ValidationError::InvalidLevels(Side::Buy))
        );
    }

    #[test]
    fn test_validate_sell_levels() {
        assert!(order(Side::Sell, dec!(1995), dec!(1990), dec!(2005)).validate().is_ok());
        assert_eq!(
            order(Side::Sell, dec!(1990), dec!(1995), dec!(2005)).validate(),
            Err(ValidationError::InvalidLevels(Side::Sell))
        );
    }

    #[test]
    fn test_validate_sizing() {
        let mut o = order(Side::Buy, dec!(1990), dec!(1995), dec!(1980));
        o.lot_size = Decimal::ZERO;
        assert_eq!(o.validate(), Err(ValidationError::NonPositiveLotSize));

        let mut o = order(Side::Buy, dec!(1990), dec!(1995), dec!(1980));
        o.partial_close_percent = 0;
        assert_eq!(o.validate(), Err(ValidationError::PartialCloseOutOfRange(0)));

        let o = order(Side::Sell, dec!(-1), dec!(-2), dec!(1980));
        assert_eq!(o.validate(), Err(ValidationError::NonPositiveLevel("TP1")));
    }

    #[test]
    fn test_quote_exit_price_by_side() {
        let quote = Quote::new("XAU_USD", dec!(1987.10), dec!(1987.32), PriceSource::Live);
        assert_eq!(quote.exit_price(Side::Buy), dec!(1987.10));
        assert_eq!(quote.exit_price(Side::Sell), dec!(1987.32));
        assert_eq!(quote.entry_price(Side::Buy), dec!(1987.32));
        assert_eq!(quote.spread, dec!(0.22));
    }

    #[test]
    fn test_closed_status_carries_close_time() {
        let mut trade = open_trade();
        assert!(trade.close_time().is_none());
        assert!(!trade.tp1_hit());

        trade.apply(&TradeUpdate {
            status: Some(TradeStatus::Tp1Hit),
            sl: Some(trade.entry_price),
            ..Default::default()
        });
        assert!(trade.tp1_hit());
        assert!(trade.sl_moved_to_breakeven());

        let now = Utc::now();
        assert!(trade.close(now, dec!(4.25)));
        assert_eq!(trade.close_time(), Some(now));
        assert!(trade.tp1_hit());
        assert_eq!(trade.view().status, "closed");
    }

    #[test]
    fn test_closed_trade_is_frozen() {
        let mut trade = open_trade();
        trade.close(Utc::now(), dec!(-7.00));
        let before = trade.clone();

        trade.apply(&TradeUpdate::valuation(dec!(1999), dec!(12), PriceSource::Live));
        assert!(!trade.close(Utc::now(), dec!(100)));
        assert_eq!(trade, before);
    }

    #[test]
    fn test_granularity_parse() {
        assert_eq!("m15".parse::<Granularity>().unwrap(), Granularity::M15);
        assert_eq!("D".parse::<Granularity>().unwrap().seconds(), 86_400);
        assert!("W".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_trade_view_json() {
        let trade = open_trade();
        let json = serde_json::to_value(trade.view()).unwrap();
        assert_eq!(json["status"], "open");
        assert_eq!(json["side"], "buy");
        assert_eq!(json["tp1Hit"], false);
        assert_eq!(json["lotSize"], "1.0");
        assert!(json["closeTime"].is_null());
        assert!(json.get("unrealizedPL").is_some());
    }
}
