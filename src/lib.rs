//! XAU/USD Trade Automator Library
//!
//! Places gold trades through an OANDA-style broker and manages each one
//! through a two-stage exit:
//!
//! 1. **TP1**: close a configurable share of the position and move the stop
//!    to the entry price, so the rest of the trade cannot lose money.
//!
//! 2. **TP2 / SL**: close whatever remains at the second target, or at the
//!    stop (original or breakeven).
//!
//! When the broker is unreachable, market data falls back to a simulated
//! random walk tagged as such; orders and closes never fall back.

pub mod api;
pub mod broker;
pub mod config;
pub mod pnl;
pub mod services;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use broker::{build_broker, Broker, BrokerError};
pub use config::Config;
pub use services::{AccountSync, Desk, DeskError, Metrics, TradeMonitor};
pub use store::{MemoryStore, TradeStore};
pub use types::{NewOrder, Side, Trade, TradeStatus};
