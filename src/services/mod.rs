//! Background services for the trade automator

pub mod account_sync;
pub mod desk;
pub mod metrics;
pub mod monitor;

pub use account_sync::AccountSync;
pub use desk::{Desk, DeskError};
pub use metrics::{Metrics, MetricsSnapshot};
pub use monitor::{TickReport, TradeMonitor, Trigger};
