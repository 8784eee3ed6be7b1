//! Metrics collection for monitoring automator health

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Monitor ticks completed
    pub ticks: u64,
    /// Trade evaluations across all ticks
    pub trades_evaluated: u64,
    /// Evaluations that failed and were skipped
    pub evaluation_errors: u64,
    /// Trigger counts
    pub tp1_triggers: u64,
    pub tp2_triggers: u64,
    pub sl_triggers: u64,
    /// Broker mutations (orders, closes, stop changes) that failed
    pub broker_failures: u64,
    /// Quotes served from the simulator instead of the broker
    pub simulated_quotes: u64,
    /// Orders placed through the desk
    pub orders_placed: u64,
    /// Trades closed on request
    pub manual_closes: u64,
}

/// Thread-safe metrics collector
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    ticks: AtomicU64,
    trades_evaluated: AtomicU64,
    evaluation_errors: AtomicU64,
    tp1_triggers: AtomicU64,
    tp2_triggers: AtomicU64,
    sl_triggers: AtomicU64,
    broker_failures: AtomicU64,
    simulated_quotes: AtomicU64,
    orders_placed: AtomicU64,
    manual_closes: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_ticks(&self) {
        self.inner.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_trades_evaluated(&self) {
        self.inner.trades_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_evaluation_errors(&self) {
        self.inner.evaluation_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_trigger(&self, trigger: &str) {
        match trigger {
            "TP1" => self.inner.tp1_triggers.fetch_add(1, Ordering::Relaxed),
            "TP2" => self.inner.tp2_triggers.fetch_add(1, Ordering::Relaxed),
            "SL" => self.inner.sl_triggers.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
    }

    pub fn inc_broker_failures(&self) {
        self.inner.broker_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_simulated_quotes(&self) {
        self.inner.simulated_quotes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_orders_placed(&self) {
        self.inner.orders_placed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_manual_closes(&self) {
        self.inner.manual_closes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.inner.ticks.load(Ordering::Relaxed),
            trades_evaluated: self.inner.trades_evaluated.load(Ordering::Relaxed),
            evaluation_errors: self.inner.evaluation_errors.load(Ordering::Relaxed),
            tp1_triggers: self.inner.tp1_triggers.load(Ordering::Relaxed),
            tp2_triggers: self.inner.tp2_triggers.load(Ordering::Relaxed),
            sl_triggers: self.inner.sl_triggers.load(Ordering::Relaxed),
            broker_failures: self.inner.broker_failures.load(Ordering::Relaxed),
            simulated_quotes: self.inner.simulated_quotes.load(Ordering::Relaxed),
            orders_placed: self.inner.orders_placed.load(Ordering::Relaxed),
            manual_closes: self.inner.manual_closes.load(Ordering::Relaxed),
        }
    }
}
