//! Simulated market data used when live broker prices are unavailable
//!
//! Quotes follow a bounded random walk around a reference price so charts and
//! P&L stay plausible while the broker is down. Everything produced here is
//! tagged `PriceSource::Simulated`.

use crate::types::{Candle, Granularity, PriceSource, Quote};
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Mutex;

/// Fixed spread of simulated quotes
const SIM_SPREAD: Decimal = dec!(0.22);

/// Largest move of the simulated mid per quote
const MAX_STEP: f64 = 1.0;

/// Simulated mid never strays further than this from the reference price
const MAX_DEVIATION: Decimal = dec!(25);

/// Bounded random-walk price generator
pub struct MarketSimulator {
    reference_price: Decimal,
    mid: Mutex<Decimal>,
}

impl MarketSimulator {
    pub fn new(reference_price: Decimal) -> Self {
        Self {
            reference_price,
            mid: Mutex::new(reference_price),
        }
    }

    pub fn reference_price(&self) -> Decimal {
        self.reference_price
    }

    /// Lowest and highest mid the walk can reach
    pub fn bounds(&self) -> (Decimal, Decimal) {
        (
            self.reference_price - MAX_DEVIATION,
            self.reference_price + MAX_DEVIATION,
        )
    }

    fn clamp(&self, price: Decimal) -> Decimal {
        let (low, high) = self.bounds();
        price.max(low).min(high)
    }

    /// Advance the walk one step and quote around the new mid
    pub fn next_quote(&self, instrument: &str) -> Quote {
        let step = random_decimal(-MAX_STEP, MAX_STEP);

        let bid = {
            let mut mid = match self.mid.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *mid = self.clamp(*mid + step).round_dp(2);
            *mid
        };

        Quote::new(instrument, bid, bid + SIM_SPREAD, PriceSource::Simulated)
    }

    /// `count` consecutive candles ending at the current period, oldest first
    pub fn candles(&self, granularity: Granularity, count: usize) -> Vec<Candle> {
        let period = granularity.seconds();
        let now = Utc::now().timestamp();
        let last_open = now - now.rem_euclid(period);

        let mut rng = rand::thread_rng();
        let mut candles = Vec::with_capacity(count);
        let mut close = self.reference_price;

        for i in (0..count as i64).rev() {
            let open = close;
            let drift = decimal_from(rng.gen_range(-MAX_STEP..MAX_STEP));
            close = self.clamp(open + drift).round_dp(2);
            let high = (open.max(close) + decimal_from(rng.gen_range(0.0..MAX_STEP))).round_dp(2);
            let low = (open.min(close) - decimal_from(rng.gen_range(0.0..MAX_STEP))).round_dp(2);

            candles.push(Candle {
                time: last_open - i * period,
                open,
                high,
                low,
                close,
                volume: rng.gen_range(100..1100),
            });
        }

        candles
    }
}

fn random_decimal(low: f64, high: f64) -> Decimal {
    decimal_from(rand::thread_rng().gen_range(low..high))
}

fn decimal_from(value: f64) -> Decimal {
    Decimal::try_from(value).unwrap_or_default().round_dp(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quotes_stay_within_bounds() {
        let sim = MarketSimulator::new(dec!(1987));
        let (low, high) = sim.bounds();

        for _ in 0..500 {
            let quote = sim.next_quote("XAU_USD");
            assert!(quote.bid >= low && quote.bid <= high, "bid {} out of bounds", quote.bid);
            assert_eq!(quote.ask - quote.bid, dec!(0.22));
            assert_eq!(quote.source, PriceSource::Simulated);
        }
    }

    #[test]
    fn test_candles_are_ordered_and_consistent() {
        let sim = MarketSimulator::new(dec!(1987));
        let candles = sim.candles(Granularity::M5, 50);

        assert_eq!(candles.len(), 50);
        for pair in candles.windows(2) {
            assert_eq!(pair[1].time - pair[0].time, 300);
            assert_eq!(pair[1].open, pair[0].close);
        }
        for c in &candles {
            assert!(c.high >= c.open.max(c.close));
            assert!(c.low <= c.open.min(c.close));
            assert!(c.volume >= 100);
        }
    }

    #[test]
    fn test_no_candles_requested() {
        let sim = MarketSimulator::new(dec!(1987));
        assert!(sim.candles(Granularity::D, 0).is_empty());
    }
}
