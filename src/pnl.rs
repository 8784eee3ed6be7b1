//! P&L and position-size arithmetic shared by the desk and the monitor
//!
//! Every monetary figure is rounded to cents when it is recorded, and each leg
//! of a trade (TP1 partial, final close) is rounded on its own before being
//! added to the stored total. Lot sizes are kept exact.

use crate::types::Side;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept for recorded money values
pub const MONEY_DP: u32 = 2;

/// Round a money value to cents (half away from zero)
pub fn money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Unrounded P&L of `lots` opened at `entry` and valued at `price`.
/// Positive when the price moved in the trade's favour.
pub fn leg_pnl(side: Side, entry: Decimal, price: Decimal, lots: Decimal) -> Decimal {
    (price - entry) * lots * side.sign()
}

/// Realized total after adding one more leg to an already-recorded total
pub fn add_leg(recorded: Decimal, leg: Decimal) -> Decimal {
    money(recorded + leg)
}

/// Lots liquidated when TP1 fires
pub fn partial_close_lots(lots: Decimal, partial_close_percent: u8) -> Decimal {
    lots * Decimal::from(partial_close_percent) / Decimal::ONE_HUNDRED
}

/// Lots left open after TP1
pub fn remaining_lots(lots: Decimal, partial_close_percent: u8) -> Decimal {
    lots * (Decimal::ONE - Decimal::from(partial_close_percent) / Decimal::ONE_HUNDRED)
}

/// Broker units for a lot amount, rounded to the nearest whole unit
pub fn lots_to_units(lots: Decimal, contract_size: Decimal) -> u64 {
    (lots.abs() * contract_size)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .unwrap_or(0)
}

/// Signed order units: positive buys, negative sells
pub fn signed_units(side: Side, lots: Decimal, contract_size: Decimal) -> i64 {
    let units = lots_to_units(lots, contract_size) as i64;
    match side {
        Side::Buy => units,
        Side::Sell => -units,
    }
}

/// Price has reached `level` in the trade's favour (take-profit direction)
pub fn reached_target(side: Side, price: Decimal, level: Decimal) -> bool {
    match side {
        Side::Buy => price >= level,
        Side::Sell => price <= level,
    }
}

/// Price has reached `level` against the trade (stop-loss direction)
pub fn reached_stop(side: Side, price: Decimal, level: Decimal) -> bool {
    match side {
        Side::Buy => price <= level,
        Side::Sell => price >= level,
    }
}
