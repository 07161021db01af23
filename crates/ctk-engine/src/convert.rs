//! Conversions across the `ctk-portfolio` (fixed-point) / `ctk-db`
//! (`rust_decimal::Decimal`) boundary (spec §9 "Numeric types" design
//! note). Every money/quantity value that crosses into or out of the
//! store passes through here exactly once, and always through a decimal
//! string — never a binary float.

use ctk_portfolio::{Micros, Position, PositionStatus, Qty};
use ctk_schemas::Side;
use rust_decimal::Decimal;
use std::str::FromStr;

pub fn micros_to_decimal(m: Micros) -> Decimal {
    Decimal::from_str(&m.to_string()).expect("Micros::to_string always produces a valid decimal")
}

pub fn decimal_to_micros(d: Decimal) -> Option<Micros> {
    Micros::parse_decimal(&d.to_string())
}

pub fn qty_to_decimal(q: Qty) -> Decimal {
    Decimal::from_str(&q.to_string()).expect("Qty::to_string always produces a valid decimal")
}

pub fn decimal_to_qty(d: Decimal) -> Option<Qty> {
    Qty::parse_decimal(&d.to_string())
}

pub fn side_to_str(side: Side) -> &'static str {
    side.as_str()
}

pub fn side_from_str(s: &str) -> Option<Side> {
    match s {
        "LONG" => Some(Side::Long),
        "SHORT" => Some(Side::Short),
        _ => None,
    }
}

pub fn status_from_str(s: &str) -> Option<PositionStatus> {
    match s {
        "NEW" => Some(PositionStatus::New),
        "OPEN" => Some(PositionStatus::Open),
        "CLOSED" => Some(PositionStatus::Closed),
        _ => None,
    }
}

/// Build a [`ctk_db::types::NewPosition`] from a freshly opened position
/// (spec §4.4 step 5: `apply_fill` returning `FillOutcome::Opened`).
pub fn new_position_row(
    position_id: uuid::Uuid,
    run_id: uuid::Uuid,
    pos: &Position,
) -> ctk_db::types::NewPosition {
    ctk_db::types::NewPosition {
        position_id,
        run_id,
        symbol: pos.symbol.clone(),
        side: side_to_str(pos.side).to_string(),
        status: pos.status.as_str().to_string(),
        open_ts: Some(pos.open_ts),
        entry_price_vwap: Some(micros_to_decimal(pos.entry_price_vwap)),
        quantity_open: qty_to_decimal(pos.quantity_open),
        cost_basis: micros_to_decimal(pos.cost_basis),
        fees_total: micros_to_decimal(pos.fees_total),
        leverage_effective: Some(pos.leverage_effective),
        stop_loss: pos.stop_loss.map(micros_to_decimal),
        take_profit: pos.take_profit.map(micros_to_decimal),
    }
}
