//! Conversions across the `ctk-portfolio` (fixed-point) / `ctk-db`
//! (`rust_decimal::Decimal`) boundary (spec §9 "Numeric types" design
//! note). Identical in spirit to `ctk-engine::convert` — duplicated rather
//! than shared because `ctk-backtest` does not depend on `ctk-engine` (the
//! two workers share no code, only a design, per `bar_step`'s doc comment).

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn micros_decimal_roundtrip() {
        let m = Micros::parse_decimal("101.05").unwrap();
        assert_eq!(decimal_to_micros(micros_to_decimal(m)), Some(m));
    }

    #[test]
    fn qty_decimal_roundtrip() {
        let q = Qty::parse_decimal("0.00990099").unwrap();
        assert_eq!(decimal_to_qty(qty_to_decimal(q)), Some(q));
    }
}
