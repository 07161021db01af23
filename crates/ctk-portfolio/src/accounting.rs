//! Position/Order/Fill accounting (spec §4.4): applies one fill at a time to
//! a run's open positions, maintaining VWAP, cost basis, fees and realized
//! P&L, and driving the `NEW → OPEN → CLOSED` FSM.
//!
//! This module is pure: it has no knowledge of orders, events, or storage.
//! The caller (the engine/backtest worker) is responsible for creating the
//! `ORDER` row, persisting the resulting `FILL` row, and turning a
//! [`FillOutcome`] into the `POSITION_OPENED`/`POSITION_CLOSED` events named
//! in spec §3.

use std::collections::BTreeMap;

use crate::fixedpoint::{Micros, Qty};
use crate::types::{Fill, OrderType, Position, Side};

/// Portfolio state for one run: current capital and the open/new positions
/// keyed by `(symbol, side)`. A closed position is returned to the caller in
/// a [`FillOutcome`] and then dropped from this map, keeping this state
/// minimal rather than accumulating closed positions forever.
#[derive(Clone, Debug)]
pub struct PortfolioState {
    pub starting_capital: Micros,
    pub current_capital: Micros,
    pub positions: BTreeMap<(String, Side), Position>,
}

impl PortfolioState {
    pub fn new(starting_capital: Micros) -> Self {
        Self {
            starting_capital,
            current_capital: starting_capital,
            positions: BTreeMap::new(),
        }
    }

    /// Reconstruct a run's in-memory state from persisted positions — used
    /// to resume a live run after the engine process restarts (spec §4.6).
    /// `current_capital` is read back from `runs.current_capital`, not
    /// re-derived, since fees already charged against it are not otherwise
    /// recoverable from the position rows alone.
    pub fn restore(starting_capital: Micros, current_capital: Micros, positions: Vec<Position>) -> Self {
        let mut map = BTreeMap::new();
        for pos in positions {
            map.insert((pos.symbol.clone(), pos.side), pos);
        }
        Self {
            starting_capital,
            current_capital,
            positions: map,
        }
    }

    pub fn position(&self, symbol: &str, side: Side) -> Option<&Position> {
        self.positions.get(&(symbol.to_string(), side))
    }

    /// `true` if `allow_multiple_positions_per_symbol=false` and an in-flight
    /// position already exists on `symbol`, on either side (spec §3's
    /// per-symbol invariant).
    pub fn has_inflight_on_symbol(&self, symbol: &str) -> bool {
        self.positions
            .iter()
            .any(|((sym, _side), pos)| sym == symbol && pos.is_inflight())
    }
}

/// What applying a fill did to the position it touched.
#[derive(Debug)]
pub enum FillOutcome {
    /// First fill on this `(symbol, side)`: `NEW → OPEN`.
    Opened(Position),
    /// An additional opening fill on an already-open position (VWAP updated)
    /// or a partial closing fill that left the position still `OPEN`.
    Updated(Position),
    /// A closing fill brought `quantity_open` to zero: `OPEN → CLOSED`.
    Closed(Position),
    /// An `EXIT` fill's quantity exceeded `quantity_open`: the held position
    /// closes fully, and a new position opens on the opposite side with the
    /// remainder (spec §4.4 step 5).
    Flipped { closed: Position, opened: Position },
    /// An `ADJUST` fill against a position that doesn't exist. Spec defines
    /// `ADJUST` only as an order-intent discriminant with no accounting
    /// semantics of its own; this crate takes no action beyond charging the
    /// fee (already reflected in `current_capital`).
    NoOp,
}

/// Error applying a fill — always indicates a caller bug (the risk/guard
/// layer is responsible for never letting an invalid fill reach here).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountingError {
    /// An `EXIT`/`ADJUST` fill referenced a `(symbol, side)` with no
    /// in-flight position to reduce.
    NoOpenPosition { symbol: String, side: Side },
}

impl std::fmt::Display for AccountingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountingError::NoOpenPosition { symbol, side } => {
                write!(f, "no open position for {symbol} {side}")
            }
        }
    }
}

impl std::error::Error for AccountingError {}

fn weighted_avg(prior_price: Micros, prior_qty: Qty, new_price: Micros, new_qty: Qty) -> Micros {
    let total_qty = prior_qty + new_qty;
    if total_qty.is_zero() {
        return new_price;
    }
    let prior_notional = prior_price.checked_mul_qty(prior_qty).unwrap_or(Micros::ZERO);
    let new_notional = new_price.checked_mul_qty(new_qty).unwrap_or(Micros::ZERO);
    let total_notional = prior_notional + new_notional;
    // total_notional / total_qty, at Micros precision: scale qty out first.
    Micros::new(
        ((total_notional.raw() as i128) * Qty::SCALE / total_qty.raw())
            .clamp(i64::MIN as i128, i64::MAX as i128) as i64,
    )
}

/// Apply one fill for `symbol` to the portfolio. Mutates `current_capital`
/// per spec §4.4 step 6 (`current_capital -= fee`, plus realized P&L on the
/// closing portion) and returns what happened to the position.
pub fn apply_fill(
    pf: &mut PortfolioState,
    symbol: &str,
    fill: &Fill,
) -> Result<FillOutcome, AccountingError> {
    pf.current_capital -= fill.fee;

    match fill.order_type {
        OrderType::Entry => Ok(apply_entry(pf, symbol, fill)),
        OrderType::Exit => apply_exit(pf, symbol, fill),
        OrderType::Adjust => {
            if let Some(pos) = pf.positions.get_mut(&(symbol.to_string(), fill.side)) {
                pos.fees_total += fill.fee;
                Ok(FillOutcome::Updated(pos.clone()))
            } else {
                Ok(FillOutcome::NoOp)
            }
        }
    }
}

fn apply_entry(pf: &mut PortfolioState, symbol: &str, fill: &Fill) -> FillOutcome {
    let key = (symbol.to_string(), fill.side);
    match pf.positions.get_mut(&key) {
        None => {
            let pos = Position::opened(symbol, fill.side, fill);
            pf.positions.insert(key, pos.clone());
            FillOutcome::Opened(pos)
        }
        Some(pos) => {
            pos.entry_price_vwap =
                weighted_avg(pos.entry_price_vwap, pos.quantity_open, fill.price, fill.qty);
            pos.quantity_open += fill.qty;
            pos.cost_basis += fill.price.checked_mul_qty(fill.qty).unwrap_or(Micros::ZERO);
            pos.fees_total += fill.fee;
            FillOutcome::Updated(pos.clone())
        }
    }
}

fn apply_exit(
    pf: &mut PortfolioState,
    symbol: &str,
    fill: &Fill,
) -> Result<FillOutcome, AccountingError> {
    let key = (symbol.to_string(), fill.side);
    let pos = pf
        .positions
        .get_mut(&key)
        .ok_or_else(|| AccountingError::NoOpenPosition {
            symbol: symbol.to_string(),
            side: fill.side,
        })?;

    let reduce_qty = fill.qty.min(pos.quantity_open);
    let overflow_qty = fill.qty - reduce_qty;

    let pnl_piece = fill
        .price
        .saturating_sub(pos.entry_price_vwap)
        .checked_mul_qty(reduce_qty)
        .unwrap_or(Micros::ZERO);
    let pnl_piece = match fill.side {
        Side::Long => pnl_piece,
        Side::Short => -pnl_piece,
    };

    pos.exit_price_vwap = Some(weighted_avg(
        pos.exit_price_vwap.unwrap_or(Micros::ZERO),
        pos.quantity_close,
        fill.price,
        reduce_qty,
    ));
    pos.quantity_open -= reduce_qty;
    pos.quantity_close += reduce_qty;
    pos.fees_total += fill.fee;
    add_realized_pnl(pos, pnl_piece);

    pf.current_capital += pnl_piece;

    if !pos.quantity_open.is_within_tolerance_of_zero() {
        // Partial exit: position remains open.
        return Ok(FillOutcome::Updated(pos.clone()));
    }

    pos.status = crate::types::PositionStatus::Closed;
    pos.close_ts = Some(fill.ts);
    let closed = pf.positions.remove(&key).expect("just matched this key");

    if overflow_qty.is_zero() {
        return Ok(FillOutcome::Closed(closed));
    }

    // Flip: reopen on the opposite side with the remainder.
    let opened_side = fill.side.opposite();
    let open_fill = Fill::entry(
        opened_side,
        overflow_qty,
        fill.price,
        Micros::ZERO,
        fill.ts,
        None,
        None,
        closed.leverage_effective,
    );
    let opened = Position::opened(symbol, opened_side, &open_fill);
    pf.positions.insert((symbol.to_string(), opened_side), opened.clone());

    Ok(FillOutcome::Flipped { closed, opened })
}

fn add_realized_pnl(pos: &mut Position, pnl_piece: Micros) {
    // `Position::realized_pnl_gross` is private to the types module; go
    // through the public setter-free accumulation path instead.
    pos.accumulate_realized_pnl_gross(pnl_piece);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(n: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + n * 60, 0).unwrap()
    }

    fn px(s: &str) -> Micros {
        Micros::parse_decimal(s).unwrap()
    }

    fn qty(s: &str) -> Qty {
        Qty::parse_decimal(s).unwrap()
    }

    #[test]
    fn first_entry_fill_opens_position() {
        let mut pf = PortfolioState::new(px("1000"));
        let fill = Fill::entry(Side::Long, qty("1"), px("100"), Micros::ZERO, ts(0), None, None, 1.0);
        let outcome = apply_fill(&mut pf, "BTC-USD", &fill).unwrap();
        assert!(matches!(outcome, FillOutcome::Opened(_)));
        let pos = pf.position("BTC-USD", Side::Long).unwrap();
        assert_eq!(pos.entry_price_vwap, px("100"));
        assert_eq!(pos.quantity_open, qty("1"));
    }

    #[test]
    fn second_entry_fill_updates_vwap() {
        let mut pf = PortfolioState::new(px("10000"));
        apply_fill(
            &mut pf,
            "BTC-USD",
            &Fill::entry(Side::Long, qty("1"), px("100"), Micros::ZERO, ts(0), None, None, 1.0),
        )
        .unwrap();
        apply_fill(
            &mut pf,
            "BTC-USD",
            &Fill::entry(Side::Long, qty("1"), px("200"), Micros::ZERO, ts(1), None, None, 1.0),
        )
        .unwrap();
        let pos = pf.position("BTC-USD", Side::Long).unwrap();
        // (100*1 + 200*1) / 2 = 150
        assert_eq!(pos.entry_price_vwap, px("150"));
        assert_eq!(pos.quantity_open, qty("2"));
    }

    #[test]
    fn full_exit_closes_position_and_realizes_pnl() {
        let mut pf = PortfolioState::new(px("1000"));
        apply_fill(
            &mut pf,
            "BTC-USD",
            &Fill::entry(Side::Long, qty("1"), px("100"), Micros::ZERO, ts(0), None, None, 1.0),
        )
        .unwrap();
        let outcome = apply_fill(
            &mut pf,
            "BTC-USD",
            &Fill::exit(Side::Long, qty("1"), px("110"), Micros::ZERO, ts(1)),
        )
        .unwrap();
        match outcome {
            FillOutcome::Closed(pos) => {
                assert_eq!(pos.status, crate::types::PositionStatus::Closed);
                assert_eq!(pos.realized_pnl(), px("10"));
            }
            other => panic!("expected Closed, got {other:?}"),
        }
        assert!(pf.position("BTC-USD", Side::Long).is_none());
        assert_eq!(pf.current_capital, px("1010"));
    }

    #[test]
    fn short_realized_pnl_profits_on_price_drop() {
        let mut pf = PortfolioState::new(px("1000"));
        apply_fill(
            &mut pf,
            "BTC-USD",
            &Fill::entry(Side::Short, qty("1"), px("100"), Micros::ZERO, ts(0), None, None, 1.0),
        )
        .unwrap();
        let outcome = apply_fill(
            &mut pf,
            "BTC-USD",
            &Fill::exit(Side::Short, qty("1"), px("90"), Micros::ZERO, ts(1)),
        )
        .unwrap();
        match outcome {
            FillOutcome::Closed(pos) => assert_eq!(pos.realized_pnl(), px("10")),
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn partial_exit_leaves_position_open() {
        let mut pf = PortfolioState::new(px("1000"));
        apply_fill(
            &mut pf,
            "BTC-USD",
            &Fill::entry(Side::Long, qty("2"), px("100"), Micros::ZERO, ts(0), None, None, 1.0),
        )
        .unwrap();
        let outcome = apply_fill(
            &mut pf,
            "BTC-USD",
            &Fill::exit(Side::Long, qty("1"), px("110"), Micros::ZERO, ts(1)),
        )
        .unwrap();
        assert!(matches!(outcome, FillOutcome::Updated(_)));
        let pos = pf.position("BTC-USD", Side::Long).unwrap();
        assert_eq!(pos.quantity_open, qty("1"));
        assert_eq!(pos.quantity_close, qty("1"));
    }

    #[test]
    fn exit_exceeding_open_quantity_flips_to_opposite_side() {
        let mut pf = PortfolioState::new(px("1000"));
        apply_fill(
            &mut pf,
            "BTC-USD",
            &Fill::entry(Side::Long, qty("1"), px("100"), Micros::ZERO, ts(0), None, None, 1.0),
        )
        .unwrap();
        let outcome = apply_fill(
            &mut pf,
            "BTC-USD",
            &Fill::exit(Side::Long, qty("1.5"), px("110"), Micros::ZERO, ts(1)),
        )
        .unwrap();
        match outcome {
            FillOutcome::Flipped { closed, opened } => {
                assert_eq!(closed.status, crate::types::PositionStatus::Closed);
                assert_eq!(opened.side, Side::Short);
                assert_eq!(opened.quantity_open, qty("0.5"));
                assert_eq!(opened.entry_price_vwap, px("110"));
            }
            other => panic!("expected Flipped, got {other:?}"),
        }
        assert!(pf.position("BTC-USD", Side::Long).is_none());
        assert!(pf.position("BTC-USD", Side::Short).is_some());
    }

    #[test]
    fn exit_against_missing_position_errors() {
        let mut pf = PortfolioState::new(px("1000"));
        let err = apply_fill(
            &mut pf,
            "BTC-USD",
            &Fill::exit(Side::Long, qty("1"), px("100"), Micros::ZERO, ts(0)),
        )
        .unwrap_err();
        assert_eq!(
            err,
            AccountingError::NoOpenPosition {
                symbol: "BTC-USD".to_string(),
                side: Side::Long,
            }
        );
    }

    #[test]
    fn restore_indexes_positions_by_symbol_and_side() {
        let fill = Fill::entry(Side::Long, qty("1"), px("100"), Micros::ZERO, ts(0), None, None, 1.0);
        let pos = Position::opened("BTC-USD", Side::Long, &fill);
        let pf = PortfolioState::restore(px("1000"), px("950"), vec![pos]);
        assert_eq!(pf.current_capital, px("950"));
        assert!(pf.position("BTC-USD", Side::Long).is_some());
    }

    #[test]
    fn fee_always_reduces_current_capital() {
        let mut pf = PortfolioState::new(px("1000"));
        apply_fill(
            &mut pf,
            "BTC-USD",
            &Fill::entry(Side::Long, qty("1"), px("100"), px("0.5"), ts(0), None, None, 1.0),
        )
        .unwrap();
        assert_eq!(pf.current_capital, px("999.5"));
    }
}
