//! Scenario: VWAP correctness and the NEW -> OPEN -> CLOSED position FSM.
//!
//! Exercises the quantified invariants "unique active position" and "VWAP
//! correctness" against a sequence of opening and closing fills on both
//! sides of a symbol.

use chrono::{TimeZone, Utc};
use ctk_portfolio::accounting::{apply_fill, FillOutcome, PortfolioState};
use ctk_portfolio::{Fill, Micros, PositionStatus, Qty, Side};

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
fn vwap_after_three_opening_fills_matches_weighted_sum() {
    let mut pf = PortfolioState::new(px("100000"));

    apply_fill(
        &mut pf,
        "ETH-USD",
        &Fill::entry(Side::Long, qty("1"), px("2000"), Micros::ZERO, ts(0), None, None, 1.0),
    )
    .unwrap();
    apply_fill(
        &mut pf,
        "ETH-USD",
        &Fill::entry(Side::Long, qty("2"), px("2100"), Micros::ZERO, ts(1), None, None, 1.0),
    )
    .unwrap();
    apply_fill(
        &mut pf,
        "ETH-USD",
        &Fill::entry(Side::Long, qty("1"), px("1900"), Micros::ZERO, ts(2), None, None, 1.0),
    )
    .unwrap();

    let pos = pf.position("ETH-USD", Side::Long).unwrap();
    // (2000*1 + 2100*2 + 1900*1) / 4 = 2025
    assert_eq!(pos.entry_price_vwap, px("2025"));
    assert_eq!(pos.quantity_open, qty("4"));
    assert_eq!(pos.status, PositionStatus::Open);
}

#[test]
fn at_most_one_inflight_position_per_run_symbol_side() {
    let mut pf = PortfolioState::new(px("10000"));
    apply_fill(
        &mut pf,
        "BTC-USD",
        &Fill::entry(Side::Long, qty("1"), px("100"), Micros::ZERO, ts(0), None, None, 1.0),
    )
    .unwrap();

    // A second entry on the same (symbol, side) must update the existing
    // position, never create a second one.
    apply_fill(
        &mut pf,
        "BTC-USD",
        &Fill::entry(Side::Long, qty("1"), px("110"), Micros::ZERO, ts(1), None, None, 1.0),
    )
    .unwrap();

    assert_eq!(
        pf.positions
            .keys()
            .filter(|(sym, side)| sym == "BTC-USD" && *side == Side::Long)
            .count(),
        1
    );
}

#[test]
fn position_transitions_open_to_closed_when_quantity_reaches_zero() {
    let mut pf = PortfolioState::new(px("10000"));
    apply_fill(
        &mut pf,
        "BTC-USD",
        &Fill::entry(Side::Long, qty("3"), px("100"), Micros::ZERO, ts(0), None, None, 1.0),
    )
    .unwrap();

    let outcome = apply_fill(
        &mut pf,
        "BTC-USD",
        &Fill::exit(Side::Long, qty("2"), px("105"), Micros::ZERO, ts(1)),
    )
    .unwrap();
    assert!(matches!(outcome, FillOutcome::Updated(ref p) if p.status == PositionStatus::Open));

    let outcome = apply_fill(
        &mut pf,
        "BTC-USD",
        &Fill::exit(Side::Long, qty("1"), px("108"), Micros::ZERO, ts(2)),
    )
    .unwrap();
    match outcome {
        FillOutcome::Closed(pos) => {
            assert_eq!(pos.status, PositionStatus::Closed);
            assert_eq!(pos.quantity_close, qty("3"));
            // exit VWAP = (105*2 + 108*1) / 3 = 106
            assert_eq!(pos.exit_price_vwap, Some(px("106")));
        }
        other => panic!("expected Closed, got {other:?}"),
    }
    assert!(pf.position("BTC-USD", Side::Long).is_none());
}
