//! Spec §8 scenario 3: with an open LONG and a bar whose `low` crosses
//! `stop_loss`, the synthetic stop EXIT applies even if the strategy also
//! emits an exit on the same bar — the risk layer's stop/take check runs
//! ahead of, and independent from, strategy evaluation.

use chrono::{TimeZone, Utc};
use ctk_portfolio::{Micros, Qty};
use ctk_risk::{check_stop_take, StopTakeKind, StopTakeLevels};
use ctk_schemas::{Bar, Side};

fn bar_b() -> Bar {
    Bar {
        symbol: "BTC-USD".to_string(),
        ts_close_utc: Utc.timestamp_opt(120, 0).unwrap(),
        open: "101".to_string(),
        high: "101".to_string(),
        low: "98.0".to_string(),
        close: "99.0".to_string(),
        volume: "5".to_string(),
        roc_1m: Some("-0.02".to_string()),
        roc_tf: Some("-0.02".to_string()),
        vol_mult: Some("1".to_string()),
        spread_bps: Some("10".to_string()),
        rsi_14: None,
    }
}

#[test]
fn synthetic_stop_fires_regardless_of_what_the_strategy_would_say() {
    let levels = StopTakeLevels {
        side: Side::Long,
        quantity_open: Qty::parse_decimal("0.990099").unwrap(),
        stop_loss: Some(Micros::parse_decimal("98.98").unwrap()),
        take_profit: Some(Micros::parse_decimal("106.05").unwrap()),
    };

    // The strategy kernel is never consulted here: the guard layer's
    // stop/take check runs before evaluate() and, once it fires, the bar's
    // strategy signals for this symbol are discarded entirely by the engine.
    let hit = check_stop_take(&levels, &bar_b()).expect("stop must trigger on bar B's low");
    assert_eq!(hit.kind, StopTakeKind::StopLoss);
    assert_eq!(hit.trigger_price, Micros::parse_decimal("98.98").unwrap());
}
