//! Determinism is a hard requirement of the kernel contract (spec §4.3):
//! the same `(bar, state, params)` must produce byte-identical signals.

use chrono::{TimeZone, Utc};
use ctk_portfolio::Micros;
use ctk_schemas::Bar;
use ctk_strategy::{MomentumBreakoutV2, Strategy, StrategyState};
use serde_json::json;
use uuid::Uuid;

fn bar() -> Bar {
    Bar {
        symbol: "BTC-USD".to_string(),
        ts_close_utc: Utc.timestamp_opt(60, 0).unwrap(),
        open: "100".to_string(),
        high: "101".to_string(),
        low: "100".to_string(),
        close: "101".to_string(),
        volume: "10".to_string(),
        roc_1m: Some("0.02".to_string()),
        roc_tf: Some("0.02".to_string()),
        vol_mult: Some("2".to_string()),
        spread_bps: Some("10".to_string()),
        rsi_14: None,
    }
}

fn params() -> serde_json::Value {
    json!({
        "minRocThreshold": 0.01,
        "minVolMult": 1.0,
        "maxSpreadBps": 50.0,
        "riskPct": 0.10,
        "leverage": 1.0,
        "stopLossPct": 0.02,
        "takeProfitPct": 0.05,
    })
}

#[test]
fn repeated_evaluation_of_the_same_inputs_is_byte_identical() {
    let b = bar();
    let p = params();
    let state = StrategyState {
        run_id: Uuid::nil(),
        symbol: "BTC-USD",
        current_capital: Micros::parse_decimal("1000").unwrap(),
        positions: &[],
        timeframe_minutes: 1,
        last_candle: None,
    };

    let strat = MomentumBreakoutV2;
    let first = strat.evaluate(&b, &state, &p).unwrap();
    let second = strat.evaluate(&b, &state, &p).unwrap();
    assert_eq!(first, second);
}
