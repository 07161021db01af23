//! Scenario: loading a symbol's bars from a store and folding them into a
//! higher timeframe, end to end through the public API.

use chrono::{TimeZone, Utc};
use ctk_marketdata::{aggregate, Bar, BarStore, InMemoryBarStore, MarketDataError, Timeframe};

fn bar(ts: i64, open: &str, high: &str, low: &str, close: &str, volume: &str) -> Bar {
    Bar {
        symbol: "SOL-USD".to_string(),
        ts_close_utc: Utc.timestamp_opt(ts, 0).unwrap(),
        open: open.to_string(),
        high: high.to_string(),
        low: low.to_string(),
        close: close.to_string(),
        volume: volume.to_string(),
        roc_1m: None,
        roc_tf: None,
        vol_mult: None,
        spread_bps: None,
        rsi_14: None,
    }
}

#[test]
fn load_then_aggregate_five_minute_candle_from_one_minute_bars() {
    let mut store = InMemoryBarStore::new();
    store.insert((1..=5).map(|i| bar(i * 60, "100", "101", "99", "100.1", "2")));

    let loaded = store
        .load_bars(
            "SOL-USD",
            Utc.timestamp_opt(60, 0).unwrap(),
            Utc.timestamp_opt(300, 0).unwrap(),
        )
        .unwrap();
    assert_eq!(loaded.len(), 5);

    let five_min = aggregate(&loaded, Timeframe::M5, None).unwrap();
    assert_eq!(five_min.len(), 1);
    assert_eq!(five_min[0].open, "100");
    assert_eq!(five_min[0].close, "100.1");
    assert_eq!(five_min[0].volume, "10");
}

#[test]
fn missing_range_is_reported_as_recoverable_no_bars_error() {
    let store = InMemoryBarStore::new();
    let err = store
        .load_bars(
            "SOL-USD",
            Utc.timestamp_opt(0, 0).unwrap(),
            Utc.timestamp_opt(60, 0).unwrap(),
        )
        .unwrap_err();
    assert!(matches!(err, MarketDataError::NoBarsInRange { .. }));
}

#[test]
fn latest_price_map_tracks_last_insert_per_symbol() {
    let mut store = InMemoryBarStore::new();
    store.insert([bar(60, "100", "101", "99", "100.5", "1")]);

    let mut eth = bar(60, "2000", "2010", "1990", "2005", "5");
    eth.symbol = "ETH-USD".to_string();
    store.insert([eth]);

    let map = store
        .latest_price_map(&["SOL-USD".to_string(), "ETH-USD".to_string(), "BTC-USD".to_string()])
        .unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map["SOL-USD"].to_string(), "100.5");
    assert_eq!(map["ETH-USD"].to_string(), "2005");
    assert!(!map.contains_key("BTC-USD"));
}
