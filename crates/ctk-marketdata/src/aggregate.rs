//! Folding consecutive 1-minute bars into a higher timeframe (spec §4.1).
//!
//! No binary floats: OHLCV fields are decimal strings on the wire, parsed
//! through [`rust_decimal::Decimal`] only for the comparisons/sums this
//! module needs, then re-serialized back to decimal strings.

use std::str::FromStr;

use chrono::{TimeZone, Utc};
use ctk_schemas::{Bar, Timeframe};
use rust_decimal::Decimal;

use crate::error::MarketDataError;

fn parse_decimal(field: &'static str, raw: &str) -> Result<Decimal, MarketDataError> {
    Decimal::from_str(raw).map_err(|_| MarketDataError::InvalidDecimal {
        field,
        raw: raw.to_string(),
    })
}

/// Default suppression threshold: `ceil(n/2) + 1`, capped at `n` itself so a
/// 1-minute target (a bucket can only ever hold exactly 1 bar) isn't held to
/// a threshold it can never reach — that would make `aggregate(bars, 1m)`
/// drop every bucket instead of reproducing `bars` unchanged.
fn default_min_minutes_per_bucket(n: i64) -> i64 {
    ((n + 1) / 2 + 1).min(n)
}

fn validate_sequence(bars: &[Bar]) -> Result<(), MarketDataError> {
    for window in bars.windows(2) {
        let (a, b) = (&window[0], &window[1]);
        if a.symbol != b.symbol {
            return Err(MarketDataError::MixedSymbols {
                first: a.symbol.clone(),
                other: b.symbol.clone(),
            });
        }
        if b.ts_close_utc <= a.ts_close_utc {
            return Err(MarketDataError::NonIncreasingBars {
                symbol: a.symbol.clone(),
                prev_ts: a.ts_close_utc,
                next_ts: b.ts_close_utc,
            });
        }
    }
    Ok(())
}

/// Fold `bars` (strictly increasing 1-minute bars, single symbol) into
/// `target`-timeframe bars.
///
/// Grouping key is `floor(epoch_seconds / (N*60))`, `N = target.minutes()`,
/// where `epoch_seconds` is each bar's start instant (`ts_close_utc - 60s`)
/// so a bar ending exactly on an N-minute boundary completes that bucket.
/// A bucket whose 1-minute bar count is below `min_minutes_per_bucket`
/// (default `ceil(N/2) + 1`) is dropped rather than emitted as a partial
/// candle — this matters for the live loop, where the most recent bucket is
/// usually still filling.
pub fn aggregate(
    bars: &[Bar],
    target: Timeframe,
    min_minutes_per_bucket: Option<i64>,
) -> Result<Vec<Bar>, MarketDataError> {
    if bars.is_empty() {
        return Ok(Vec::new());
    }
    validate_sequence(bars)?;

    let step_secs = target.minutes() * 60;
    let min_required = min_minutes_per_bucket.unwrap_or_else(|| default_min_minutes_per_bucket(target.minutes()));

    let mut buckets: Vec<(i64, Vec<&Bar>)> = Vec::new();
    for bar in bars {
        // `ts_close_utc` marks the *end* of each 1-minute bar; key off the
        // bar's start instant so a bar ending exactly on an N-minute
        // boundary completes that bucket instead of starting the next one.
        let bar_start = bar.ts_close_utc.timestamp() - 60;
        let key = bar_start.div_euclid(step_secs);
        match buckets.last_mut() {
            Some((k, v)) if *k == key => v.push(bar),
            _ => buckets.push((key, vec![bar])),
        }
    }

    let mut out = Vec::with_capacity(buckets.len());
    for (key, group) in buckets {
        if (group.len() as i64) < min_required {
            continue;
        }
        out.push(fold_bucket(key, step_secs, &group)?);
    }
    Ok(out)
}

fn fold_bucket(key: i64, step_secs: i64, group: &[&Bar]) -> Result<Bar, MarketDataError> {
    let first = group[0];
    let last = *group.last().expect("group is non-empty");

    let mut high = parse_decimal("high", &first.high)?;
    let mut low = parse_decimal("low", &first.low)?;
    let mut volume = Decimal::ZERO;
    for bar in group {
        let h = parse_decimal("high", &bar.high)?;
        let l = parse_decimal("low", &bar.low)?;
        let v = parse_decimal("volume", &bar.volume)?;
        if h > high {
            high = h;
        }
        if l < low {
            low = l;
        }
        volume += v;
    }

    let bucket_end_ts = Utc
        .timestamp_opt((key + 1) * step_secs, 0)
        .single()
        .expect("bucket boundary is a valid instant");

    Ok(Bar {
        symbol: first.symbol.clone(),
        ts_close_utc: bucket_end_ts,
        open: first.open.clone(),
        high: high.to_string(),
        low: low.to_string(),
        close: last.close.clone(),
        volume: volume.to_string(),
        roc_1m: last.roc_1m.clone(),
        roc_tf: last.roc_tf.clone(),
        vol_mult: last.vol_mult.clone(),
        spread_bps: last.spread_bps.clone(),
        rsi_14: last.rsi_14.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, open: &str, high: &str, low: &str, close: &str, volume: &str) -> Bar {
        Bar {
            symbol: "BTC-USD".to_string(),
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
    fn empty_input_yields_empty_output() {
        assert_eq!(aggregate(&[], Timeframe::M5, None).unwrap(), Vec::new());
    }

    #[test]
    fn five_complete_one_minute_bars_fold_into_one_bucket() {
        let bars = vec![
            bar(60, "100", "101", "99", "100.5", "10"),
            bar(120, "100.5", "102", "100", "101", "10"),
            bar(180, "101", "101.5", "100.5", "101.2", "10"),
            bar(240, "101.2", "103", "101", "102", "10"),
            bar(300, "102", "102.5", "101.5", "102.3", "10"),
        ];
        let out = aggregate(&bars, Timeframe::M5, None).unwrap();
        assert_eq!(out.len(), 1);
        let b = &out[0];
        assert_eq!(b.open, "100");
        assert_eq!(b.close, "102.3");
        assert_eq!(b.high, "103");
        assert_eq!(b.low, "99");
        assert_eq!(b.volume, "50");
        assert_eq!(b.ts_close_utc.timestamp(), 300);
    }

    #[test]
    fn feature_fields_come_from_last_contributing_bar() {
        let mut first = bar(60, "100", "101", "99", "100.5", "10");
        first.rsi_14 = Some("40".to_string());
        let mut last = bar(120, "100.5", "102", "100", "101", "10");
        last.rsi_14 = Some("55".to_string());
        let out = aggregate(&[first, last], Timeframe::M1, Some(1)).unwrap();
        // target == source timeframe, one bar per bucket
        assert_eq!(out[0].rsi_14, Some("40".to_string()));
        assert_eq!(out[1].rsi_14, Some("55".to_string()));
    }

    #[test]
    fn incomplete_trailing_bucket_is_suppressed_by_default_threshold() {
        // 5m bucket needs ceil(5/2)+1 = 4 one-minute bars by default.
        let bars = vec![
            bar(60, "100", "101", "99", "100.5", "1"),
            bar(120, "100.5", "102", "100", "101", "1"),
            bar(180, "101", "101.5", "100.5", "101.2", "1"),
            bar(240, "101.2", "103", "101", "102", "1"),
            bar(300, "102", "102.5", "101.5", "102.3", "1"),
            // only 3 bars land in the next 5-minute bucket: suppressed.
            bar(360, "102.3", "103", "102", "102.5", "1"),
            bar(420, "102.5", "103.2", "102.1", "102.8", "1"),
        ];
        let out = aggregate(&bars, Timeframe::M5, None).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn explicit_min_minutes_per_bucket_overrides_default() {
        let bars = vec![
            bar(60, "100", "101", "99", "100.5", "1"),
            bar(120, "100.5", "102", "100", "101", "1"),
        ];
        // Only 2 of 5 expected minutes present, but caller allows it.
        let out = aggregate(&bars, Timeframe::M5, Some(1)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].close, "101");
    }

    #[test]
    fn non_increasing_timestamps_are_rejected() {
        let bars = vec![
            bar(120, "100", "101", "99", "100.5", "1"),
            bar(60, "100.5", "102", "100", "101", "1"),
        ];
        let err = aggregate(&bars, Timeframe::M5, None).unwrap_err();
        assert!(matches!(err, MarketDataError::NonIncreasingBars { .. }));
    }

    #[test]
    fn mixed_symbols_are_rejected() {
        let mut other = bar(120, "100", "101", "99", "100.5", "1");
        other.symbol = "ETH-USD".to_string();
        let bars = vec![bar(60, "100", "101", "99", "100.5", "1"), other];
        let err = aggregate(&bars, Timeframe::M5, None).unwrap_err();
        assert!(matches!(err, MarketDataError::MixedSymbols { .. }));
    }

    #[test]
    fn one_minute_target_with_default_threshold_keeps_every_bar() {
        // aggregate(bars, 1m) must reproduce `bars` one-for-one; a threshold
        // above 1 would suppress every single-bar bucket.
        let bars = vec![
            bar(60, "100", "101", "99", "100.5", "1"),
            bar(120, "100.5", "102", "100", "101", "1"),
            bar(180, "101", "101.5", "100.5", "101.2", "1"),
        ];
        let out = aggregate(&bars, Timeframe::M1, None).unwrap();
        assert_eq!(out.len(), bars.len());
        for (a, b) in out.iter().zip(bars.iter()) {
            assert_eq!(a.ts_close_utc, b.ts_close_utc);
            assert_eq!(a.close, b.close);
        }
    }

    #[test]
    fn bucket_boundary_uses_floor_of_epoch_over_n_times_sixty() {
        // A bar landing exactly on a 5-minute boundary (ts=300) starts a new
        // bucket rather than extending the previous one.
        let bars = vec![
            bar(300, "100", "101", "99", "100.5", "1"),
            bar(360, "100.5", "101", "100", "100.8", "1"),
        ];
        let out = aggregate(&bars, Timeframe::M5, Some(1)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].ts_close_utc.timestamp(), 600);
    }
}
