//! Errors produced by bar loading and aggregation.
//!
//! A missing range is recoverable: the live engine treats it as "no new bar
//! yet" and the backtest worker treats it as a fatal run error (spec §4.1).
//! Which interpretation applies is the caller's decision — this crate only
//! distinguishes the cases.

use std::fmt;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketDataError {
    /// No bars exist for `symbol` in `[start_ts, end_ts]`.
    NoBarsInRange {
        symbol: String,
        start_ts: DateTime<Utc>,
        end_ts: DateTime<Utc>,
    },
    /// Bars returned by a store were not strictly increasing in time.
    NonIncreasingBars {
        symbol: String,
        prev_ts: DateTime<Utc>,
        next_ts: DateTime<Utc>,
    },
    /// A batch passed to `aggregate` mixed more than one symbol.
    MixedSymbols { first: String, other: String },
    /// An OHLCV decimal field could not be parsed.
    InvalidDecimal { field: &'static str, raw: String },
}

impl fmt::Display for MarketDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketDataError::NoBarsInRange {
                symbol,
                start_ts,
                end_ts,
            } => write!(
                f,
                "no bars for {symbol} in [{start_ts}, {end_ts}]"
            ),
            MarketDataError::NonIncreasingBars {
                symbol,
                prev_ts,
                next_ts,
            } => write!(
                f,
                "bars for {symbol} are not strictly increasing: {prev_ts} then {next_ts}"
            ),
            MarketDataError::MixedSymbols { first, other } => write!(
                f,
                "aggregate received bars for more than one symbol: {first} and {other}"
            ),
            MarketDataError::InvalidDecimal { field, raw } => write!(
                f,
                "field '{field}' is not a valid decimal: '{raw}'"
            ),
        }
    }
}

impl std::error::Error for MarketDataError {}
