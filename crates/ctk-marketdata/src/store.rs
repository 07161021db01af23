//! `BarStore`: the seam between pure bar-processing code and wherever bars
//! actually live. A Postgres-backed implementation lives in `ctk-db`; this
//! crate only ships [`InMemoryBarStore`], a deterministic fixture used by
//! unit tests and the backtest worker's dry-run mode.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ctk_schemas::Bar;
use rust_decimal::Decimal;

use crate::error::MarketDataError;

/// Read-side contract for 1-minute OHLCV bars (spec §4.1).
pub trait BarStore: Send + Sync {
    /// Ordered 1-minute bars for `symbol` in `[start_ts, end_ts]`, strictly
    /// increasing in time. `Err(MarketDataError::NoBarsInRange)` when the
    /// range is empty — callers decide whether that's recoverable.
    fn load_bars(
        &self,
        symbol: &str,
        start_ts: DateTime<Utc>,
        end_ts: DateTime<Utc>,
    ) -> Result<Vec<Bar>, MarketDataError>;

    /// Last known close price for `symbol`, or `None` if nothing has been
    /// seen yet.
    fn latest_price(&self, symbol: &str) -> Result<Option<Decimal>, MarketDataError>;

    /// Last known close price per symbol; symbols with no data are simply
    /// absent from the result rather than erroring.
    fn latest_price_map(&self, symbols: &[String]) -> Result<BTreeMap<String, Decimal>, MarketDataError> {
        let mut out = BTreeMap::new();
        for symbol in symbols {
            if let Some(price) = self.latest_price(symbol)? {
                out.insert(symbol.clone(), price);
            }
        }
        Ok(out)
    }
}

/// An in-memory [`BarStore`] fixture: bars are held sorted by `ts_close_utc`
/// per symbol. Intended for tests and for backtests run against a
/// pre-loaded symbol universe rather than a live Postgres connection.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBarStore {
    bars: BTreeMap<String, Vec<Bar>>,
}

impl InMemoryBarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a batch of bars, keeping each symbol's series sorted by time.
    /// Existing `(symbol, ts_close_utc)` entries are replaced, matching the
    /// append-only-but-idempotent-on-retry ingestion pattern the rest of the
    /// store layer follows.
    pub fn insert(&mut self, bars: impl IntoIterator<Item = Bar>) {
        for bar in bars {
            let series = self.bars.entry(bar.symbol.clone()).or_default();
            match series.binary_search_by_key(&bar.ts_close_utc, |b| b.ts_close_utc) {
                Ok(idx) => series[idx] = bar,
                Err(idx) => series.insert(idx, bar),
            }
        }
    }
}

impl BarStore for InMemoryBarStore {
    fn load_bars(
        &self,
        symbol: &str,
        start_ts: DateTime<Utc>,
        end_ts: DateTime<Utc>,
    ) -> Result<Vec<Bar>, MarketDataError> {
        let series = match self.bars.get(symbol) {
            Some(s) => s,
            None => {
                return Err(MarketDataError::NoBarsInRange {
                    symbol: symbol.to_string(),
                    start_ts,
                    end_ts,
                })
            }
        };

        let out: Vec<Bar> = series
            .iter()
            .filter(|b| b.ts_close_utc >= start_ts && b.ts_close_utc <= end_ts)
            .cloned()
            .collect();

        if out.is_empty() {
            return Err(MarketDataError::NoBarsInRange {
                symbol: symbol.to_string(),
                start_ts,
                end_ts,
            });
        }

        for window in out.windows(2) {
            if window[1].ts_close_utc <= window[0].ts_close_utc {
                return Err(MarketDataError::NonIncreasingBars {
                    symbol: symbol.to_string(),
                    prev_ts: window[0].ts_close_utc,
                    next_ts: window[1].ts_close_utc,
                });
            }
        }

        Ok(out)
    }

    fn latest_price(&self, symbol: &str) -> Result<Option<Decimal>, MarketDataError> {
        let Some(series) = self.bars.get(symbol) else {
            return Ok(None);
        };
        let Some(last) = series.last() else {
            return Ok(None);
        };
        let price = Decimal::from_str(&last.close).map_err(|_| MarketDataError::InvalidDecimal {
            field: "close",
            raw: last.close.clone(),
        })?;
        Ok(Some(price))
    }
}
