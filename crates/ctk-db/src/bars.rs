//! Postgres-backed market-data reads (spec §4.1, AMBIENT). `ohlcv_1m` and
//! `features_1m` are owned by an external ingestion pipeline (spec §1
//! Non-goals); this module only reads them, left-joined on `(symbol,
//! ts_close_utc)` since a feature row can lag its bar.
//!
//! Returns 1-minute [`Bar`]s; aggregating to a run's configured timeframe is
//! `ctk-marketdata::aggregate`'s job, not this one's.

use chrono::{DateTime, Utc};
use ctk_schemas::Bar;
use rust_decimal::Decimal;
use sqlx::PgPool;

type Row = (
    DateTime<Utc>,
    Decimal,
    Decimal,
    Decimal,
    Decimal,
    Decimal,
    Option<Decimal>,
    Option<Decimal>,
    Option<Decimal>,
    Option<Decimal>,
    Option<Decimal>,
);

/// All completed 1-minute bars for `symbol` strictly after `start_ts` and up
/// to and including `end_ts`, in time order.
pub async fn load_1m_bars(
    pool: &PgPool,
    symbol: &str,
    start_ts: DateTime<Utc>,
    end_ts: DateTime<Utc>,
) -> anyhow::Result<Vec<Bar>> {
    let rows: Vec<Row> = sqlx::query_as(
        r#"
        select o.ts_close_utc, o.open, o.high, o.low, o.close, o.volume,
               f.roc_1m, f.roc_tf, f.vol_mult, f.spread_bps, f.rsi_14
        from ohlcv_1m o
        left join features_1m f
          on f.symbol = o.symbol and f.ts_close_utc = o.ts_close_utc
        where o.symbol = $1 and o.ts_close_utc > $2 and o.ts_close_utc <= $3
        order by o.ts_close_utc asc
        "#,
    )
    .bind(symbol)
    .bind(start_ts)
    .bind(end_ts)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(ts, open, high, low, close, volume, roc_1m, roc_tf, vol_mult, spread_bps, rsi_14)| {
                Bar {
                    symbol: symbol.to_string(),
                    ts_close_utc: ts,
                    open: open.to_string(),
                    high: high.to_string(),
                    low: low.to_string(),
                    close: close.to_string(),
                    volume: volume.to_string(),
                    roc_1m: roc_1m.map(|d| d.to_string()),
                    roc_tf: roc_tf.map(|d| d.to_string()),
                    vol_mult: vol_mult.map(|d| d.to_string()),
                    spread_bps: spread_bps.map(|d| d.to_string()),
                    rsi_14: rsi_14.map(|d| d.to_string()),
                }
            },
        )
        .collect())
}

/// The most recent completed bar's close for `symbol`, for mark-to-market
/// and force-exit fills when no fresher bar has arrived this iteration.
pub async fn latest_close(pool: &PgPool, symbol: &str) -> anyhow::Result<Option<Decimal>> {
    let row: Option<(Decimal,)> = sqlx::query_as(
        "select close from ohlcv_1m where symbol = $1 order by ts_close_utc desc limit 1",
    )
    .bind(symbol)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(c,)| c))
}
