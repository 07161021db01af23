//! Per-`(run, symbol)` candle cursor (spec §3, §4.2): the last processed
//! bar timestamp. Monotonic non-decreasing — `set_cursor` silently no-ops a
//! regression rather than erroring, since the caller's retry-after-timeout
//! path may replay a bar it already advanced past.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn get_cursor(
    pool: &PgPool,
    run_id: Uuid,
    symbol: &str,
) -> anyhow::Result<Option<DateTime<Utc>>> {
    let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
        "select last_processed_candle_ts from cursors where run_id = $1 and symbol = $2",
    )
    .bind(run_id)
    .bind(symbol)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(ts,)| ts))
}

pub async fn set_cursor(
    pool: &PgPool,
    run_id: Uuid,
    symbol: &str,
    ts: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        insert into cursors (run_id, symbol, last_processed_candle_ts)
        values ($1, $2, $3)
        on conflict (run_id, symbol) do update
           set last_processed_candle_ts = excluded.last_processed_candle_ts
         where excluded.last_processed_candle_ts >= cursors.last_processed_candle_ts
        "#,
    )
    .bind(run_id)
    .bind(symbol)
    .bind(ts)
    .execute(pool)
    .await?;
    Ok(())
}
