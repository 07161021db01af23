//! Run lifecycle operations (spec §4.2): creation, atomic claim, terminal
//! transitions, and the handful of run-scoped reads the engine and backtest
//! worker need every iteration.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{NewRun, RunRow};

/// Truncation bound for stored error messages (spec §4.2: "1 KiB
/// recommended").
const MAX_ERROR_MESSAGE_BYTES: usize = 1024;

pub async fn insert_run(pool: &PgPool, run: &NewRun) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        insert into runs (
            run_id, kind, name, symbols, timeframe, strategy_name, strategy_version,
            params, seed, status, starting_capital, current_capital,
            max_concurrent_positions, allow_multiple_positions_per_symbol,
            start_ts, end_ts
        ) values (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11, $12, $13, $14, $15
        )
        "#,
    )
    .bind(run.run_id)
    .bind(&run.kind)
    .bind(&run.name)
    .bind(&run.symbols)
    .bind(&run.timeframe)
    .bind(&run.strategy_name)
    .bind(&run.strategy_version)
    .bind(&run.params)
    .bind(run.seed)
    .bind(&run.status)
    .bind(run.starting_capital)
    .bind(run.max_concurrent_positions)
    .bind(run.allow_multiple_positions_per_symbol)
    .bind(run.start_ts)
    .bind(run.end_ts)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_run(pool: &PgPool, run_id: Uuid) -> anyhow::Result<Option<RunRow>> {
    let row = sqlx::query_as::<_, RunRow>("select * from runs where run_id = $1")
        .bind(run_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Atomically select the oldest `status='queued'` run and transition it to
/// `running`, returning it — or `None` if no queued run is available.
///
/// `FOR UPDATE SKIP LOCKED` guarantees concurrent backtest workers never
/// claim the same row (spec §4.2).
pub async fn claim_next_run(pool: &PgPool, worker_name: &str) -> anyhow::Result<Option<RunRow>> {
    let mut tx = pool.begin().await?;

    let claimed: Option<(Uuid,)> = sqlx::query_as(
        r#"
        select run_id
        from runs
        where status = 'queued'
        order by created_at asc
        limit 1
        for update skip locked
        "#,
    )
    .fetch_optional(&mut *tx)
    .await?;

    let Some((run_id,)) = claimed else {
        tx.commit().await?;
        return Ok(None);
    };

    let row = sqlx::query_as::<_, RunRow>(
        r#"
        update runs
           set status = 'running', started_at = now(), claimed_by = $2
         where run_id = $1
        returning *
        "#,
    )
    .bind(run_id)
    .bind(worker_name)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(row))
}

pub async fn set_run_status(pool: &PgPool, run_id: Uuid, status: &str) -> anyhow::Result<()> {
    sqlx::query("update runs set status = $2 where run_id = $1")
        .bind(run_id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_done(pool: &PgPool, run_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("update runs set status = 'done', stopped_at = now() where run_id = $1")
        .bind(run_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_error(pool: &PgPool, run_id: Uuid, message: &str) -> anyhow::Result<()> {
    let truncated = truncate_message(message, MAX_ERROR_MESSAGE_BYTES);
    sqlx::query(
        "update runs set status = 'error', error = $2, stopped_at = now() where run_id = $1",
    )
    .bind(run_id)
    .bind(truncated)
    .execute(pool)
    .await?;
    Ok(())
}

fn truncate_message(message: &str, max_bytes: usize) -> String {
    if message.len() <= max_bytes {
        return message.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

pub async fn update_current_capital(
    pool: &PgPool,
    run_id: Uuid,
    current_capital: Decimal,
) -> anyhow::Result<()> {
    sqlx::query("update runs set current_capital = $2 where run_id = $1")
        .bind(run_id)
        .bind(current_capital)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_start_end_ts(
    pool: &PgPool,
    run_id: Uuid,
    start_ts: DateTime<Utc>,
    end_ts: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query("update runs set start_ts = $2, end_ts = $3 where run_id = $1")
        .bind(run_id)
        .bind(start_ts)
        .bind(end_ts)
        .execute(pool)
        .await?;
    Ok(())
}

/// Cascading delete, in the order spec §6 names: fills → orders →
/// positions → account/price snapshots → events → cursors → run.
pub async fn delete_run_cascade(pool: &PgPool, run_id: Uuid) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("delete from fills where run_id = $1")
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("delete from orders where run_id = $1")
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("delete from positions where run_id = $1")
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("delete from account_snapshots where run_id = $1")
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("delete from price_snapshots where run_id = $1")
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("delete from events where run_id = $1")
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("delete from cursors where run_id = $1")
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("delete from bt_results where run_id = $1")
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("delete from bt_equity where run_id = $1")
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("delete from runs where run_id = $1")
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_messages_untouched() {
        assert_eq!(truncate_message("boom", 1024), "boom");
    }

    #[test]
    fn truncate_clamps_to_a_char_boundary() {
        let long = "x".repeat(2000);
        let truncated = truncate_message(&long, 1024);
        assert_eq!(truncated.len(), 1024);
    }
}
