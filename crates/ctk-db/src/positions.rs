//! Position CRUD (spec §3, §4.2, §4.4). `insert_position` is the one
//! operation that can legitimately fail with
//! [`crate::error::StoreError::PositionAlreadyExists`] — the accountant
//! opening a brand-new position races the partial unique index.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{NewPosition, PositionRow};

pub async fn insert_position(pool: &PgPool, pos: &NewPosition) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        insert into positions (
            position_id, run_id, symbol, side, status, open_ts,
            entry_price_vwap, quantity_open, cost_basis, fees_total,
            leverage_effective, stop_loss, take_profit
        ) values (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13
        )
        "#,
    )
    .bind(pos.position_id)
    .bind(pos.run_id)
    .bind(&pos.symbol)
    .bind(&pos.side)
    .bind(&pos.status)
    .bind(pos.open_ts)
    .bind(pos.entry_price_vwap)
    .bind(pos.quantity_open)
    .bind(pos.cost_basis)
    .bind(pos.fees_total)
    .bind(pos.leverage_effective)
    .bind(pos.stop_loss)
    .bind(pos.take_profit)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_position(pool: &PgPool, position_id: Uuid) -> anyhow::Result<Option<PositionRow>> {
    let row = sqlx::query_as::<_, PositionRow>("select * from positions where position_id = $1")
        .bind(position_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// The in-flight (NEW/OPEN) position, if any, on `(run_id, symbol, side)`.
pub async fn get_inflight_position(
    pool: &PgPool,
    run_id: Uuid,
    symbol: &str,
    side: &str,
) -> anyhow::Result<Option<PositionRow>> {
    let row = sqlx::query_as::<_, PositionRow>(
        r#"
        select * from positions
        where run_id = $1 and symbol = $2 and side = $3
          and status in ('NEW', 'OPEN')
        "#,
    )
    .bind(run_id)
    .bind(symbol)
    .bind(side)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// All in-flight positions for a run, across all symbols/sides — used by
/// the engine to count toward `max_concurrent_positions` and by force-exit.
pub async fn list_inflight_positions(pool: &PgPool, run_id: Uuid) -> anyhow::Result<Vec<PositionRow>> {
    let rows = sqlx::query_as::<_, PositionRow>(
        "select * from positions where run_id = $1 and status in ('NEW', 'OPEN') order by open_ts",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Apply an opening fill's VWAP update (spec §3): `P' = (P·Q + p·q)/(Q+q)`.
#[allow(clippy::too_many_arguments)]
pub async fn apply_opening_fill(
    pool: &PgPool,
    position_id: Uuid,
    new_entry_price_vwap: Decimal,
    new_quantity_open: Decimal,
    new_cost_basis: Decimal,
    new_fees_total: Decimal,
    new_status: &str,
    open_ts: Option<DateTime<Utc>>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        update positions
           set entry_price_vwap = $2,
               quantity_open = $3,
               cost_basis = $4,
               fees_total = $5,
               status = $6,
               open_ts = coalesce(open_ts, $7),
               updated_at = now()
         where position_id = $1
        "#,
    )
    .bind(position_id)
    .bind(new_entry_price_vwap)
    .bind(new_quantity_open)
    .bind(new_cost_basis)
    .bind(new_fees_total)
    .bind(new_status)
    .bind(open_ts)
    .execute(pool)
    .await?;
    Ok(())
}

/// Apply a closing fill (spec §3/§4.4): reduce `quantity_open`, grow
/// `quantity_close`, accumulate fees and realized P&L, and — once
/// `quantity_open` reaches zero within tolerance — close the position.
#[allow(clippy::too_many_arguments)]
pub async fn apply_closing_fill(
    pool: &PgPool,
    position_id: Uuid,
    new_quantity_open: Decimal,
    new_quantity_close: Decimal,
    new_fees_total: Decimal,
    new_realized_pnl: Decimal,
    new_exit_price_vwap: Option<Decimal>,
    is_closed: bool,
    close_ts: Option<DateTime<Utc>>,
) -> anyhow::Result<()> {
    let status = if is_closed { "CLOSED" } else { "OPEN" };
    sqlx::query(
        r#"
        update positions
           set quantity_open = $2,
               quantity_close = $3,
               fees_total = $4,
               realized_pnl = $5,
               exit_price_vwap = coalesce($6, exit_price_vwap),
               status = $7,
               close_ts = case when $7 = 'CLOSED' then $8 else close_ts end,
               updated_at = now()
         where position_id = $1
        "#,
    )
    .bind(position_id)
    .bind(new_quantity_open)
    .bind(new_quantity_close)
    .bind(new_fees_total)
    .bind(new_realized_pnl)
    .bind(new_exit_price_vwap)
    .bind(status)
    .bind(close_ts)
    .execute(pool)
    .await?;
    Ok(())
}
