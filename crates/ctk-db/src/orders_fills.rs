//! Orders and fills (spec §3, §4.4) — append-only once filled; orders
//! transition `NEW → FILLED | PARTIAL | CANCELLED | REJECTED`.

use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{FillRow, NewFill, NewOrder, OrderRow};

pub async fn insert_order(pool: &PgPool, order: &NewOrder) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        insert into orders (
            order_id, run_id, symbol, position_id, ts, side, type, qty, price,
            status, reason_tag, rejection_reason
        ) values (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12
        )
        "#,
    )
    .bind(order.order_id)
    .bind(order.run_id)
    .bind(&order.symbol)
    .bind(order.position_id)
    .bind(order.ts)
    .bind(&order.side)
    .bind(&order.order_type)
    .bind(order.qty)
    .bind(order.price)
    .bind(&order.status)
    .bind(&order.reason_tag)
    .bind(&order.rejection_reason)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_order_status(pool: &PgPool, order_id: Uuid, status: &str) -> anyhow::Result<()> {
    sqlx::query("update orders set status = $2 where order_id = $1")
        .bind(order_id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_order_position(
    pool: &PgPool,
    order_id: Uuid,
    position_id: Uuid,
) -> anyhow::Result<()> {
    sqlx::query("update orders set position_id = $2 where order_id = $1")
        .bind(order_id)
        .bind(position_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_order(pool: &PgPool, order_id: Uuid) -> anyhow::Result<Option<OrderRow>> {
    let row = sqlx::query_as::<_, OrderRow>("select * from orders where order_id = $1")
        .bind(order_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn insert_fill(pool: &PgPool, fill: &NewFill) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        insert into fills (fill_id, order_id, position_id, run_id, symbol, ts, qty, price, fee)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(fill.fill_id)
    .bind(fill.order_id)
    .bind(fill.position_id)
    .bind(fill.run_id)
    .bind(&fill.symbol)
    .bind(fill.ts)
    .bind(fill.qty)
    .bind(fill.price)
    .bind(fill.fee)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_fills_for_position(
    pool: &PgPool,
    position_id: Uuid,
) -> anyhow::Result<Vec<FillRow>> {
    let rows = sqlx::query_as::<_, FillRow>(
        "select * from fills where position_id = $1 order by ts",
    )
    .bind(position_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Every fill in a run, ordered by time — the raw material for the
/// turnover metric (spec §4.8) and equity-curve reconstruction.
pub async fn list_fills_for_run(pool: &PgPool, run_id: Uuid) -> anyhow::Result<Vec<FillRow>> {
    let rows = sqlx::query_as::<_, FillRow>("select * from fills where run_id = $1 order by ts")
        .bind(run_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
