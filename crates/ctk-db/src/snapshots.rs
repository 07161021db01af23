//! Account and price snapshots (spec §3, §4.6 step 4) — both append-only,
//! unique per `(run_id, ts)` / `(run_id, ts, symbol)`.

use sqlx::PgPool;

use crate::types::{NewAccountSnapshot, NewPriceSnapshot};

pub async fn insert_account_snapshot(
    pool: &PgPool,
    snap: &NewAccountSnapshot,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        insert into account_snapshots (
            snapshot_id, run_id, ts, equity, cash, margin_used,
            exposure_gross, exposure_net, open_positions_count
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        on conflict (run_id, ts) do nothing
        "#,
    )
    .bind(snap.snapshot_id)
    .bind(snap.run_id)
    .bind(snap.ts)
    .bind(snap.equity)
    .bind(snap.cash)
    .bind(snap.margin_used)
    .bind(snap.exposure_gross)
    .bind(snap.exposure_net)
    .bind(snap.open_positions_count)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_price_snapshot(pool: &PgPool, snap: &NewPriceSnapshot) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        insert into price_snapshots (snapshot_id, run_id, ts, symbol, price)
        values ($1, $2, $3, $4, $5)
        on conflict (run_id, ts, symbol) do nothing
        "#,
    )
    .bind(snap.snapshot_id)
    .bind(snap.run_id)
    .bind(snap.ts)
    .bind(&snap.symbol)
    .bind(snap.price)
    .execute(pool)
    .await?;
    Ok(())
}
