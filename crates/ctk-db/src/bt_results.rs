//! Backtest summary persistence (spec §4.2, §4.8): one `bt_results` row per
//! `(run_id, symbol)` and an equity-curve point per `(run_id, symbol, ts)`.

use sqlx::PgPool;

use crate::types::{BtEquityPoint, BtResultRow};

pub async fn upsert_bt_result(pool: &PgPool, row: &BtResultRow) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        insert into bt_results (
            run_id, symbol, trades, wins, losses, pnl, fees, win_rate,
            sharpe, sortino, max_dd, profit_factor, exposure, turnover
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        on conflict (run_id, symbol) do update set
            trades = excluded.trades,
            wins = excluded.wins,
            losses = excluded.losses,
            pnl = excluded.pnl,
            fees = excluded.fees,
            win_rate = excluded.win_rate,
            sharpe = excluded.sharpe,
            sortino = excluded.sortino,
            max_dd = excluded.max_dd,
            profit_factor = excluded.profit_factor,
            exposure = excluded.exposure,
            turnover = excluded.turnover
        "#,
    )
    .bind(row.run_id)
    .bind(&row.symbol)
    .bind(row.trades)
    .bind(row.wins)
    .bind(row.losses)
    .bind(row.pnl)
    .bind(row.fees)
    .bind(row.win_rate)
    .bind(row.sharpe)
    .bind(row.sortino)
    .bind(row.max_dd)
    .bind(row.profit_factor)
    .bind(row.exposure)
    .bind(row.turnover)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_bt_equity_point(pool: &PgPool, point: &BtEquityPoint) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        insert into bt_equity (run_id, symbol, ts, equity)
        values ($1, $2, $3, $4)
        on conflict (run_id, symbol, ts) do update set equity = excluded.equity
        "#,
    )
    .bind(point.run_id)
    .bind(&point.symbol)
    .bind(point.ts)
    .bind(point.equity)
    .execute(pool)
    .await?;
    Ok(())
}
