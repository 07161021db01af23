//! Structured audit events (spec §3) — append-only, one row per
//! ACCOUNT_SNAPSHOT/ORDER_NEW/ORDER_UPDATE/FILL/POSITION_*/SIGNAL/
//! STRATEGY_NOTE.

use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{EventRow, NewEvent};

pub async fn insert_event(pool: &PgPool, event: &NewEvent) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        insert into events (event_id, run_id, event_type, ts, payload, order_id, fill_id, position_id)
        values ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(event.event_id)
    .bind(event.run_id)
    .bind(&event.event_type)
    .bind(event.ts)
    .bind(&event.payload)
    .bind(event.order_id)
    .bind(event.fill_id)
    .bind(event.position_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_events_for_run(pool: &PgPool, run_id: Uuid) -> anyhow::Result<Vec<EventRow>> {
    let rows = sqlx::query_as::<_, EventRow>("select * from events where run_id = $1 order by ts")
        .bind(run_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
