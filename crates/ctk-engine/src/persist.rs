//! Shared DB-write helpers for the live controller (spec §3, §4.6): turning
//! a [`ctk_portfolio::Fill`]/[`ctk_portfolio::Position`] into the
//! `orders`/`fills`/`events` rows the store expects. Stateless — callers own
//! `position_id` bookkeeping (`ctk-db` positions have no in-memory identity
//! of their own).

use chrono::{DateTime, Utc};
use ctk_db::types::{NewEvent, NewFill, NewOrder};
use ctk_portfolio::{Fill, Position};
use ctk_risk::RejectionReason;
use ctk_schemas::EventType;
use ctk_strategy::Signal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::convert;

#[allow(clippy::too_many_arguments)]
pub async fn record_event(
    pool: &PgPool,
    run_id: Uuid,
    event_type: EventType,
    ts: DateTime<Utc>,
    payload: serde_json::Value,
    order_id: Option<Uuid>,
    fill_id: Option<Uuid>,
    position_id: Option<Uuid>,
) -> anyhow::Result<()> {
    let ev = NewEvent {
        event_id: Uuid::new_v4(),
        run_id,
        event_type: event_type.as_str().to_string(),
        ts,
        payload,
        order_id,
        fill_id,
        position_id,
    };
    ctk_db::events::insert_event(pool, &ev).await
}

/// Persist the SIGNAL event spec §4.5/§7 require for every signal the guard
/// table has ruled on — admitted or rejected alike.
pub async fn record_signal_event(
    pool: &PgPool,
    run_id: Uuid,
    ts: DateTime<Utc>,
    symbol: &str,
    signal: &Signal,
    rejection_reason: Option<RejectionReason>,
) -> anyhow::Result<()> {
    let payload = serde_json::json!({
        "symbol": symbol,
        "side": signal.side.as_str(),
        "size": signal.size.to_string(),
        "reason": signal.reason,
        "executed": rejection_reason.is_none(),
        "rejection_reason": rejection_reason.map(RejectionReason::as_str),
    });
    record_event(pool, run_id, EventType::Signal, ts, payload, None, None, None).await
}

/// Insert the `ORDER` row for a fill about to be applied, plus its
/// `ORDER_NEW` event. Returns the freshly generated `order_id`.
pub async fn record_new_order(
    pool: &PgPool,
    run_id: Uuid,
    symbol: &str,
    position_id: Option<Uuid>,
    fill: &Fill,
) -> anyhow::Result<Uuid> {
    let order_id = Uuid::new_v4();
    let new_order = NewOrder {
        order_id,
        run_id,
        symbol: symbol.to_string(),
        position_id,
        ts: fill.ts,
        side: convert::side_to_str(fill.side).to_string(),
        order_type: fill.order_type.as_str().to_string(),
        qty: convert::qty_to_decimal(fill.qty),
        price: Some(convert::micros_to_decimal(fill.price)),
        status: "NEW".to_string(),
        reason_tag: None,
        rejection_reason: None,
    };
    ctk_db::orders_fills::insert_order(pool, &new_order).await?;
    let payload = serde_json::json!({
        "order_id": order_id,
        "symbol": symbol,
        "side": fill.side.as_str(),
        "type": fill.order_type.as_str(),
        "qty": fill.qty.to_string(),
    });
    record_event(pool, run_id, EventType::OrderNew, fill.ts, payload, Some(order_id), None, position_id).await?;
    Ok(order_id)
}

/// Insert the `FILL` row, mark the order `FILLED`, and emit the `FILL`
/// event — the final step once accounting has resolved what the fill did.
pub async fn record_fill(
    pool: &PgPool,
    run_id: Uuid,
    symbol: &str,
    order_id: Uuid,
    position_id: Uuid,
    fill: &Fill,
) -> anyhow::Result<Uuid> {
    let fill_id = Uuid::new_v4();
    let new_fill = NewFill {
        fill_id,
        order_id,
        position_id: Some(position_id),
        run_id,
        symbol: symbol.to_string(),
        ts: fill.ts,
        qty: convert::qty_to_decimal(fill.qty),
        price: convert::micros_to_decimal(fill.price),
        fee: convert::micros_to_decimal(fill.fee),
    };
    ctk_db::orders_fills::insert_fill(pool, &new_fill).await?;
    ctk_db::orders_fills::set_order_status(pool, order_id, "FILLED").await?;
    let payload = serde_json::json!({
        "fill_id": fill_id,
        "order_id": order_id,
        "symbol": symbol,
        "qty": fill.qty.to_string(),
        "price": fill.price.to_string(),
        "fee": fill.fee.to_string(),
    });
    record_event(pool, run_id, EventType::Fill, fill.ts, payload, Some(order_id), Some(fill_id), Some(position_id)).await?;
    Ok(fill_id)
}

pub fn position_payload(pos: &Position) -> serde_json::Value {
    serde_json::json!({
        "symbol": pos.symbol,
        "side": pos.side.as_str(),
        "status": pos.status.as_str(),
        "entry_price_vwap": pos.entry_price_vwap.to_string(),
        "exit_price_vwap": pos.exit_price_vwap.map(|m| m.to_string()),
        "quantity_open": pos.quantity_open.to_string(),
        "quantity_close": pos.quantity_close.to_string(),
        "realized_pnl": pos.realized_pnl().to_string(),
        "fees_total": pos.fees_total.to_string(),
    })
}

pub async fn record_position_opened(
    pool: &PgPool,
    run_id: Uuid,
    position_id: Uuid,
    pos: &Position,
) -> anyhow::Result<()> {
    record_event(
        pool,
        run_id,
        EventType::PositionOpened,
        pos.open_ts,
        position_payload(pos),
        None,
        None,
        Some(position_id),
    )
    .await
}

pub async fn record_position_closed(
    pool: &PgPool,
    run_id: Uuid,
    position_id: Uuid,
    pos: &Position,
) -> anyhow::Result<()> {
    let ts = pos.close_ts.unwrap_or(pos.open_ts);
    record_event(
        pool,
        run_id,
        EventType::PositionClosed,
        ts,
        position_payload(pos),
        None,
        None,
        Some(position_id),
    )
    .await
}

pub async fn record_position_mark(
    pool: &PgPool,
    run_id: Uuid,
    position_id: Uuid,
    pos: &Position,
    mark: ctk_portfolio::Micros,
    ts: DateTime<Utc>,
) -> anyhow::Result<()> {
    let payload = serde_json::json!({
        "symbol": pos.symbol,
        "side": pos.side.as_str(),
        "mark": mark.to_string(),
        "unrealized_pnl": pos.unrealized_pnl(mark).to_string(),
    });
    record_event(pool, run_id, EventType::PositionMark, ts, payload, None, None, Some(position_id)).await
}

pub async fn record_strategy_note(
    pool: &PgPool,
    run_id: Uuid,
    symbol: &str,
    ts: DateTime<Utc>,
    note: &str,
) -> anyhow::Result<()> {
    let payload = serde_json::json!({ "symbol": symbol, "note": note });
    record_event(pool, run_id, EventType::StrategyNote, ts, payload, None, None, None).await
}
