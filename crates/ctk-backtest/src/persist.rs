//! Shared DB-write helpers for the backtest worker (spec §3, §4.7): the
//! backtest-side twin of `ctk-engine::persist`, trimmed to the events a
//! full replay actually emits (no `ACCOUNT_SNAPSHOT`/`POSITION_MARK` cadence
//! — a backtest's per-bar equity curve is `bt_equity`, not periodic account
//! snapshots).

use chrono::{DateTime, Utc};
use ctk_db::types::{NewEvent, NewFill, NewOrder};
use ctk_portfolio::{Fill, Position};
use ctk_risk::RejectionReason;
use ctk_schemas::EventType;
use ctk_strategy::Signal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::convert;

/// Namespace for [`derive_id`], distinct from `ctk-audit`'s event-id
/// namespace so the two id spaces never collide even on an identical seed.
const BACKTEST_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x8e, 0x2c, 0x71, 0x45, 0xd0, 0x9b, 0x4f, 0x63, 0xa1, 0x5d, 0x7a, 0x30, 0xc4, 0x9e, 0x1b, 0x06,
]);

/// Deterministically derives an event/order/fill/position id for a replay
/// (spec §4.7, §8: byte-identical replays). `seq` is the per-symbol bar
/// outcome counter (`SymbolBook::seq`) and `kind` disambiguates the several
/// ids a single outcome can mint (`"event"`, `"order"`, `"fill"`,
/// `"position"`) — no RNG, so the same `(run_id, symbol, seq, kind)` always
/// yields the same id.
fn derive_id(run_id: Uuid, symbol: &str, seq: u64, kind: &str) -> Uuid {
    let name = format!("{run_id}|{symbol}|{seq}|{kind}");
    Uuid::new_v5(&BACKTEST_ID_NAMESPACE, name.as_bytes())
}

#[allow(clippy::too_many_arguments)]
pub async fn record_event(
    pool: &PgPool,
    run_id: Uuid,
    symbol: &str,
    seq: u64,
    event_type: EventType,
    ts: DateTime<Utc>,
    payload: serde_json::Value,
    order_id: Option<Uuid>,
    fill_id: Option<Uuid>,
    position_id: Option<Uuid>,
) -> anyhow::Result<()> {
    let ev = NewEvent {
        event_id: derive_id(run_id, symbol, seq, "event"),
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

#[allow(clippy::too_many_arguments)]
pub async fn record_signal_event(
    pool: &PgPool,
    run_id: Uuid,
    seq: u64,
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
    record_event(pool, run_id, symbol, seq, EventType::Signal, ts, payload, None, None, None).await
}

pub async fn record_new_order(
    pool: &PgPool,
    run_id: Uuid,
    symbol: &str,
    seq: u64,
    position_id: Option<Uuid>,
    fill: &Fill,
) -> anyhow::Result<Uuid> {
    let order_id = derive_id(run_id, symbol, seq, "order");
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
        status: "FILLED".to_string(),
        reason_tag: None,
        rejection_reason: None,
    };
    ctk_db::orders_fills::insert_order(pool, &new_order).await?;
    Ok(order_id)
}

pub async fn record_fill(
    pool: &PgPool,
    run_id: Uuid,
    symbol: &str,
    seq: u64,
    order_id: Uuid,
    position_id: Uuid,
    fill: &Fill,
) -> anyhow::Result<Uuid> {
    let fill_id = derive_id(run_id, symbol, seq, "fill");
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

/// Deterministically derives the id for a newly opened position (spec §4.7,
/// §8). `seq` is `SymbolBook::seq` at the point the owning outcome is
/// applied — see [`derive_id`].
pub fn new_position_id(run_id: Uuid, symbol: &str, seq: u64) -> Uuid {
    derive_id(run_id, symbol, seq, "position")
}

pub async fn record_position_opened(
    pool: &PgPool,
    run_id: Uuid,
    symbol: &str,
    seq: u64,
    position_id: Uuid,
    pos: &Position,
) -> anyhow::Result<()> {
    record_event(
        pool,
        run_id,
        symbol,
        seq,
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
    symbol: &str,
    seq: u64,
    position_id: Uuid,
    pos: &Position,
) -> anyhow::Result<()> {
    let ts = pos.close_ts.unwrap_or(pos.open_ts);
    record_event(
        pool,
        run_id,
        symbol,
        seq,
        EventType::PositionClosed,
        ts,
        position_payload(pos),
        None,
        None,
        Some(position_id),
    )
    .await
}
