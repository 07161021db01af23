//! Row and insert-argument types for the trading store (spec §3, §6).
//!
//! Money/quantity columns round-trip through `rust_decimal::Decimal`, not
//! `f64` — Postgres `numeric` maps onto it directly via sqlx. Callers above
//! this crate (`ctk-engine`, `ctk-backtest`) convert to/from their own
//! `Micros`/`Qty` fixed-point types at this boundary (spec §9 "Numeric
//! types" design note).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunRow {
    pub run_id: Uuid,
    pub kind: String,
    pub name: String,
    pub symbols: Vec<String>,
    pub timeframe: String,
    pub strategy_name: String,
    pub strategy_version: String,
    pub params: Value,
    pub seed: Option<i64>,
    pub status: String,
    pub starting_capital: Decimal,
    pub current_capital: Decimal,
    pub max_concurrent_positions: i32,
    pub allow_multiple_positions_per_symbol: bool,
    pub start_ts: Option<DateTime<Utc>>,
    pub end_ts: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRun {
    pub run_id: Uuid,
    pub kind: String,
    pub name: String,
    pub symbols: Vec<String>,
    pub timeframe: String,
    pub strategy_name: String,
    pub strategy_version: String,
    pub params: Value,
    pub seed: Option<i64>,
    pub status: String,
    pub starting_capital: Decimal,
    pub max_concurrent_positions: i32,
    pub allow_multiple_positions_per_symbol: bool,
    pub start_ts: Option<DateTime<Utc>>,
    pub end_ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PositionRow {
    pub position_id: Uuid,
    pub run_id: Uuid,
    pub symbol: String,
    pub side: String,
    pub status: String,
    pub open_ts: Option<DateTime<Utc>>,
    pub close_ts: Option<DateTime<Utc>>,
    pub entry_price_vwap: Option<Decimal>,
    pub exit_price_vwap: Option<Decimal>,
    pub quantity_open: Decimal,
    pub quantity_close: Decimal,
    pub cost_basis: Decimal,
    pub fees_total: Decimal,
    pub realized_pnl: Decimal,
    pub leverage_effective: Option<f64>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPosition {
    pub position_id: Uuid,
    pub run_id: Uuid,
    pub symbol: String,
    pub side: String,
    pub status: String,
    pub open_ts: Option<DateTime<Utc>>,
    pub entry_price_vwap: Option<Decimal>,
    pub quantity_open: Decimal,
    pub cost_basis: Decimal,
    pub fees_total: Decimal,
    pub leverage_effective: Option<f64>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub order_id: Uuid,
    pub run_id: Uuid,
    pub symbol: String,
    pub position_id: Option<Uuid>,
    pub ts: DateTime<Utc>,
    pub side: String,
    #[sqlx(rename = "type")]
    pub order_type: String,
    pub qty: Decimal,
    pub price: Option<Decimal>,
    pub status: String,
    pub reason_tag: Option<String>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: Uuid,
    pub run_id: Uuid,
    pub symbol: String,
    pub position_id: Option<Uuid>,
    pub ts: DateTime<Utc>,
    pub side: String,
    pub order_type: String,
    pub qty: Decimal,
    pub price: Option<Decimal>,
    pub status: String,
    pub reason_tag: Option<String>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FillRow {
    pub fill_id: Uuid,
    pub order_id: Uuid,
    pub position_id: Option<Uuid>,
    pub run_id: Uuid,
    pub symbol: String,
    pub ts: DateTime<Utc>,
    pub qty: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewFill {
    pub fill_id: Uuid,
    pub order_id: Uuid,
    pub position_id: Option<Uuid>,
    pub run_id: Uuid,
    pub symbol: String,
    pub ts: DateTime<Utc>,
    pub qty: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewAccountSnapshot {
    pub snapshot_id: Uuid,
    pub run_id: Uuid,
    pub ts: DateTime<Utc>,
    pub equity: Decimal,
    pub cash: Decimal,
    pub margin_used: Decimal,
    pub exposure_gross: Decimal,
    pub exposure_net: Decimal,
    pub open_positions_count: i32,
}

#[derive(Debug, Clone)]
pub struct NewPriceSnapshot {
    pub snapshot_id: Uuid,
    pub run_id: Uuid,
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub price: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_id: Uuid,
    pub run_id: Uuid,
    pub event_type: String,
    pub ts: DateTime<Utc>,
    pub payload: Value,
    pub order_id: Option<Uuid>,
    pub fill_id: Option<Uuid>,
    pub position_id: Option<Uuid>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    pub event_id: Uuid,
    pub run_id: Uuid,
    pub event_type: String,
    pub ts: DateTime<Utc>,
    pub payload: Value,
    pub order_id: Option<Uuid>,
    pub fill_id: Option<Uuid>,
    pub position_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct BtResultRow {
    pub run_id: Uuid,
    pub symbol: String,
    pub trades: i32,
    pub wins: i32,
    pub losses: i32,
    pub pnl: Decimal,
    pub fees: Decimal,
    pub win_rate: f64,
    pub sharpe: Option<f64>,
    pub sortino: Option<f64>,
    pub max_dd: f64,
    pub profit_factor: Option<f64>,
    pub exposure: f64,
    pub turnover: Decimal,
}

#[derive(Debug, Clone)]
pub struct BtEquityPoint {
    pub run_id: Uuid,
    pub symbol: String,
    pub ts: DateTime<Utc>,
    pub equity: Decimal,
}
