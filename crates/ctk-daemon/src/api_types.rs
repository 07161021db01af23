//! Request and response types for all ctk-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Error body
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// POST /v1/runs — createRun (spec §6)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRunRequest {
    /// "backtest" | "live".
    pub kind: String,
    pub name: String,
    pub symbols: Vec<String>,
    /// One of {1m,5m,15m,30m,1h,4h,1d}.
    pub timeframe: String,
    pub strategy_name: String,
    pub strategy_version: String,
    #[serde(default = "default_params")]
    pub params: Value,
    pub seed: Option<i64>,
    /// Decimal text, e.g. "100000.00".
    pub starting_capital: String,
    #[serde(default = "default_max_concurrent_positions")]
    pub max_concurrent_positions: i32,
    #[serde(default)]
    pub allow_multiple_positions_per_symbol: bool,
    pub start_ts: Option<DateTime<Utc>>,
    pub end_ts: Option<DateTime<Utc>>,
}

fn default_params() -> Value {
    Value::Object(Default::default())
}

fn default_max_concurrent_positions() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRunResponse {
    pub run_id: Uuid,
    pub config_hash: String,
}

// ---------------------------------------------------------------------------
// POST /v1/runs/:id/status — setRunStatus (spec §6)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRunStatusRequest {
    /// One of {queued,running,active,paused,winding_down,stopped,done,error}.
    pub status: String,
}

// ---------------------------------------------------------------------------
// GET /v1/runs/:id — run projection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub run_id: Uuid,
    pub kind: String,
    pub name: String,
    pub symbols: Vec<String>,
    pub timeframe: String,
    pub strategy_name: String,
    pub strategy_version: String,
    pub status: String,
    pub starting_capital: String,
    pub current_capital: String,
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

impl From<ctk_db::types::RunRow> for RunResponse {
    fn from(r: ctk_db::types::RunRow) -> Self {
        Self {
            run_id: r.run_id,
            kind: r.kind,
            name: r.name,
            symbols: r.symbols,
            timeframe: r.timeframe,
            strategy_name: r.strategy_name,
            strategy_version: r.strategy_version,
            status: r.status,
            starting_capital: r.starting_capital.to_string(),
            current_capital: r.current_capital.to_string(),
            max_concurrent_positions: r.max_concurrent_positions,
            allow_multiple_positions_per_symbol: r.allow_multiple_positions_per_symbol,
            start_ts: r.start_ts,
            end_ts: r.end_ts,
            claimed_by: r.claimed_by,
            created_at: r.created_at,
            started_at: r.started_at,
            stopped_at: r.stopped_at,
            error: r.error,
        }
    }
}

// ---------------------------------------------------------------------------
// Generic ok ack — force-exit, delete
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}
