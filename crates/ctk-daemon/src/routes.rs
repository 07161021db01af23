//! Axum router and all HTTP handlers for ctk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so scenario tests in
//! `tests/` can compose the router directly.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use ctk_schemas::{RunStatus, Timeframe};
use rust_decimal::Decimal;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    api_types::{
        CreateRunRequest, CreateRunResponse, ErrorResponse, HealthResponse, OkResponse,
        RunResponse, SetRunStatusRequest,
    },
    state::AppState,
};

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/runs", post(create_run))
        .route("/v1/runs/:id", get(get_run))
        .route("/v1/runs/:id", delete(delete_run))
        .route("/v1/runs/:id/status", post(set_run_status))
        .route("/v1/runs/:id/force-exit", post(force_exit))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Typed daemon error, mapped to an HTTP status + JSON body at the edge.
/// Callers (tests, the CLI) match on the `kind` implied by the status code
/// rather than parsing the message.
enum AppError {
    NotFound,
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "run not found".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(e) => {
                error!(error = %e, "daemon request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e)
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/runs — createRun (spec §6)
// ---------------------------------------------------------------------------

pub(crate) async fn create_run(
    State(st): State<Arc<AppState>>,
    Json(body): Json<CreateRunRequest>,
) -> Result<Response, AppError> {
    let kind = match body.kind.as_str() {
        "backtest" | "live" => body.kind.clone(),
        other => return Err(AppError::BadRequest(format!("unrecognized run kind '{other}'"))),
    };
    if Timeframe::parse(&body.timeframe).is_none() {
        return Err(AppError::BadRequest(format!(
            "unrecognized timeframe '{}'",
            body.timeframe
        )));
    }
    if body.symbols.is_empty() {
        return Err(AppError::BadRequest("symbols must not be empty".to_string()));
    }
    let starting_capital = Decimal::from_str(&body.starting_capital)
        .map_err(|_| AppError::BadRequest(format!("bad starting_capital '{}'", body.starting_capital)))?;

    // Strategy must already be resolvable — fail the create rather than let
    // a live run or a backtest worker discover this later.
    st.strategies
        .build(&body.strategy_name, &body.strategy_version)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let run_id = Uuid::new_v4();
    let initial_status = if kind == "live" { RunStatus::Active } else { RunStatus::Queued };

    let new_run = ctk_db::types::NewRun {
        run_id,
        kind: kind.clone(),
        name: body.name.clone(),
        symbols: body.symbols.clone(),
        timeframe: body.timeframe.clone(),
        strategy_name: body.strategy_name.clone(),
        strategy_version: body.strategy_version.clone(),
        params: body.params.clone(),
        seed: body.seed,
        status: initial_status.as_str().to_string(),
        starting_capital,
        max_concurrent_positions: body.max_concurrent_positions,
        allow_multiple_positions_per_symbol: body.allow_multiple_positions_per_symbol,
        start_ts: body.start_ts,
        end_ts: body.end_ts,
    };
    ctk_db::runs::insert_run(&st.pool, &new_run).await?;

    let config_hash = record_config_loaded(&st, run_id, &body).await?;

    if kind == "live" {
        spawn_live_run(st.pool.clone(), run_id, Arc::clone(&st.strategies), st.config.clone());
    }

    st.audit
        .lock()
        .await
        .append(
            run_id,
            "CONTROL_PLANE",
            "RUN_CREATED",
            serde_json::json!({"kind": kind, "name": body.name, "symbols": body.symbols}),
        )?;

    info!(run_id = %run_id, kind = %kind, "run created");
    Ok((
        StatusCode::CREATED,
        Json(CreateRunResponse { run_id, config_hash }),
    )
        .into_response())
}

/// Canonicalizes the run's effective configuration (strategy params, risk
/// knobs, execution-cost knobs) via `ctk-config`'s layered-YAML hasher and
/// records it as a `CONFIG_LOADED` event (spec §6's `config_hash`, stored
/// alongside the run since `runs` carries no dedicated column for it).
async fn record_config_loaded(
    st: &AppState,
    run_id: Uuid,
    body: &CreateRunRequest,
) -> anyhow::Result<String> {
    let effective = serde_json::json!({
        "params": body.params,
        "max_concurrent_positions": body.max_concurrent_positions,
        "allow_multiple_positions_per_symbol": body.allow_multiple_positions_per_symbol,
        "slippage_bps": st.config.slippage_bps,
        "taker_fee_bps": st.config.taker_fee_bps,
    });
    let yaml = serde_yaml::to_string(&effective)?;
    let loaded = ctk_config::load_layered_yaml_from_strings(&[&yaml])?;

    let event = ctk_db::types::NewEvent {
        event_id: Uuid::new_v4(),
        run_id,
        event_type: "CONFIG_LOADED".to_string(),
        ts: chrono::Utc::now(),
        payload: serde_json::json!({
            "config_hash": loaded.config_hash,
            "config": loaded.config_json,
        }),
        order_id: None,
        fill_id: None,
        position_id: None,
    };
    ctk_db::events::insert_event(&st.pool, &event).await?;
    Ok(loaded.config_hash)
}

fn spawn_live_run(
    pool: sqlx::PgPool,
    run_id: Uuid,
    strategies: Arc<ctk_strategy::StrategyFactory>,
    config: ctk_config::EngineConfig,
) {
    tokio::spawn(async move {
        if let Err(e) = ctk_engine::run_live(pool.clone(), run_id, strategies, config).await {
            error!(run_id = %run_id, error = %e, "live run failed");
            let _ = ctk_db::runs::set_error(&pool, run_id, &e.to_string()).await;
        }
    });
}

// ---------------------------------------------------------------------------
// GET /v1/runs/:id
// ---------------------------------------------------------------------------

pub(crate) async fn get_run(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunResponse>, AppError> {
    let run = ctk_db::runs::get_run(&st.pool, id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(run.into()))
}

// ---------------------------------------------------------------------------
// POST /v1/runs/:id/status — setRunStatus (spec §6)
// ---------------------------------------------------------------------------

pub(crate) async fn set_run_status(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<SetRunStatusRequest>,
) -> Result<Json<RunResponse>, AppError> {
    let Some(status) = RunStatus::parse(&body.status) else {
        return Err(AppError::BadRequest(format!("unrecognized run status '{}'", body.status)));
    };
    ctk_db::runs::get_run(&st.pool, id).await?.ok_or(AppError::NotFound)?;
    ctk_db::runs::set_run_status(&st.pool, id, status.as_str()).await?;
    let run = ctk_db::runs::get_run(&st.pool, id).await?.ok_or(AppError::NotFound)?;

    st.audit
        .lock()
        .await
        .append(id, "CONTROL_PLANE", "RUN_STATUS_SET", serde_json::json!({"status": status.as_str()}))?;

    info!(run_id = %id, status = %status, "run status set");
    Ok(Json(run.into()))
}

// ---------------------------------------------------------------------------
// POST /v1/runs/:id/force-exit — forceExit (spec §6)
// ---------------------------------------------------------------------------

pub(crate) async fn force_exit(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OkResponse>, AppError> {
    ctk_db::runs::get_run(&st.pool, id).await?.ok_or(AppError::NotFound)?;
    ctk_engine::force_exit(&st.pool, id, &st.config).await?;

    st.audit
        .lock()
        .await
        .append(id, "CONTROL_PLANE", "RUN_FORCE_EXIT", serde_json::json!({}))?;

    info!(run_id = %id, "force-exit complete");
    Ok(Json(OkResponse { ok: true }))
}

// ---------------------------------------------------------------------------
// DELETE /v1/runs/:id — deleteRun cascade (spec §6)
// ---------------------------------------------------------------------------

pub(crate) async fn delete_run(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OkResponse>, AppError> {
    ctk_db::runs::get_run(&st.pool, id).await?.ok_or(AppError::NotFound)?;

    st.audit
        .lock()
        .await
        .append(id, "CONTROL_PLANE", "RUN_DELETED", serde_json::json!({}))?;

    ctk_db::runs::delete_run_cascade(&st.pool, id).await?;
    info!(run_id = %id, "run deleted");
    Ok(Json(OkResponse { ok: true }))
}
