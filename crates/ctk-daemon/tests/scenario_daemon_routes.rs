//! Scenario: the control-plane HTTP surface (spec §6) round-trips a
//! backtest run through create -> get -> set-status -> delete, and a
//! malformed create is rejected before anything is written.
//!
//! DB-backed test, skipped if DATABASE_URL is not set.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use bytes::Bytes;
use ctk_config::EngineConfig;
use ctk_daemon::{routes, state::AppState};
use ctk_strategy::StrategyFactory;
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp.into_body().collect().await.expect("body collect failed").to_bytes();
    (status, body)
}

fn parse_json(b: Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

async fn shared_state() -> Option<Arc<AppState>> {
    let url = match std::env::var(ctk_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: {} not set", ctk_db::ENV_DB_URL);
            return None;
        }
    };
    let pool = ctk_db::connect(&url, 4).await.expect("connect");
    ctk_db::migrate(&pool).await.expect("migrate");
    let strategies = Arc::new(StrategyFactory::with_builtins());
    Some(Arc::new(AppState::new(pool, strategies, EngineConfig::default())))
}

fn create_body() -> serde_json::Value {
    serde_json::json!({
        "kind": "backtest",
        "name": "daemon-route-test",
        "symbols": ["BTC-USD"],
        "timeframe": "1m",
        "strategy_name": "momentum_breakout_v2",
        "strategy_version": "v2",
        "starting_capital": "100000.00",
    })
}

#[tokio::test]
async fn create_get_status_delete_round_trip() {
    let Some(st) = shared_state().await else { return };

    let req = Request::builder()
        .method("POST")
        .uri("/v1/runs")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(create_body().to_string()))
        .unwrap();
    let (status, body) = call(routes::build_router(Arc::clone(&st)), req).await;
    assert_eq!(status, StatusCode::CREATED, "create_run failed: {body:?}");
    let created = parse_json(body);
    let run_id = created["run_id"].as_str().unwrap().to_string();
    assert!(!created["config_hash"].as_str().unwrap().is_empty());

    let req = Request::builder()
        .method("GET")
        .uri(format!("/v1/runs/{run_id}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = call(routes::build_router(Arc::clone(&st)), req).await;
    assert_eq!(status, StatusCode::OK);
    let got = parse_json(body);
    assert_eq!(got["status"], "queued");
    assert_eq!(got["kind"], "backtest");

    let req = Request::builder()
        .method("POST")
        .uri(format!("/v1/runs/{run_id}/status"))
        .header("content-type", "application/json")
        .body(axum::body::Body::from(r#"{"status":"paused"}"#))
        .unwrap();
    let (status, body) = call(routes::build_router(Arc::clone(&st)), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["status"], "paused");

    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/v1/runs/{run_id}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _) = call(routes::build_router(Arc::clone(&st)), req).await;
    assert_eq!(status, StatusCode::OK);

    let req = Request::builder()
        .method("GET")
        .uri(format!("/v1/runs/{run_id}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _) = call(routes::build_router(st), req).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "run should be gone after delete");
}

#[tokio::test]
async fn create_run_rejects_unknown_strategy() {
    let Some(st) = shared_state().await else { return };

    let mut body = create_body();
    body["strategy_name"] = serde_json::json!("not_a_real_strategy");

    let req = Request::builder()
        .method("POST")
        .uri("/v1/runs")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap();
    let (status, _) = call(routes::build_router(st), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_unknown_run_is_404() {
    let Some(st) = shared_state().await else { return };

    let req = Request::builder()
        .method("GET")
        .uri(format!("/v1/runs/{}", Uuid::new_v4()))
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _) = call(routes::build_router(st), req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_ok() {
    let Some(st) = shared_state().await else { return };

    let req = Request::builder()
        .method("GET")
        .uri("/v1/health")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = call(routes::build_router(st), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["ok"], true);
}
