//! Spec §3/§4.2/§9: at most one NEW/OPEN position per `(run_id, symbol,
//! side)`. A second insert must fail with
//! `StoreError::PositionAlreadyExists`, not a generic database error.
//!
//! DB-backed test, skipped if DATABASE_URL is not set.

use chrono::Utc;
use ctk_db::error::StoreError;
use ctk_db::types::{NewPosition, NewRun};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn second_inflight_position_on_same_run_symbol_side_is_rejected() -> anyhow::Result<()> {
    let url = match std::env::var(ctk_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: {} not set", ctk_db::ENV_DB_URL);
            return Ok(());
        }
    };

    let pool = ctk_db::connect(&url, 4).await?;
    ctk_db::migrate(&pool).await?;

    let run_id = Uuid::new_v4();
    ctk_db::runs::insert_run(
        &pool,
        &NewRun {
            run_id,
            kind: "live".to_string(),
            name: "uniqueness-test".to_string(),
            symbols: vec!["BTC-USD".to_string()],
            timeframe: "1m".to_string(),
            strategy_name: "momentum_breakout_v2".to_string(),
            strategy_version: "v2".to_string(),
            params: json!({}),
            seed: None,
            status: "active".to_string(),
            starting_capital: Decimal::new(1_000_000_000, 6),
            max_concurrent_positions: 5,
            allow_multiple_positions_per_symbol: false,
            start_ts: None,
            end_ts: None,
        },
    )
    .await?;

    let first = NewPosition {
        position_id: Uuid::new_v4(),
        run_id,
        symbol: "BTC-USD".to_string(),
        side: "LONG".to_string(),
        status: "OPEN".to_string(),
        open_ts: Some(Utc::now()),
        entry_price_vwap: Some(Decimal::new(101_000_000, 6)),
        quantity_open: Decimal::new(990_099, 8),
        cost_basis: Decimal::new(100_000_000, 6),
        fees_total: Decimal::ZERO,
        leverage_effective: Some(1.0),
        stop_loss: Some(Decimal::new(98_980_000, 6)),
        take_profit: None,
    };
    ctk_db::positions::insert_position(&pool, &first).await?;

    let second = NewPosition {
        position_id: Uuid::new_v4(),
        ..first.clone()
    };
    let err = ctk_db::positions::insert_position(&pool, &second)
        .await
        .expect_err("a second in-flight LONG on the same symbol must be rejected");
    assert!(matches!(err, StoreError::PositionAlreadyExists));

    ctk_db::runs::delete_run_cascade(&pool, run_id).await?;
    Ok(())
}
