//! Run-lifecycle command handlers: create, status, set-status, force-exit,
//! delete, events. Talks to `ctk-db` directly rather than through
//! `ctk-daemon`'s HTTP API — useful for local development and scripted
//! backtests where no daemon process is running.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ctk_audit::AuditWriter;
use ctk_config::EngineConfig;
use ctk_db::types::{EventRow, NewEvent, NewRun, RunRow};
use ctk_schemas::{RunStatus, Timeframe};
use ctk_strategy::StrategyFactory;
use serde_json::Value;
use uuid::Uuid;

use super::{load_params, parse_symbols};

#[allow(clippy::too_many_arguments)]
pub async fn run_create(
    kind: String,
    name: String,
    symbols: String,
    timeframe: String,
    strategy_name: String,
    strategy_version: String,
    starting_capital: String,
    params: Option<String>,
    params_file: Option<String>,
    seed: Option<i64>,
    max_concurrent_positions: i32,
    allow_multiple_positions_per_symbol: bool,
    start: Option<String>,
    end: Option<String>,
) -> Result<()> {
    let start = start.map(|s| parse_rfc3339(&s)).transpose()?;
    let end = end.map(|s| parse_rfc3339(&s)).transpose()?;
    let config = EngineConfig::from_env();
    let pool = ctk_db::connect_from_env(config.db_pool_max).await?;

    let kind = match kind.as_str() {
        "backtest" | "live" => kind,
        other => anyhow::bail!("unrecognized --kind '{other}', expected backtest|live"),
    };
    if Timeframe::parse(&timeframe).is_none() {
        anyhow::bail!("unrecognized --timeframe '{}'", timeframe);
    }
    let symbols = parse_symbols(&symbols)?;
    let starting_capital_dec: rust_decimal::Decimal = starting_capital
        .parse()
        .with_context(|| format!("bad --starting-capital '{starting_capital}'"))?;
    let params = load_params(params, params_file)?;

    let strategies = StrategyFactory::with_builtins();
    strategies
        .build(&strategy_name, &strategy_version)
        .with_context(|| format!("unresolved strategy {strategy_name}@{strategy_version}"))?;

    if kind == "backtest" && (start.is_none() || end.is_none()) {
        anyhow::bail!("backtest runs require both --start and --end");
    }

    let run_id = Uuid::new_v4();
    let initial_status = if kind == "live" { RunStatus::Active } else { RunStatus::Queued };

    let new_run = NewRun {
        run_id,
        kind: kind.clone(),
        name: name.clone(),
        symbols: symbols.clone(),
        timeframe: timeframe.clone(),
        strategy_name: strategy_name.clone(),
        strategy_version: strategy_version.clone(),
        params: params.clone(),
        seed,
        status: initial_status.as_str().to_string(),
        starting_capital: starting_capital_dec,
        max_concurrent_positions,
        allow_multiple_positions_per_symbol,
        start_ts: start,
        end_ts: end,
    };
    ctk_db::runs::insert_run(&pool, &new_run).await?;

    let config_hash = record_config_loaded(&pool, &config, run_id, &params, max_concurrent_positions, allow_multiple_positions_per_symbol).await?;

    let mut audit = open_audit()?;
    audit.append(
        run_id,
        "CONTROL_PLANE",
        "RUN_CREATED",
        serde_json::json!({"kind": kind, "name": name, "symbols": symbols}),
    )?;

    println!("run_id={}", run_id);
    println!("kind={}", kind);
    println!("status={}", initial_status.as_str());
    println!("config_hash={}", config_hash);

    if kind == "live" {
        println!("note: run created as active; start the live loop with `ctk-cli engine live --run-id {run_id}`");
    }

    Ok(())
}

/// Canonicalizes the run's effective configuration and records it as a
/// `CONFIG_LOADED` event — `runs` carries no dedicated `config_hash` column.
async fn record_config_loaded(
    pool: &sqlx::PgPool,
    config: &EngineConfig,
    run_id: Uuid,
    params: &Value,
    max_concurrent_positions: i32,
    allow_multiple_positions_per_symbol: bool,
) -> Result<String> {
    let effective = serde_json::json!({
        "params": params,
        "max_concurrent_positions": max_concurrent_positions,
        "allow_multiple_positions_per_symbol": allow_multiple_positions_per_symbol,
        "slippage_bps": config.slippage_bps,
        "taker_fee_bps": config.taker_fee_bps,
    });
    let yaml = serde_yaml::to_string(&effective)?;
    let loaded = ctk_config::load_layered_yaml_from_strings(&[&yaml])?;

    let event = NewEvent {
        event_id: Uuid::new_v4(),
        run_id,
        event_type: "CONFIG_LOADED".to_string(),
        ts: Utc::now(),
        payload: serde_json::json!({
            "config_hash": loaded.config_hash,
            "config": loaded.config_json,
        }),
        order_id: None,
        fill_id: None,
        position_id: None,
    };
    ctk_db::events::insert_event(pool, &event).await?;
    Ok(loaded.config_hash)
}

pub async fn run_status(run_id: String) -> Result<()> {
    let run_id = Uuid::parse_str(&run_id).context("invalid --run-id")?;
    let config = EngineConfig::from_env();
    let pool = ctk_db::connect_from_env(config.db_pool_max).await?;
    let run = ctk_db::runs::get_run(&pool, run_id)
        .await?
        .with_context(|| format!("run {run_id} not found"))?;
    print_run(&run);
    Ok(())
}

fn print_run(r: &RunRow) {
    println!("run_id={}", r.run_id);
    println!("kind={}", r.kind);
    println!("name={}", r.name);
    println!("status={}", r.status);
    println!("symbols={}", r.symbols.join(","));
    println!("timeframe={}", r.timeframe);
    println!("strategy={}@{}", r.strategy_name, r.strategy_version);
    println!("starting_capital={}", r.starting_capital);
    println!("current_capital={}", r.current_capital);
    println!("max_concurrent_positions={}", r.max_concurrent_positions);
    println!(
        "allow_multiple_positions_per_symbol={}",
        r.allow_multiple_positions_per_symbol
    );
    println!("claimed_by={}", r.claimed_by.as_deref().unwrap_or(""));
    println!("created_at={}", r.created_at.to_rfc3339());
    println!("error={}", r.error.as_deref().unwrap_or(""));
}

pub async fn run_set_status(run_id: String, status: String) -> Result<()> {
    let run_id = Uuid::parse_str(&run_id).context("invalid --run-id")?;
    let Some(status) = RunStatus::parse(&status) else {
        anyhow::bail!("unrecognized --status '{status}'");
    };
    let config = EngineConfig::from_env();
    let pool = ctk_db::connect_from_env(config.db_pool_max).await?;
    ctk_db::runs::get_run(&pool, run_id)
        .await?
        .with_context(|| format!("run {run_id} not found"))?;
    ctk_db::runs::set_run_status(&pool, run_id, status.as_str()).await?;

    let mut audit = open_audit()?;
    audit.append(
        run_id,
        "CONTROL_PLANE",
        "RUN_STATUS_SET",
        serde_json::json!({"status": status.as_str()}),
    )?;

    println!("run_id={} status={}", run_id, status.as_str());
    Ok(())
}

pub async fn run_force_exit(run_id: String) -> Result<()> {
    let run_id = Uuid::parse_str(&run_id).context("invalid --run-id")?;
    let config = EngineConfig::from_env();
    let pool = ctk_db::connect_from_env(config.db_pool_max).await?;
    ctk_db::runs::get_run(&pool, run_id)
        .await?
        .with_context(|| format!("run {run_id} not found"))?;
    ctk_engine::force_exit(&pool, run_id, &config).await?;

    let mut audit = open_audit()?;
    audit.append(run_id, "CONTROL_PLANE", "RUN_FORCE_EXIT", serde_json::json!({}))?;

    println!("run_id={} force_exit=done", run_id);
    Ok(())
}

pub async fn run_delete(run_id: String) -> Result<()> {
    let run_id = Uuid::parse_str(&run_id).context("invalid --run-id")?;
    let config = EngineConfig::from_env();
    let pool = ctk_db::connect_from_env(config.db_pool_max).await?;
    ctk_db::runs::get_run(&pool, run_id)
        .await?
        .with_context(|| format!("run {run_id} not found"))?;

    let mut audit = open_audit()?;
    audit.append(run_id, "CONTROL_PLANE", "RUN_DELETED", serde_json::json!({}))?;

    ctk_db::runs::delete_run_cascade(&pool, run_id).await?;
    println!("run_id={} deleted=true", run_id);
    Ok(())
}

pub async fn run_events(run_id: String) -> Result<()> {
    let run_id = Uuid::parse_str(&run_id).context("invalid --run-id")?;
    let config = EngineConfig::from_env();
    let pool = ctk_db::connect_from_env(config.db_pool_max).await?;
    let events: Vec<EventRow> = ctk_db::events::list_events_for_run(&pool, run_id).await?;
    for e in &events {
        println!("ts={} type={} payload={}", e.ts.to_rfc3339(), e.event_type, e.payload);
    }
    println!("count={}", events.len());
    Ok(())
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid RFC3339 timestamp '{s}'"))
}

fn open_audit() -> Result<AuditWriter> {
    let path = std::env::var("AUDIT_LOG_PATH").unwrap_or_else(|_| "ctk-cli-audit.jsonl".to_string());
    AuditWriter::new(&path, true).with_context(|| format!("failed to open audit log {path:?}"))
}
