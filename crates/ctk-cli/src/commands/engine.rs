//! `ctk-cli engine live` — drive one live run's loop in the foreground.
//!
//! For local development without a standing `ctk-daemon` process: blocks
//! until the run reaches a terminal status (`stopped`/`done`/`error`) or the
//! process is interrupted.

use anyhow::{Context, Result};
use ctk_config::EngineConfig;
use ctk_strategy::StrategyFactory;
use std::sync::Arc;
use uuid::Uuid;

pub async fn engine_live(run_id: String) -> Result<()> {
    let run_id = Uuid::parse_str(&run_id).context("invalid --run-id")?;
    let config = EngineConfig::from_env();
    let pool = ctk_db::connect_from_env(config.db_pool_max).await?;
    ctk_db::runs::get_run(&pool, run_id)
        .await?
        .with_context(|| format!("run {run_id} not found"))?;

    let strategies = Arc::new(StrategyFactory::with_builtins());
    println!("run_id={} engine=live starting", run_id);
    ctk_engine::run_live(pool, run_id, strategies, config).await?;
    println!("run_id={} engine=live stopped", run_id);
    Ok(())
}
