//! `ctk-cli db` — connectivity probe and migration runner.

use anyhow::Result;
use ctk_config::EngineConfig;

pub async fn db_status() -> Result<()> {
    let pool = ctk_db::connect_from_env(EngineConfig::from_env().db_pool_max).await?;
    let s = ctk_db::status(&pool).await?;
    println!("db_ok={} has_runs_table={}", s.ok, s.has_runs_table);
    Ok(())
}

pub async fn db_migrate() -> Result<()> {
    let pool = ctk_db::connect_from_env(EngineConfig::from_env().db_pool_max).await?;
    ctk_db::migrate(&pool).await?;
    println!("migrations_applied=true");
    Ok(())
}
