//! `ctk-cli backtest worker` — drive the backtest worker loop in the
//! foreground. `--once` claims and replays a single queued run and exits
//! (useful for scripted backtests); without it, polls forever like the
//! standing worker process would.

use anyhow::Result;
use ctk_config::EngineConfig;
use ctk_strategy::StrategyFactory;
use std::sync::Arc;

pub async fn backtest_worker(once: bool) -> Result<()> {
    let config = EngineConfig::from_env();
    let pool = ctk_db::connect_from_env(config.db_pool_max).await?;
    let strategies = Arc::new(StrategyFactory::with_builtins());

    if once {
        let claimed = ctk_backtest::run_once(&pool, &strategies, &config).await?;
        println!("claimed={}", claimed);
        return Ok(());
    }

    println!("backtest worker starting worker_name={}", config.worker_name);
    ctk_backtest::run_forever(pool, strategies, config).await
}
