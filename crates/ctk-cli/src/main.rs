mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ctk")]
#[command(about = "Crypto momentum trading platform CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database connectivity and migrations
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute a layered config hash and print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Run lifecycle commands
    Run {
        #[command(subcommand)]
        cmd: RunCmd,
    },

    /// Drive a live run's loop in the foreground
    Engine {
        #[command(subcommand)]
        cmd: EngineCmd,
    },

    /// Drive the backtest worker loop in the foreground
    Backtest {
        #[command(subcommand)]
        cmd: BacktestCmd,
    },

    /// Audit log inspection
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    Migrate,
}

#[derive(Subcommand)]
enum RunCmd {
    /// Create a new run row and print its id + config hash.
    Create {
        /// "backtest" or "live"
        #[arg(long)]
        kind: String,
        #[arg(long)]
        name: String,
        /// Comma-separated symbol list, e.g. BTC-USD,ETH-USD
        #[arg(long)]
        symbols: String,
        #[arg(long)]
        timeframe: String,
        #[arg(long)]
        strategy_name: String,
        #[arg(long)]
        strategy_version: String,
        #[arg(long)]
        starting_capital: String,
        /// Inline JSON strategy params
        #[arg(long)]
        params: Option<String>,
        /// Path to a JSON file of strategy params
        #[arg(long)]
        params_file: Option<String>,
        #[arg(long)]
        seed: Option<i64>,
        #[arg(long, default_value_t = 1)]
        max_concurrent_positions: i32,
        #[arg(long, default_value_t = false)]
        allow_multiple_positions_per_symbol: bool,
        /// Required for backtest runs (RFC3339, e.g. 2026-01-01T00:00:00Z)
        #[arg(long)]
        start: Option<String>,
        /// Required for backtest runs (RFC3339)
        #[arg(long)]
        end: Option<String>,
    },

    /// Print a run's current row
    Status {
        #[arg(long)]
        run_id: String,
    },

    /// Transition a run to a new status
    SetStatus {
        #[arg(long)]
        run_id: String,
        #[arg(long)]
        status: String,
    },

    /// Force-close every open position at the latest close and stop the run
    ForceExit {
        #[arg(long)]
        run_id: String,
    },

    /// Cascade-delete a run and all rows scoped to it
    Delete {
        #[arg(long)]
        run_id: String,
    },

    /// List a run's event-log rows in time order
    Events {
        #[arg(long)]
        run_id: String,
    },
}

#[derive(Subcommand)]
enum EngineCmd {
    /// Run the live loop for one run until it reaches a terminal status
    Live {
        #[arg(long)]
        run_id: String,
    },
}

#[derive(Subcommand)]
enum BacktestCmd {
    /// Claim and replay queued runs
    Worker {
        /// Claim and replay a single run, then exit
        #[arg(long, default_value_t = false)]
        once: bool,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify a hash-chained audit log's integrity
    Verify {
        #[arg(long)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => match cmd {
            DbCmd::Status => commands::db::db_status().await?,
            DbCmd::Migrate => commands::db::db_migrate().await?,
        },

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = ctk_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Run { cmd } => match cmd {
            RunCmd::Create {
                kind,
                name,
                symbols,
                timeframe,
                strategy_name,
                strategy_version,
                starting_capital,
                params,
                params_file,
                seed,
                max_concurrent_positions,
                allow_multiple_positions_per_symbol,
                start,
                end,
            } => {
                commands::run::run_create(
                    kind,
                    name,
                    symbols,
                    timeframe,
                    strategy_name,
                    strategy_version,
                    starting_capital,
                    params,
                    params_file,
                    seed,
                    max_concurrent_positions,
                    allow_multiple_positions_per_symbol,
                    start,
                    end,
                )
                .await?
            }
            RunCmd::Status { run_id } => commands::run::run_status(run_id).await?,
            RunCmd::SetStatus { run_id, status } => commands::run::run_set_status(run_id, status).await?,
            RunCmd::ForceExit { run_id } => commands::run::run_force_exit(run_id).await?,
            RunCmd::Delete { run_id } => commands::run::run_delete(run_id).await?,
            RunCmd::Events { run_id } => commands::run::run_events(run_id).await?,
        },

        Commands::Engine { cmd } => match cmd {
            EngineCmd::Live { run_id } => commands::engine::engine_live(run_id).await?,
        },

        Commands::Backtest { cmd } => match cmd {
            BacktestCmd::Worker { once } => commands::backtest::backtest_worker(once).await?,
        },

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => {
                let result = ctk_audit::verify_hash_chain(&path)?;
                match result {
                    ctk_audit::VerifyResult::Valid { lines } => {
                        println!("valid=true lines={}", lines);
                    }
                    ctk_audit::VerifyResult::Broken { line, reason } => {
                        println!("valid=false line={} reason={}", line, reason);
                        std::process::exit(1);
                    }
                }
            }
        },
    }

    Ok(())
}
