//! Shared runtime state for ctk-daemon.
//!
//! All types here are `Clone`-able (via `Arc`). Handlers receive
//! `State<Arc<AppState>>` from Axum; this module owns nothing async itself.

use std::sync::Arc;

use ctk_audit::AuditWriter;
use ctk_config::EngineConfig;
use ctk_strategy::StrategyFactory;
use sqlx::PgPool;
use tokio::sync::Mutex;

/// Static build metadata included in health responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Shared handle across all Axum handlers. Cheap to clone (everything
/// inside is an `Arc` or a pool handle that is itself a cheap-to-clone
/// connection pool).
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub strategies: Arc<StrategyFactory>,
    pub config: EngineConfig,
    pub build: BuildInfo,
    /// Hash-chained append log of control-plane operations (createRun,
    /// setRunStatus, forceExit, deleteRun), independent of the `events`
    /// table rows those operations also leave behind.
    pub audit: Arc<Mutex<AuditWriter>>,
}

impl AppState {
    pub fn new(pool: PgPool, strategies: Arc<StrategyFactory>, config: EngineConfig) -> Self {
        let audit_path = std::env::var("AUDIT_LOG_PATH").unwrap_or_else(|_| "ctk-daemon-audit.jsonl".to_string());
        let audit = AuditWriter::new(&audit_path, true)
            .unwrap_or_else(|e| panic!("failed to open audit log {audit_path:?}: {e}"));
        Self {
            pool,
            strategies,
            config,
            build: BuildInfo {
                service: "ctk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            audit: Arc::new(Mutex::new(audit)),
        }
    }
}
