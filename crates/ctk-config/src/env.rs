//! Typed resolution of the environment-variable keys spec §6 names.
//!
//! Every key has the spec's documented default, so a deployment that sets
//! none of them still runs with sane values; `from_env` never fails.

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Live-loop cadence, in milliseconds (spec §4.6, §6). Default 1500.
    pub poll_ms: u64,
    /// Per-worker symbol chunk size for the backtest worker (spec §4.7, §6).
    /// Default 2.
    pub max_parallel_symbols: usize,
    /// Identifier stored on backtest run claims (spec §6). Default "worker".
    pub worker_name: String,
    /// `PgPoolOptions::max_connections` bound (spec §6). Default 8.
    pub db_pool_max: u32,
    /// Execution slippage, in basis points (spec §4.4, §6). Default 2.
    pub slippage_bps: i64,
    /// Taker fee, in basis points (spec §4.4, §6). Default 4.
    pub taker_fee_bps: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_ms: 1500,
            max_parallel_symbols: 2,
            worker_name: "worker".to_string(),
            db_pool_max: 8,
            slippage_bps: 2,
            taker_fee_bps: 4,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    /// Resolve from the process environment, falling back to spec §6
    /// defaults for any key that is unset or unparseable.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            poll_ms: env_or("POLL_MS", default.poll_ms),
            max_parallel_symbols: env_or("MAX_PARALLEL_SYMBOLS", default.max_parallel_symbols),
            worker_name: std::env::var("WORKER_NAME").unwrap_or(default.worker_name),
            db_pool_max: env_or("DB_POOL_MAX", default.db_pool_max),
            slippage_bps: env_or("SLIPPAGE_BPS", default.slippage_bps),
            taker_fee_bps: env_or("TAKER_FEE_BPS", default.taker_fee_bps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.poll_ms, 1500);
        assert_eq!(cfg.max_parallel_symbols, 2);
        assert_eq!(cfg.worker_name, "worker");
        assert_eq!(cfg.slippage_bps, 2);
        assert_eq!(cfg.taker_fee_bps, 4);
    }
}
