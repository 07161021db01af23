//! `StrategyFactory`: resolves a run's `(strategy_name, strategy_version)`
//! to a concrete [`Strategy`] impl (SPEC_FULL.md §4.3 supplement). The
//! distilled spec names `strategy_name`/`strategy_version` on `Run` but
//! never says how they resolve to code; this registry closes that gap
//! without building a dynamic plugin-loading system — one concrete
//! strategy family per spec §1 Non-goals.

use std::collections::HashMap;
use std::sync::Arc;

use crate::kernel::Strategy;
use crate::momentum_breakout_v2::MomentumBreakoutV2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStrategy {
    pub name: String,
    pub version: String,
}

impl std::fmt::Display for UnknownStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown strategy {}@{}", self.name, self.version)
    }
}

impl std::error::Error for UnknownStrategy {}

pub struct StrategyFactory {
    builders: HashMap<(&'static str, &'static str), Arc<dyn Strategy>>,
}

impl StrategyFactory {
    /// Registry pre-populated with every strategy this crate ships.
    pub fn with_builtins() -> Self {
        let mut builders: HashMap<(&'static str, &'static str), Arc<dyn Strategy>> =
            HashMap::new();
        let momentum: Arc<dyn Strategy> = Arc::new(MomentumBreakoutV2);
        builders.insert((momentum.name(), momentum.version()), momentum);
        Self { builders }
    }

    pub fn build(&self, name: &str, version: &str) -> Result<Arc<dyn Strategy>, UnknownStrategy> {
        self.builders
            .iter()
            .find(|((n, v), _)| *n == name && *v == version)
            .map(|(_, s)| s.clone())
            .ok_or_else(|| UnknownStrategy {
                name: name.to_string(),
                version: version.to_string(),
            })
    }
}

impl Default for StrategyFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_momentum_breakout_v2() {
        let registry = StrategyFactory::with_builtins();
        let strat = registry.build("momentum_breakout_v2", "v2").unwrap();
        assert_eq!(strat.name(), "momentum_breakout_v2");
    }

    #[test]
    fn unknown_strategy_is_an_error() {
        let registry = StrategyFactory::with_builtins();
        let err = registry.build("does_not_exist", "v1").unwrap_err();
        assert_eq!(err.name, "does_not_exist");
    }
}
