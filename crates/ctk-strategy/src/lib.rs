//! ctk-strategy
//!
//! The Strategy Kernel (spec §4.3): a pure function
//! `evaluate(bar, state, params) -> signals[]` plus the one worked
//! strategy, `momentum_breakout_v2`, and a small registry resolving
//! `(strategy_name, strategy_version)` to a concrete implementation
//! (SPEC_FULL.md §4.3 supplement).

pub mod kernel;
pub mod momentum_breakout_v2;
pub mod registry;
pub mod types;

pub use kernel::{Strategy, StrategyError};
pub use momentum_breakout_v2::MomentumBreakoutV2;
pub use registry::{StrategyFactory, UnknownStrategy};
pub use types::{PositionView, Signal, SignalOrderType, StrategyState};
