//! ctk-backtest
//!
//! The Backtest Engine (spec §4.7): a worker that claims queued backtest
//! runs, replays each symbol's historical bars against the strategy
//! kernel and guard table with next-bar-open fill pricing, and writes
//! the resulting per-bar equity curve and per-symbol summary metrics.
//!
//! `bar_step`/`convert`/`fill` mirror `ctk-engine`'s modules of the same
//! name — same decision order, different fill-pricing reference (see
//! `bar_step`'s doc comment) — duplicated rather than shared since this
//! crate does not depend on `ctk-engine`. `worker` and `persist` are this
//! crate's own.

pub mod bar_step;
pub mod convert;
pub mod fill;
pub mod persist;
pub mod worker;

pub use bar_step::{step, HeldPosition, StepOutcome, StepParams};
pub use worker::{run_forever, run_once};
