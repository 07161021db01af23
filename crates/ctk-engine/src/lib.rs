//! ctk-engine
//!
//! The Simulation Engine (spec §4.6): the live, always-on trading loop.
//! Polls new completed bars per `(run, symbol)`, evaluates synthetic
//! stop/take exits and the strategy kernel through the guard table
//! (`bar_step`), persists the resulting orders/fills/positions/events, and
//! drives the run-level status machine — kill switch, bankruptcy,
//! operator-issued pause/force-exit/delete.
//!
//! `bar_step`/`convert`/`fill` are pure, IO-free decision logic shared in
//! spirit (not in code — see `bar_step`'s doc comment) with `ctk-backtest`.
//! `controller` and `persist` are this crate's own: the part that actually
//! drives a live run against `ctk-db`.

pub mod bar_step;
pub mod controller;
pub mod convert;
pub mod fill;
pub mod persist;

pub use bar_step::{step, HeldPosition, StepOutcome, StepParams};
pub use controller::{force_exit, run_live};
