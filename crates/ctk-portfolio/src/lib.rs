//! ctk-portfolio
//!
//! Position/Order/Fill Accountant (spec §3, §4.4):
//! - Fixed-point `Micros`/`Qty` types, no binary floats in the accounting path
//! - Single aggregate VWAP position per `(run, symbol, side)`, not FIFO lots
//! - NEW -> OPEN -> CLOSED position FSM, with flip-on-overfill handling
//! - Realized vs unrealized P&L, equity and exposure metrics
//! - Pure deterministic logic (no IO, no time source, no broker wiring)

pub mod accounting;
pub mod fixedpoint;
pub mod metrics;
pub mod types;

pub use accounting::{AccountingError, FillOutcome, PortfolioState};
pub use fixedpoint::{Micros, Qty};
pub use metrics::{
    annualization_factor, compute_equity, compute_exposure, compute_max_drawdown,
    compute_simple_returns, compute_symbol_metrics, ExposureMetrics, SymbolMetrics,
};
pub use types::{Fill, OrderType, Position, PositionStatus, Side};

use std::collections::BTreeMap;

/// Canonical mark map: symbol -> last known price.
pub type MarkMap = BTreeMap<String, Micros>;

/// Build a [`MarkMap`] with minimal boilerplate.
pub fn marks<I, S>(items: I) -> MarkMap
where
    I: IntoIterator<Item = (S, Micros)>,
    S: Into<String>,
{
    let mut m = MarkMap::new();
    for (sym, px) in items {
        m.insert(sym.into(), px);
    }
    m
}
