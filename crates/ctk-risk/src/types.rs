use ctk_portfolio::{Micros, Qty};
use ctk_schemas::{RunStatus, Side};

/// Per-run risk configuration (spec §3, §4.5).
#[derive(Clone, Debug, PartialEq)]
pub struct RiskConfig {
    pub max_concurrent_positions: u32,
    pub allow_multiple_positions_per_symbol: bool,
    /// Cash that must remain untouched by new entries (spec §4.5 capital
    /// check: `cost_basis estimate > current_capital - cash_reserve`).
    pub cash_reserve: Micros,
    /// Daily drawdown fraction that trips the kill switch (spec §4.5,
    /// §9(b)). `0.05` means a 5% drop from the day's starting equity.
    pub kill_switch_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_concurrent_positions: 1,
            allow_multiple_positions_per_symbol: false,
            cash_reserve: Micros::ZERO,
            kill_switch_pct: 0.20,
        }
    }
}

/// Whether a signal is opening new exposure or closing/reducing existing
/// exposure (spec §9's "exit signals vs. new entries" design note: the
/// kernel expresses "close my LONG" as a SHORT signal, and this is how the
/// engine/risk layer tells the two apart).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    Entry,
    Exit,
}

/// Classify a signal's intent by checking whether a position on the
/// opposite side is currently held — an opposite-side signal while holding
/// a position closes it; everything else opens new exposure.
pub fn classify_intent(signal_side: Side, held_sides: &[Side]) -> Intent {
    if held_sides.contains(&signal_side.opposite()) {
        Intent::Exit
    } else {
        Intent::Entry
    }
}

/// Everything the guard layer needs to evaluate one signal (spec §4.5's
/// table). Borrowed, read-only — the risk layer makes no mutations itself.
pub struct GuardContext<'a> {
    pub run_status: RunStatus,
    pub intent: Intent,
    pub open_positions_count: u32,
    pub max_concurrent_positions: u32,
    pub allow_multiple_positions_per_symbol: bool,
    pub has_inflight_on_symbol: bool,
    pub cost_basis_estimate: Micros,
    pub current_capital: Micros,
    pub cash_reserve: Micros,
    pub symbols_in_run_order: &'a [String],
    pub symbol: &'a str,
}

/// Why a guard rejected a signal — stored verbatim as `SIGNAL.rejection_reason`
/// (spec §4.5, §7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectionReason {
    RunGate,
    ConcurrencyCap,
    PerSymbolCap,
    ExitOnlyWindow,
    InsufficientCapital,
    PositionAlreadyExists,
}

impl RejectionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectionReason::RunGate => "run_gate",
            RejectionReason::ConcurrencyCap => "concurrency_cap",
            RejectionReason::PerSymbolCap => "per_symbol_cap",
            RejectionReason::ExitOnlyWindow => "exit_only_window",
            RejectionReason::InsufficientCapital => "insufficient_capital",
            RejectionReason::PositionAlreadyExists => "position_already_exists",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RiskDecision {
    Admit,
    Reject(RejectionReason),
}

/// A held position's stop/take-profit levels, for synthetic exit detection
/// (spec §4.5: stop/take evaluated *before* strategy evaluation).
#[derive(Clone, Copy, Debug)]
pub struct StopTakeLevels {
    pub side: Side,
    pub quantity_open: Qty,
    pub stop_loss: Option<Micros>,
    pub take_profit: Option<Micros>,
}
