//! Wire types for the strategy kernel contract (spec §4.3):
//! `evaluate(bar, state, params) -> signals[]`.

use ctk_portfolio::{Micros, Qty};
pub use ctk_schemas::Side;

/// Order type a signal asks the engine to submit (spec §4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalOrderType {
    Market,
    Limit,
}

/// One emitted trading intent. The kernel does not know position ids; it
/// only knows a position exists via [`StrategyState::positions`] (spec
/// §4.3's exit-signaling design note) — whether a `Signal` becomes an
/// ENTRY or an EXIT order is decided by the engine/risk layer by comparing
/// `side` against the currently held side, not by anything on this struct.
#[derive(Clone, Debug, PartialEq)]
pub struct Signal {
    pub side: Side,
    pub size: Qty,
    pub order_type: SignalOrderType,
    pub price: Option<Micros>,
    pub stop_loss: Option<Micros>,
    pub take_profit: Option<Micros>,
    pub leverage: Option<f64>,
    pub reason: String,
}

/// A position the kernel can see on `state.positions` — just enough to
/// decide entries/exits, not the full accounting row (spec §4.3: "the
/// kernel does not know the current position id").
#[derive(Clone, Debug, PartialEq)]
pub struct PositionView {
    pub side: Side,
    pub quantity_open: Qty,
    pub entry_price_vwap: Micros,
}

/// The state a strategy is evaluated against (spec §4.3).
#[derive(Clone, Debug)]
pub struct StrategyState<'a> {
    pub run_id: uuid::Uuid,
    pub symbol: &'a str,
    pub current_capital: Micros,
    pub positions: &'a [PositionView],
    pub timeframe_minutes: i64,
    pub last_candle: Option<&'a ctk_schemas::Bar>,
}

impl<'a> StrategyState<'a> {
    pub fn position_on(&self, side: Side) -> Option<&PositionView> {
        self.positions.iter().find(|p| p.side == side)
    }

    pub fn has_any_position(&self) -> bool {
        !self.positions.is_empty()
    }
}
