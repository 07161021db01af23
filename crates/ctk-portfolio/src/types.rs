use chrono::{DateTime, Utc};

use crate::fixedpoint::{Micros, Qty};

pub use ctk_schemas::{OrderType, PositionStatus, Side};

/// One execution against an order (the accounting atom).
///
/// `qty` and `price` are always non-negative; `fee` is always non-negative.
/// For an `EXIT` fill, `side` is the side of the *held position being
/// reduced* — not the signal's side, which the kernel expresses as the
/// opposite of the held side (spec §4.3's exit-signaling rule). Translating
/// a signal into the position side it closes is the engine's job, upstream
/// of this crate.
#[derive(Clone, Debug, PartialEq)]
pub struct Fill {
    pub side: Side,
    pub order_type: OrderType,
    pub qty: Qty,
    pub price: Micros,
    pub fee: Micros,
    pub ts: DateTime<Utc>,
    /// Only consulted on an `ENTRY` fill that creates a brand-new position;
    /// ignored on fills that add to an already-open position (stops are set
    /// once, at open, not relocated by later size-adding entries).
    pub stop_loss: Option<Micros>,
    pub take_profit: Option<Micros>,
    /// Only consulted on an `ENTRY` fill that creates a brand-new position.
    pub leverage: f64,
}

impl Fill {
    pub fn entry(
        side: Side,
        qty: Qty,
        price: Micros,
        fee: Micros,
        ts: DateTime<Utc>,
        stop_loss: Option<Micros>,
        take_profit: Option<Micros>,
        leverage: f64,
    ) -> Self {
        Self {
            side,
            order_type: OrderType::Entry,
            qty,
            price,
            fee,
            ts,
            stop_loss,
            take_profit,
            leverage,
        }
    }

    pub fn exit(side: Side, qty: Qty, price: Micros, fee: Micros, ts: DateTime<Utc>) -> Self {
        Self {
            side,
            order_type: OrderType::Exit,
            qty,
            price,
            fee,
            ts,
            stop_loss: None,
            take_profit: None,
            leverage: 1.0,
        }
    }
}

/// The aggregate exposure of a run on one `symbol` on one `side` (spec §3).
///
/// There is at most one `Position` per `(run, symbol, side)` with status in
/// `{NEW, OPEN}` at a time; this crate enforces that by construction, since
/// [`crate::PortfolioState`] keys its open-position map by `(symbol, side)`
/// and only ever holds one entry per key.
#[derive(Clone, Debug, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub status: PositionStatus,
    pub open_ts: DateTime<Utc>,
    pub close_ts: Option<DateTime<Utc>>,
    pub entry_price_vwap: Micros,
    pub exit_price_vwap: Option<Micros>,
    pub quantity_open: Qty,
    pub quantity_close: Qty,
    pub cost_basis: Micros,
    pub fees_total: Micros,
    /// Gross realized P&L accumulated from closing fills, before fees.
    /// `realized_pnl()` subtracts `fees_total` per spec §3's derived
    /// invariant.
    realized_pnl_gross: Micros,
    pub leverage_effective: f64,
    pub stop_loss: Option<Micros>,
    pub take_profit: Option<Micros>,
}

impl Position {
    pub(crate) fn opened(symbol: &str, side: Side, fill: &Fill) -> Self {
        Position {
            symbol: symbol.to_string(),
            side,
            status: PositionStatus::Open,
            open_ts: fill.ts,
            close_ts: None,
            entry_price_vwap: fill.price,
            exit_price_vwap: None,
            quantity_open: fill.qty,
            quantity_close: Qty::ZERO,
            cost_basis: fill.price.checked_mul_qty(fill.qty).unwrap_or(Micros::ZERO),
            fees_total: fill.fee,
            realized_pnl_gross: Micros::ZERO,
            leverage_effective: fill.leverage,
            stop_loss: fill.stop_loss,
            take_profit: fill.take_profit,
        }
    }

    /// `realized_pnl = Σ_fills_close (exit_price − entry_vwap) · qty ·
    /// sign(side) − Σ_fees` (spec §3).
    pub fn realized_pnl(&self) -> Micros {
        self.realized_pnl_gross.saturating_sub(self.fees_total)
    }

    pub(crate) fn accumulate_realized_pnl_gross(&mut self, pnl_piece: Micros) {
        self.realized_pnl_gross += pnl_piece;
    }

    /// Reconstruct a position from its persisted columns — used when a live
    /// run resumes after a process restart, since `PortfolioState` otherwise
    /// only comes into being through fills applied in this process's memory.
    /// `realized_pnl_net` is the value stored in `positions.realized_pnl`
    /// (already net of fees); `fees_total` is added back to recover the
    /// gross figure this type tracks internally.
    #[allow(clippy::too_many_arguments)]
    pub fn rehydrate(
        symbol: String,
        side: Side,
        status: PositionStatus,
        open_ts: DateTime<Utc>,
        close_ts: Option<DateTime<Utc>>,
        entry_price_vwap: Micros,
        exit_price_vwap: Option<Micros>,
        quantity_open: Qty,
        quantity_close: Qty,
        cost_basis: Micros,
        fees_total: Micros,
        realized_pnl_net: Micros,
        leverage_effective: f64,
        stop_loss: Option<Micros>,
        take_profit: Option<Micros>,
    ) -> Self {
        Position {
            symbol,
            side,
            status,
            open_ts,
            close_ts,
            entry_price_vwap,
            exit_price_vwap,
            quantity_open,
            quantity_close,
            cost_basis,
            fees_total,
            realized_pnl_gross: realized_pnl_net + fees_total,
            leverage_effective,
            stop_loss,
            take_profit,
        }
    }

    pub fn is_inflight(&self) -> bool {
        self.status.is_inflight()
    }

    /// Unrealized P&L of the still-open quantity against `mark`.
    pub fn unrealized_pnl(&self, mark: Micros) -> Micros {
        if self.quantity_open.is_zero() {
            return Micros::ZERO;
        }
        let diff = match self.side {
            Side::Long => mark.saturating_sub(self.entry_price_vwap),
            Side::Short => self.entry_price_vwap.saturating_sub(mark),
        };
        diff.checked_mul_qty(self.quantity_open).unwrap_or(Micros::ZERO)
    }
}
