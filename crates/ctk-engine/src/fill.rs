//! Execution price and fee computation (spec §4.4): the live engine fills
//! at the current bar's close, adjusted by slippage; the backtest worker
//! (`ctk-backtest`) fills at the *next* bar's open — the only place the two
//! paths diverge is which price they hand to [`execution_price`].
//!
//! `sign` follows the trade direction a `Side` implies: going `LONG`
//! (buying) pushes the fill price up, going `SHORT` (selling) pushes it
//! down — `Side::sign()` already encodes this (`+1`/`-1`), so the same
//! expression works whether the side came from an entry signal or from the
//! opposite-side signal the kernel uses to request an exit.

use ctk_portfolio::{Micros, Qty};
use ctk_schemas::Side;

/// `reference_price · (1 + side.sign() · slippage_bps / 1e4)`.
pub fn execution_price(reference_price: Micros, side: Side, slippage_bps: i64) -> Micros {
    reference_price.apply_bps(slippage_bps, side.sign())
}

/// `|fill_price · qty| · taker_fee_bps / 1e4`. Returns `None` only on
/// notional overflow (spec §4.4 treats that as a fatal run error, not a
/// value to clamp).
pub fn taker_fee(fill_price: Micros, qty: Qty, taker_fee_bps: i64) -> Option<Micros> {
    fill_price.checked_mul_qty(qty).map(|notional| notional.abs().bps_of(taker_fee_bps))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_execution_price_moves_up() {
        let px = Micros::parse_decimal("100").unwrap();
        let exec = execution_price(px, Side::Long, 2);
        assert_eq!(exec.raw(), 100_020_000);
    }

    #[test]
    fn short_execution_price_moves_down() {
        let px = Micros::parse_decimal("100").unwrap();
        let exec = execution_price(px, Side::Short, 2);
        assert_eq!(exec.raw(), 99_980_000);
    }

    #[test]
    fn fee_is_basis_points_of_notional() {
        let px = Micros::parse_decimal("100").unwrap();
        let qty = Qty::parse_decimal("2").unwrap();
        let fee = taker_fee(px, qty, 4).unwrap();
        // notional = 200, fee = 200 * 4 / 10_000 = 0.08
        assert_eq!(fee, Micros::parse_decimal("0.08").unwrap());
    }
}
