//! Execution price and fee computation (spec §4.4) — the backtest-side twin
//! of `ctk-engine::fill`. The only difference between the two workers is
//! which reference price they hand to [`execution_price`]: the live engine
//! uses the current bar's close, this worker uses the *next* bar's open
//! (see `bar_step`'s doc comment).

use ctk_portfolio::{Micros, Qty};
use ctk_schemas::Side;

pub fn execution_price(reference_price: Micros, side: Side, slippage_bps: i64) -> Micros {
    reference_price.apply_bps(slippage_bps, side.sign())
}

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
    fn fee_is_basis_points_of_notional() {
        let px = Micros::parse_decimal("100").unwrap();
        let qty = Qty::parse_decimal("2").unwrap();
        let fee = taker_fee(px, qty, 4).unwrap();
        assert_eq!(fee, Micros::parse_decimal("0.08").unwrap());
    }
}
