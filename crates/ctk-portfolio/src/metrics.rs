//! Backtest/run metrics (spec §4.8): trade statistics, risk-adjusted return
//! ratios, drawdown, and exposure/turnover, computed from a symbol's closed
//! positions and its equity curve.
//!
//! Grounded on the promotion evaluator's `compute_metrics` /
//! `compute_max_drawdown` / `compute_simple_returns` / `mean_std` shape, but
//! adapted to this crate's `Position`/fee model and to the annualization
//! factor spec §4.8 actually specifies (`√(525600 / timeframeMinutes)`),
//! which differs from the un-annualized ratio the promotion crate used for
//! its own (daily-bar) domain.

use std::collections::BTreeMap;

use crate::fixedpoint::Micros;
use crate::types::{Position, PositionStatus};

/// Per-`(run, symbol)` aggregate metrics (spec §4.8 / `bt_results`).
#[derive(Clone, Debug, PartialEq)]
pub struct SymbolMetrics {
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub win_rate: f64,
    pub pnl: Micros,
    pub fees: Micros,
    pub sharpe: f64,
    pub sortino: f64,
    pub max_dd: f64,
    pub profit_factor: f64,
    pub exposure: f64,
    pub turnover: Micros,
}

fn mean_std(xs: &[f64]) -> (f64, f64) {
    let n = xs.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = xs.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, 0.0);
    }
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, var.sqrt())
}

fn downside_std(xs: &[f64]) -> f64 {
    let negatives: Vec<f64> = xs.iter().copied().filter(|x| *x < 0.0).collect();
    if negatives.is_empty() {
        return 0.0;
    }
    let ms = negatives.iter().map(|x| x.powi(2)).sum::<f64>() / negatives.len() as f64;
    ms.sqrt()
}

/// Simple per-bar returns from an equity curve: `(e[i] - e[i-1]) / e[i-1]`.
/// Bars where the prior equity is zero or negative are skipped (no return is
/// defined there).
pub fn compute_simple_returns(equity_curve: &[Micros]) -> Vec<f64> {
    let mut out = Vec::with_capacity(equity_curve.len().saturating_sub(1));
    for w in equity_curve.windows(2) {
        let prev = w[0].raw() as f64;
        let next = w[1].raw() as f64;
        if prev > 0.0 {
            out.push((next - prev) / prev);
        }
    }
    out
}

/// `max over t of (peak_until_t − equity_t) / peak_until_t`, reported as a
/// non-negative fraction (spec §4.8).
pub fn compute_max_drawdown(equity_curve: &[Micros]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0f64;
    for e in equity_curve {
        let v = e.raw() as f64;
        if v > peak {
            peak = v;
        }
        if peak > 0.0 {
            let dd = (peak - v) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Annualization factor for the sharpe/sortino ratio: `√(525600 /
/// timeframe_minutes)` (spec §4.8; 525600 = minutes per non-leap year).
pub fn annualization_factor(timeframe_minutes: i64) -> f64 {
    (525_600.0 / timeframe_minutes as f64).sqrt()
}

fn profit_factor(closed: &[&Position]) -> f64 {
    let mut gains = 0f64;
    let mut losses = 0f64;
    for pos in closed {
        let pnl = pos.realized_pnl().raw() as f64;
        if pnl > 0.0 {
            gains += pnl;
        } else {
            losses += -pnl;
        }
    }
    if losses == 0.0 {
        if gains > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    } else {
        gains / losses
    }
}

/// Compute the §4.8 metrics for one symbol.
///
/// - `closed_positions`: every position that reached `CLOSED` for this
///   `(run, symbol)`, in any order.
/// - `equity_curve`: one point per processed bar (spec §4.7's
///   per-bar-per-symbol equity curve for backtests; the live engine's
///   periodic `ACCOUNT_SNAPSHOT`s for paper runs).
/// - `bars_with_open_position`: parallel to a bar sequence, `true` where the
///   symbol held any open position on that bar — used for `exposure`.
/// - `fill_notionals`: `|fill.qty · fill.price|` for every fill against this
///   symbol — used for `turnover`.
/// - `timeframe_minutes`: the run's timeframe, for sharpe/sortino
///   annualization.
pub fn compute_symbol_metrics(
    closed_positions: &[Position],
    equity_curve: &[Micros],
    bars_with_open_position: &[bool],
    fill_notionals: &[Micros],
    timeframe_minutes: i64,
) -> SymbolMetrics {
    let closed: Vec<&Position> = closed_positions
        .iter()
        .filter(|p| p.status == PositionStatus::Closed)
        .collect();

    let trades = closed.len() as u64;
    let wins = closed.iter().filter(|p| p.realized_pnl().raw() > 0).count() as u64;
    let losses = trades - wins;
    let win_rate = if trades == 0 {
        0.0
    } else {
        wins as f64 / trades as f64
    };

    let pnl = closed
        .iter()
        .fold(Micros::ZERO, |acc, p| acc.saturating_add(p.realized_pnl()));
    let fees = closed
        .iter()
        .fold(Micros::ZERO, |acc, p| acc.saturating_add(p.fees_total));

    let returns = compute_simple_returns(equity_curve);
    let (mean, std) = mean_std(&returns);
    let factor = annualization_factor(timeframe_minutes);
    let sharpe = if std == 0.0 { 0.0 } else { (mean / std) * factor };
    let dstd = downside_std(&returns);
    let sortino = if dstd == 0.0 { 0.0 } else { (mean / dstd) * factor };

    let max_dd = compute_max_drawdown(equity_curve);

    let exposure = if bars_with_open_position.is_empty() {
        0.0
    } else {
        bars_with_open_position.iter().filter(|b| **b).count() as f64
            / bars_with_open_position.len() as f64
    };

    let turnover = fill_notionals
        .iter()
        .fold(Micros::ZERO, |acc, n| acc.saturating_add(n.abs()));

    SymbolMetrics {
        trades,
        wins,
        losses,
        win_rate,
        pnl,
        fees,
        sharpe,
        sortino,
        max_dd,
        profit_factor: profit_factor(&closed),
        exposure,
        turnover,
    }
}

/// Equity = cash (current_capital) + Σ unrealized P&L of open positions
/// against `marks` (spec §8's conservation-of-P&L property).
pub fn compute_equity(
    current_capital: Micros,
    open_positions: &BTreeMap<(String, crate::types::Side), Position>,
    marks: &crate::MarkMap,
) -> Micros {
    let mut equity = current_capital;
    for ((symbol, _side), pos) in open_positions {
        let mark = marks.get(symbol).copied().unwrap_or(Micros::ZERO);
        equity = equity.saturating_add(pos.unrealized_pnl(mark));
    }
    equity
}

/// Gross and net notional exposure of the currently open positions, marked
/// to `marks`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExposureMetrics {
    pub gross: Micros,
    pub net: Micros,
}

pub fn compute_exposure(
    open_positions: &BTreeMap<(String, crate::types::Side), Position>,
    marks: &crate::MarkMap,
) -> ExposureMetrics {
    let mut gross = Micros::ZERO;
    let mut net = Micros::ZERO;
    for ((symbol, side), pos) in open_positions {
        let mark = marks.get(symbol).copied().unwrap_or(Micros::ZERO);
        let notional = mark.checked_mul_qty(pos.quantity_open).unwrap_or(Micros::ZERO);
        gross = gross.saturating_add(notional.abs());
        net = net.saturating_add(match side {
            crate::types::Side::Long => notional,
            crate::types::Side::Short => -notional,
        });
    }
    ExposureMetrics { gross, net }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> Micros {
        Micros::parse_decimal(s).unwrap()
    }

    #[test]
    fn max_drawdown_tracks_peak_to_trough() {
        let curve = vec![m("100"), m("120"), m("90"), m("110")];
        let dd = compute_max_drawdown(&curve);
        assert!((dd - 0.25).abs() < 1e-9);
    }

    #[test]
    fn symbol_metrics_profit_factor_infinite_with_no_losses() {
        use crate::accounting::{apply_fill, PortfolioState};
        use crate::types::{Fill, Side};
        use chrono::{TimeZone, Utc};

        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut pf = PortfolioState::new(m("1000"));
        apply_fill(
            &mut pf,
            "BTC-USD",
            &Fill::entry(Side::Long, crate::fixedpoint::Qty::parse_decimal("1").unwrap(), m("100"), Micros::ZERO, ts, None, None, 1.0),
        )
        .unwrap();
        let outcome = apply_fill(
            &mut pf,
            "BTC-USD",
            &Fill::exit(Side::Long, crate::fixedpoint::Qty::parse_decimal("1").unwrap(), m("110"), Micros::ZERO, ts),
        )
        .unwrap();
        let closed = match outcome {
            crate::accounting::FillOutcome::Closed(pos) => pos,
            other => panic!("expected Closed, got {other:?}"),
        };
        let metrics = compute_symbol_metrics(&[closed], &[], &[], &[], 1);
        assert_eq!(metrics.trades, 1);
        assert_eq!(metrics.wins, 1);
        assert_eq!(metrics.losses, 0);
        assert_eq!(metrics.profit_factor, f64::INFINITY);
    }

    #[test]
    fn annualization_factor_one_minute_bars() {
        let f = annualization_factor(1);
        assert!((f - 525_600f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn annualization_factor_daily_bars() {
        let f = annualization_factor(1440);
        assert!((f - (525_600.0f64 / 1440.0).sqrt()).abs() < 1e-6);
    }

    #[test]
    fn simple_returns_basic() {
        let curve = vec![m("100"), m("110"), m("99")];
        let rets = compute_simple_returns(&curve);
        assert_eq!(rets.len(), 2);
        assert!((rets[0] - 0.10).abs() < 1e-9);
        assert!((rets[1] - (-0.10)).abs() < 1e-9);
    }
}
