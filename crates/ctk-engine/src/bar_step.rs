//! The per-`(run, symbol)` per-bar decision core (spec §4.5, §4.6): pure,
//! IO-free, and the one place the live engine and the backtest worker could
//! in principle share logic if the backtest worker's next-bar-open fill
//! price didn't make that sharing impossible without threading an extra bar
//! through — see `ctk-backtest`'s own (nearly identical) version of this
//! module.
//!
//! Order of operations, in spec §4.5's words: stop/take exits are evaluated
//! against the bar's high/low *before* the strategy kernel runs, and when
//! one trips it pre-empts the kernel entirely for this bar — the kernel is
//! not consulted, matching scenario 3's "stop/take wins over a same-bar
//! strategy exit" requirement.

use ctk_portfolio::{Fill, Micros, OrderType, Qty};
use ctk_risk::{
    classify_intent, guard, stop_take, GuardContext, Intent, RejectionReason, RiskDecision,
    StopTakeLevels,
};
use ctk_schemas::{Bar, RunStatus, Side};
use ctk_strategy::{PositionView, Signal, Strategy, StrategyError, StrategyState};
use uuid::Uuid;

use crate::fill::{execution_price, taker_fee};

/// A currently in-flight position on `(run, symbol)`, as the engine needs
/// to see it — including the stop/take levels set at entry, which
/// `ctk_strategy::PositionView` deliberately omits (the kernel never needs
/// them; the risk layer does).
#[derive(Clone, Debug)]
pub struct HeldPosition {
    pub position_id: Uuid,
    pub side: Side,
    pub quantity_open: Qty,
    pub entry_price_vwap: Micros,
    pub stop_loss: Option<Micros>,
    pub take_profit: Option<Micros>,
}

impl HeldPosition {
    fn as_view(&self) -> PositionView {
        PositionView {
            side: self.side,
            quantity_open: self.quantity_open,
            entry_price_vwap: self.entry_price_vwap,
        }
    }

    fn as_stop_take_levels(&self) -> StopTakeLevels {
        StopTakeLevels {
            side: self.side,
            quantity_open: self.quantity_open,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
        }
    }
}

/// Everything [`step`] needs besides the bar and the held positions.
pub struct StepParams<'a> {
    pub run_id: Uuid,
    pub symbol: &'a str,
    pub timeframe_minutes: i64,
    pub strategy: &'a dyn Strategy,
    pub strategy_params: &'a serde_json::Value,
    pub run_status: RunStatus,
    pub current_capital: Micros,
    pub open_positions_count_in_run: u32,
    pub max_concurrent_positions: u32,
    pub allow_multiple_positions_per_symbol: bool,
    pub cash_reserve: Micros,
    pub slippage_bps: i64,
    pub taker_fee_bps: i64,
}

/// What happened on this bar for this one held/candidate exposure.
#[derive(Debug)]
pub enum StepOutcome {
    /// A stop-loss or take-profit level on an already-held position
    /// triggered; the resulting exit fill pre-empted strategy evaluation.
    ForcedExit {
        position_id: Uuid,
        fill: Fill,
        kind: stop_take::StopTakeKind,
    },
    /// A strategy signal cleared the guard table.
    Admitted { fill: Fill, signal: Signal },
    /// A strategy signal was rejected by the guard table.
    Rejected {
        signal: Signal,
        reason: RejectionReason,
    },
}

fn parse_close(bar: &Bar) -> Option<Micros> {
    Micros::parse_decimal(&bar.close)
}

/// Evaluate one bar for one `(run, symbol)`: check stop/take on every held
/// position first; only if none trip, evaluate the strategy kernel and run
/// its signals through the guard table.
pub fn step(
    bar: &Bar,
    held: &[HeldPosition],
    params: &StepParams<'_>,
) -> Result<Vec<StepOutcome>, StrategyError> {
    let mut forced_exits = Vec::new();
    for pos in held {
        if let Some(hit) = stop_take::check(&pos.as_stop_take_levels(), bar) {
            let run_gate_ctx = GuardContext {
                run_status: params.run_status,
                intent: Intent::Exit,
                open_positions_count: params.open_positions_count_in_run,
                max_concurrent_positions: params.max_concurrent_positions,
                allow_multiple_positions_per_symbol: params.allow_multiple_positions_per_symbol,
                has_inflight_on_symbol: true,
                cost_basis_estimate: Micros::ZERO,
                current_capital: params.current_capital,
                cash_reserve: params.cash_reserve,
                symbols_in_run_order: &[],
                symbol: params.symbol,
            };
            if guard::evaluate(&run_gate_ctx) != RiskDecision::Admit {
                continue;
            }
            let fee = taker_fee(hit.trigger_price, hit.quantity_open, params.taker_fee_bps)
                .unwrap_or(Micros::ZERO);
            let fill = Fill::exit(hit.side, hit.quantity_open, hit.trigger_price, fee, bar.ts_close_utc);
            forced_exits.push(StepOutcome::ForcedExit {
                position_id: pos.position_id,
                fill,
                kind: hit.kind,
            });
        }
    }
    if !forced_exits.is_empty() {
        return Ok(forced_exits);
    }

    let held_sides: Vec<Side> = held.iter().map(|h| h.side).collect();
    let position_views: Vec<PositionView> = held.iter().map(HeldPosition::as_view).collect();
    let state = StrategyState {
        run_id: params.run_id,
        symbol: params.symbol,
        current_capital: params.current_capital,
        positions: &position_views,
        timeframe_minutes: params.timeframe_minutes,
        last_candle: Some(bar),
    };

    let signals = params.strategy.evaluate(bar, &state, params.strategy_params)?;
    let Some(close) = parse_close(bar) else {
        return Ok(Vec::new());
    };

    let mut out = Vec::with_capacity(signals.len());
    for signal in signals {
        let intent = classify_intent(signal.side, &held_sides);
        let exec_price = execution_price(close, signal.side, params.slippage_bps);
        let fee = taker_fee(exec_price, signal.size, params.taker_fee_bps);

        let (fill_side, order_type) = match intent {
            Intent::Entry => (signal.side, OrderType::Entry),
            Intent::Exit => (signal.side.opposite(), OrderType::Exit),
        };

        let cost_basis_estimate = exec_price.checked_mul_qty(signal.size);

        let ctx = GuardContext {
            run_status: params.run_status,
            intent,
            open_positions_count: params.open_positions_count_in_run,
            max_concurrent_positions: params.max_concurrent_positions,
            allow_multiple_positions_per_symbol: params.allow_multiple_positions_per_symbol,
            has_inflight_on_symbol: !held.is_empty(),
            cost_basis_estimate: cost_basis_estimate.unwrap_or(Micros::MAX),
            current_capital: params.current_capital,
            cash_reserve: params.cash_reserve,
            symbols_in_run_order: &[],
            symbol: params.symbol,
        };

        match guard::evaluate(&ctx) {
            RiskDecision::Reject(reason) => out.push(StepOutcome::Rejected { signal, reason }),
            RiskDecision::Admit => {
                let Some(fee) = fee else {
                    out.push(StepOutcome::Rejected {
                        signal,
                        reason: RejectionReason::InsufficientCapital,
                    });
                    continue;
                };
                let fill = match order_type {
                    OrderType::Entry => Fill::entry(
                        fill_side,
                        signal.size,
                        exec_price,
                        fee,
                        bar.ts_close_utc,
                        signal.stop_loss,
                        signal.take_profit,
                        signal.leverage.unwrap_or(1.0),
                    ),
                    _ => Fill::exit(fill_side, signal.size, exec_price, fee, bar.ts_close_utc),
                };
                out.push(StepOutcome::Admitted { fill, signal });
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ctk_strategy::MomentumBreakoutV2;
    use serde_json::json;

    fn bar(ts: i64, close: &str, roc_1m: Option<&str>, roc_tf: Option<&str>) -> Bar {
        Bar {
            symbol: "BTC-USD".to_string(),
            ts_close_utc: Utc.timestamp_opt(ts, 0).unwrap(),
            open: close.to_string(),
            high: close.to_string(),
            low: close.to_string(),
            close: close.to_string(),
            volume: "10".to_string(),
            roc_1m: roc_1m.map(str::to_string),
            roc_tf: roc_tf.map(str::to_string),
            vol_mult: Some("2".to_string()),
            spread_bps: Some("10".to_string()),
            rsi_14: None,
        }
    }

    fn strat_params() -> serde_json::Value {
        json!({
            "minRocThreshold": 0.01,
            "minVolMult": 1.0,
            "maxSpreadBps": 50.0,
            "riskPct": 0.10,
            "leverage": 1.0,
            "stopLossPct": 0.02,
            "takeProfitPct": 0.05,
        })
    }

    fn base_step_params<'a>(
        strategy: &'a dyn Strategy,
        strategy_params: &'a serde_json::Value,
    ) -> StepParams<'a> {
        StepParams {
            run_id: Uuid::nil(),
            symbol: "BTC-USD",
            timeframe_minutes: 1,
            strategy,
            strategy_params,
            run_status: RunStatus::Active,
            current_capital: Micros::parse_decimal("1000").unwrap(),
            open_positions_count_in_run: 0,
            max_concurrent_positions: 3,
            allow_multiple_positions_per_symbol: false,
            cash_reserve: Micros::ZERO,
            slippage_bps: 2,
            taker_fee_bps: 4,
        }
    }

    #[test]
    fn entry_signal_clears_guard_and_produces_an_admitted_fill() {
        let strat = MomentumBreakoutV2;
        let p = strat_params();
        let sp = base_step_params(&strat, &p);
        let b = bar(60, "101", Some("0.02"), Some("0.02"));
        let out = step(&b, &[], &sp).unwrap();
        assert_eq!(out.len(), 1);
        match &out[0] {
            StepOutcome::Admitted { fill, .. } => {
                assert_eq!(fill.side, Side::Long);
                assert_eq!(fill.order_type, OrderType::Entry);
            }
            other => panic!("expected Admitted, got {other:?}"),
        }
    }

    #[test]
    fn stop_loss_hit_preempts_strategy_exit_signal() {
        let strat = MomentumBreakoutV2;
        let p = strat_params();
        let sp = base_step_params(&strat, &p);
        let held = vec![HeldPosition {
            position_id: Uuid::nil(),
            side: Side::Long,
            quantity_open: Qty::parse_decimal("1").unwrap(),
            entry_price_vwap: Micros::parse_decimal("100").unwrap(),
            stop_loss: Some(Micros::parse_decimal("98").unwrap()),
            take_profit: Some(Micros::parse_decimal("110").unwrap()),
        }];
        let mut b = bar(120, "99", Some("-0.01"), None);
        b.low = "97".to_string();
        b.high = "99".to_string();
        let out = step(&b, &held, &sp).unwrap();
        assert_eq!(out.len(), 1);
        match &out[0] {
            StepOutcome::ForcedExit { kind, .. } => {
                assert_eq!(*kind, stop_take::StopTakeKind::StopLoss)
            }
            other => panic!("expected ForcedExit, got {other:?}"),
        }
    }

    #[test]
    fn concurrency_cap_rejects_a_new_entry() {
        let strat = MomentumBreakoutV2;
        let p = strat_params();
        let mut sp = base_step_params(&strat, &p);
        sp.open_positions_count_in_run = 3;
        sp.max_concurrent_positions = 3;
        let b = bar(60, "101", Some("0.02"), Some("0.02"));
        let out = step(&b, &[], &sp).unwrap();
        assert_eq!(out.len(), 1);
        match &out[0] {
            StepOutcome::Rejected { reason, .. } => {
                assert_eq!(*reason, RejectionReason::ConcurrencyCap)
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn run_gate_still_admits_a_forced_exit_when_run_is_paused() {
        let strat = MomentumBreakoutV2;
        let p = strat_params();
        let mut sp = base_step_params(&strat, &p);
        sp.run_status = RunStatus::Paused;
        let held = vec![HeldPosition {
            position_id: Uuid::nil(),
            side: Side::Long,
            quantity_open: Qty::parse_decimal("1").unwrap(),
            entry_price_vwap: Micros::parse_decimal("100").unwrap(),
            stop_loss: Some(Micros::parse_decimal("98").unwrap()),
            take_profit: None,
        }];
        let mut b = bar(120, "99", Some("-0.01"), None);
        b.low = "90".to_string();
        let out = step(&b, &held, &sp).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], StepOutcome::ForcedExit { .. }));
    }
}
