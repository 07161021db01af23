//! The backtest-side twin of `ctk-engine::bar_step` (spec §4.5, §4.7): same
//! stop/take-then-kernel-then-guard-table decision order, but a strategy
//! signal fills at the *next* bar's open rather than the current bar's
//! close — the one place a backtest replay and the live loop must diverge,
//! since a live run has no "next" bar to peek at and a backtest has the
//! whole series in hand. Stop/take exits are unaffected: they trigger off
//! the bar's own high/low against a level fixed at entry, independent of
//! which worker is running.

use ctk_portfolio::{Fill, Micros, OrderType, Qty};
use ctk_risk::{
    classify_intent, guard, stop_take, GuardContext, Intent, RejectionReason, RiskDecision,
    StopTakeLevels,
};
use ctk_schemas::{Bar, RunStatus, Side};
use ctk_strategy::{PositionView, Signal, Strategy, StrategyError, StrategyState};
use uuid::Uuid;

use crate::fill::{execution_price, taker_fee};

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

#[derive(Debug)]
pub enum StepOutcome {
    ForcedExit {
        position_id: Uuid,
        fill: Fill,
        kind: stop_take::StopTakeKind,
    },
    /// A strategy signal cleared the guard table. `None` when there was no
    /// next bar to price the fill against — the signal is neither admitted
    /// nor rejected, it simply can't execute on the last bar of a replay.
    Admitted { fill: Fill, signal: Signal },
    Rejected {
        signal: Signal,
        reason: RejectionReason,
    },
}

fn parse_close(bar: &Bar) -> Option<Micros> {
    Micros::parse_decimal(&bar.close)
}

fn parse_open(bar: &Bar) -> Option<Micros> {
    Micros::parse_decimal(&bar.open)
}

/// Evaluate one bar for one `(run, symbol)` against the replay's next bar
/// (`None` on the final bar of the series — any kernel signal that bar
/// produces is silently dropped, since it has nothing to fill against).
pub fn step(
    bar: &Bar,
    next_bar: Option<&Bar>,
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
    if signals.is_empty() {
        return Ok(Vec::new());
    }

    let Some(next_open) = next_bar.and_then(parse_open) else {
        return Ok(Vec::new());
    };
    let next_ts = next_bar.expect("next_open is Some only when next_bar is Some").ts_close_utc;
    let _ = parse_close(bar); // close is read by stop/take's own check, not needed here

    let mut out = Vec::with_capacity(signals.len());
    for signal in signals {
        let intent = classify_intent(signal.side, &held_sides);
        let exec_price = execution_price(next_open, signal.side, params.slippage_bps);
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
                        next_ts,
                        signal.stop_loss,
                        signal.take_profit,
                        signal.leverage.unwrap_or(1.0),
                    ),
                    _ => Fill::exit(fill_side, signal.size, exec_price, fee, next_ts),
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

    fn bar(ts: i64, open: &str, close: &str, roc_1m: Option<&str>, roc_tf: Option<&str>) -> Bar {
        Bar {
            symbol: "BTC-USD".to_string(),
            ts_close_utc: Utc.timestamp_opt(ts, 0).unwrap(),
            open: open.to_string(),
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
    fn entry_signal_fills_at_next_bar_open() {
        let strat = MomentumBreakoutV2;
        let p = strat_params();
        let sp = base_step_params(&strat, &p);
        let b = bar(60, "101", "101", Some("0.02"), Some("0.02"));
        let next = bar(120, "103", "104", None, None);
        let out = step(&b, Some(&next), &[], &sp).unwrap();
        assert_eq!(out.len(), 1);
        match &out[0] {
            StepOutcome::Admitted { fill, .. } => {
                assert_eq!(fill.side, Side::Long);
                // 103 bumped up by 2bps slippage
                assert_eq!(fill.price.raw(), 103_020_600);
            }
            other => panic!("expected Admitted, got {other:?}"),
        }
    }

    #[test]
    fn entry_signal_on_final_bar_is_dropped() {
        let strat = MomentumBreakoutV2;
        let p = strat_params();
        let sp = base_step_params(&strat, &p);
        let b = bar(60, "101", "101", Some("0.02"), Some("0.02"));
        let out = step(&b, None, &[], &sp).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn stop_loss_hit_preempts_strategy_exit_and_does_not_need_a_next_bar() {
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
        let mut b = bar(120, "99", "99", Some("-0.01"), None);
        b.low = "97".to_string();
        b.high = "99".to_string();
        let out = step(&b, None, &held, &sp).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], StepOutcome::ForcedExit { .. }));
    }
}
