//! The worked strategy from spec §4.3: `momentum_breakout_v2`.
//!
//! Only LONG entries are emitted — SHORT entries are an explicit Open
//! Question (spec §9(a)) left for a future strategy; `ctk-portfolio` fully
//! supports SHORT and is exercised independently by its own tests.

use std::str::FromStr;

use ctk_config::coerce_percent;
use ctk_portfolio::{Micros, Qty};
use ctk_schemas::Side;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::kernel::{parse_field, required_opt, Strategy, StrategyError};
use crate::types::{Signal, SignalOrderType, StrategyState};

pub struct MomentumBreakoutV2;

fn param_f64(params: &Value, key: &'static str) -> Result<f64, StrategyError> {
    params
        .get(key)
        .and_then(Value::as_f64)
        .ok_or(StrategyError::InvalidParam(key))
}

fn param_f64_or(params: &Value, key: &'static str, default: f64) -> f64 {
    params.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn micros_to_decimal(m: Micros) -> Decimal {
    Decimal::from_str(&m.to_string()).expect("Micros::to_string always produces a valid decimal")
}

fn decimal_to_micros(d: Decimal) -> Option<Micros> {
    Micros::parse_decimal(&d.to_string())
}

fn decimal_to_qty(d: Decimal) -> Option<Qty> {
    Qty::parse_decimal(&d.to_string())
}

impl Strategy for MomentumBreakoutV2 {
    fn name(&self) -> &'static str {
        "momentum_breakout_v2"
    }

    fn version(&self) -> &'static str {
        "v2"
    }

    fn evaluate(
        &self,
        bar: &ctk_schemas::Bar,
        state: &StrategyState<'_>,
        params: &Value,
    ) -> Result<Vec<Signal>, StrategyError> {
        let close = parse_field("close", &bar.close)?;

        let held_long = state.position_on(Side::Long);

        // Exit check comes first: an open LONG exits on momentum loss or
        // RSI exhaustion, regardless of whether entry conditions also hold
        // this bar (stop/take precedence over strategy signals is the
        // engine's job, not the kernel's — spec §4.5 scenario 3).
        if let Some(held) = held_long {
            let roc_1m_raw = required_opt("roc_1m", &bar.roc_1m)?;
            let roc_1m = parse_field("roc_1m", roc_1m_raw)?;

            let rsi_exit_level = param_f64_or(params, "rsiExitLevel", 75.0);
            let rsi_exceeds_exit = match &bar.rsi_14 {
                Some(raw) => {
                    let rsi = parse_field("rsi_14", raw)?;
                    rsi > Decimal::from_f64_retain_or_zero(rsi_exit_level)
                }
                None => false,
            };

            if roc_1m < Decimal::ZERO || rsi_exceeds_exit {
                return Ok(vec![Signal {
                    side: Side::Short,
                    size: held.quantity_open,
                    order_type: SignalOrderType::Market,
                    price: None,
                    stop_loss: None,
                    take_profit: None,
                    leverage: None,
                    reason: "momentum_exit".to_string(),
                }]);
            }
            // Held long, no exit condition: no new entry on the same side.
            return Ok(Vec::new());
        }

        // Entry: all three conditions must hold on the current bar.
        let roc_tf_raw = required_opt("roc_tf", &bar.roc_tf)?;
        let roc_tf = parse_field("roc_tf", roc_tf_raw)?;
        let vol_mult_raw = required_opt("vol_mult", &bar.vol_mult)?;
        let vol_mult = parse_field("vol_mult", vol_mult_raw)?;
        let spread_bps_raw = required_opt("spread_bps", &bar.spread_bps)?;
        let spread_bps = parse_field("spread_bps", spread_bps_raw)?;

        let min_roc_threshold = coerce_percent(param_f64(params, "minRocThreshold")?);
        let min_vol_mult = param_f64(params, "minVolMult")?;
        let max_spread_bps = param_f64(params, "maxSpreadBps")?;

        let entry_ok = roc_tf >= Decimal::from_f64_retain_or_zero(min_roc_threshold)
            && vol_mult >= Decimal::from_f64_retain_or_zero(min_vol_mult)
            && spread_bps <= Decimal::from_f64_retain_or_zero(max_spread_bps);

        if !entry_ok {
            return Ok(Vec::new());
        }

        let risk_pct = coerce_percent(param_f64(params, "riskPct")?);
        let leverage = param_f64_or(params, "leverage", 1.0);
        let stop_loss_pct = coerce_percent(param_f64(params, "stopLossPct")?);
        let take_profit_pct = coerce_percent(param_f64(params, "takeProfitPct")?);

        let stop_loss = close * (Decimal::ONE - Decimal::from_f64_retain_or_zero(stop_loss_pct));
        let take_profit =
            close * (Decimal::ONE + Decimal::from_f64_retain_or_zero(take_profit_pct));

        let capital = micros_to_decimal(state.current_capital);
        let size = capital
            * Decimal::from_f64_retain_or_zero(risk_pct)
            * Decimal::from_f64_retain_or_zero(leverage)
            / close;

        let size = decimal_to_qty(size).ok_or(StrategyError::InvalidParam("riskPct"))?;
        let stop_loss = decimal_to_micros(stop_loss);
        let take_profit = decimal_to_micros(take_profit);

        Ok(vec![Signal {
            side: Side::Long,
            size,
            order_type: SignalOrderType::Market,
            price: None,
            stop_loss,
            take_profit,
            leverage: Some(leverage),
            reason: "momentum_entry".to_string(),
        }])
    }
}

trait DecimalFromF64Ext {
    fn from_f64_retain_or_zero(v: f64) -> Decimal;
}

impl DecimalFromF64Ext for Decimal {
    fn from_f64_retain_or_zero(v: f64) -> Decimal {
        Decimal::from_str(&format!("{v}")).unwrap_or(Decimal::ZERO)
    }
}
