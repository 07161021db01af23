//! The live run controller (spec §4.6): one async task per run, polling
//! every `poll_ms` for newly completed bars on each of the run's symbols,
//! replaying them through [`crate::bar_step::step`], persisting the
//! resulting orders/fills/positions/events, and driving the run-level
//! status machine (kill switch, bankruptcy, winding-down -> stopped,
//! operator force-exit).
//!
//! Symbols are processed in sequence within one polling iteration, all
//! against the same [`RunState`] — `current_capital` is run-scoped, not
//! per-symbol, so the "one mutable writer at a time" property spec §4.6
//! implies falls out of there being exactly one `RunState` per run rather
//! than from an explicit lock. A concurrent-per-symbol variant would wrap
//! this same `RunState` in a `tokio::sync::Mutex` and `tokio::spawn` one
//! task per symbol against it; nothing here depends on the sequential
//! order, it's just the simpler form of the same design.

use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use ctk_config::EngineConfig;
use ctk_db::types::{NewAccountSnapshot, NewPriceSnapshot};
use ctk_portfolio::{
    accounting::apply_fill, compute_equity, compute_exposure, FillOutcome, MarkMap, Micros,
    OrderType, PortfolioState, Position,
};
use ctk_risk::{check_kill_switch, RiskConfig};
use ctk_schemas::{RunStatus, Side, Timeframe};
use ctk_strategy::{Strategy, StrategyFactory};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::bar_step::{step, HeldPosition, StepOutcome, StepParams};
use crate::convert;
use crate::fill::{execution_price, taker_fee};
use crate::persist;

/// How often (in processed bars) a live run writes an `ACCOUNT_SNAPSHOT`.
const SNAPSHOT_EVERY_N_BARS: u32 = 20;

/// A run's in-memory working set: the accountant's view of its positions,
/// the DB identity of each one (positions have no identity of their own in
/// [`PortfolioState`]), and the bookkeeping the run-level status checks
/// need.
struct RunState {
    portfolio: PortfolioState,
    position_ids: BTreeMap<(String, Side), Uuid>,
    last_price: MarkMap,
    day_start_equity: Micros,
    day_start_date: NaiveDate,
    bars_since_snapshot: u32,
}

impl RunState {
    async fn load(
        pool: &PgPool,
        run_id: Uuid,
        starting_capital: Micros,
        current_capital: Micros,
    ) -> anyhow::Result<Self> {
        let rows = ctk_db::positions::list_inflight_positions(pool, run_id).await?;
        let mut position_ids = BTreeMap::new();
        let mut positions = Vec::with_capacity(rows.len());
        for row in rows {
            let side = convert::side_from_str(&row.side)
                .with_context(|| format!("unrecognized position side '{}' in store", row.side))?;
            let status = convert::status_from_str(&row.status)
                .with_context(|| format!("unrecognized position status '{}' in store", row.status))?;
            let pos = Position::rehydrate(
                row.symbol.clone(),
                side,
                status,
                row.open_ts.context("in-flight position missing open_ts")?,
                row.close_ts,
                convert::decimal_to_micros(row.entry_price_vwap.unwrap_or_default())
                    .context("bad entry_price_vwap")?,
                row.exit_price_vwap.and_then(convert::decimal_to_micros),
                convert::decimal_to_qty(row.quantity_open).context("bad quantity_open")?,
                convert::decimal_to_qty(row.quantity_close).context("bad quantity_close")?,
                convert::decimal_to_micros(row.cost_basis).context("bad cost_basis")?,
                convert::decimal_to_micros(row.fees_total).context("bad fees_total")?,
                convert::decimal_to_micros(row.realized_pnl).context("bad realized_pnl")?,
                row.leverage_effective.unwrap_or(1.0),
                row.stop_loss.and_then(convert::decimal_to_micros),
                row.take_profit.and_then(convert::decimal_to_micros),
            );
            position_ids.insert((row.symbol.clone(), side), row.position_id);
            positions.push(pos);
        }

        let portfolio = PortfolioState::restore(starting_capital, current_capital, positions);
        let day_start_equity = compute_equity(portfolio.current_capital, &portfolio.positions, &MarkMap::new());
        Ok(Self {
            portfolio,
            position_ids,
            last_price: MarkMap::new(),
            day_start_equity,
            day_start_date: Utc::now().date_naive(),
            bars_since_snapshot: 0,
        })
    }

    fn open_count(&self) -> u32 {
        self.portfolio.positions.values().filter(|p| p.is_inflight()).count() as u32
    }
}

/// Drive one live run (spec §4.6) until it reaches a terminal status.
pub async fn run_live(
    pool: PgPool,
    run_id: Uuid,
    strategies: std::sync::Arc<StrategyFactory>,
    config: EngineConfig,
) -> anyhow::Result<()> {
    let run = ctk_db::runs::get_run(&pool, run_id)
        .await?
        .context("run not found")?;
    let starting_capital =
        convert::decimal_to_micros(run.starting_capital).context("bad starting_capital")?;
    let current_capital =
        convert::decimal_to_micros(run.current_capital).context("bad current_capital")?;
    let strategy = strategies
        .build(&run.strategy_name, &run.strategy_version)
        .context("unresolved strategy")?;
    let timeframe = Timeframe::parse(&run.timeframe).context("unrecognized timeframe")?;
    let risk_cfg = RiskConfig {
        max_concurrent_positions: run.max_concurrent_positions.max(0) as u32,
        allow_multiple_positions_per_symbol: run.allow_multiple_positions_per_symbol,
        cash_reserve: Micros::ZERO,
        kill_switch_pct: RiskConfig::default().kill_switch_pct,
    };

    let mut rs = RunState::load(&pool, run_id, starting_capital, current_capital).await?;

    loop {
        let run_row = ctk_db::runs::get_run(&pool, run_id)
            .await?
            .context("run disappeared mid-loop")?;
        let status = RunStatus::parse(&run_row.status)
            .with_context(|| format!("unrecognized run status '{}'", run_row.status))?;

        if matches!(status, RunStatus::Stopped | RunStatus::Done | RunStatus::Error) {
            return Ok(());
        }

        let now = Utc::now();
        let cutoff = now - Duration::minutes(timeframe.minutes());

        for symbol in &run_row.symbols {
            if let Err(e) = process_symbol(
                &pool,
                run_id,
                symbol,
                status,
                strategy.as_ref(),
                &run_row.params,
                &risk_cfg,
                &config,
                timeframe,
                cutoff,
                &mut rs,
            )
            .await
            {
                tracing::warn!(
                    run_id = %run_id,
                    symbol = %symbol,
                    error = %e,
                    "bar processing failed for this symbol this iteration; cursor not advanced"
                );
            }
        }

        maybe_snapshot(&pool, run_id, &mut rs, now).await?;
        check_run_level_transitions(&pool, run_id, &mut rs, &risk_cfg, status, now).await?;

        tokio::time::sleep(std::time::Duration::from_millis(config.poll_ms)).await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_symbol(
    pool: &PgPool,
    run_id: Uuid,
    symbol: &str,
    run_status: RunStatus,
    strategy: &dyn Strategy,
    strategy_params: &serde_json::Value,
    risk_cfg: &RiskConfig,
    config: &EngineConfig,
    timeframe: Timeframe,
    cutoff: DateTime<Utc>,
    rs: &mut RunState,
) -> anyhow::Result<()> {
    // No cursor yet means this symbol has never been processed in this run;
    // the run's own start_ts, not an arbitrary lookback, is what "the
    // beginning" means for a live run.
    let cursor = match ctk_db::cursors::get_cursor(pool, run_id, symbol).await? {
        Some(ts) => ts,
        None => {
            let run = ctk_db::runs::get_run(pool, run_id).await?.context("run not found")?;
            run.start_ts.unwrap_or(cutoff)
        }
    };
    if cursor >= cutoff {
        return Ok(());
    }

    let bars_1m = ctk_db::bars::load_1m_bars(pool, symbol, cursor, cutoff).await?;
    if bars_1m.is_empty() {
        return Ok(());
    }
    let bars = if timeframe == Timeframe::M1 {
        bars_1m
    } else {
        match ctk_marketdata::aggregate(&bars_1m, timeframe, None) {
            Ok(bars) => bars,
            Err(e) => {
                tracing::warn!(run_id = %run_id, symbol, error = %e, "aggregation failed; skipping iteration");
                return Ok(());
            }
        }
    };
    if bars.is_empty() {
        // Only a partial, still-filling bucket was available this tick.
        return Ok(());
    }

    for bar in &bars {
        let held: Vec<HeldPosition> = rs
            .portfolio
            .positions
            .iter()
            .filter(|((sym, _), _)| sym == symbol)
            .map(|((_, side), pos)| HeldPosition {
                position_id: rs
                    .position_ids
                    .get(&(symbol.to_string(), *side))
                    .copied()
                    .unwrap_or_else(Uuid::nil),
                side: *side,
                quantity_open: pos.quantity_open,
                entry_price_vwap: pos.entry_price_vwap,
                stop_loss: pos.stop_loss,
                take_profit: pos.take_profit,
            })
            .collect();

        let params = StepParams {
            run_id,
            symbol,
            timeframe_minutes: timeframe.minutes(),
            strategy,
            strategy_params,
            run_status,
            current_capital: rs.portfolio.current_capital,
            open_positions_count_in_run: rs.open_count(),
            max_concurrent_positions: risk_cfg.max_concurrent_positions,
            allow_multiple_positions_per_symbol: risk_cfg.allow_multiple_positions_per_symbol,
            cash_reserve: risk_cfg.cash_reserve,
            slippage_bps: config.slippage_bps,
            taker_fee_bps: config.taker_fee_bps,
        };

        let outcomes = step(bar, &held, &params)?;
        for outcome in outcomes {
            apply_outcome(pool, run_id, symbol, rs, outcome).await?;
        }

        if let Some(mark) = Micros::parse_decimal(&bar.close) {
            rs.last_price.insert(symbol.to_string(), mark);
            let marks_for_symbol: Vec<((String, Side), Position)> = rs
                .portfolio
                .positions
                .iter()
                .filter(|((sym, _), p)| sym == symbol && p.is_inflight())
                .map(|(k, p)| (k.clone(), p.clone()))
                .collect();
            for (key, pos) in marks_for_symbol {
                if let Some(&position_id) = rs.position_ids.get(&key) {
                    persist::record_position_mark(pool, run_id, position_id, &pos, mark, bar.ts_close_utc)
                        .await?;
                }
            }
        }

        ctk_db::cursors::set_cursor(pool, run_id, symbol, bar.ts_close_utc).await?;
        rs.bars_since_snapshot += 1;
    }

    Ok(())
}

async fn apply_outcome(
    pool: &PgPool,
    run_id: Uuid,
    symbol: &str,
    rs: &mut RunState,
    outcome: StepOutcome,
) -> anyhow::Result<()> {
    match outcome {
        StepOutcome::Rejected { signal, reason } => {
            persist::record_signal_event(pool, run_id, Utc::now(), symbol, &signal, Some(reason)).await?;
        }
        StepOutcome::Admitted { fill, signal } => {
            persist::record_signal_event(pool, run_id, fill.ts, symbol, &signal, None).await?;
            apply_and_persist_fill(pool, run_id, symbol, rs, fill, None).await?;
        }
        StepOutcome::ForcedExit { position_id, fill, kind } => {
            let ts = fill.ts;
            apply_and_persist_fill(pool, run_id, symbol, rs, fill, Some(position_id)).await?;
            persist::record_strategy_note(pool, run_id, symbol, ts, &format!("{kind:?} triggered a forced exit"))
                .await?;
        }
    }
    Ok(())
}

/// Record the order, apply the fill to the in-memory portfolio, reconcile
/// the position row it touched, and persist the fill. This is the one place
/// that turns a pure [`ctk_portfolio::Fill`] into every side effect spec §3
/// names for it.
async fn apply_and_persist_fill(
    pool: &PgPool,
    run_id: Uuid,
    symbol: &str,
    rs: &mut RunState,
    fill: ctk_portfolio::Fill,
    known_position_id: Option<Uuid>,
) -> anyhow::Result<()> {
    let order_id = persist::record_new_order(pool, run_id, symbol, known_position_id, &fill).await?;

    let outcome = apply_fill(&mut rs.portfolio, symbol, &fill)
        .context("accounting rejected a fill the guard table had already admitted")?;

    let position_id = match outcome {
        FillOutcome::Opened(pos) => {
            let new_id = Uuid::new_v4();
            let row = convert::new_position_row(new_id, run_id, &pos);
            match ctk_db::positions::insert_position(pool, &row).await {
                Ok(()) => {}
                Err(ctk_db::StoreError::PositionAlreadyExists) => {
                    persist::record_event(
                        pool,
                        run_id,
                        ctk_schemas::EventType::Signal,
                        fill.ts,
                        serde_json::json!({
                            "symbol": symbol,
                            "side": fill.side.as_str(),
                            "executed": false,
                            "rejection_reason": ctk_risk::RejectionReason::PositionAlreadyExists.as_str(),
                        }),
                        Some(order_id),
                        None,
                        None,
                    )
                    .await?;
                    return Ok(());
                }
                Err(ctk_db::StoreError::Other(e)) => return Err(e.into()),
            }
            rs.position_ids.insert((symbol.to_string(), pos.side), new_id);
            persist::record_position_opened(pool, run_id, new_id, &pos).await?;
            new_id
        }
        FillOutcome::Updated(pos) => {
            let id = known_position_id
                .or_else(|| rs.position_ids.get(&(symbol.to_string(), pos.side)).copied())
                .context("updated position with no known position_id")?;
            if fill.order_type == OrderType::Entry {
                ctk_db::positions::apply_opening_fill(
                    pool,
                    id,
                    convert::micros_to_decimal(pos.entry_price_vwap),
                    convert::qty_to_decimal(pos.quantity_open),
                    convert::micros_to_decimal(pos.cost_basis),
                    convert::micros_to_decimal(pos.fees_total),
                    pos.status.as_str(),
                    Some(pos.open_ts),
                )
                .await?;
            } else {
                ctk_db::positions::apply_closing_fill(
                    pool,
                    id,
                    convert::qty_to_decimal(pos.quantity_open),
                    convert::qty_to_decimal(pos.quantity_close),
                    convert::micros_to_decimal(pos.fees_total),
                    convert::micros_to_decimal(pos.realized_pnl()),
                    pos.exit_price_vwap.map(convert::micros_to_decimal),
                    false,
                    None,
                )
                .await?;
            }
            id
        }
        FillOutcome::Closed(pos) => {
            let id = known_position_id
                .or_else(|| rs.position_ids.get(&(symbol.to_string(), pos.side)).copied())
                .context("closed position with no known position_id")?;
            ctk_db::positions::apply_closing_fill(
                pool,
                id,
                convert::qty_to_decimal(pos.quantity_open),
                convert::qty_to_decimal(pos.quantity_close),
                convert::micros_to_decimal(pos.fees_total),
                convert::micros_to_decimal(pos.realized_pnl()),
                pos.exit_price_vwap.map(convert::micros_to_decimal),
                true,
                pos.close_ts,
            )
            .await?;
            rs.position_ids.remove(&(symbol.to_string(), pos.side));
            persist::record_position_closed(pool, run_id, id, &pos).await?;
            id
        }
        FillOutcome::Flipped { closed, opened } => {
            let closed_id = known_position_id
                .or_else(|| rs.position_ids.get(&(symbol.to_string(), closed.side)).copied())
                .context("flipped position with no known closed position_id")?;
            ctk_db::positions::apply_closing_fill(
                pool,
                closed_id,
                convert::qty_to_decimal(closed.quantity_open),
                convert::qty_to_decimal(closed.quantity_close),
                convert::micros_to_decimal(closed.fees_total),
                convert::micros_to_decimal(closed.realized_pnl()),
                closed.exit_price_vwap.map(convert::micros_to_decimal),
                true,
                closed.close_ts,
            )
            .await?;
            rs.position_ids.remove(&(symbol.to_string(), closed.side));
            persist::record_position_closed(pool, run_id, closed_id, &closed).await?;

            let opened_id = Uuid::new_v4();
            let row = convert::new_position_row(opened_id, run_id, &opened);
            ctk_db::positions::insert_position(pool, &row).await?;
            rs.position_ids.insert((symbol.to_string(), opened.side), opened_id);
            persist::record_position_opened(pool, run_id, opened_id, &opened).await?;
            opened_id
        }
        FillOutcome::NoOp => known_position_id.unwrap_or_else(Uuid::nil),
    };

    if position_id != Uuid::nil() {
        persist::record_fill(pool, run_id, symbol, order_id, position_id, &fill).await?;
    }

    ctk_db::runs::update_current_capital(pool, run_id, convert::micros_to_decimal(rs.portfolio.current_capital))
        .await?;
    Ok(())
}

async fn maybe_snapshot(pool: &PgPool, run_id: Uuid, rs: &mut RunState, now: DateTime<Utc>) -> anyhow::Result<()> {
    if rs.bars_since_snapshot < SNAPSHOT_EVERY_N_BARS {
        return Ok(());
    }
    rs.bars_since_snapshot = 0;

    let equity = compute_equity(rs.portfolio.current_capital, &rs.portfolio.positions, &rs.last_price);
    let exposure = compute_exposure(&rs.portfolio.positions, &rs.last_price);
    let open_positions_count = rs.portfolio.positions.values().filter(|p| p.is_inflight()).count() as i32;

    let snap = NewAccountSnapshot {
        snapshot_id: Uuid::new_v4(),
        run_id,
        ts: now,
        equity: convert::micros_to_decimal(equity),
        cash: convert::micros_to_decimal(rs.portfolio.current_capital),
        margin_used: Decimal::ZERO,
        exposure_gross: convert::micros_to_decimal(exposure.gross),
        exposure_net: convert::micros_to_decimal(exposure.net),
        open_positions_count,
    };
    ctk_db::snapshots::insert_account_snapshot(pool, &snap).await?;
    persist::record_event(
        pool,
        run_id,
        ctk_schemas::EventType::AccountSnapshot,
        now,
        serde_json::json!({
            "equity": equity.to_string(),
            "cash": rs.portfolio.current_capital.to_string(),
        }),
        None,
        None,
        None,
    )
    .await?;

    for (symbol, price) in rs.last_price.iter() {
        let px_snap = NewPriceSnapshot {
            snapshot_id: Uuid::new_v4(),
            run_id,
            ts: now,
            symbol: symbol.clone(),
            price: convert::micros_to_decimal(*price),
        };
        ctk_db::snapshots::insert_price_snapshot(pool, &px_snap).await?;
    }

    Ok(())
}

async fn check_run_level_transitions(
    pool: &PgPool,
    run_id: Uuid,
    rs: &mut RunState,
    risk_cfg: &RiskConfig,
    run_status: RunStatus,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let today = now.date_naive();
    if today != rs.day_start_date {
        rs.day_start_date = today;
        rs.day_start_equity = compute_equity(rs.portfolio.current_capital, &rs.portfolio.positions, &rs.last_price);
    }

    let already_winding_down = matches!(run_status, RunStatus::WindingDown);

    if rs.portfolio.current_capital.raw() <= 0 {
        if !already_winding_down {
            ctk_db::runs::set_run_status(pool, run_id, RunStatus::WindingDown.as_str()).await?;
            persist::record_strategy_note(pool, run_id, "*", now, "bankruptcy: current_capital <= 0, winding down")
                .await?;
        }
    } else {
        let equity = compute_equity(rs.portfolio.current_capital, &rs.portfolio.positions, &rs.last_price);
        if check_kill_switch(rs.day_start_equity, equity, risk_cfg.kill_switch_pct).is_some() && !already_winding_down
        {
            ctk_db::runs::set_run_status(pool, run_id, RunStatus::WindingDown.as_str()).await?;
            persist::record_strategy_note(pool, run_id, "*", now, "kill switch tripped, winding down").await?;
        }
    }

    if already_winding_down {
        let still_open = rs.portfolio.positions.values().any(|p| p.is_inflight());
        if !still_open {
            ctk_db::runs::set_run_status(pool, run_id, RunStatus::Stopped.as_str()).await?;
        }
    }

    Ok(())
}

/// Force-close every in-flight position in a run at the latest known close
/// (spec §6's `forceExit` control-plane operation), then transition the run
/// to `stopped`.
pub async fn force_exit(pool: &PgPool, run_id: Uuid, config: &EngineConfig) -> anyhow::Result<()> {
    let run = ctk_db::runs::get_run(pool, run_id).await?.context("run not found")?;
    let starting_capital =
        convert::decimal_to_micros(run.starting_capital).context("bad starting_capital")?;
    let current_capital =
        convert::decimal_to_micros(run.current_capital).context("bad current_capital")?;

    let mut rs = RunState::load(pool, run_id, starting_capital, current_capital).await?;
    let targets: Vec<((String, Side), Uuid)> =
        rs.position_ids.iter().map(|(k, v)| (k.clone(), *v)).collect();

    for ((symbol, side), position_id) in targets {
        let quantity_open = match rs.portfolio.position(&symbol, side) {
            Some(pos) if pos.is_inflight() => pos.quantity_open,
            _ => continue,
        };
        if quantity_open.is_zero() {
            continue;
        }
        let Some(close) = ctk_db::bars::latest_close(pool, &symbol).await? else {
            tracing::warn!(run_id = %run_id, symbol = %symbol, "force-exit skipped: no market data to price the exit");
            continue;
        };
        let Some(reference_price) = convert::decimal_to_micros(close) else {
            continue;
        };
        // A force-exit sells the held side, so slippage must push the price
        // the other way — the same convention the admitted-exit path uses
        // by pricing against the opposite-of-held side (`bar_step::step`).
        let exec_price = execution_price(reference_price, side.opposite(), config.slippage_bps);
        let fee = taker_fee(exec_price, quantity_open, config.taker_fee_bps).unwrap_or(Micros::ZERO);
        let fill = ctk_portfolio::Fill::exit(side, quantity_open, exec_price, fee, Utc::now());
        apply_and_persist_fill(pool, run_id, &symbol, &mut rs, fill, Some(position_id)).await?;
    }

    ctk_db::runs::set_run_status(pool, run_id, RunStatus::Stopped.as_str()).await?;
    Ok(())
}
