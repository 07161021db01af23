//! The backtest worker (spec §4.7): claims queued runs one at a time
//! (`FOR UPDATE SKIP LOCKED`, same as the live engine's run claim), then
//! replays each run's symbols against its full historical bar range,
//! bounded to `max_parallel_symbols` concurrent replays via a
//! [`tokio::task::JoinSet`].
//!
//! Design decision (recorded in `DESIGN.md`): each symbol in a backtest run
//! gets its own independent [`PortfolioState`], seeded fresh from
//! `run.starting_capital`, rather than sharing one run-wide ledger the way
//! the live engine does. `bt_results` is keyed per `(run_id, symbol)` with
//! its own trade count and P&L, and replaying symbols concurrently against
//! a single shared ledger would reintroduce exactly the cross-task
//! ordering problem the live engine avoids by processing symbols
//! sequentially. `max_concurrent_positions` therefore bounds concurrent
//! positions *within* one symbol's own replay (relevant only when
//! `allow_multiple_positions_per_symbol` is set) rather than across the
//! whole run. The run's `current_capital` is reconstructed afterward as
//! `starting_capital` plus the sum of each symbol's net change in cash —
//! a bookkeeping convenience for the control plane, not a ledger the
//! replay itself shares.

use std::sync::Arc;

use anyhow::Context;
use ctk_config::EngineConfig;
use ctk_db::types::{BtEquityPoint, BtResultRow, RunRow};
use ctk_portfolio::{
    accounting::apply_fill, compute_equity, compute_symbol_metrics, FillOutcome, MarkMap, Micros,
    OrderType, PortfolioState, Position,
};
use ctk_risk::RiskConfig;
use ctk_schemas::{RunStatus, Side, Timeframe};
use ctk_strategy::{Strategy, StrategyFactory};
use sqlx::PgPool;
use uuid::Uuid;

use crate::bar_step::{step, HeldPosition, StepOutcome, StepParams};
use crate::convert;
use crate::persist;

/// One replay tick (spec §4.7): pop the oldest queued run, replay it end to
/// end, mark it done or errored. Returns `false` when no queued run was
/// available — callers loop this with a sleep between empty polls.
pub async fn run_once(
    pool: &PgPool,
    strategies: &Arc<StrategyFactory>,
    config: &EngineConfig,
) -> anyhow::Result<bool> {
    let Some(run) = ctk_db::runs::claim_next_run(pool, &config.worker_name).await? else {
        return Ok(false);
    };

    let run_id = run.run_id;
    match replay_run(pool, &run, strategies, config).await {
        Ok(()) => ctk_db::runs::set_done(pool, run_id).await?,
        Err(e) => {
            tracing::error!(run_id = %run_id, error = %e, "backtest run failed");
            ctk_db::runs::set_error(pool, run_id, &e.to_string()).await?;
        }
    }
    Ok(true)
}

/// Poll forever: claim and replay runs as they're queued, sleeping
/// `poll_ms` between empty claims.
pub async fn run_forever(
    pool: PgPool,
    strategies: Arc<StrategyFactory>,
    config: EngineConfig,
) -> anyhow::Result<()> {
    loop {
        let claimed = run_once(&pool, &strategies, &config).await?;
        if !claimed {
            tokio::time::sleep(std::time::Duration::from_millis(config.poll_ms)).await;
        }
    }
}

async fn replay_run(
    pool: &PgPool,
    run: &RunRow,
    strategies: &Arc<StrategyFactory>,
    config: &EngineConfig,
) -> anyhow::Result<()> {
    let starting_capital =
        convert::decimal_to_micros(run.starting_capital).context("bad starting_capital")?;
    let strategy = strategies
        .build(&run.strategy_name, &run.strategy_version)
        .context("unresolved strategy")?;
    let timeframe = Timeframe::parse(&run.timeframe).context("unrecognized timeframe")?;
    let start_ts = run.start_ts.context("backtest run missing start_ts")?;
    let end_ts = run.end_ts.context("backtest run missing end_ts")?;
    let risk_cfg = RiskConfig {
        max_concurrent_positions: run.max_concurrent_positions.max(0) as u32,
        allow_multiple_positions_per_symbol: run.allow_multiple_positions_per_symbol,
        cash_reserve: Micros::ZERO,
        kill_switch_pct: RiskConfig::default().kill_switch_pct,
    };

    let mut join_set = tokio::task::JoinSet::new();
    let mut pending = run.symbols.clone().into_iter();
    let mut in_flight = 0usize;
    let mut final_capitals: Vec<Micros> = Vec::with_capacity(run.symbols.len());

    loop {
        while in_flight < config.max_parallel_symbols.max(1) {
            let Some(symbol) = pending.next() else { break };
            in_flight += 1;
            let pool = pool.clone();
            let strategy = strategy.clone();
            let strategy_params = run.params.clone();
            let risk_cfg = risk_cfg.clone();
            let config = config.clone();
            let run_id = run.run_id;
            join_set.spawn(async move {
                replay_symbol(
                    &pool,
                    run_id,
                    &symbol,
                    strategy.as_ref(),
                    &strategy_params,
                    &risk_cfg,
                    &config,
                    timeframe,
                    starting_capital,
                    start_ts,
                    end_ts,
                )
                .await
            });
        }

        let Some(joined) = join_set.join_next().await else {
            break;
        };
        in_flight -= 1;
        final_capitals.push(joined.context("symbol replay task panicked")??);
    }

    if final_capitals.is_empty() {
        return Ok(());
    }
    let net_contribution: i64 = final_capitals
        .iter()
        .map(|c| c.raw().saturating_sub(starting_capital.raw()))
        .fold(0i64, i64::saturating_add);
    let final_run_capital = Micros::new(starting_capital.raw().saturating_add(net_contribution));
    ctk_db::runs::update_current_capital(
        pool,
        run.run_id,
        convert::micros_to_decimal(final_run_capital),
    )
    .await?;

    Ok(())
}

/// A single symbol's independent ledger for the life of its replay.
struct SymbolBook {
    portfolio: PortfolioState,
    position_ids: std::collections::BTreeMap<Side, Uuid>,
    closed_positions: Vec<Position>,
    fill_notionals: Vec<Micros>,
    /// Per-outcome counter feeding `persist::derive_id`, so replayed ids are
    /// deterministic instead of `Uuid::new_v4()`-random (spec §4.7, §8).
    seq: u64,
}

#[allow(clippy::too_many_arguments)]
async fn replay_symbol(
    pool: &PgPool,
    run_id: Uuid,
    symbol: &str,
    strategy: &dyn Strategy,
    strategy_params: &serde_json::Value,
    risk_cfg: &RiskConfig,
    config: &EngineConfig,
    timeframe: Timeframe,
    starting_capital: Micros,
    start_ts: chrono::DateTime<chrono::Utc>,
    end_ts: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<Micros> {
    let bars_1m = ctk_db::bars::load_1m_bars(pool, symbol, start_ts, end_ts).await?;
    let bars = if timeframe == Timeframe::M1 {
        bars_1m
    } else {
        ctk_marketdata::aggregate(&bars_1m, timeframe, None)
            .with_context(|| format!("aggregation failed for {symbol}"))?
    };

    let mut book = SymbolBook {
        portfolio: PortfolioState::new(starting_capital),
        position_ids: std::collections::BTreeMap::new(),
        closed_positions: Vec::new(),
        fill_notionals: Vec::new(),
        seq: 0,
    };
    let mut equity_curve: Vec<Micros> = Vec::with_capacity(bars.len());
    let mut bars_with_open_position: Vec<bool> = Vec::with_capacity(bars.len());
    let mut last_price = MarkMap::new();

    for (i, bar) in bars.iter().enumerate() {
        let next_bar = bars.get(i + 1);
        let held: Vec<HeldPosition> = book
            .portfolio
            .positions
            .values()
            .map(|pos| HeldPosition {
                position_id: book
                    .position_ids
                    .get(&pos.side)
                    .copied()
                    .unwrap_or_else(Uuid::nil),
                side: pos.side,
                quantity_open: pos.quantity_open,
                entry_price_vwap: pos.entry_price_vwap,
                stop_loss: pos.stop_loss,
                take_profit: pos.take_profit,
            })
            .collect();

        let open_count = book.portfolio.positions.values().filter(|p| p.is_inflight()).count() as u32;
        let params = StepParams {
            run_id,
            symbol,
            timeframe_minutes: timeframe.minutes(),
            strategy,
            strategy_params,
            run_status: RunStatus::Active,
            current_capital: book.portfolio.current_capital,
            open_positions_count_in_run: open_count,
            max_concurrent_positions: risk_cfg.max_concurrent_positions,
            allow_multiple_positions_per_symbol: risk_cfg.allow_multiple_positions_per_symbol,
            cash_reserve: risk_cfg.cash_reserve,
            slippage_bps: config.slippage_bps,
            taker_fee_bps: config.taker_fee_bps,
        };

        let outcomes = step(bar, next_bar, &held, &params)?;
        for outcome in outcomes {
            apply_outcome(pool, run_id, symbol, &mut book, outcome).await?;
        }

        if let Some(mark) = Micros::parse_decimal(&bar.close) {
            last_price.insert(symbol.to_string(), mark);
        }
        let equity = compute_equity(book.portfolio.current_capital, &book.portfolio.positions, &last_price);
        equity_curve.push(equity);
        bars_with_open_position.push(book.portfolio.positions.values().any(|p| p.is_inflight()));

        let point = BtEquityPoint {
            run_id,
            symbol: symbol.to_string(),
            ts: bar.ts_close_utc,
            equity: convert::micros_to_decimal(equity),
        };
        ctk_db::bt_results::upsert_bt_equity_point(pool, &point).await?;
    }

    let metrics = compute_symbol_metrics(
        &book.closed_positions,
        &equity_curve,
        &bars_with_open_position,
        &book.fill_notionals,
        timeframe.minutes(),
    );
    let row = BtResultRow {
        run_id,
        symbol: symbol.to_string(),
        trades: metrics.trades as i32,
        wins: metrics.wins as i32,
        losses: metrics.losses as i32,
        pnl: convert::micros_to_decimal(metrics.pnl),
        fees: convert::micros_to_decimal(metrics.fees),
        win_rate: metrics.win_rate,
        sharpe: Some(metrics.sharpe),
        sortino: Some(metrics.sortino),
        max_dd: metrics.max_dd,
        profit_factor: Some(metrics.profit_factor),
        exposure: metrics.exposure,
        turnover: convert::micros_to_decimal(metrics.turnover),
    };
    ctk_db::bt_results::upsert_bt_result(pool, &row).await?;

    Ok(book.portfolio.current_capital)
}

async fn apply_outcome(
    pool: &PgPool,
    run_id: Uuid,
    symbol: &str,
    book: &mut SymbolBook,
    outcome: StepOutcome,
) -> anyhow::Result<()> {
    let seq = book.seq;
    book.seq += 1;

    match outcome {
        StepOutcome::Rejected { signal, reason } => {
            persist::record_signal_event(pool, run_id, seq, chrono::Utc::now(), symbol, &signal, Some(reason))
                .await?;
        }
        StepOutcome::Admitted { fill, signal } => {
            persist::record_signal_event(pool, run_id, seq, fill.ts, symbol, &signal, None).await?;
            apply_and_persist_fill(pool, run_id, symbol, seq, book, fill, None).await?;
        }
        StepOutcome::ForcedExit { position_id, fill, .. } => {
            apply_and_persist_fill(pool, run_id, symbol, seq, book, fill, Some(position_id)).await?;
        }
    }
    Ok(())
}

/// Record the order, apply the fill to the symbol's own ledger, reconcile
/// the position row it touched, and persist the fill — the backtest-side
/// twin of `ctk-engine::controller::apply_and_persist_fill`, scoped to one
/// symbol's independent book instead of a run-wide `RunState`.
async fn apply_and_persist_fill(
    pool: &PgPool,
    run_id: Uuid,
    symbol: &str,
    seq: u64,
    book: &mut SymbolBook,
    fill: ctk_portfolio::Fill,
    known_position_id: Option<Uuid>,
) -> anyhow::Result<()> {
    let order_id = persist::record_new_order(pool, run_id, symbol, seq, known_position_id, &fill).await?;
    let notional = fill.price.checked_mul_qty(fill.qty).unwrap_or(Micros::ZERO);

    let outcome = apply_fill(&mut book.portfolio, symbol, &fill)
        .context("accounting rejected a fill the guard table had already admitted")?;

    let position_id = match outcome {
        FillOutcome::Opened(pos) => {
            let new_id = persist::new_position_id(run_id, symbol, seq);
            let row = convert::new_position_row(new_id, run_id, &pos);
            match ctk_db::positions::insert_position(pool, &row).await {
                Ok(()) => {}
                Err(ctk_db::StoreError::PositionAlreadyExists) => {
                    persist::record_event(
                        pool,
                        run_id,
                        symbol,
                        seq,
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
            book.position_ids.insert(pos.side, new_id);
            persist::record_position_opened(pool, run_id, symbol, seq, new_id, &pos).await?;
            new_id
        }
        FillOutcome::Updated(pos) => {
            let id = known_position_id
                .or_else(|| book.position_ids.get(&pos.side).copied())
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
                .or_else(|| book.position_ids.get(&pos.side).copied())
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
            book.position_ids.remove(&pos.side);
            persist::record_position_closed(pool, run_id, symbol, seq, id, &pos).await?;
            book.closed_positions.push(pos);
            id
        }
        FillOutcome::Flipped { closed, opened } => {
            let closed_id = known_position_id
                .or_else(|| book.position_ids.get(&closed.side).copied())
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
            book.position_ids.remove(&closed.side);
            persist::record_position_closed(pool, run_id, symbol, seq, closed_id, &closed).await?;
            book.closed_positions.push(closed);

            let opened_id = persist::new_position_id(run_id, symbol, seq);
            let row = convert::new_position_row(opened_id, run_id, &opened);
            ctk_db::positions::insert_position(pool, &row).await?;
            book.position_ids.insert(opened.side, opened_id);
            persist::record_position_opened(pool, run_id, symbol, seq, opened_id, &opened).await?;
            opened_id
        }
        FillOutcome::NoOp => known_position_id.unwrap_or_else(Uuid::nil),
    };

    if position_id != Uuid::nil() {
        persist::record_fill(pool, run_id, symbol, seq, order_id, position_id, &fill).await?;
        book.fill_notionals.push(notional);
    }

    Ok(())
}
