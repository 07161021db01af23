//! The guard table (spec §4.5): a strict ordered chain of checks a signal
//! must clear before the engine is allowed to place an order. Checks run in
//! the order listed here — the first failing guard wins, and its reason is
//! what gets recorded on the rejected signal.
//!
//! The Uniqueness guard named in spec §9 is deliberately absent from this
//! function: that invariant ("at most one NEW/OPEN position per
//! `(run_id, symbol, side)`") is enforced by a partial unique index in
//! `ctk-db`, not here, because only the store sees every concurrent writer.
//! [`RejectionReason::PositionAlreadyExists`] exists so the engine can map a
//! unique-violation bounced back from the store onto the same rejection
//! vocabulary as the guards evaluated here.

use ctk_schemas::RunStatus;

use crate::types::{GuardContext, Intent, RejectionReason, RiskDecision};

/// Evaluate one signal's context against the guard table, in spec §4.5
/// order. Exit intents only pass through the run-gate — the rest constrain
/// *new* exposure, not closing it. A paused run still evaluates stop/take
/// exits (spec §5: "position mark/stop evaluations continue" during pause,
/// only entries are blocked), so the run-gate admits exits for any
/// non-terminal status; only `Stopped`/`Done`/`Error` reject them outright.
pub fn evaluate(ctx: &GuardContext<'_>) -> RiskDecision {
    if ctx.intent == Intent::Exit {
        if matches!(ctx.run_status, RunStatus::Stopped | RunStatus::Done | RunStatus::Error) {
            return RiskDecision::Reject(RejectionReason::RunGate);
        }
        return RiskDecision::Admit;
    }

    if !matches!(ctx.run_status, RunStatus::Active | RunStatus::WindingDown) {
        return RiskDecision::Reject(RejectionReason::RunGate);
    }

    if ctx.run_status == RunStatus::WindingDown {
        return RiskDecision::Reject(RejectionReason::ExitOnlyWindow);
    }

    if ctx.open_positions_count >= ctx.max_concurrent_positions {
        return RiskDecision::Reject(RejectionReason::ConcurrencyCap);
    }

    if !ctx.allow_multiple_positions_per_symbol && ctx.has_inflight_on_symbol {
        return RiskDecision::Reject(RejectionReason::PerSymbolCap);
    }

    if ctx.cost_basis_estimate > ctx.current_capital.saturating_sub(ctx.cash_reserve) {
        return RiskDecision::Reject(RejectionReason::InsufficientCapital);
    }

    RiskDecision::Admit
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctk_portfolio::Micros;

    fn base_ctx() -> GuardContext<'static> {
        GuardContext {
            run_status: RunStatus::Active,
            intent: Intent::Entry,
            open_positions_count: 0,
            max_concurrent_positions: 3,
            allow_multiple_positions_per_symbol: false,
            has_inflight_on_symbol: false,
            cost_basis_estimate: Micros::parse_decimal("100").unwrap(),
            current_capital: Micros::parse_decimal("1000").unwrap(),
            cash_reserve: Micros::ZERO,
            symbols_in_run_order: &[],
            symbol: "BTC-USD",
        }
    }

    #[test]
    fn admits_a_clean_entry() {
        assert_eq!(evaluate(&base_ctx()), RiskDecision::Admit);
    }

    #[test]
    fn rejects_when_run_is_not_active_or_winding_down() {
        let mut ctx = base_ctx();
        ctx.run_status = RunStatus::Paused;
        assert_eq!(
            evaluate(&ctx),
            RiskDecision::Reject(RejectionReason::RunGate)
        );
    }

    #[test]
    fn exits_pass_even_when_winding_down() {
        let mut ctx = base_ctx();
        ctx.run_status = RunStatus::WindingDown;
        ctx.intent = Intent::Exit;
        assert_eq!(evaluate(&ctx), RiskDecision::Admit);
    }

    #[test]
    fn exits_pass_while_paused() {
        let mut ctx = base_ctx();
        ctx.run_status = RunStatus::Paused;
        ctx.intent = Intent::Exit;
        assert_eq!(evaluate(&ctx), RiskDecision::Admit);
    }

    #[test]
    fn exits_are_rejected_once_the_run_is_terminal() {
        for status in [RunStatus::Stopped, RunStatus::Done, RunStatus::Error] {
            let mut ctx = base_ctx();
            ctx.run_status = status;
            ctx.intent = Intent::Exit;
            assert_eq!(
                evaluate(&ctx),
                RiskDecision::Reject(RejectionReason::RunGate)
            );
        }
    }

    #[test]
    fn winding_down_rejects_new_entries() {
        let mut ctx = base_ctx();
        ctx.run_status = RunStatus::WindingDown;
        assert_eq!(
            evaluate(&ctx),
            RiskDecision::Reject(RejectionReason::ExitOnlyWindow)
        );
    }

    #[test]
    fn rejects_once_concurrency_cap_is_reached() {
        let mut ctx = base_ctx();
        ctx.open_positions_count = 3;
        assert_eq!(
            evaluate(&ctx),
            RiskDecision::Reject(RejectionReason::ConcurrencyCap)
        );
    }

    #[test]
    fn rejects_a_second_position_on_the_same_symbol_by_default() {
        let mut ctx = base_ctx();
        ctx.has_inflight_on_symbol = true;
        assert_eq!(
            evaluate(&ctx),
            RiskDecision::Reject(RejectionReason::PerSymbolCap)
        );
    }

    #[test]
    fn allows_a_second_position_on_the_same_symbol_when_configured() {
        let mut ctx = base_ctx();
        ctx.has_inflight_on_symbol = true;
        ctx.allow_multiple_positions_per_symbol = true;
        assert_eq!(evaluate(&ctx), RiskDecision::Admit);
    }

    #[test]
    fn rejects_when_cost_basis_exceeds_available_capital() {
        let mut ctx = base_ctx();
        ctx.cost_basis_estimate = Micros::parse_decimal("1000").unwrap();
        ctx.cash_reserve = Micros::parse_decimal("100").unwrap();
        assert_eq!(
            evaluate(&ctx),
            RiskDecision::Reject(RejectionReason::InsufficientCapital)
        );
    }

    #[test]
    fn concurrency_cap_is_checked_before_per_symbol_cap() {
        let mut ctx = base_ctx();
        ctx.open_positions_count = 3;
        ctx.has_inflight_on_symbol = true;
        assert_eq!(
            evaluate(&ctx),
            RiskDecision::Reject(RejectionReason::ConcurrencyCap)
        );
    }
}
