//! Spec §8 scenario 2: `max_concurrent_positions=1`, two symbols both emit
//! ENTRY on the same bar. Only the first, by the deterministic symbol order
//! in `run.symbols`, is admitted; the second is rejected with
//! `concurrency_cap`.

use ctk_portfolio::Micros;
use ctk_risk::{evaluate, GuardContext, Intent, RejectionReason, RiskDecision};
use ctk_schemas::RunStatus;

fn ctx(symbol: &str, open_positions_count: u32) -> GuardContext<'_> {
    GuardContext {
        run_status: RunStatus::Active,
        intent: Intent::Entry,
        open_positions_count,
        max_concurrent_positions: 1,
        allow_multiple_positions_per_symbol: false,
        has_inflight_on_symbol: false,
        cost_basis_estimate: Micros::parse_decimal("100").unwrap(),
        current_capital: Micros::parse_decimal("1000").unwrap(),
        cash_reserve: Micros::ZERO,
        symbols_in_run_order: &[],
        symbol,
    }
}

#[test]
fn only_the_first_symbol_in_run_order_is_admitted() {
    let run_symbols = ["BTC-USD", "ETH-USD"];

    let mut open_count = 0u32;
    let mut decisions = Vec::new();
    for symbol in run_symbols {
        let c = ctx(symbol, open_count);
        let decision = evaluate(&c);
        if decision == RiskDecision::Admit {
            open_count += 1;
        }
        decisions.push((symbol, decision));
    }

    assert_eq!(decisions[0], ("BTC-USD", RiskDecision::Admit));
    assert_eq!(
        decisions[1],
        (
            "ETH-USD",
            RiskDecision::Reject(RejectionReason::ConcurrencyCap)
        )
    );
}
