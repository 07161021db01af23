//! Daily kill switch (spec §4.5, §9(b)): a run is force-stopped once its
//! equity has fallen by `kill_switch_pct` from the equity recorded at the
//! start of the current trading day.

use ctk_portfolio::Micros;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KillSwitchTrip {
    pub day_start_equity_raw: i64,
    pub current_equity_raw: i64,
}

/// `true` if the drawdown from `day_start_equity` to `current_equity` meets
/// or exceeds `kill_switch_pct`. A non-positive `day_start_equity` never
/// trips the switch — there is no baseline to measure a drawdown against.
pub fn check(day_start_equity: Micros, current_equity: Micros, kill_switch_pct: f64) -> Option<KillSwitchTrip> {
    if day_start_equity.raw() <= 0 || kill_switch_pct <= 0.0 {
        return None;
    }
    if current_equity >= day_start_equity {
        return None;
    }
    let drawdown = (day_start_equity - current_equity).raw() as f64 / day_start_equity.raw() as f64;
    if drawdown >= kill_switch_pct {
        Some(KillSwitchTrip {
            day_start_equity_raw: day_start_equity.raw(),
            current_equity_raw: current_equity.raw(),
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_at_exact_threshold() {
        let start = Micros::parse_decimal("1000").unwrap();
        let now = Micros::parse_decimal("800").unwrap();
        assert!(check(start, now, 0.20).is_some());
    }

    #[test]
    fn does_not_trip_below_threshold() {
        let start = Micros::parse_decimal("1000").unwrap();
        let now = Micros::parse_decimal("850").unwrap();
        assert!(check(start, now, 0.20).is_none());
    }

    #[test]
    fn gains_never_trip() {
        let start = Micros::parse_decimal("1000").unwrap();
        let now = Micros::parse_decimal("1200").unwrap();
        assert!(check(start, now, 0.20).is_none());
    }

    #[test]
    fn zero_baseline_never_trips() {
        let start = Micros::ZERO;
        let now = Micros::parse_decimal("-50").unwrap();
        assert!(check(start, now, 0.20).is_none());
    }
}
