//! Synthetic stop-loss / take-profit exit detection (spec §4.5): evaluated
//! against the bar's high/low range *before* the strategy kernel runs, so a
//! stop or take hit on this bar always pre-empts whatever the kernel would
//! otherwise say about it.

use ctk_portfolio::{Micros, Qty};
use ctk_schemas::{Bar, Side};

use crate::types::StopTakeLevels;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopTakeKind {
    StopLoss,
    TakeProfit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StopTakeHit {
    pub side: Side,
    pub quantity_open: Qty,
    pub kind: StopTakeKind,
    pub trigger_price: Micros,
}

/// Check one held position's stop/take levels against a bar's high/low.
///
/// LONG stops trigger when `low <= stop_loss`; LONG takes trigger when
/// `high >= take_profit`. SHORT is the mirror image. When both a stop and a
/// take would trigger on the same bar (a wide-range bar), the stop wins —
/// conservative, since a real fill sequence within the bar is unknown.
pub fn check(levels: &StopTakeLevels, bar: &Bar) -> Option<StopTakeHit> {
    if levels.quantity_open.is_zero() {
        return None;
    }
    let high = Micros::parse_decimal(&bar.high)?;
    let low = Micros::parse_decimal(&bar.low)?;

    match levels.side {
        Side::Long => {
            if let Some(stop) = levels.stop_loss {
                if low <= stop {
                    return Some(StopTakeHit {
                        side: levels.side,
                        quantity_open: levels.quantity_open,
                        kind: StopTakeKind::StopLoss,
                        trigger_price: stop,
                    });
                }
            }
            if let Some(take) = levels.take_profit {
                if high >= take {
                    return Some(StopTakeHit {
                        side: levels.side,
                        quantity_open: levels.quantity_open,
                        kind: StopTakeKind::TakeProfit,
                        trigger_price: take,
                    });
                }
            }
        }
        Side::Short => {
            if let Some(stop) = levels.stop_loss {
                if high >= stop {
                    return Some(StopTakeHit {
                        side: levels.side,
                        quantity_open: levels.quantity_open,
                        kind: StopTakeKind::StopLoss,
                        trigger_price: stop,
                    });
                }
            }
            if let Some(take) = levels.take_profit {
                if low <= take {
                    return Some(StopTakeHit {
                        side: levels.side,
                        quantity_open: levels.quantity_open,
                        kind: StopTakeKind::TakeProfit,
                        trigger_price: take,
                    });
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(low: &str, high: &str) -> Bar {
        Bar {
            symbol: "BTC-USD".to_string(),
            ts_close_utc: Utc.timestamp_opt(60, 0).unwrap(),
            open: "100".to_string(),
            high: high.to_string(),
            low: low.to_string(),
            close: "100".to_string(),
            volume: "1".to_string(),
            roc_1m: None,
            roc_tf: None,
            vol_mult: None,
            spread_bps: None,
            rsi_14: None,
        }
    }

    fn levels(side: Side, stop: &str, take: &str) -> StopTakeLevels {
        StopTakeLevels {
            side,
            quantity_open: Qty::parse_decimal("1").unwrap(),
            stop_loss: Some(Micros::parse_decimal(stop).unwrap()),
            take_profit: Some(Micros::parse_decimal(take).unwrap()),
        }
    }

    #[test]
    fn long_stop_triggers_on_low_touch() {
        let lv = levels(Side::Long, "98", "110");
        let hit = check(&lv, &bar("97", "99")).unwrap();
        assert_eq!(hit.kind, StopTakeKind::StopLoss);
    }

    #[test]
    fn long_take_triggers_on_high_touch() {
        let lv = levels(Side::Long, "90", "105");
        let hit = check(&lv, &bar("100", "106")).unwrap();
        assert_eq!(hit.kind, StopTakeKind::TakeProfit);
    }

    #[test]
    fn long_prefers_stop_when_both_trigger_same_bar() {
        let lv = levels(Side::Long, "98", "102");
        let hit = check(&lv, &bar("97", "103")).unwrap();
        assert_eq!(hit.kind, StopTakeKind::StopLoss);
    }

    #[test]
    fn short_stop_triggers_on_high_touch() {
        let lv = levels(Side::Short, "102", "95");
        let hit = check(&lv, &bar("94", "103")).unwrap();
        assert_eq!(hit.kind, StopTakeKind::StopLoss);
    }

    #[test]
    fn no_hit_within_range() {
        let lv = levels(Side::Long, "90", "110");
        assert!(check(&lv, &bar("95", "105")).is_none());
    }

    #[test]
    fn flat_position_never_triggers() {
        let mut lv = levels(Side::Long, "98", "110");
        lv.quantity_open = Qty::ZERO;
        assert!(check(&lv, &bar("90", "90")).is_none());
    }
}
