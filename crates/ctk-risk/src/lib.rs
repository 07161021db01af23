//! ctk-risk
//!
//! The Risk & Guard Layer (spec §4.5): the ordered guard table that admits
//! or rejects a signal before it becomes an order, synthetic stop/take-profit
//! exit detection that runs ahead of strategy evaluation, and the daily kill
//! switch.

pub mod guard;
pub mod kill_switch;
pub mod stop_take;
pub mod types;

pub use guard::evaluate;
pub use kill_switch::{check as check_kill_switch, KillSwitchTrip};
pub use stop_take::{check as check_stop_take, StopTakeHit, StopTakeKind};
pub use types::{
    classify_intent, GuardContext, Intent, RejectionReason, RiskConfig, RiskDecision,
    StopTakeLevels,
};
