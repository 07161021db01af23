//! The strategy kernel contract (spec §4.3): a pure function over a bar and
//! state, returning zero or more signals. `Strategy` impls MUST be
//! deterministic — same `(bar, state, params)` in, byte-identical signals
//! out — and MUST NOT look past the bar/state they are given.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::types::{Signal, StrategyState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    /// A required field was missing or null on the current bar (spec §4.1:
    /// missing features are `None`, never coerced to zero — a strategy that
    /// needs a feature to decide must treat its absence as "can't decide").
    MissingField(&'static str),
    /// A bar field could not be parsed as a decimal.
    InvalidDecimal { field: &'static str, raw: String },
    /// `params` was missing a required key or had the wrong shape.
    InvalidParam(&'static str),
}

impl std::fmt::Display for StrategyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyError::MissingField(field) => write!(f, "missing field: {field}"),
            StrategyError::InvalidDecimal { field, raw } => {
                write!(f, "field '{field}' is not a valid decimal: '{raw}'")
            }
            StrategyError::InvalidParam(key) => write!(f, "invalid or missing param: {key}"),
        }
    }
}

impl std::error::Error for StrategyError {}

pub fn parse_field(field: &'static str, raw: &str) -> Result<Decimal, StrategyError> {
    Decimal::from_str(raw).map_err(|_| StrategyError::InvalidDecimal {
        field,
        raw: raw.to_string(),
    })
}

pub fn required_opt<'a>(
    field: &'static str,
    value: &'a Option<String>,
) -> Result<&'a str, StrategyError> {
    value
        .as_deref()
        .ok_or(StrategyError::MissingField(field))
}

/// A momentum/mean-reversion/etc. strategy evaluated once per completed bar.
///
/// Implementations must be `Send + Sync` so a [`crate::registry::StrategyFactory`]
/// can hand out boxed instances shared across a run's per-symbol tasks.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn version(&self) -> &'static str;

    /// Pure evaluation: given the current bar, the run's state for this
    /// symbol, and the run's opaque params, return the signals to emit.
    /// Percentage-shaped params MUST be coerced with
    /// [`ctk_config::coerce_percent`] (spec §4.3).
    fn evaluate(
        &self,
        bar: &ctk_schemas::Bar,
        state: &StrategyState<'_>,
        params: &serde_json::Value,
    ) -> Result<Vec<Signal>, StrategyError>;
}
