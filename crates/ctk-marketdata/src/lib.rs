//! ctk-marketdata
//!
//! Market Data Reader (spec §4.1): loads ordered 1-minute bars for a symbol
//! and time range, aggregates them into higher timeframes, and reports the
//! last known price per symbol. Bars are accessed through the [`BarStore`]
//! trait so the same aggregation/backtest code runs against a
//! Postgres-backed reader (`ctk-db`) or the in-memory fixture here, without
//! conditional compilation.

pub mod aggregate;
pub mod error;
pub mod store;

pub use aggregate::aggregate;
pub use ctk_schemas::{Bar, Timeframe};
pub use error::MarketDataError;
pub use store::{BarStore, InMemoryBarStore};
