//! ctk-db
//!
//! The Trading Store (spec §4.2, §6): Postgres-backed persistence for runs,
//! positions, orders, fills, snapshots, events, cursors and backtest
//! results, with the atomic-claim and partial-unique-index mechanisms the
//! concurrency model (spec §5) depends on.
//!
//! Queries are runtime-checked (`sqlx::query`/`query_as`), not the
//! compile-time `query!` macro — there is no `.sqlx` offline cache or a
//! live database reachable while this crate is built.

pub mod bars;
pub mod bt_results;
pub mod connection;
pub mod cursors;
pub mod error;
pub mod events;
pub mod orders_fills;
pub mod positions;
pub mod runs;
pub mod snapshots;
pub mod types;

pub use connection::{connect, connect_from_env, migrate, status, DbStatus, ENV_DB_URL};
pub use error::StoreError;
