//! A dedicated error surface for store-level invariant violations (spec
//! §4.2, §7) — callers need to tell "position already exists" apart from
//! an ordinary transient I/O failure so they can treat it as a guard
//! rejection rather than a fatal run error.

/// The partial unique index's name (see `migrations/0001_init.sql`), used to
/// recognize a uniqueness violation specifically, rather than any
/// `23505 unique_violation`.
const POSITION_UNIQUE_CONSTRAINT: &str = "positions_one_inflight_per_run_symbol_side";

#[derive(Debug)]
pub enum StoreError {
    /// A second NEW/OPEN position would have been created for
    /// `(run_id, symbol, side)` — spec §4.2's uniqueness invariant.
    PositionAlreadyExists,
    /// Any other database error, wrapped for `?`-propagation.
    Other(sqlx::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::PositionAlreadyExists => {
                write!(f, "position already exists for this (run, symbol, side)")
            }
            StoreError::Other(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::PositionAlreadyExists => None,
            StoreError::Other(e) => Some(e),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.constraint() == Some(POSITION_UNIQUE_CONSTRAINT) {
                return StoreError::PositionAlreadyExists;
            }
        }
        StoreError::Other(err)
    }
}
