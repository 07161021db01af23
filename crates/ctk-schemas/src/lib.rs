//! Wire/shared types used across the trading-store, engine and daemon
//! crates. No logic lives here — just `Serialize`/`Deserialize` DTOs and the
//! small enums that every other crate agrees on, so that (for example)
//! `ctk-db` and `ctk-daemon` don't each invent their own `RunStatus`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One 1-minute OHLCV bar, optionally joined with derived features.
///
/// Feature fields are `None` when the upstream feature pipeline hasn't
/// populated them yet for this bar — never coerced to zero (spec §4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub ts_close_utc: DateTime<Utc>,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    pub roc_1m: Option<String>,
    pub roc_tf: Option<String>,
    pub vol_mult: Option<String>,
    pub spread_bps: Option<String>,
    pub rsi_14: Option<String>,
}

/// Accepted run timeframes and their minute mapping (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    pub fn minutes(self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn parse(s: &str) -> Option<Timeframe> {
        Timeframe::ALL.into_iter().find(|tf| tf.as_str() == s)
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    pub fn sign(self) -> i64 {
        match self {
            Side::Long => 1,
            Side::Short => -1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    New,
    Open,
    Closed,
}

impl PositionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PositionStatus::New => "NEW",
            PositionStatus::Open => "OPEN",
            PositionStatus::Closed => "CLOSED",
        }
    }

    pub fn is_inflight(self) -> bool {
        matches!(self, PositionStatus::New | PositionStatus::Open)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Entry,
    Exit,
    Adjust,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Entry => "ENTRY",
            OrderType::Exit => "EXIT",
            OrderType::Adjust => "ADJUST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    Partial,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Partial => "PARTIAL",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
        }
    }
}

/// Run lifecycle status (spec §3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Queued,
    Running,
    Active,
    Paused,
    WindingDown,
    Stopped,
    Done,
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Active => "active",
            RunStatus::Paused => "paused",
            RunStatus::WindingDown => "winding_down",
            RunStatus::Stopped => "stopped",
            RunStatus::Done => "done",
            RunStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<RunStatus> {
        Some(match s {
            "queued" => RunStatus::Queued,
            "running" => RunStatus::Running,
            "active" => RunStatus::Active,
            "paused" => RunStatus::Paused,
            "winding_down" => RunStatus::WindingDown,
            "stopped" => RunStatus::Stopped,
            "done" => RunStatus::Done,
            "error" => RunStatus::Error,
            _ => return None,
        })
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunKind {
    Backtest,
    Live,
}

impl RunKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RunKind::Backtest => "backtest",
            RunKind::Live => "live",
        }
    }
}

/// Structured audit record kinds (spec §3 Event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    AccountSnapshot,
    OrderNew,
    OrderUpdate,
    Fill,
    PositionOpened,
    PositionMark,
    PositionClosed,
    StrategyNote,
    Signal,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::AccountSnapshot => "ACCOUNT_SNAPSHOT",
            EventType::OrderNew => "ORDER_NEW",
            EventType::OrderUpdate => "ORDER_UPDATE",
            EventType::Fill => "FILL",
            EventType::PositionOpened => "POSITION_OPENED",
            EventType::PositionMark => "POSITION_MARK",
            EventType::PositionClosed => "POSITION_CLOSED",
            EventType::StrategyNote => "STRATEGY_NOTE",
            EventType::Signal => "SIGNAL",
        }
    }
}

/// Envelope wrapping a structured event payload for persistence / transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub event_id: Uuid,
    pub run_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub event_type: String,
    pub payload: T,
}
