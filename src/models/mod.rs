use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One OHLCV sample for a fixed time interval, keyed by open time
///
/// `complete` is false while the bar's interval is still elapsing; the
/// in-progress bar is rewritten on every poll until it rolls over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub complete: bool,
}

/// Order side, spelled the way the exchange spells it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired or held position for the traded symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Flat,
    Short,
}

impl PositionSide {
    /// Numeric encoding used in session logs: +1 long, 0 flat, -1 short
    pub fn signum(&self) -> i8 {
        match self {
            PositionSide::Long => 1,
            PositionSide::Flat => 0,
            PositionSide::Short => -1,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PositionSide::Long => "long",
            PositionSide::Flat => "flat",
            PositionSide::Short => "short",
        };
        f.write_str(name)
    }
}

/// A confirmed market-order execution as reported by the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub symbol: String,
    pub side: Side,
    /// Filled quantity in base units
    pub executed_qty: f64,
    /// Total quote amount paid or received across all fills
    pub cum_quote_qty: f64,
    pub transact_time: DateTime<Utc>,
}

/// Trading signal derived from the two most recent completed bars
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub target: PositionSide,
    /// Log return of the latest completed bar over its predecessor
    pub bar_return: f64,
    /// Log volume change, `None` when outside the plausible range
    pub volume_change: Option<f64>,
}
