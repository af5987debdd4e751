use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::models::Bar;

/// Time-indexed series of OHLCV bars for the traded symbol
///
/// Bars are keyed by open time; re-ingesting a timestamp replaces the
/// prior value, which is how the in-progress bar is rewritten on every
/// poll. Completion is monotonic: callers must never overwrite a
/// completed bar with an incomplete revision.
#[derive(Debug, Default)]
pub struct BarStore {
    bars: BTreeMap<DateTime<Utc>, Bar>,
}

impl BarStore {
    pub fn new() -> Self {
        Self {
            bars: BTreeMap::new(),
        }
    }

    /// Insert or replace the bar at `bar.open_time`
    pub fn upsert(&mut self, bar: Bar) {
        self.bars.insert(bar.open_time, bar);
    }

    /// Completed bars in increasing open-time order; restartable, no
    /// internal cursor
    pub fn completed(&self) -> impl Iterator<Item = &Bar> + '_ {
        self.bars.values().filter(|b| b.complete)
    }

    /// Completed bars collected for strategy evaluation
    pub fn completed_bars(&self) -> Vec<Bar> {
        self.completed().cloned().collect()
    }

    /// Open time of the most recent bar, completed or not
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.bars.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}
