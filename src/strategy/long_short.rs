use super::Strategy;
use crate::models::{Bar, PositionSide, Signal};

/// Bar-to-bar log volume changes beyond this are treated as undefined;
/// stale or bogus volume prints produce extreme ratios
const VOLUME_CHANGE_CAP: f64 = 3.0;

/// Contrarian long/short strategy over log returns, gated by volume
///
/// Goes long when the latest completed bar sold off at or below the
/// lower return threshold, short when it rallied at or above the upper
/// one, flat otherwise. Both directional cases also require the
/// bar-to-bar log volume change to sit inside the configured band; an
/// undefined volume change fails the gate.
#[derive(Debug, Clone)]
pub struct LongShortStrategy {
    return_thresh: (f64, f64),
    volume_thresh: (f64, f64),
}

impl LongShortStrategy {
    /// Thresholds are `(low, high)` pairs supplied by the caller
    pub fn new(return_thresh: (f64, f64), volume_thresh: (f64, f64)) -> Self {
        Self {
            return_thresh,
            volume_thresh,
        }
    }

    /// Log volume change between two bars, `None` when out of the
    /// plausible range (this also covers zero-volume bars)
    fn volume_change(prev: &Bar, last: &Bar) -> Option<f64> {
        let change = (last.volume / prev.volume).ln();
        if change.is_finite() && change.abs() <= VOLUME_CHANGE_CAP {
            Some(change)
        } else {
            None
        }
    }
}

impl Strategy for LongShortStrategy {
    fn evaluate(&self, completed_bars: &[Bar]) -> Option<Signal> {
        if completed_bars.len() < self.min_bars_required() {
            return None;
        }

        let last = &completed_bars[completed_bars.len() - 1];
        let prev = &completed_bars[completed_bars.len() - 2];

        let bar_return = (last.close / prev.close).ln();
        let volume_change = Self::volume_change(prev, last);
        let volume_ok = volume_change
            .map(|v| v >= self.volume_thresh.0 && v <= self.volume_thresh.1)
            .unwrap_or(false);

        let target = if bar_return <= self.return_thresh.0 && volume_ok {
            PositionSide::Long
        } else if bar_return >= self.return_thresh.1 && volume_ok {
            PositionSide::Short
        } else {
            PositionSide::Flat
        };

        Some(Signal {
            target,
            bar_return,
            volume_change,
        })
    }

    fn name(&self) -> &str {
        "LongShortStrategy"
    }

    fn min_bars_required(&self) -> usize {
        2
    }
}
