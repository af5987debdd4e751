// Trading strategy module
pub mod long_short;

pub use long_short::LongShortStrategy;

use crate::models::{Bar, Signal};

/// Base trait for trading strategies
pub trait Strategy: Send + Sync {
    /// Evaluate the completed-bar series and produce a signal for the
    /// most recent completed bar; `None` when there is too little data
    fn evaluate(&self, completed_bars: &[Bar]) -> Option<Signal>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum completed bars required for this strategy
    fn min_bars_required(&self) -> usize;
}
