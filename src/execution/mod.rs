// Order execution and trade accounting module
pub mod ledger;
pub mod reconciler;

pub use ledger::{TradeLedger, TradeReport};
pub use reconciler::{plan, PositionReconciler};
