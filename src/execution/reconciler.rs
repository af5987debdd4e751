use crate::api::{ApiResult, Exchange};
use crate::execution::TradeLedger;
use crate::models::{Order, PositionSide, Side};

/// Keeps the held position aligned with the strategy's target by issuing
/// the minimal sequence of market orders
///
/// A long↔short flip is two independent orders of `units` rather than
/// one double-sized order, so each leg keeps its own profit attribution
/// in the ledger.
#[derive(Debug)]
pub struct PositionReconciler {
    symbol: String,
    units: f64,
    position: PositionSide,
}

/// Order legs needed to move between two positions, at most two
pub fn plan(current: PositionSide, target: PositionSide) -> &'static [Side] {
    use PositionSide::{Flat, Long, Short};
    use Side::{Buy, Sell};

    match (current, target) {
        (Flat, Long) => &[Buy],
        (Flat, Short) => &[Sell],
        (Long, Flat) => &[Sell],
        (Short, Flat) => &[Buy],
        (Long, Short) => &[Sell, Sell],
        (Short, Long) => &[Buy, Buy],
        (Long, Long) | (Flat, Flat) | (Short, Short) => &[],
    }
}

/// Report label for one leg of a transition; the closing leg of a flip
/// is "going neutral"
fn transition_label(target: PositionSide, leg: usize, total: usize) -> &'static str {
    if total == 2 && leg == 0 {
        return "going neutral";
    }
    match target {
        PositionSide::Long => "going long",
        PositionSide::Flat => "going neutral",
        PositionSide::Short => "going short",
    }
}

impl PositionReconciler {
    pub fn new(symbol: impl Into<String>, units: f64) -> Self {
        Self::with_position(symbol, units, PositionSide::Flat)
    }

    /// Resume with a known held position
    pub fn with_position(symbol: impl Into<String>, units: f64, position: PositionSide) -> Self {
        Self {
            symbol: symbol.into(),
            units,
            position,
        }
    }

    pub fn position(&self) -> PositionSide {
        self.position
    }

    /// Issue the orders that move the held position to `target`
    ///
    /// Each confirmed order is recorded in the ledger as it executes.
    /// The held position advances to `target` only once the whole
    /// sequence has succeeded; a failed leg aborts the remainder and
    /// leaves the position at its pre-transition value for the next
    /// evaluation to retry.
    pub async fn reconcile<E: Exchange>(
        &mut self,
        target: PositionSide,
        exchange: &E,
        ledger: &mut TradeLedger,
    ) -> ApiResult<Vec<Order>> {
        let legs = plan(self.position, target);
        let mut orders = Vec::with_capacity(legs.len());

        for (leg, side) in legs.iter().enumerate() {
            let order = exchange
                .market_order(&self.symbol, *side, self.units)
                .await?;
            let report = ledger.record(&order);
            tracing::info!(
                side = %report.side,
                base_qty = report.base_qty,
                quote_qty = report.quote_qty,
                price = report.price,
                profit = report.realized_profit,
                cum_profit = report.cumulative_profit,
                trade = report.trade_number,
                "{}",
                transition_label(target, leg, legs.len()),
            );
            orders.push(order);
        }

        if !legs.is_empty() {
            self.position = target;
        }
        Ok(orders)
    }
}
