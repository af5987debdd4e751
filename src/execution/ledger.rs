use chrono::{DateTime, Utc};

use crate::models::{Order, Side};

/// Running record of confirmed order executions
///
/// Quote amounts are signed: buys negative, sells positive. Entries are
/// append-only; a failed submission never reaches the ledger, and
/// nothing is ever rolled back.
#[derive(Debug, Default)]
pub struct TradeLedger {
    trade_values: Vec<f64>,
    trades: u32,
}

/// Per-fill accounting snapshot emitted by [`TradeLedger::record`]
#[derive(Debug, Clone, PartialEq)]
pub struct TradeReport {
    pub trade_number: u32,
    pub side: Side,
    pub base_qty: f64,
    pub quote_qty: f64,
    /// Average fill price, quote over base
    pub price: f64,
    pub realized_profit: f64,
    pub cumulative_profit: f64,
    pub transact_time: DateTime<Utc>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of orders recorded so far
    pub fn trade_count(&self) -> u32 {
        self.trades
    }

    /// Signed quote amounts in execution order
    pub fn trade_values(&self) -> &[f64] {
        &self.trade_values
    }

    /// Sum of all signed quote amounts recorded so far
    pub fn cumulative_profit(&self) -> f64 {
        self.trade_values.iter().sum()
    }

    /// Append a confirmed order and report realized/cumulative profit
    ///
    /// Profit is realized only on even-numbered fills, when a round trip
    /// closes: the realized figure is the sum of the last two signed
    /// amounts. Odd-numbered fills report zero realized profit and a
    /// cumulative figure that excludes the just-opened leg.
    pub fn record(&mut self, order: &Order) -> TradeReport {
        let signed = match order.side {
            Side::Buy => -order.cum_quote_qty,
            Side::Sell => order.cum_quote_qty,
        };
        self.trade_values.push(signed);
        self.trades += 1;

        let (realized_profit, cumulative_profit) = if self.trades % 2 == 0 {
            let round_trip: f64 = self.trade_values[self.trade_values.len() - 2..]
                .iter()
                .sum();
            (round_trip, self.cumulative_profit())
        } else {
            let all_but_open: f64 = self.trade_values[..self.trade_values.len() - 1]
                .iter()
                .sum();
            (0.0, all_but_open)
        };

        let price = if order.executed_qty > 0.0 {
            order.cum_quote_qty / order.executed_qty
        } else {
            0.0
        };

        TradeReport {
            trade_number: self.trades,
            side: order.side,
            base_qty: order.executed_qty,
            quote_qty: order.cum_quote_qty,
            price,
            realized_profit,
            cumulative_profit,
            transact_time: order.transact_time,
        }
    }
}
