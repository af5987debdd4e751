pub mod binance;

pub use binance::{BinanceClient, RawKline, AVAILABLE_INTERVALS};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Order, Side};

/// Errors surfaced by the market-data and exchange collaborators
///
/// Insufficient bar history is not an error: signal evaluation simply
/// yields no signal.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("order rejected: {code} {message}")]
    OrderRejected { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Read side of the exchange: kline history for one symbol
#[async_trait]
pub trait MarketData: Send + Sync {
    /// The most recent `limit` klines, oldest first; the final one is
    /// still in progress
    async fn recent_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> ApiResult<Vec<RawKline>>;

    /// Klines between `start` and `end` (now when `None`), oldest first
    async fn historical_klines(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        limit: u32,
    ) -> ApiResult<Vec<RawKline>>;
}

/// Write side of the exchange: market-order submission
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Submit a market order and return the confirmed execution
    async fn market_order(&self, symbol: &str, side: Side, quantity: f64) -> ApiResult<Order>;
}
