use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::Arc;
use uuid::Uuid;

use super::{ApiError, ApiResult, Exchange, MarketData};
use crate::models::{Bar, Order, Side};

const MAINNET_URL: &str = "https://api.binance.com";
const TESTNET_URL: &str = "https://testnet.binance.vision";
const RECV_WINDOW_MS: u64 = 5000;
const RATE_LIMIT_RPM: u32 = 1100; // Spot REST allows 1200 request weight/min

/// Intervals the spot kline endpoint accepts
pub const AVAILABLE_INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

// Type alias for the rate limiter to simplify signatures
type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for the Binance spot REST API
///
/// Kline reads are public; order submission and account queries carry an
/// HMAC-SHA256 signature over the query string. All clones share one
/// rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    rate_limiter: Arc<BinanceRateLimiter>,
}

// ============== Wire Types ==============

/// One kline row exactly as the wire sends it: open time, stringly
/// OHLCV, then close time and quote/trade statistics this bot ignores
#[derive(Debug, Clone, Deserialize)]
pub struct RawKline(
    pub i64,    // open time (ms)
    pub String, // open
    pub String, // high
    pub String, // low
    pub String, // close
    pub String, // volume
    pub i64,    // close time (ms)
    pub String, // quote asset volume
    pub u64,    // number of trades
    pub String, // taker buy base volume
    pub String, // taker buy quote volume
    pub String, // ignore
);

impl RawKline {
    pub fn open_time_ms(&self) -> i64 {
        self.0
    }

    /// Convert to a domain bar, marked completed or in-progress by the
    /// caller (the wire row itself does not say)
    pub fn into_bar(self, complete: bool) -> ApiResult<Bar> {
        let open_time = parse_millis(self.0)?;
        Ok(Bar {
            open_time,
            open: parse_f64(&self.1, "open")?,
            high: parse_f64(&self.2, "high")?,
            low: parse_f64(&self.3, "low")?,
            close: parse_f64(&self.4, "close")?,
            volume: parse_f64(&self.5, "volume")?,
            complete,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    symbol: String,
    side: Side,
    executed_qty: String,
    // Binance spells it with the double m
    #[serde(rename = "cummulativeQuoteQty")]
    cummulative_quote_qty: String,
    transact_time: i64,
}

impl OrderResponse {
    fn into_order(self) -> ApiResult<Order> {
        Ok(Order {
            symbol: self.symbol,
            side: self.side,
            executed_qty: parse_f64(&self.executed_qty, "executedQty")?,
            cum_quote_qty: parse_f64(&self.cummulative_quote_qty, "cummulativeQuoteQty")?,
            transact_time: parse_millis(self.transact_time)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    code: i64,
    msg: String,
}

/// Account snapshot from the signed account endpoint
#[derive(Debug, Deserialize)]
pub struct AccountInfo {
    pub balances: Vec<Balance>,
}

impl AccountInfo {
    pub fn balance(&self, asset: &str) -> Option<&Balance> {
        self.balances.iter().find(|b| b.asset == asset)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

fn parse_f64(raw: &str, field: &str) -> ApiResult<f64> {
    raw.parse()
        .map_err(|_| ApiError::Malformed(format!("non-numeric {field}: {raw}")))
}

fn parse_millis(ms: i64) -> ApiResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| ApiError::Malformed(format!("bad millisecond timestamp: {ms}")))
}

// ============== Implementation ==============

impl BinanceClient {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self::with_base_url(MAINNET_URL, api_key, api_secret)
    }

    pub fn testnet(api_key: String, api_secret: String) -> Self {
        Self::with_base_url(TESTNET_URL, api_key, api_secret)
    }

    /// Point the client at an arbitrary host (mock servers in tests)
    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: String,
        api_secret: String,
    ) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap());
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key,
            api_secret,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Hex-encoded HMAC-SHA256 of the query string, as the signed
    /// endpoints require
    fn sign(&self, query: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// GET /api/v3/klines — the most recent `limit` klines; the last row
    /// is the in-progress bar
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> ApiResult<Vec<RawKline>> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/api/v3/klines", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol),
                ("interval", interval),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    /// GET /api/v3/klines with an explicit time range
    pub async fn get_historical_klines(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        limit: u32,
    ) -> ApiResult<Vec<RawKline>> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/api/v3/klines", self.base_url);
        let mut query = vec![
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("startTime", start.timestamp_millis().to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(end) = end {
            query.push(("endTime", end.timestamp_millis().to_string()));
        }

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    /// POST /api/v3/order — signed market order, FULL response
    pub async fn create_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: f64,
    ) -> ApiResult<Order> {
        self.rate_limiter.until_ready().await;

        let client_order_id = Uuid::new_v4().simple().to_string();
        let timestamp = Utc::now().timestamp_millis();
        let query = format!(
            "symbol={symbol}&side={side}&type=MARKET&quantity={quantity}\
             &newClientOrderId={client_order_id}&recvWindow={RECV_WINDOW_MS}&timestamp={timestamp}",
            side = side.as_str(),
        );
        let signature = self.sign(&query);
        let url = format!("{}/api/v3/order?{query}&signature={signature}", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => ApiError::OrderRejected {
                    code: err.code,
                    message: err.msg,
                },
                Err(_) => ApiError::Malformed(format!("order failed with {status}: {body}")),
            });
        }

        let report: OrderResponse = response.json().await?;
        report.into_order()
    }

    /// GET /api/v3/account — signed account snapshot, used as the
    /// startup connectivity check
    pub async fn get_account(&self) -> ApiResult<AccountInfo> {
        self.rate_limiter.until_ready().await;

        let timestamp = Utc::now().timestamp_millis();
        let query = format!("recvWindow={RECV_WINDOW_MS}&timestamp={timestamp}");
        let signature = self.sign(&query);
        let url = format!("{}/api/v3/account?{query}&signature={signature}", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MarketData for BinanceClient {
    async fn recent_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> ApiResult<Vec<RawKline>> {
        self.get_klines(symbol, interval, limit).await
    }

    async fn historical_klines(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        limit: u32,
    ) -> ApiResult<Vec<RawKline>> {
        self.get_historical_klines(symbol, interval, start, end, limit)
            .await
    }
}

#[async_trait]
impl Exchange for BinanceClient {
    async fn market_order(&self, symbol: &str, side: Side, quantity: f64) -> ApiResult<Order> {
        self.create_market_order(symbol, side, quantity).await
    }
}
