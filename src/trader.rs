use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::time::{sleep, Duration};

use crate::api::{Exchange, MarketData, AVAILABLE_INTERVALS};
use crate::data::BarStore;
use crate::execution::{PositionReconciler, TradeLedger};
use crate::models::PositionSide;
use crate::strategy::{LongShortStrategy, Strategy};
use crate::Result;

/// Poll cadence for kline updates; deliberately independent of the bar
/// interval so completion is detected promptly
const POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Longer sleep after a failed iteration
const ERROR_BACKOFF: Duration = Duration::from_secs(10);
/// Kline page size for the historical backfill request
const BACKFILL_LIMIT: u32 = 1000;

/// Construction-time parameters for a trading session
#[derive(Debug, Clone)]
pub struct TraderConfig {
    pub symbol: String,
    pub interval: String,
    pub return_thresh: (f64, f64),
    pub volume_thresh: (f64, f64),
    /// Order size in base units, per leg
    pub units: f64,
    /// Stop and flatten once this many orders have been recorded
    pub trade_limit: u32,
    /// Hours of completed bars to preload before polling
    pub backfill_hours: u32,
}

/// Single-symbol long/short trading session: backfill, poll, signal,
/// reconcile, account
///
/// Owns every piece of mutable trading state. The polling loop is the
/// only thread of control and the sole error-recovery boundary: any
/// failure inside an iteration is logged and answered with a longer
/// backoff sleep, never a crash.
pub struct LongShortTrader<M, E> {
    market: M,
    exchange: E,
    config: TraderConfig,
    store: BarStore,
    strategy: LongShortStrategy,
    reconciler: PositionReconciler,
    ledger: TradeLedger,
    last_kline_time: Option<DateTime<Utc>>,
    stop: Arc<AtomicBool>,
}

impl<M: MarketData, E: Exchange> LongShortTrader<M, E> {
    pub fn new(market: M, exchange: E, config: TraderConfig) -> Result<Self> {
        if !AVAILABLE_INTERVALS.contains(&config.interval.as_str()) {
            return Err(format!("unsupported bar interval: {}", config.interval).into());
        }

        let strategy = LongShortStrategy::new(config.return_thresh, config.volume_thresh);
        let reconciler = PositionReconciler::new(config.symbol.clone(), config.units);

        Ok(Self {
            market,
            exchange,
            config,
            store: BarStore::new(),
            strategy,
            reconciler,
            ledger: TradeLedger::new(),
            last_kline_time: None,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Cooperative stop flag, observed at the top of each loop
    /// iteration; raising it makes the session flatten and exit
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }

    pub fn position(&self) -> PositionSide {
        self.reconciler.position()
    }

    pub fn bars(&self) -> &BarStore {
        &self.store
    }

    /// Preload the historical window and seed completion tracking
    ///
    /// The final backfilled bar is still forming and is stored
    /// incomplete; its open time becomes the completion watermark.
    pub async fn backfill(&mut self) -> Result<()> {
        let start = Utc::now() - ChronoDuration::hours(self.config.backfill_hours as i64);
        let klines = self
            .market
            .historical_klines(
                &self.config.symbol,
                &self.config.interval,
                start,
                None,
                BACKFILL_LIMIT,
            )
            .await?;

        if klines.is_empty() {
            return Err("historical backfill returned no klines".into());
        }

        let count = klines.len();
        for (i, raw) in klines.into_iter().enumerate() {
            let bar = raw.into_bar(i + 1 < count)?;
            self.store.upsert(bar);
        }
        self.last_kline_time = self.store.latest_timestamp();

        tracing::info!(
            bars = count,
            last = ?self.last_kline_time,
            "historical backfill loaded"
        );
        Ok(())
    }

    /// Run the session until the trade budget is exhausted or the stop
    /// flag is raised; both exits flatten any open position
    pub async fn run(&mut self) -> Result<()> {
        self.backfill().await?;
        tracing::info!(
            symbol = %self.config.symbol,
            interval = %self.config.interval,
            "live polling started"
        );

        loop {
            if self.stop.load(Ordering::Relaxed) {
                tracing::info!("stop requested, flattening and exiting");
                self.flatten().await?;
                break;
            }
            if self.ledger.trade_count() >= self.config.trade_limit {
                self.flatten().await?;
                break;
            }

            match self.poll_once().await {
                Ok(()) => sleep(POLL_INTERVAL).await,
                Err(e) => {
                    tracing::warn!(error = %e, "poll iteration failed, backing off");
                    sleep(ERROR_BACKOFF).await;
                }
            }
        }

        tracing::info!(
            trades = self.ledger.trade_count(),
            cum_profit = self.ledger.cumulative_profit(),
            "trading session finished"
        );
        Ok(())
    }

    /// One polling step: fetch the two most recent klines, ingest them,
    /// and run the completed-bar pipeline when a bar has rolled over
    pub async fn poll_once(&mut self) -> Result<()> {
        let mut klines = self
            .market
            .recent_klines(&self.config.symbol, &self.config.interval, 2)
            .await?;

        let (Some(current_raw), Some(completed_raw)) = (klines.pop(), klines.pop()) else {
            return Err("expected two recent klines".into());
        };
        let current = current_raw.into_bar(false)?;
        let completed = completed_raw.into_bar(true)?;

        let is_new = self
            .last_kline_time
            .map_or(true, |t| completed.open_time > t);
        if is_new {
            tracing::info!(
                open_time = %completed.open_time,
                close = completed.close,
                volume = completed.volume,
                "new completed bar"
            );
            self.last_kline_time = Some(completed.open_time);
            self.store.upsert(completed);
            self.on_completed_bar().await?;
        }

        // Keep the live view current regardless of rollover
        self.store.upsert(current);
        Ok(())
    }

    /// Completed-bar pipeline: evaluate, reconcile, then check the
    /// trade budget
    async fn on_completed_bar(&mut self) -> Result<()> {
        let completed = self.store.completed_bars();
        match self.strategy.evaluate(&completed) {
            Some(signal) => {
                tracing::info!(
                    target = %signal.target,
                    position = signal.target.signum(),
                    bar_return = signal.bar_return,
                    volume_change = ?signal.volume_change,
                    "signal"
                );
                self.reconciler
                    .reconcile(signal.target, &self.exchange, &mut self.ledger)
                    .await?;
            }
            None => {
                tracing::debug!(
                    completed = completed.len(),
                    "not enough completed bars for a signal"
                );
            }
        }

        if self.ledger.trade_count() >= self.config.trade_limit {
            tracing::info!(
                trades = self.ledger.trade_count(),
                limit = self.config.trade_limit,
                "trade budget reached"
            );
            self.flatten().await?;
            self.stop.store(true, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Close any open position with a single offsetting order
    pub async fn flatten(&mut self) -> Result<()> {
        if self.reconciler.position() != PositionSide::Flat {
            tracing::info!(position = %self.reconciler.position(), "flattening open position");
            self.reconciler
                .reconcile(PositionSide::Flat, &self.exchange, &mut self.ledger)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, ApiResult, RawKline};
    use crate::models::{Order, Side};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn raw_kline(open_time_ms: i64, close: f64, volume: f64) -> RawKline {
        RawKline(
            open_time_ms,
            close.to_string(),
            close.to_string(),
            close.to_string(),
            close.to_string(),
            volume.to_string(),
            open_time_ms + 59_999,
            "0".to_string(),
            0,
            "0".to_string(),
            "0".to_string(),
            "0".to_string(),
        )
    }

    const T0: i64 = 1_700_000_000_000;
    const MINUTE_MS: i64 = 60_000;

    /// Serves a fixed backfill and a scripted sequence of recent-kline
    /// responses
    struct ScriptedMarket {
        backfill: Vec<RawKline>,
        polls: Mutex<VecDeque<Vec<RawKline>>>,
    }

    impl ScriptedMarket {
        fn new(backfill: Vec<RawKline>, polls: Vec<Vec<RawKline>>) -> Self {
            Self {
                backfill,
                polls: Mutex::new(polls.into()),
            }
        }
    }

    #[async_trait]
    impl MarketData for ScriptedMarket {
        async fn recent_klines(
            &self,
            _symbol: &str,
            _interval: &str,
            _limit: u32,
        ) -> ApiResult<Vec<RawKline>> {
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ApiError::Malformed("poll script exhausted".to_string()))
        }

        async fn historical_klines(
            &self,
            _symbol: &str,
            _interval: &str,
            _start: DateTime<Utc>,
            _end: Option<DateTime<Utc>>,
            _limit: u32,
        ) -> ApiResult<Vec<RawKline>> {
            Ok(self.backfill.clone())
        }
    }

    /// Fills everything at a fixed price
    struct ScriptedExchange {
        fills: Mutex<Vec<Side>>,
        fill_price: f64,
    }

    impl ScriptedExchange {
        fn new(fill_price: f64) -> Self {
            Self {
                fills: Mutex::new(Vec::new()),
                fill_price,
            }
        }

        fn fills(&self) -> Vec<Side> {
            self.fills.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Exchange for ScriptedExchange {
        async fn market_order(
            &self,
            symbol: &str,
            side: Side,
            quantity: f64,
        ) -> ApiResult<Order> {
            self.fills.lock().unwrap().push(side);
            Ok(Order {
                symbol: symbol.to_string(),
                side,
                executed_qty: quantity,
                cum_quote_qty: quantity * self.fill_price,
                transact_time: Utc::now(),
            })
        }
    }

    fn config(trade_limit: u32) -> TraderConfig {
        TraderConfig {
            symbol: "BTCUSDT".to_string(),
            interval: "1m".to_string(),
            return_thresh: (-0.0001, 0.0001),
            volume_thresh: (-3.0, 3.0),
            units: 0.01,
            trade_limit,
            backfill_hours: 1,
        }
    }

    #[test]
    fn test_rejects_unsupported_interval() {
        let market = ScriptedMarket::new(vec![], vec![]);
        let exchange = ScriptedExchange::new(100.0);
        let mut cfg = config(100);
        cfg.interval = "7m".to_string();

        assert!(LongShortTrader::new(market, exchange, cfg).is_err());
    }

    #[tokio::test]
    async fn test_backfill_marks_last_bar_incomplete() {
        let market = ScriptedMarket::new(
            vec![
                raw_kline(T0, 100.0, 1000.0),
                raw_kline(T0 + MINUTE_MS, 100.1, 1000.0),
                raw_kline(T0 + 2 * MINUTE_MS, 100.2, 1000.0),
            ],
            vec![],
        );
        let exchange = ScriptedExchange::new(100.0);
        let mut trader = LongShortTrader::new(market, exchange, config(100)).unwrap();

        trader.backfill().await.unwrap();

        assert_eq!(trader.bars().len(), 3);
        assert_eq!(trader.bars().completed_bars().len(), 2);
        assert_eq!(
            trader.bars().latest_timestamp().unwrap().timestamp_millis(),
            T0 + 2 * MINUTE_MS
        );
    }

    #[tokio::test]
    async fn test_new_completed_bar_triggers_pipeline() {
        // Backfill: one completed bar at T0, in-progress at T0+1m
        let market = ScriptedMarket::new(
            vec![
                raw_kline(T0, 100.0, 1000.0),
                raw_kline(T0 + MINUTE_MS, 100.0, 1000.0),
            ],
            vec![vec![
                // Bar at T0+2m completed with a selloff vs T0
                raw_kline(T0 + 2 * MINUTE_MS, 99.98, 1000.0),
                raw_kline(T0 + 3 * MINUTE_MS, 99.99, 500.0),
            ]],
        );
        let exchange = ScriptedExchange::new(99.98);
        let mut trader = LongShortTrader::new(market, exchange, config(100)).unwrap();

        trader.backfill().await.unwrap();
        trader.poll_once().await.unwrap();

        assert_eq!(trader.exchange.fills(), vec![Side::Buy]);
        assert_eq!(trader.position(), PositionSide::Long);
        assert_eq!(trader.ledger().trade_count(), 1);
        // In-progress bar was ingested too
        assert_eq!(
            trader.bars().latest_timestamp().unwrap().timestamp_millis(),
            T0 + 3 * MINUTE_MS
        );
    }

    #[tokio::test]
    async fn test_duplicate_poll_does_not_retrigger_pipeline() {
        let poll = vec![
            raw_kline(T0 + 2 * MINUTE_MS, 99.98, 1000.0),
            raw_kline(T0 + 3 * MINUTE_MS, 99.99, 500.0),
        ];
        let market = ScriptedMarket::new(
            vec![
                raw_kline(T0, 100.0, 1000.0),
                raw_kline(T0 + MINUTE_MS, 100.0, 1000.0),
            ],
            vec![poll.clone(), poll],
        );
        let exchange = ScriptedExchange::new(99.98);
        let mut trader = LongShortTrader::new(market, exchange, config(100)).unwrap();

        trader.backfill().await.unwrap();
        trader.poll_once().await.unwrap();
        trader.poll_once().await.unwrap();

        // Second poll saw the same completed timestamp and stayed quiet
        assert_eq!(trader.exchange.fills(), vec![Side::Buy]);
        assert_eq!(trader.ledger().trade_count(), 1);
    }

    #[tokio::test]
    async fn test_backfilled_watermark_bar_never_completes() {
        // The completed kline of the first poll shares its open time
        // with the last backfilled (incomplete) bar
        let market = ScriptedMarket::new(
            vec![
                raw_kline(T0, 100.0, 1000.0),
                raw_kline(T0 + MINUTE_MS, 99.98, 1000.0),
            ],
            vec![vec![
                raw_kline(T0 + MINUTE_MS, 99.98, 1000.0),
                raw_kline(T0 + 2 * MINUTE_MS, 99.97, 900.0),
            ]],
        );
        let exchange = ScriptedExchange::new(99.98);
        let mut trader = LongShortTrader::new(market, exchange, config(100)).unwrap();

        trader.backfill().await.unwrap();
        trader.poll_once().await.unwrap();

        assert!(trader.exchange.fills().is_empty());
        assert_eq!(trader.bars().completed_bars().len(), 1);
    }

    #[tokio::test]
    async fn test_trade_budget_flattens_and_stops() {
        // Limit of 1: the first buy exhausts the budget, so the
        // pipeline immediately sells back to flat and raises stop
        let market = ScriptedMarket::new(
            vec![
                raw_kline(T0, 100.0, 1000.0),
                raw_kline(T0 + MINUTE_MS, 100.0, 1000.0),
            ],
            vec![vec![
                raw_kline(T0 + 2 * MINUTE_MS, 99.98, 1000.0),
                raw_kline(T0 + 3 * MINUTE_MS, 99.99, 500.0),
            ]],
        );
        let exchange = ScriptedExchange::new(99.98);
        let mut trader = LongShortTrader::new(market, exchange, config(1)).unwrap();

        trader.backfill().await.unwrap();
        trader.poll_once().await.unwrap();

        assert_eq!(trader.exchange.fills(), vec![Side::Buy, Side::Sell]);
        assert_eq!(trader.position(), PositionSide::Flat);
        assert_eq!(trader.ledger().trade_count(), 2);
        assert!(trader.stop_flag().load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_pre_raised_stop_flag_exits_run_promptly() {
        let market = ScriptedMarket::new(
            vec![
                raw_kline(T0, 100.0, 1000.0),
                raw_kline(T0 + MINUTE_MS, 100.0, 1000.0),
            ],
            vec![],
        );
        let exchange = ScriptedExchange::new(100.0);
        let mut trader = LongShortTrader::new(market, exchange, config(100)).unwrap();

        trader.stop_flag().store(true, Ordering::Relaxed);
        trader.run().await.unwrap();

        assert_eq!(trader.ledger().trade_count(), 0);
        assert_eq!(trader.position(), PositionSide::Flat);
    }
}
