use clap::Parser;
use std::sync::atomic::Ordering;

use longshortbot::api::BinanceClient;
use longshortbot::trader::{LongShortTrader, TraderConfig};
use longshortbot::Result;

/// Automated long/short trader for a single Binance spot symbol
///
/// Polls klines, goes long after selloffs and short after rallies per
/// the configured thresholds, and stops after the trade budget is spent.
#[derive(Debug, Parser)]
#[command(name = "longshortbot")]
struct Args {
    /// Trading pair symbol
    #[arg(long, default_value = "BTCUSDT")]
    symbol: String,

    /// Kline interval (1m, 3m, 5m, ...)
    #[arg(long, default_value = "1m")]
    interval: String,

    /// Lower log-return threshold: go long at or below
    #[arg(long, default_value_t = -0.0001, allow_hyphen_values = true)]
    return_low: f64,

    /// Upper log-return threshold: go short at or above
    #[arg(long, default_value_t = 0.0001)]
    return_high: f64,

    /// Lower bound of the log volume-change band
    #[arg(long, default_value_t = -3.0, allow_hyphen_values = true)]
    volume_low: f64,

    /// Upper bound of the log volume-change band
    #[arg(long, default_value_t = 3.0)]
    volume_high: f64,

    /// Order size in base units
    #[arg(long, default_value_t = 0.01)]
    units: f64,

    /// Stop after this many recorded trades
    #[arg(long, default_value_t = 100)]
    trade_limit: u32,

    /// Hours of historical bars to preload
    #[arg(long, default_value_t = 1)]
    backfill_hours: u32,

    /// Trade against the live exchange instead of the testnet
    #[arg(long)]
    mainnet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();

    tracing::info!("🚀 longshortbot starting");

    let api_key =
        std::env::var("BINANCE_API_KEY").expect("BINANCE_API_KEY not found in environment");
    let api_secret =
        std::env::var("BINANCE_API_SECRET").expect("BINANCE_API_SECRET not found in environment");

    let client = if args.mainnet {
        BinanceClient::new(api_key, api_secret)
    } else {
        BinanceClient::testnet(api_key, api_secret)
    };

    // Connectivity check before any trading state is built
    let account = client.get_account().await?;
    tracing::info!(
        "✅ Connected to Binance{}",
        if args.mainnet { "" } else { " testnet" }
    );
    if let Some(usdt) = account.balance("USDT") {
        tracing::info!("  USDT balance: {} (free), {} (locked)", usdt.free, usdt.locked);
    }

    let config = TraderConfig {
        symbol: args.symbol,
        interval: args.interval,
        return_thresh: (args.return_low, args.return_high),
        volume_thresh: (args.volume_low, args.volume_high),
        units: args.units,
        trade_limit: args.trade_limit,
        backfill_hours: args.backfill_hours,
    };

    tracing::info!("📊 Configuration:");
    tracing::info!("  Symbol: {} @ {}", config.symbol, config.interval);
    tracing::info!(
        "  Return thresholds: [{}, {}]",
        config.return_thresh.0,
        config.return_thresh.1
    );
    tracing::info!(
        "  Volume-change band: [{}, {}]",
        config.volume_thresh.0,
        config.volume_thresh.1
    );
    tracing::info!("  Units: {}", config.units);
    tracing::info!("  Trade limit: {}", config.trade_limit);
    tracing::info!("  Backfill: {}h", config.backfill_hours);

    let mut trader = LongShortTrader::new(client.clone(), client, config)?;

    // Ctrl+C raises the stop flag; the loop flattens and exits on its
    // next iteration
    let stop = trader.stop_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("⚠️  Ctrl+C received, stopping after the current iteration");
            stop.store(true, Ordering::Relaxed);
        }
    });

    trader.run().await?;

    tracing::info!("👋 Session complete");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter("longshortbot=info")
        .init();
}
