//! Trade Automator CLI
//!
//! Market data lookups and a one-shot managed trade from the terminal.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use rust_decimal::Decimal;
use std::sync::Arc;
use trade_automator::broker::build_broker;
use trade_automator::services::{AccountSync, Desk, Metrics, TradeMonitor};
use trade_automator::store::{MemoryStore, TradeStore};
use trade_automator::types::{Granularity, NewOrder, PriceSource, Side, Trade};
use trade_automator::Config;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "trade-automator")]
#[command(about = "XAU/USD trade automation with TP1 partial close and breakeven stop")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current quote
    Quote,

    /// Show recent candles
    Candles {
        /// M1, M5, M15, H1, H4 or D
        #[arg(short, long, default_value = "M1")]
        granularity: Granularity,

        /// Number of candles
        #[arg(short, long, default_value = "20")]
        count: usize,
    },

    /// Show the broker account summary
    Account,

    /// Place a trade and manage it until it closes (Ctrl-C to detach)
    Trade {
        /// buy or sell
        side: Side,

        /// Lot size
        #[arg(short, long)]
        lots: Decimal,

        /// First take-profit (partial close)
        #[arg(long)]
        tp1: Decimal,

        /// Second take-profit (closes the rest)
        #[arg(long)]
        tp2: Decimal,

        /// Stop-loss
        #[arg(long)]
        sl: Decimal,

        /// Percent of the position closed at TP1
        #[arg(short, long, default_value = "75")]
        partial: u8,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;

    match cli.command {
        Commands::Quote => show_quote(&config).await?,
        Commands::Candles { granularity, count } => show_candles(&config, granularity, count).await?,
        Commands::Account => show_account(&config).await?,
        Commands::Trade {
            side,
            lots,
            tp1,
            tp2,
            sl,
            partial,
        } => {
            let order = NewOrder {
                side,
                lot_size: lots,
                tp1,
                tp2,
                sl,
                partial_close_percent: partial,
            };
            run_trade(config, order).await?
        }
    }

    Ok(())
}

fn source_label(source: PriceSource) -> String {
    match source {
        PriceSource::Live => "LIVE".green().to_string(),
        PriceSource::Simulated => "SIMULATED".yellow().to_string(),
    }
}

fn banner(title: &str, config: &Config) {
    println!("\n{}", "=".repeat(60));
    println!("  {}", title.bold());
    println!(
        "  Instrument: {} | Mode: {}",
        config.trading.instrument,
        if config.paper_trading {
            "PAPER".cyan().to_string()
        } else {
            "LIVE".red().bold().to_string()
        }
    );
    println!("{}\n", "=".repeat(60));
}

async fn show_quote(config: &Config) -> Result<()> {
    let broker = build_broker(config)?;
    let quote = broker.get_current_price(&config.trading.instrument).await;

    banner("QUOTE", config);
    println!("  Bid:    {}", quote.bid);
    println!("  Ask:    {}", quote.ask);
    println!("  Spread: {}", quote.spread);
    println!("  Source: {}", source_label(quote.source));
    Ok(())
}

async fn show_candles(config: &Config, granularity: Granularity, count: usize) -> Result<()> {
    let broker = build_broker(config)?;
    let candles = broker
        .get_candles(&config.trading.instrument, granularity, count)
        .await;

    banner(&format!("CANDLES ({})", granularity), config);
    println!("  {:<22} {:>10} {:>10} {:>10} {:>10} {:>8}", "Time", "Open", "High", "Low", "Close", "Volume");
    for candle in &candles {
        let time = chrono::DateTime::from_timestamp(candle.time, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| candle.time.to_string());
        let close = if candle.close >= candle.open {
            candle.close.to_string().green()
        } else {
            candle.close.to_string().red()
        };
        println!(
            "  {:<22} {:>10} {:>10} {:>10} {:>10} {:>8}",
            time, candle.open, candle.high, candle.low, close, candle.volume
        );
    }
    Ok(())
}

async fn show_account(config: &Config) -> Result<()> {
    let broker = build_broker(config)?;
    let summary = broker.get_account_summary().await;

    banner("ACCOUNT", config);
    println!("  Balance:        {}", summary.balance);
    println!("  Unrealized P&L: {}", summary.unrealized_pl);
    println!("  Margin Used:    {}", summary.margin_used);
    println!("  Source:         {}", source_label(summary.source));
    Ok(())
}

async fn run_trade(config: Config, order: NewOrder) -> Result<()> {
    banner("MANAGED TRADE", &config);

    let broker = build_broker(&config)?;
    let store: Arc<dyn TradeStore> = Arc::new(MemoryStore::new());
    let metrics = Metrics::new();
    let owner = config.trading.owner_id.clone();

    let desk = Desk::new(broker.clone(), store.clone(), config.trading.clone(), metrics.clone());
    let trade = desk.place_order(&owner, order).await?;
    print_trade("Opened", &trade);

    let monitor = Arc::new(TradeMonitor::new(
        broker.clone(),
        store.clone(),
        config.trading.clone(),
        config.monitor.clone(),
        metrics,
    ));
    monitor.start();

    let mut poll = tokio::time::interval(config.monitor.interval);
    let mut last_status = trade.status;
    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping monitor");
                break None;
            }
            _ = poll.tick() => {
                let Some(current) = store.get_trade(trade.id).await? else {
                    break None;
                };
                if current.status != last_status {
                    last_status = current.status;
                    print_trade("Update", &current);
                }
                if current.is_closed() {
                    break Some(current);
                }
            }
        }
    };

    monitor.stop().await;

    match outcome {
        Some(closed) => {
            let account = AccountSync::new(broker, store, config.trading.clone())
                .reconcile()
                .await?;
            println!("\n  Final realized P&L: {}", pnl(closed.realized_pl));
            println!("  Account balance:    {}", account.balance);
        }
        None => println!("\n  Trade left open; it is no longer managed."),
    }

    Ok(())
}

fn pnl(value: Decimal) -> String {
    if value.is_sign_negative() {
        value.to_string().red().to_string()
    } else {
        value.to_string().green().to_string()
    }
}

fn print_trade(label: &str, trade: &Trade) {
    println!(
        "  [{}] {} {} {} lots @ {} | status {} | SL {} | realized {}",
        label,
        trade.id.to_string()[..8].dimmed(),
        trade.side,
        trade.lot_size,
        trade.entry_price,
        trade.status.to_string().bold(),
        trade.sl,
        pnl(trade.realized_pl)
    );
}
