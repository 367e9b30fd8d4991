//! miniquet: a small flip-trading engine
//!
//! Traders keep entries that alternate between buying and selling one
//! symbol. Each tick fetches quotes once, lets every trader decide in
//! parallel, and persists each flip to a SQLite ledger that is replayed on
//! startup.

mod api;
mod error;
mod events;
mod ledger;
mod models;
mod operator;
mod trading;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{Credentials, GmoClient, OrderGateway, PaperGateway};
use crate::events::{EventLog, EventTail};
use crate::ledger::Ledger;
use crate::operator::Console;
use crate::trading::{Desk, EngineConfig, Ticker};

/// Flip-trading engine CLI.
#[derive(Parser)]
#[command(name = "miniquet")]
#[command(about = "Flip entries between buy and sell on GMO Coin quotes", long_about = None)]
struct Cli {
    /// Ledger file path
    #[arg(long, default_value = "./miniquet.db", env = "MINIQUET_LEDGER")]
    ledger: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the tick loop and the operator console
    Run {
        /// Milliseconds between ticks
        #[arg(short, long, default_value = "1000")]
        interval_ms: u64,

        /// Dry run (orders go to the paper gateway)
        #[arg(long)]
        dry_run: bool,

        /// GMO Coin API key
        #[arg(long, env = "GMO_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// GMO Coin API secret
        #[arg(long, env = "GMO_API_SECRET", hide_env_values = true)]
        api_secret: Option<String>,
    },

    /// Print every entry stored in the ledger, or one by id
    Entries {
        /// Entry id
        id: Option<String>,
    },

    /// Show the trader roster
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            interval_ms,
            dry_run,
            api_key,
            api_secret,
        } => {
            let config = EngineConfig {
                tick_interval_ms: interval_ms,
                ..EngineConfig::default()
            };
            config.validate()?;

            let credentials = match (api_key, api_secret) {
                (Some(api_key), Some(api_secret)) => Some(Credentials { api_key, api_secret }),
                _ => None,
            };
            run(&cli.ledger, config, credentials, dry_run).await?;
        }

        Commands::Entries { id } => {
            let ledger = Ledger::open(&cli.ledger).await?;
            let fetched = match &id {
                Some(id) => ledger.get(id).await.map(|e| vec![e]),
                None => ledger.scan().await,
            };
            ledger.close().await;
            let mut entries = fetched?;

            if entries.is_empty() {
                println!("Ledger is empty.");
                return Ok(());
            }

            entries.sort_by(|a, b| {
                a.trader
                    .cmp(&b.trader)
                    .then(a.symbol.cmp(&b.symbol))
                    .then(a.last_fix_date.cmp(&b.last_fix_date))
            });

            println!("\n{}", operator::entry_header());
            println!("{}", "-".repeat(102));
            for entry in &entries {
                println!("{}", operator::format_entry(entry));
            }

            let total: Decimal = entries.iter().map(|e| e.realized_pnl).sum();
            println!("\n{} entries, realized P&L {}", entries.len(), total.normalize());
        }

        Commands::Config => {
            let config = EngineConfig::default();

            println!("\n=== Engine Configuration ===\n");
            println!("Tick interval:  {}ms", config.tick_interval_ms);
            println!("Ledger:         {}", cli.ledger.display());

            println!("\nTraders:");
            for trader in &config.traders {
                println!(
                    "  {:<8} threshold {:>5}%  {}",
                    trader.name,
                    trader.points.normalize(),
                    trader.description
                );
            }
        }
    }

    Ok(())
}

async fn run(path: &Path, config: EngineConfig, credentials: Option<Credentials>, dry_run: bool) -> Result<()> {
    let ledger = Ledger::open(path)
        .await
        .with_context(|| format!("Failed to open ledger at {}", path.display()))?;

    let client = Arc::new(GmoClient::new(credentials)?);
    let gateway: Arc<dyn OrderGateway> = if dry_run || !client.has_credentials() {
        if !dry_run {
            warn!("GMO credentials not set, falling back to paper trading");
        }
        Arc::new(PaperGateway::new())
    } else {
        client.clone()
    };
    let live = !dry_run && client.has_credentials();

    let desk = Arc::new(Desk::build(&config, ledger, gateway));
    let recovered = desk
        .recover()
        .await
        .context("Failed to recover entries from the ledger")?;

    let (log, rx) = EventLog::channel("miniquet");
    let tail = EventTail::default();
    tokio::spawn(events::run_consumer(rx, tail.clone()));

    let period = Duration::from_millis(config.tick_interval_ms);
    let ticker = Arc::new(Ticker::new(desk.clone(), client, log.with_source("ticker"), period));

    println!("\n=== miniquet ===");
    println!("Ledger:    {}", path.display());
    println!("Interval:  {}ms", config.tick_interval_ms);
    println!("Mode:      {}", if live { "LIVE TRADING" } else { "DRY RUN (paper orders)" });
    println!("Traders:   {}", config.traders.len());
    println!("Recovered: {} entries", recovered);
    println!("\nType 'help' for commands, 'quit' or Ctrl+C to stop.\n");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ticker_task = tokio::spawn({
        let ticker = ticker.clone();
        async move { ticker.run(shutdown_rx).await }
    });

    let console = Console::new(desk.clone(), ticker, tail, log.with_source("console"));
    tokio::spawn(console.run(operator::spawn_stdin_reader(), shutdown_tx.clone()));

    let mut stopped = shutdown_tx.subscribe();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("\n\nStopping...");
        }
        _ = stopped.changed() => {}
    }
    let _ = shutdown_tx.send(true);

    // Let an in-flight tick finish before the ledger goes away.
    if let Err(e) = ticker_task.await {
        warn!(error = %e, "Ticker task ended abnormally");
    }
    desk.ledger().close().await;

    for trader in desk.traders() {
        let entries = trader.entry_count().await;
        let realized = trader.realized_pnl().await;
        info!(trader = %trader.name(), entries, realized = %realized, "Final state");
    }

    Ok(())
}
