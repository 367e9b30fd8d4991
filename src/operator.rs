//! Operator console: line commands read from stdin.
//!
//! ```text
//! add <trader> <symbol> <size> <rate>
//! stop <trader> <id>
//! kill9 <trader> <id>
//! list [trader]
//! log | status | help | quit
//! ```

use std::io::BufRead;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::error::EngineResult;
use crate::events::{EventLog, EventTail};
use crate::models::Entry;
use crate::trading::{Desk, Ticker};

/// Number of log lines shown by `log`.
const LOG_LINES: usize = 20;

const HELP: &str = "\
Commands:
  add <trader> <symbol> <size> <rate>   open a new entry
  stop <trader> <id>                    close the entry on its next trade
  kill9 <trader> <id>                   drop the entry now, without trading
  list [trader]                         show entries
  log                                   show recent events
  status                                show last quotes and trader totals
  help                                  show this text
  quit                                  stop the engine";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add {
        trader: String,
        symbol: String,
        size: Decimal,
        rate: Decimal,
    },
    Stop { trader: String, id: String },
    Kill { trader: String, id: String },
    List { trader: Option<String> },
    Log,
    Status,
    Help,
    Quit,
}

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid {field} '{value}': must be a positive number")]
    BadNumber { field: &'static str, value: String },
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&verb, args)) = words.split_first() else {
            return Err(ParseError::Empty);
        };

        match (verb.to_lowercase().as_str(), args) {
            ("add", [trader, symbol, size, rate]) => Ok(Command::Add {
                trader: trader.to_string(),
                symbol: symbol.to_string(),
                size: positive("size", size)?,
                rate: positive("rate", rate)?,
            }),
            ("add", _) => Err(ParseError::Usage("add <trader> <symbol> <size> <rate>")),

            ("stop", [trader, id]) => Ok(Command::Stop {
                trader: trader.to_string(),
                id: id.to_string(),
            }),
            ("stop", _) => Err(ParseError::Usage("stop <trader> <id>")),

            ("kill9", [trader, id]) => Ok(Command::Kill {
                trader: trader.to_string(),
                id: id.to_string(),
            }),
            ("kill9", _) => Err(ParseError::Usage("kill9 <trader> <id>")),

            ("list", []) => Ok(Command::List { trader: None }),
            ("list", [trader]) => Ok(Command::List {
                trader: Some(trader.to_string()),
            }),
            ("list", _) => Err(ParseError::Usage("list [trader]")),

            ("log", []) => Ok(Command::Log),
            ("status", []) => Ok(Command::Status),
            ("help", []) => Ok(Command::Help),
            ("quit" | "exit", []) => Ok(Command::Quit),

            ("log" | "status" | "help" | "quit" | "exit", _) => Err(ParseError::Usage("takes no arguments")),
            (other, _) => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

fn positive(field: &'static str, value: &str) -> Result<Decimal, ParseError> {
    match Decimal::from_str(value) {
        Ok(n) if n > Decimal::ZERO => Ok(n),
        _ => Err(ParseError::BadNumber {
            field,
            value: value.to_string(),
        }),
    }
}

/// Result of one console command.
#[derive(Debug, PartialEq)]
pub enum Reply {
    Text(String),
    Quit,
}

/// One display row for an entry.
pub fn format_entry(entry: &Entry) -> String {
    format!(
        "{:<36} {:<8} {:<10} {:>10} {:<4} {:>14} {:>12}{}",
        entry.id,
        entry.trader,
        entry.symbol,
        entry.size.normalize(),
        entry.position,
        entry.last_fix_rate.normalize(),
        entry.realized_pnl.normalize(),
        if entry.terminal_requested { "  (stopping)" } else { "" }
    )
}

pub fn entry_header() -> String {
    format!(
        "{:<36} {:<8} {:<10} {:>10} {:<4} {:>14} {:>12}",
        "ID", "TRADER", "SYMBOL", "SIZE", "NEXT", "FIX RATE", "REALIZED"
    )
}

pub struct Console {
    desk: Arc<Desk>,
    ticker: Arc<Ticker>,
    tail: EventTail,
    log: EventLog,
}

impl Console {
    pub fn new(desk: Arc<Desk>, ticker: Arc<Ticker>, tail: EventTail, log: EventLog) -> Self {
        Self {
            desk,
            ticker,
            tail,
            log,
        }
    }

    /// Parse and run one input line. Errors are reported, never fatal.
    pub async fn handle_line(&self, line: &str) -> Reply {
        if line.trim().is_empty() {
            return Reply::Text(String::new());
        }

        match line.parse::<Command>() {
            Ok(command) => match self.execute(command).await {
                Ok(reply) => reply,
                Err(e) => {
                    self.log.error(format!("{}: {}", line.trim(), e));
                    Reply::Text(format!("error: {}", e))
                }
            },
            Err(e) => Reply::Text(format!("error: {}", e)),
        }
    }

    pub async fn execute(&self, command: Command) -> EngineResult<Reply> {
        let text = match command {
            Command::Add {
                trader,
                symbol,
                size,
                rate,
            } => {
                let id = self.desk.add(&trader, &symbol, size, rate).await?;
                self.log.info(format!("Added entry {} for {}: {} {} at {}", id, trader, symbol, size, rate));
                id
            }

            Command::Stop { trader, id } => {
                self.desk.request_stop(&trader, &id).await?;
                self.log.info(format!("Stop requested for entry {} of {}", id, trader));
                match self.desk.trader(&trader)?.get_entry(&id).await {
                    Some(entry) => format!("{}\n{}", entry_header(), format_entry(&entry)),
                    // Closed by a tick in between.
                    None => format!("{} is already closed", id),
                }
            }

            Command::Kill { trader, id } => {
                let entry = self.desk.request_kill(&trader, &id).await?;
                self.log.info(format!("Killed entry {} of {} without trading", id, trader));
                format!("killed {} ({} {} {})", id, entry.symbol, entry.position, entry.size)
            }

            Command::List { trader } => {
                let mut rows = vec![entry_header()];
                match trader {
                    Some(name) => {
                        rows.extend(self.desk.list_entries(&name).await?.iter().map(format_entry));
                    }
                    None => {
                        for t in self.desk.traders() {
                            rows.extend(t.list_entries().await.iter().map(format_entry));
                        }
                    }
                }
                rows.join("\n")
            }

            Command::Log => {
                let events = self.tail.snapshot();
                let skip = events.len().saturating_sub(LOG_LINES);
                events
                    .iter()
                    .skip(skip)
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("\n")
            }

            Command::Status => self.status().await,
            Command::Help => HELP.to_string(),
            Command::Quit => return Ok(Reply::Quit),
        };

        Ok(Reply::Text(text))
    }

    async fn status(&self) -> String {
        let mut out = Vec::new();

        match self.ticker.last_quotes().await {
            Some(book) => {
                let fetched = book
                    .fetched_at()
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| "-".to_string());
                out.push(format!("Quotes at {}", fetched));
                if book.is_empty() {
                    out.push("  (no plausible quotes)".to_string());
                } else {
                    out.push(format!("  {:<12} {:>14} {:>14} {:>10}", "SYMBOL", "ASK", "BID", "SPREAD"));
                }
                for (symbol, quote) in book.sorted() {
                    out.push(format!(
                        "  {:<12} {:>14} {:>14} {:>10}",
                        symbol,
                        quote.ask,
                        quote.bid,
                        quote.spread()
                    ));
                }
            }
            None => out.push("No quotes fetched yet".to_string()),
        }

        out.push(String::new());
        out.push(format!(
            "  {:<8} {:>8} {:>14}  {:<18} {}",
            "TRADER", "ENTRIES", "REALIZED", "RULE", "DESCRIPTION"
        ));
        for trader in self.desk.traders() {
            let rule = trader.decision_rule().map(|r| r.name()).unwrap_or("-");
            out.push(format!(
                "  {:<8} {:>8} {:>14}  {:<18} {}",
                trader.name(),
                trader.entry_count().await,
                trader.realized_pnl().await.normalize(),
                rule,
                trader.description()
            ));
        }

        match self.desk.ledger().count().await {
            Ok(n) => out.push(format!("\nLedger records: {}", n)),
            Err(e) => out.push(format!("\nLedger unavailable: {}", e)),
        }

        out.join("\n")
    }

    /// Run commands from `lines` until `quit`, end of input or shutdown.
    pub async fn run(self, mut lines: mpsc::UnboundedReceiver<String>, shutdown: watch::Sender<bool>) {
        let mut stopped = shutdown.subscribe();

        info!("Console ready, type 'help' for commands");

        loop {
            let line = tokio::select! {
                line = lines.recv() => line,
                _ = stopped.changed() => break,
            };

            let Some(line) = line else {
                info!("Console input closed");
                break;
            };

            match self.handle_line(&line).await {
                Reply::Text(text) if text.is_empty() => {}
                Reply::Text(text) => println!("{}", text),
                Reply::Quit => break,
            }
        }

        let _ = shutdown.send(true);
    }
}

/// Forward stdin lines from a dedicated thread.
///
/// The thread blocks on the terminal, so it is left detached; it never holds
/// up runtime shutdown.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read console input");
                    break;
                }
            }
        }
    });

    rx
}
