//! Trader: a named strategy context owning its entries.
//!
//! Every public operation takes the trader's single lock for its whole
//! duration, including the gateway and ledger calls it makes. A tick is
//! therefore atomic with respect to `add`/`request_stop`/`request_kill` on the
//! same trader, while different traders never wait on each other.
//!
//! Memory follows the ledger: an entry is inserted only after its first `put`
//! succeeds and removed only after its `delete` succeeds. The one exception
//! is a flip: the in-memory entry flips before the `put`, so a failed `put`
//! (or a crash between the two) leaves the ledger one flip behind. That case
//! is reported as an error on the event log and is bounded to one flip per
//! entry.
//!
//! The flip is computed before the order goes out; an entry whose P&L would
//! overflow is reported and never traded.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::OrderGateway;
use crate::error::{EngineError, EngineResult};
use crate::events::EventLog;
use crate::ledger::Ledger;
use crate::models::{Entry, QuoteBook};

use super::DecisionRule;

/// Outcome counters for one `evaluate_tick` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Entries whose quote was found and handed to the rule
    pub evaluated: usize,
    /// Entries flipped in memory
    pub flipped: usize,
    /// Terminal entries deleted
    pub closed: usize,
    /// Per-entry failures reported to the log
    pub errors: usize,
}

impl std::ops::AddAssign for TickReport {
    fn add_assign(&mut self, other: Self) {
        self.evaluated += other.evaluated;
        self.flipped += other.flipped;
        self.closed += other.closed;
        self.errors += other.errors;
    }
}

/// State guarded by the trader's lock.
#[derive(Default)]
struct Holdings {
    open: HashMap<String, Entry>,
    /// Realized P&L carried by entries that have been closed or killed
    closed_pnl: Decimal,
}

impl Holdings {
    fn retire(&mut self, entry: &Entry) {
        self.closed_pnl = self.closed_pnl.saturating_add(entry.realized_pnl);
    }
}

pub struct Trader {
    name: String,
    description: String,
    ledger: Ledger,
    gateway: Arc<dyn OrderGateway>,
    rule: OnceLock<Arc<dyn DecisionRule>>,
    holdings: Mutex<Holdings>,
}

impl Trader {
    pub fn new(name: &str, description: &str, ledger: Ledger, gateway: Arc<dyn OrderGateway>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            ledger,
            gateway,
            rule: OnceLock::new(),
            holdings: Mutex::new(Holdings::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Install the decision rule. Only the first call takes effect.
    pub fn set_decision_rule(&self, rule: Arc<dyn DecisionRule>) -> bool {
        let label = rule.name().to_string();
        if self.rule.set(rule).is_err() {
            warn!(trader = %self.name, rule = %label, "Decision rule already set, ignoring");
            return false;
        }
        true
    }

    pub fn decision_rule(&self) -> Option<&Arc<dyn DecisionRule>> {
        self.rule.get()
    }

    /// Open a new entry at `want_rate` and persist it. Returns the new id.
    pub async fn add(&self, symbol: &str, size: Decimal, want_rate: Decimal) -> EngineResult<String> {
        let mut holdings = self.holdings.lock().await;

        let entry = Entry::new(&self.name, symbol, size, want_rate);
        if entry.notional(want_rate).is_none() {
            return Err(EngineError::Overflow(format!(
                "size {} at rate {} for {}",
                size, want_rate, symbol
            )));
        }
        let id = entry.key();
        if holdings.open.contains_key(&id) {
            return Err(EngineError::DuplicateId(id));
        }

        self.ledger.put(&entry).await?;
        holdings.open.insert(id.clone(), entry);

        debug!(trader = %self.name, id = %id, symbol = %symbol, "Entry added");
        Ok(id)
    }

    /// Ask for the entry to be closed on its next successful trade. The flag
    /// is persisted so a restart keeps the request.
    pub async fn request_stop(&self, id: &str) -> EngineResult<()> {
        let mut holdings = self.holdings.lock().await;

        let entry = holdings
            .open
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if entry.terminal_requested {
            return Ok(());
        }

        let mut stopped = entry.clone();
        stopped.request_terminal();
        self.ledger.put(&stopped).await?;
        *entry = stopped;
        Ok(())
    }

    /// Drop the entry immediately, without trading. Memory is only touched
    /// once the ledger delete has succeeded. The entry's realized P&L stays
    /// in the trader's total.
    pub async fn request_kill(&self, id: &str) -> EngineResult<Entry> {
        let mut holdings = self.holdings.lock().await;

        let entry = holdings
            .open
            .get(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        self.ledger.delete(entry).await?;

        let entry = holdings
            .open
            .remove(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        holdings.retire(&entry);
        Ok(entry)
    }

    /// Put a recovered entry back in memory without writing it again.
    pub async fn reattach(&self, entry: Entry) -> EngineResult<()> {
        let mut holdings = self.holdings.lock().await;

        let id = entry.key();
        if holdings.open.contains_key(&id) {
            return Err(EngineError::DuplicateId(id));
        }
        holdings.open.insert(id, entry);
        Ok(())
    }

    /// Snapshot of one entry.
    pub async fn get_entry(&self, id: &str) -> Option<Entry> {
        self.holdings.lock().await.open.get(id).cloned()
    }

    /// Snapshot of every entry, ordered by symbol then age.
    pub async fn list_entries(&self) -> Vec<Entry> {
        let holdings = self.holdings.lock().await;
        let mut list: Vec<Entry> = holdings.open.values().cloned().collect();
        list.sort_by(|a, b| {
            a.symbol
                .cmp(&b.symbol)
                .then(a.last_fix_date.cmp(&b.last_fix_date))
        });
        list
    }

    pub async fn entry_count(&self) -> usize {
        self.holdings.lock().await.open.len()
    }

    /// Realized P&L of this process: open entries plus every entry closed
    /// or killed since startup.
    pub async fn realized_pnl(&self) -> Decimal {
        let holdings = self.holdings.lock().await;
        holdings
            .open
            .values()
            .fold(holdings.closed_pnl, |total, e| total.saturating_add(e.realized_pnl))
    }

    /// Evaluate every entry against one quote snapshot.
    ///
    /// Per-entry failures are reported to `log` and counted; they never stop
    /// the remaining entries. Only a missing decision rule fails the call.
    pub async fn evaluate_tick(&self, log: &EventLog, quotes: &QuoteBook) -> EngineResult<TickReport> {
        let mut guard = self.holdings.lock().await;
        let holdings = &mut *guard;

        let rule = match self.rule.get() {
            Some(rule) => rule.clone(),
            None => {
                let err = EngineError::NotConfigured(format!("decision rule of trader '{}'", self.name));
                log.error(err.to_string());
                return Err(err);
            }
        };

        let mut report = TickReport::default();
        let ids: Vec<String> = holdings.open.keys().cloned().collect();

        for id in ids {
            let Some(entry) = holdings.open.get(&id).cloned() else {
                continue;
            };

            let Some(quote) = quotes.get(&entry.symbol).copied() else {
                log.error(format!("Not found symbol: '{}' (entry {})", entry.symbol, id));
                report.errors += 1;
                continue;
            };
            if !quote.is_plausible() {
                log.error(format!(
                    "Implausible quote for '{}': ask {} bid {} (entry {})",
                    entry.symbol, quote.ask, quote.bid, id
                ));
                report.errors += 1;
                continue;
            }

            report.evaluated += 1;
            if !rule.should_flip(&entry, quote.ask, quote.bid) {
                continue;
            }

            // Work out the flip first so an overflowing entry never trades.
            let mut flipped = entry.clone();
            let delta = if entry.terminal_requested {
                Decimal::ZERO
            } else {
                match flipped.flip(Utc::now(), quote.ask, quote.bid) {
                    Ok(delta) => delta,
                    Err(e) => {
                        log.error(format!("Skipping trade for entry {}: {}", id, e));
                        report.errors += 1;
                        continue;
                    }
                }
            };

            let order_id = match self.gateway.place_order(entry.position, &entry.symbol, entry.size).await {
                Ok(order_id) => order_id,
                Err(e) => {
                    let err = EngineError::GatewayError(e.to_string());
                    log.error(format!("Failed the trade for entry {}: {}", id, err));
                    report.errors += 1;
                    continue;
                }
            };

            if entry.terminal_requested {
                let deleted = self.ledger.delete(&entry).await;
                match deleted {
                    Ok(()) => {
                        holdings.open.remove(&id);
                        holdings.retire(&entry);
                        report.closed += 1;
                        log.info(format!(
                            "Closed entry: {}, order_id: '{}', realized: {}",
                            id, order_id, entry.realized_pnl
                        ));
                    }
                    Err(e) => {
                        report.errors += 1;
                        log.error(format!(
                            "Traded final order '{}' but could not delete entry {}: {}; keeping it resident",
                            order_id, id, e
                        ));
                    }
                }
                continue;
            }

            let Some(slot) = holdings.open.get_mut(&id) else {
                continue;
            };
            *slot = flipped;
            report.flipped += 1;

            let persisted = self.ledger.put(slot).await;
            match persisted {
                Ok(()) => log.info(format!(
                    "Trade!!! entry: {}, order_id: '{}', now {} at {}, pnl {:+}",
                    id, order_id, slot.position, slot.last_fix_rate, delta
                )),
                Err(e) => {
                    report.errors += 1;
                    log.error(format!(
                        "Entry {} flipped to {} but was not persisted: {}; ledger is one flip behind",
                        id, slot.position, e
                    ));
                }
            }
        }

        Ok(report)
    }
}
