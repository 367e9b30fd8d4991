//! Tick scheduler: one quote fetch per interval, fanned out to every trader.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::QuoteSource;
use crate::events::EventLog;
use crate::models::QuoteBook;

use super::{Desk, TickReport};

pub struct Ticker {
    desk: Arc<Desk>,
    quotes: Arc<dyn QuoteSource>,
    log: EventLog,
    period: Duration,
    last: RwLock<Option<Arc<QuoteBook>>>,
}

impl Ticker {
    pub fn new(desk: Arc<Desk>, quotes: Arc<dyn QuoteSource>, log: EventLog, period: Duration) -> Self {
        Self {
            desk,
            quotes,
            log,
            period,
            last: RwLock::new(None),
        }
    }

    /// Last successfully fetched quote snapshot.
    pub async fn last_quotes(&self) -> Option<Arc<QuoteBook>> {
        self.last.read().await.clone()
    }

    /// Run one tick. Returns `None` when the quote fetch failed and no
    /// trader was invoked.
    pub async fn tick(&self) -> Option<TickReport> {
        let book = match self.quotes.fetch_quotes().await {
            Ok(book) => Arc::new(book),
            Err(e) => {
                self.log.error(format!("Failed to fetch quotes, skipping tick: {:#}", e));
                return None;
            }
        };
        *self.last.write().await = Some(book.clone());

        let tasks = self.desk.traders().map(|trader| {
            let trader = trader.clone();
            let book = book.clone();
            let log = self.log.with_source(trader.name());
            tokio::spawn(async move {
                let result = trader.evaluate_tick(&log, &book).await;
                (trader.name().to_string(), result)
            })
        });

        let mut total = TickReport::default();
        for joined in join_all(tasks).await {
            match joined {
                Ok((_, Ok(report))) => total += report,
                // Already reported on the trader's own log.
                Ok((name, Err(e))) => debug!(trader = %name, error = %e, "Trader skipped tick"),
                Err(e) => self.log.error(format!("Trader task failed: {}", e)),
            }
        }

        debug!(
            symbols = book.len(),
            evaluated = total.evaluated,
            flipped = total.flipped,
            closed = total.closed,
            errors = total.errors,
            "Tick complete"
        );
        Some(total)
    }

    /// Tick every period until `shutdown` turns true. A tick in progress is
    /// always allowed to finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut timer = interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_ms = self.period.as_millis() as u64, "Ticker started");

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        warn!("Ticker stopped");
    }
}
