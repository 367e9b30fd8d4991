//! Event log: the engine's logger capability.
//!
//! Traders, the ticker and the operator console report through an
//! [`EventLog`] handle. Sending never blocks and never fails; a single
//! consumer task turns events into `tracing` records and keeps a short tail
//! for the console's `log` command. Ordering is per-sender only: events from
//! different traders interleave arbitrarily and do not reflect commit order.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{error, info};

/// Number of events kept for display.
pub const TAIL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

/// One reported event.
#[derive(Debug, Clone)]
pub struct Event {
    pub at: DateTime<Utc>,
    pub level: Level,
    pub source: String,
    pub text: String,
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.level {
            Level::Info => "INFO ",
            Level::Error => "ERROR",
        };
        write!(
            f,
            "[{}] {} {}: {}",
            self.at.format("%H:%M:%S"),
            tag,
            self.source,
            self.text
        )
    }
}

/// Cloneable sending side of the event channel.
#[derive(Debug, Clone)]
pub struct EventLog {
    tx: mpsc::UnboundedSender<Event>,
    source: String,
}

impl EventLog {
    /// Create a log handle and the receiver its consumer drains.
    pub fn channel(source: &str) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                source: source.to_string(),
            },
            rx,
        )
    }

    /// Same channel, different source label.
    pub fn with_source(&self, source: &str) -> Self {
        Self {
            tx: self.tx.clone(),
            source: source.to_string(),
        }
    }

    pub fn info(&self, text: impl Into<String>) {
        self.send(Level::Info, text.into());
    }

    pub fn error(&self, text: impl Into<String>) {
        self.send(Level::Error, text.into());
    }

    fn send(&self, level: Level, text: String) {
        // A gone consumer means shutdown; dropping the event is fine.
        let _ = self.tx.send(Event {
            at: Utc::now(),
            level,
            source: self.source.clone(),
            text,
        });
    }
}

/// Latest events, newest last.
#[derive(Debug, Clone, Default)]
pub struct EventTail {
    inner: Arc<Mutex<VecDeque<Event>>>,
}

impl EventTail {
    fn push(&self, event: Event) {
        let mut tail = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if tail.len() == TAIL_CAPACITY {
            tail.pop_front();
        }
        tail.push_back(event);
    }

    pub fn snapshot(&self) -> Vec<Event> {
        match self.inner.lock() {
            Ok(guard) => guard.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }
}

/// Drain events until every sender is dropped.
pub async fn run_consumer(mut rx: mpsc::UnboundedReceiver<Event>, tail: EventTail) {
    while let Some(event) = rx.recv().await {
        match event.level {
            Level::Info => info!(source = %event.source, "{}", event.text),
            Level::Error => error!(source = %event.source, "{}", event.text),
        }
        tail.push(event);
    }
}
