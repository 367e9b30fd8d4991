//! Quote snapshot shared by every trader during a tick.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Best ask/bid for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub ask: Decimal,
    pub bid: Decimal,
}

impl Quote {
    pub fn new(ask: Decimal, bid: Decimal) -> Self {
        Self { ask, bid }
    }

    /// Both sides positive and not crossed.
    pub fn is_plausible(&self) -> bool {
        self.ask > Decimal::ZERO && self.bid > Decimal::ZERO && self.bid <= self.ask
    }

    /// Spread between ask and bid.
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }
}

/// Immutable set of quotes fetched once per tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteBook {
    quotes: HashMap<String, Quote>,
    fetched_at: Option<DateTime<Utc>>,
}

impl QuoteBook {
    pub fn new(fetched_at: DateTime<Utc>) -> Self {
        Self {
            quotes: HashMap::new(),
            fetched_at: Some(fetched_at),
        }
    }

    pub fn insert(&mut self, symbol: impl Into<String>, quote: Quote) {
        self.quotes.insert(symbol.into(), quote);
    }

    pub fn get(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.get(symbol)
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Quotes sorted by symbol, for display.
    pub fn sorted(&self) -> Vec<(&str, &Quote)> {
        let mut all: Vec<_> = self.quotes.iter().map(|(s, q)| (s.as_str(), q)).collect();
        all.sort_by(|a, b| a.0.cmp(b.0));
        all
    }
}

impl FromIterator<(String, Quote)> for QuoteBook {
    fn from_iter<I: IntoIterator<Item = (String, Quote)>>(iter: I) -> Self {
        Self {
            quotes: iter.into_iter().collect(),
            fetched_at: Some(Utc::now()),
        }
    }
}
