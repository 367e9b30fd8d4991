//! Test doubles for the exchange boundary and the decision rule.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::api::{OrderGateway, QuoteSource};
use crate::models::{Entry, QuoteBook, Side};

use super::DecisionRule;

/// Order placed through a [`ScriptedGateway`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub side: Side,
    pub symbol: String,
    pub size: Decimal,
}

/// Records orders; rejects any order for a symbol in `reject`.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    orders: Mutex<Vec<PlacedOrder>>,
    reject: Mutex<HashSet<String>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_symbol(&self, symbol: &str) {
        self.reject.lock().unwrap().insert(symbol.to_string());
    }

    pub fn orders(&self) -> Vec<PlacedOrder> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderGateway for ScriptedGateway {
    async fn place_order(&self, side: Side, symbol: &str, size: Decimal) -> Result<String> {
        if self.reject.lock().unwrap().contains(symbol) {
            return Err(anyhow!("order rejected for {}", symbol));
        }

        let mut orders = self.orders.lock().unwrap();
        orders.push(PlacedOrder {
            side,
            symbol: symbol.to_string(),
            size,
        });
        Ok(format!("order-{}", orders.len()))
    }
}

/// Rule with a fixed answer.
pub struct FixedRule(pub bool);

impl DecisionRule for FixedRule {
    fn name(&self) -> &str {
        "fixed"
    }

    fn should_flip(&self, _entry: &Entry, _ask: Decimal, _bid: Decimal) -> bool {
        self.0
    }
}

/// Quote source serving a fixed book, or failing when `None`.
pub struct StaticQuotes(pub Option<QuoteBook>);

#[async_trait]
impl QuoteSource for StaticQuotes {
    async fn fetch_quotes(&self) -> Result<QuoteBook> {
        self.0.clone().ok_or_else(|| anyhow!("ticker unreachable"))
    }
}
