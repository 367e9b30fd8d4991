//! Paper gateway: accepts every order without touching an exchange.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use crate::models::Side;

use super::OrderGateway;

/// Dry-run order gateway returning synthetic order ids.
#[derive(Debug, Default)]
pub struct PaperGateway {
    next_id: AtomicU64,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn place_order(&self, side: Side, symbol: &str, size: Decimal) -> Result<String> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let order_id = format!("paper-{}", n);

        info!(
            order_id = %order_id,
            side = %side,
            symbol = %symbol,
            size = %size,
            "[DRY RUN] Order accepted"
        );

        Ok(order_id)
    }
}
