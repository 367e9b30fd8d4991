//! Exchange boundary: quote source and order gateway capabilities.

mod gmo_client;
mod paper;
mod types;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::{QuoteBook, Side};

pub use gmo_client::{Credentials, GmoClient};
pub use paper::PaperGateway;

/// Source of the per-tick quote snapshot.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Current ask/bid per symbol. Implausible quotes are dropped, not returned.
    async fn fetch_quotes(&self) -> Result<QuoteBook>;
}

/// Order placement. A failure is a transport error or a rejection; callers do
/// not retry.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Place a market order and return the exchange order id.
    async fn place_order(&self, side: Side, symbol: &str, size: Decimal) -> Result<String>;
}
