//! Data models for entries and market quotes.

mod entry;
mod quote;

pub use entry::{Entry, Side};
pub use quote::{Quote, QuoteBook};
