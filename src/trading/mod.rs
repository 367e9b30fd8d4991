//! Trading core: traders, their decision rules, the desk and the tick loop.

mod config;
mod desk;
mod rule;
mod scheduler;
mod trader;

#[cfg(test)]
pub mod testing;

pub use config::{EngineConfig, TraderConfig};
pub use desk::Desk;
pub use rule::{DecisionRule, ThresholdRule};
pub use scheduler::Ticker;
pub use trader::{TickReport, Trader};
