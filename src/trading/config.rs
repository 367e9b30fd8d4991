//! Engine configuration.

use std::collections::HashSet;

use anyhow::{bail, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// One trader in the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderConfig {
    /// Unique trader name; entries are tagged with it
    pub name: String,

    /// Free-form description shown by the `config` command
    pub description: String,

    /// Threshold for the trader's decision rule, in percent of the last fix rate
    pub points: Decimal,
}

impl TraderConfig {
    pub fn new(name: &str, description: &str, points: Decimal) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            points,
        }
    }
}

/// Configuration for the tick loop and the trader roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Milliseconds between ticks
    pub tick_interval_ms: u64,

    /// Traders registered at startup
    pub traders: Vec<TraderConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            traders: vec![
                TraderConfig::new("alice", "Trade with a difference of 0.2 point.", dec!(0.2)),
                TraderConfig::new("john", "Trade with a difference of 1 point.", dec!(1)),
            ],
        }
    }
}

impl EngineConfig {
    /// Reject empty rosters, duplicate names and negative thresholds.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            bail!("tick interval must be positive");
        }
        if self.traders.is_empty() {
            bail!("no traders configured");
        }

        let mut seen = HashSet::new();
        for trader in &self.traders {
            if trader.name.trim().is_empty() {
                bail!("trader name must not be empty");
            }
            if !seen.insert(trader.name.as_str()) {
                bail!("duplicate trader name '{}'", trader.name);
            }
            if trader.points < Decimal::ZERO {
                bail!("trader '{}' has a negative threshold", trader.name);
            }
        }
        Ok(())
    }
}
