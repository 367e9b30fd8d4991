//! Decision rules: when does an entry's quote justify a flip.

use rust_decimal::Decimal;

use crate::models::{Entry, Side};

/// Capability invoked once per entry per tick.
///
/// Implementations must be pure: they inspect the entry and the quote and
/// answer; they never mutate state, place orders or fail. A rule that cannot
/// decide answers `false`.
pub trait DecisionRule: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// `true` when the entry should trade on its current side at this quote.
    fn should_flip(&self, entry: &Entry, ask: Decimal, bid: Decimal) -> bool;
}

/// Flip once price has moved `points` percent past the last fix rate.
///
/// A pending BUY fires when the ask has dropped `points`% below the fix rate;
/// a pending SELL fires when the bid has risen `points`% above it. With
/// `points = 0` a fresh entry buys as soon as the ask reaches its wanted rate.
#[derive(Debug, Clone)]
pub struct ThresholdRule {
    label: String,
    points: Decimal,
}

impl ThresholdRule {
    pub fn new(points: Decimal) -> Self {
        Self {
            label: format!("threshold({}%)", points.normalize()),
            points,
        }
    }
}

impl DecisionRule for ThresholdRule {
    fn name(&self) -> &str {
        &self.label
    }

    fn should_flip(&self, entry: &Entry, ask: Decimal, bid: Decimal) -> bool {
        match entry.position {
            Side::Buy => entry.points_from_fix(ask) <= -self.points,
            Side::Sell => entry.points_from_fix(bid) >= self.points,
        }
    }
}
