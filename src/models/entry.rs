//! Entry model: one open position and its flip transition.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// Side of the next order placed for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// The other side.
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One position tracked by a trader and persisted in the ledger.
///
/// `position` is the side of the next order: a new entry starts at `Buy`
/// anchored on the wanted rate, and each successful trade flips it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Ledger key, never reused
    pub id: Uuid,

    /// Name of the owning trader
    pub trader: String,

    /// Instrument symbol (e.g. "BTC_JPY")
    pub symbol: String,

    /// Order quantity, constant for the life of the entry
    pub size: Decimal,

    /// Side of the next order
    pub position: Side,

    /// Price the position was last fixed at
    pub last_fix_rate: Decimal,

    /// When the position was last fixed
    pub last_fix_date: DateTime<Utc>,

    /// Running realized profit
    #[serde(default)]
    pub realized_pnl: Decimal,

    /// Delete instead of flipping on the next successful trade
    #[serde(default)]
    pub terminal_requested: bool,
}

impl Entry {
    /// Create a fresh entry with a newly allocated id.
    pub fn new(trader: &str, symbol: &str, size: Decimal, initial_rate: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            trader: trader.to_string(),
            symbol: symbol.to_string(),
            size,
            position: Side::Buy,
            last_fix_rate: initial_rate,
            last_fix_date: Utc::now(),
            realized_pnl: Decimal::ZERO,
            terminal_requested: false,
        }
    }

    /// Ledger key for this entry.
    pub fn key(&self) -> String {
        self.id.to_string()
    }

    /// Flip the position after a filled order and accrue realized P&L.
    ///
    /// Returns the P&L delta of this flip. On overflow the entry is left
    /// untouched.
    pub fn flip(&mut self, now: DateTime<Utc>, ask: Decimal, bid: Decimal) -> EngineResult<Decimal> {
        // Sell: bid*size - fix*size. Buy: fix*size - ask*size.
        let (fill, gain, cost) = match self.position {
            Side::Sell => (bid, bid, self.last_fix_rate),
            Side::Buy => (ask, self.last_fix_rate, ask),
        };

        let delta = self
            .notional(gain)
            .zip(self.notional(cost))
            .and_then(|(gain, cost)| gain.checked_sub(cost));
        let realized = delta.and_then(|d| self.realized_pnl.checked_add(d));
        let (Some(delta), Some(realized)) = (delta, realized) else {
            return Err(EngineError::Overflow(format!(
                "flipping entry {} at {} with size {}",
                self.id, fill, self.size
            )));
        };

        self.realized_pnl = realized;
        self.last_fix_rate = fill;
        self.position = self.position.opposite();
        self.last_fix_date = now;
        Ok(delta)
    }

    /// `size * price`, or `None` when it does not fit a `Decimal`.
    pub fn notional(&self, price: Decimal) -> Option<Decimal> {
        self.size.checked_mul(price)
    }

    /// Mark the entry for deletion on its next successful trade.
    pub fn request_terminal(&mut self) {
        self.terminal_requested = true;
    }

    /// Relative distance between a price and the last fix rate, in percent.
    pub fn points_from_fix(&self, price: Decimal) -> Decimal {
        if self.last_fix_rate.is_zero() {
            return Decimal::ZERO;
        }
        (price - self.last_fix_rate) / self.last_fix_rate * Decimal::ONE_HUNDRED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_entry_defaults() {
        let entry = Entry::new("alice", "BTC_JPY", dec!(0.1), dec!(100));

        assert_eq!(entry.trader, "alice");
        assert_eq!(entry.position, Side::Buy);
        assert_eq!(entry.last_fix_rate, dec!(100));
        assert_eq!(entry.realized_pnl, Decimal::ZERO);
        assert!(!entry.terminal_requested);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Entry::new("alice", "BTC_JPY", dec!(1), dec!(1));
        let b = Entry::new("alice", "BTC_JPY", dec!(1), dec!(1));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_flip_buy_closes_at_ask() {
        let mut entry = Entry::new("alice", "BTC_JPY", dec!(0.1), dec!(100));
        let now = Utc::now() + Duration::seconds(5);

        let delta = entry.flip(now, dec!(101), dec!(99)).unwrap();

        // 100 * 0.1 - 101 * 0.1
        assert_eq!(delta, dec!(-0.1));
        assert_eq!(entry.realized_pnl, dec!(-0.1));
        assert_eq!(entry.position, Side::Sell);
        assert_eq!(entry.last_fix_rate, dec!(101));
        assert_eq!(entry.last_fix_date, now);
    }

    #[test]
    fn test_flip_sell_closes_at_bid() {
        let mut entry = Entry::new("alice", "BTC_JPY", dec!(2), dec!(100));
        entry.flip(Utc::now(), dec!(100), dec!(99)).unwrap();

        let delta = entry.flip(Utc::now(), dec!(111), dec!(110)).unwrap();

        // 110 * 2 - 100 * 2
        assert_eq!(delta, dec!(20));
        assert_eq!(entry.realized_pnl, dec!(20));
        assert_eq!(entry.position, Side::Buy);
        assert_eq!(entry.last_fix_rate, dec!(110));
    }

    #[test]
    fn test_flip_delta_sign_matches_closed_side() {
        let rates = [dec!(0.5), dec!(99), dec!(100), dec!(101), dec!(5000000)];
        let sizes = [dec!(0.01), dec!(1), dec!(3.5)];

        for &rate in &rates {
            for &ask in &rates {
                for &bid in &rates {
                    for &size in &sizes {
                        for side in [Side::Buy, Side::Sell] {
                            let mut entry = Entry::new("p", "X", size, rate);
                            entry.position = side;
                            let before = entry.realized_pnl;

                            let delta = entry.flip(Utc::now(), ask, bid).unwrap();

                            assert_eq!(entry.position, side.opposite());
                            assert_eq!(entry.realized_pnl - before, delta);
                            match side {
                                Side::Sell => {
                                    assert_eq!(delta, bid * size - rate * size);
                                    assert_eq!(delta < Decimal::ZERO, bid < rate);
                                    assert_eq!(delta > Decimal::ZERO, bid > rate);
                                    assert_eq!(entry.last_fix_rate, bid);
                                }
                                Side::Buy => {
                                    assert_eq!(delta, rate * size - ask * size);
                                    assert_eq!(delta < Decimal::ZERO, ask > rate);
                                    assert_eq!(delta > Decimal::ZERO, ask < rate);
                                    assert_eq!(entry.last_fix_rate, ask);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_flip_overflow_leaves_entry_untouched() {
        let mut entry = Entry::new("alice", "BTC_JPY", Decimal::from(100_000_000_000_000u64), dec!(1));
        let before = entry.clone();
        let huge = Decimal::from(1_000_000_000_000_000_000u64);

        let err = entry.flip(Utc::now(), huge, dec!(1)).unwrap_err();

        assert!(matches!(err, EngineError::Overflow(_)));
        assert_eq!(entry, before);
    }

    #[test]
    fn test_request_terminal_idempotent() {
        let mut once = Entry::new("alice", "BTC_JPY", dec!(1), dec!(1));
        let mut twice = once.clone();

        once.request_terminal();
        twice.request_terminal();
        twice.request_terminal();

        assert_eq!(once, twice);
        assert!(twice.terminal_requested);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let entry = Entry::new("alice", "BTC_JPY", dec!(0.1), dec!(100));
        let mut value = serde_json::to_value(&entry).unwrap();
        value["gb01"] = serde_json::json!(1.5);

        let decoded: Entry = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_points_from_fix() {
        let entry = Entry::new("alice", "BTC_JPY", dec!(1), dec!(200));
        assert_eq!(entry.points_from_fix(dec!(202)), dec!(1));
        assert_eq!(entry.points_from_fix(dec!(199)), dec!(-0.5));
    }
}
