//! Desk: the trader registry and the command surface addressed by trader name.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;

use crate::api::OrderGateway;
use crate::error::{EngineError, EngineResult};
use crate::ledger::Ledger;
use crate::models::Entry;

use super::{EngineConfig, ThresholdRule, Trader};

pub struct Desk {
    ledger: Ledger,
    traders: BTreeMap<String, Arc<Trader>>,
}

impl Desk {
    /// Register every trader in `config`, each with a threshold rule.
    pub fn build(config: &EngineConfig, ledger: Ledger, gateway: Arc<dyn OrderGateway>) -> Self {
        let mut traders = BTreeMap::new();

        for tc in &config.traders {
            let trader = Trader::new(&tc.name, &tc.description, ledger.clone(), gateway.clone());
            trader.set_decision_rule(Arc::new(ThresholdRule::new(tc.points)));
            traders.insert(tc.name.clone(), Arc::new(trader));
        }

        Self { ledger, traders }
    }

    /// Desk over already constructed traders.
    #[cfg(test)]
    pub fn with_traders(ledger: Ledger, traders: Vec<Arc<Trader>>) -> Self {
        let traders = traders
            .into_iter()
            .map(|t| (t.name().to_string(), t))
            .collect();
        Self { ledger, traders }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn trader(&self, name: &str) -> EngineResult<&Arc<Trader>> {
        self.traders
            .get(name)
            .ok_or_else(|| EngineError::NotFound(format!("trader '{}'", name)))
    }

    /// Traders in name order.
    pub fn traders(&self) -> impl Iterator<Item = &Arc<Trader>> {
        self.traders.values()
    }

    /// Reattach every ledger record to its trader. Returns the number of
    /// recovered entries.
    ///
    /// A record that fails to decode, or that names a trader this desk does
    /// not know, aborts recovery: starting without it would silently orphan
    /// an open position.
    pub async fn recover(&self) -> EngineResult<usize> {
        let entries = self.ledger.scan().await?;
        let total = entries.len();

        for entry in entries {
            let trader = self.trader(&entry.trader)?;
            trader.reattach(entry).await?;
        }

        for trader in self.traders() {
            let entries = trader.entry_count().await;
            info!(trader = %trader.name(), entries, "Recovered entries");
        }
        Ok(total)
    }

    pub async fn add(&self, trader: &str, symbol: &str, size: Decimal, want_rate: Decimal) -> EngineResult<String> {
        self.trader(trader)?.add(symbol, size, want_rate).await
    }

    pub async fn request_stop(&self, trader: &str, id: &str) -> EngineResult<()> {
        self.trader(trader)?.request_stop(id).await
    }

    pub async fn request_kill(&self, trader: &str, id: &str) -> EngineResult<Entry> {
        self.trader(trader)?.request_kill(id).await
    }

    pub async fn list_entries(&self, trader: &str) -> EngineResult<Vec<Entry>> {
        Ok(self.trader(trader)?.list_entries().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::testing::ScriptedGateway;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    async fn desk_at(dir: &TempDir) -> Desk {
        let ledger = Ledger::open(dir.path().join("ledger.db")).await.unwrap();
        Desk::build(&EngineConfig::default(), ledger, Arc::new(ScriptedGateway::new()))
    }

    #[tokio::test]
    async fn test_build_registers_roster() {
        let dir = tempfile::tempdir().unwrap();
        let desk = desk_at(&dir).await;

        let names: Vec<_> = desk.traders().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["alice", "john"]);
        assert_eq!(
            desk.trader("john").unwrap().decision_rule().unwrap().name(),
            "threshold(1%)"
        );
    }

    #[tokio::test]
    async fn test_unknown_trader_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let desk = desk_at(&dir).await;

        let err = desk.add("bob", "BTC_JPY", dec!(1), dec!(100)).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert_eq!(err.to_string(), "trader 'bob' is not found");
    }

    #[tokio::test]
    async fn test_recover_reattaches_entries() {
        let dir = tempfile::tempdir().unwrap();

        let (a, j) = {
            let desk = desk_at(&dir).await;
            let a = desk.add("alice", "BTC_JPY", dec!(0.1), dec!(100)).await.unwrap();
            let j = desk.add("john", "ETH_JPY", dec!(1), dec!(3000)).await.unwrap();
            desk.request_stop("john", &j).await.unwrap();
            desk.ledger().close().await;
            (a, j)
        };

        let desk = desk_at(&dir).await;
        assert_eq!(desk.recover().await.unwrap(), 2);

        let alice = desk.list_entries("alice").await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].key(), a);

        let john = desk.trader("john").unwrap().get_entry(&j).await.unwrap();
        assert!(john.terminal_requested);
    }

    #[tokio::test]
    async fn test_recover_unknown_trader_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let desk = desk_at(&dir).await;
        desk.ledger()
            .put(&Entry::new("mallory", "BTC_JPY", dec!(1), dec!(100)))
            .await
            .unwrap();

        let err = desk.recover().await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_recover_corrupt_record_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let desk = desk_at(&dir).await;
        desk.ledger().put_raw("junk", b"not json").await.unwrap();

        assert!(matches!(
            desk.recover().await,
            Err(EngineError::DecodeError { .. })
        ));
    }

    #[tokio::test]
    async fn test_kill_through_desk() {
        let dir = tempfile::tempdir().unwrap();
        let desk = desk_at(&dir).await;
        let id = desk.add("alice", "BTC_JPY", dec!(0.1), dec!(100)).await.unwrap();

        assert!(desk.request_kill("john", &id).await.is_err());
        let killed = desk.request_kill("alice", &id).await.unwrap();

        assert_eq!(killed.key(), id);
        assert!(desk.list_entries("alice").await.unwrap().is_empty());
        assert_eq!(desk.ledger().count().await.unwrap(), 0);
    }
}
