//! Durable entry ledger.
//!
//! A single SQLite key-value table maps an entry id to its serialized record.
//! Every trader writes through the same [`Ledger`]; ids are globally unique so
//! no two traders ever touch the same key and no multi-key transactions are
//! needed.
//!
//! Records are JSON documents stored as BLOBs: self-describing and
//! field-tagged, and unknown fields are skipped on decode so a record written
//! by a newer build with extra fields still loads.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::models::Entry;

/// Shared handle to the on-disk ledger.
#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    /// Open (creating if needed) the ledger file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let ledger = Self { pool };
        ledger.run_migrations().await?;

        info!(path = %path.as_ref().display(), "Ledger opened");
        Ok(ledger)
    }

    async fn run_migrations(&self) -> EngineResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                record BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn ensure_open(&self) -> EngineResult<()> {
        if self.pool.is_closed() {
            return Err(EngineError::Closed);
        }
        Ok(())
    }

    /// Write `entry` under its id, replacing any previous record.
    pub async fn put(&self, entry: &Entry) -> EngineResult<()> {
        self.ensure_open()?;

        let record = encode(entry)?;
        sqlx::query(
            r#"
            INSERT INTO entries (id, record) VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET record = excluded.record
            "#,
        )
        .bind(entry.key())
        .bind(record)
        .execute(&self.pool)
        .await?;

        debug!(id = %entry.id, "Ledger put");
        Ok(())
    }

    /// Remove the record for `entry`. Missing keys are not an error.
    pub async fn delete(&self, entry: &Entry) -> EngineResult<()> {
        self.ensure_open()?;

        sqlx::query("DELETE FROM entries WHERE id = ?")
            .bind(entry.key())
            .execute(&self.pool)
            .await?;

        debug!(id = %entry.id, "Ledger delete");
        Ok(())
    }

    /// Fetch and decode one record.
    pub async fn get(&self, id: &str) -> EngineResult<Entry> {
        self.ensure_open()?;

        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT record FROM entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((record,)) => decode(id, &record),
            None => Err(EngineError::NotFound(id.to_string())),
        }
    }

    /// Decode every stored record. Any corrupt record aborts the whole scan.
    pub async fn scan(&self) -> EngineResult<Vec<Entry>> {
        self.ensure_open()?;

        let rows: Vec<(String, Vec<u8>)> = sqlx::query_as("SELECT id, record FROM entries")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|(id, record)| decode(id, record))
            .collect()
    }

    /// Number of stored records.
    pub async fn count(&self) -> EngineResult<i64> {
        self.ensure_open()?;

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Close the pool; later operations fail with [`EngineError::Closed`].
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Ledger closed");
    }

    /// Write a raw record, bypassing encoding.
    #[cfg(test)]
    pub(crate) async fn put_raw(&self, id: &str, record: &[u8]) -> EngineResult<()> {
        sqlx::query("INSERT OR REPLACE INTO entries (id, record) VALUES (?, ?)")
            .bind(id)
            .bind(record)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drop the backing table so every later statement fails with an I/O error.
    #[cfg(test)]
    pub(crate) async fn break_storage(&self) {
        sqlx::query("DROP TABLE entries")
            .execute(&self.pool)
            .await
            .unwrap();
    }
}

fn encode(entry: &Entry) -> EngineResult<Vec<u8>> {
    serde_json::to_vec(entry).map_err(|e| EngineError::StorageUnavailable(e.to_string()))
}

fn decode(id: &str, record: &[u8]) -> EngineResult<Entry> {
    serde_json::from_slice(record).map_err(|e| EngineError::DecodeError {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    async fn open_temp() -> (TempDir, Ledger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("ledger.db")).await.unwrap();
        (dir, ledger)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (_dir, ledger) = open_temp().await;

        let mut entry = Entry::new("alice", "BTC_JPY", dec!(0.1), dec!(100));
        entry.flip(chrono::Utc::now(), dec!(101), dec!(99)).unwrap();
        entry.request_terminal();
        ledger.put(&entry).await.unwrap();

        let loaded = ledger.get(&entry.key()).await.unwrap();
        assert_eq!(loaded, entry);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (_dir, ledger) = open_temp().await;

        let mut entry = Entry::new("alice", "BTC_JPY", dec!(0.1), dec!(100));
        ledger.put(&entry).await.unwrap();
        entry.flip(chrono::Utc::now(), dec!(101), dec!(99)).unwrap();
        ledger.put(&entry).await.unwrap();

        assert_eq!(ledger.count().await.unwrap(), 1);
        assert_eq!(ledger.get(&entry.key()).await.unwrap(), entry);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, ledger) = open_temp().await;

        let err = ledger.get("nope").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let (_dir, ledger) = open_temp().await;

        let entry = Entry::new("alice", "BTC_JPY", dec!(0.1), dec!(100));
        tokio_test::assert_ok!(ledger.delete(&entry).await);

        ledger.put(&entry).await.unwrap();
        ledger.delete(&entry).await.unwrap();
        assert!(matches!(
            ledger.get(&entry.key()).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_scan_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        let a = Entry::new("alice", "BTC_JPY", dec!(0.1), dec!(100));
        let mut b = Entry::new("john", "ETH_JPY", dec!(2), dec!(3000));
        b.request_terminal();

        {
            let ledger = Ledger::open(&path).await.unwrap();
            ledger.put(&a).await.unwrap();
            ledger.put(&b).await.unwrap();
            ledger.close().await;
        }

        let ledger = Ledger::open(&path).await.unwrap();
        let mut entries = ledger.scan().await.unwrap();
        entries.sort_by_key(|e| e.trader.clone());

        assert_eq!(entries, vec![a, b]);
    }

    #[tokio::test]
    async fn test_scan_aborts_on_corrupt_record() {
        let (_dir, ledger) = open_temp().await;

        ledger
            .put(&Entry::new("alice", "BTC_JPY", dec!(0.1), dec!(100)))
            .await
            .unwrap();
        ledger.put_raw("broken", b"\x00\x01garbage").await.unwrap();

        match ledger.scan().await {
            Err(EngineError::DecodeError { id, .. }) => assert_eq!(id, "broken"),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_ledger_rejects_operations() {
        let (_dir, ledger) = open_temp().await;
        let entry = Entry::new("alice", "BTC_JPY", dec!(0.1), dec!(100));

        ledger.close().await;

        assert!(matches!(ledger.put(&entry).await, Err(EngineError::Closed)));
        assert!(matches!(ledger.delete(&entry).await, Err(EngineError::Closed)));
        assert!(matches!(ledger.get(&entry.key()).await, Err(EngineError::Closed)));
        assert!(matches!(ledger.scan().await, Err(EngineError::Closed)));
    }
}
