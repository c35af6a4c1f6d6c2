// SQLite-backed exchange store, shared by every process pointing at the same file

use super::{ExchangeStore, ShareEntry};
use crate::error::{BoardError, Result};
use chrono::{DateTime, Utc};
use eyre::Context;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

pub struct SqliteExchangeStore {
    db: Mutex<Connection>,
}

impl SqliteExchangeStore {
    /// Open or create the exchange database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> eyre::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create exchange directory")?;
        }
        let db = Connection::open(path).context("Failed to open exchange database")?;
        Self::with_connection(db)
    }

    pub fn open_in_memory() -> eyre::Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory exchange database")?;
        Self::with_connection(db)
    }

    fn with_connection(db: Connection) -> eyre::Result<Self> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS share_entries (
                code TEXT PRIMARY KEY,
                snapshot_json TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_share_entries_expires_at ON share_entries(expires_at);
            "#,
        )
        .context("Failed to create exchange schema")?;

        Ok(Self { db: Mutex::new(db) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| BoardError::unavailable("exchange database lock poisoned"))
    }
}

impl ExchangeStore for SqliteExchangeStore {
    fn insert(&self, entry: ShareEntry) -> Result<()> {
        let snapshot_json = serde_json::to_string(&entry.snapshot).map_err(BoardError::unavailable)?;
        self.lock()?.execute(
            "INSERT OR REPLACE INTO share_entries (code, snapshot_json, expires_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![entry.code, snapshot_json, entry.expires_at.timestamp_millis()],
        )?;
        Ok(())
    }

    fn fetch(&self, code: &str, now: DateTime<Utc>) -> Result<Option<ShareEntry>> {
        let db = self.lock()?;
        let now_ms = now.timestamp_millis();

        let removed = db.execute(
            "DELETE FROM share_entries WHERE code = ?1 AND expires_at <= ?2",
            rusqlite::params![code, now_ms],
        )?;
        if removed > 0 {
            debug!(code, "Dropped expired exchange entry");
            return Ok(None);
        }

        let row: Option<(String, i64)> = db
            .query_row(
                "SELECT snapshot_json, expires_at FROM share_entries WHERE code = ?1",
                rusqlite::params![code],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((snapshot_json, expires_ms)) = row else {
            return Ok(None);
        };

        // A row written by something other than `insert` is reported as such
        let snapshot: Value = serde_json::from_str(&snapshot_json).map_err(|e| BoardError::malformed(e.to_string()))?;
        let expires_at = DateTime::from_timestamp_millis(expires_ms)
            .ok_or_else(|| BoardError::unavailable(format!("invalid expiry {expires_ms} for {code}")))?;

        Ok(Some(ShareEntry {
            code: code.to_string(),
            snapshot,
            expires_at,
        }))
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let removed = self.lock()?.execute(
            "DELETE FROM share_entries WHERE expires_at <= ?1",
            rusqlite::params![now.timestamp_millis()],
        )?;
        if removed > 0 {
            debug!(removed, "Purged expired exchange entries");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap()
    }

    fn entry(code: &str, expires_at: DateTime<Utc>) -> ShareEntry {
        ShareEntry {
            code: code.to_string(),
            snapshot: json!({"columns": [{"id": "todo", "title": "To Do"}], "tasks": []}),
            expires_at,
        }
    }

    #[test]
    fn test_insert_and_fetch() {
        let store = SqliteExchangeStore::open_in_memory().unwrap();
        let original = entry("AB12CD", now() + Duration::minutes(30));
        store.insert(original.clone()).unwrap();

        assert_eq!(store.fetch("AB12CD", now()).unwrap(), Some(original));
        assert_eq!(store.fetch("ZZZZZZ", now()).unwrap(), None);
    }

    #[test]
    fn test_expired_entry_deleted_on_read() {
        let store = SqliteExchangeStore::open_in_memory().unwrap();
        store.insert(entry("AB12CD", now() + Duration::seconds(1))).unwrap();

        let later = now() + Duration::seconds(2);
        assert_eq!(store.fetch("AB12CD", later).unwrap(), None);
        // Gone for good, even for a clock that moved backwards
        assert_eq!(store.fetch("AB12CD", now()).unwrap(), None);
    }

    #[test]
    fn test_insert_or_replace() {
        let store = SqliteExchangeStore::open_in_memory().unwrap();
        store.insert(entry("AB12CD", now() + Duration::seconds(5))).unwrap();
        let mut newer = entry("AB12CD", now() + Duration::hours(1));
        newer.snapshot = json!({"columns": [], "tasks": []});
        store.insert(newer.clone()).unwrap();

        assert_eq!(store.fetch("AB12CD", now() + Duration::minutes(1)).unwrap(), Some(newer));
    }

    #[test]
    fn test_purge_expired() {
        let store = SqliteExchangeStore::open_in_memory().unwrap();
        store.insert(entry("AAAAAA", now() - Duration::seconds(1))).unwrap();
        store.insert(entry("BBBBBB", now())).unwrap();
        store.insert(entry("CCCCCC", now() + Duration::seconds(1))).unwrap();

        assert_eq!(store.purge_expired(now()).unwrap(), 2);
        assert!(store.fetch("CCCCCC", now()).unwrap().is_some());
    }

    #[test]
    fn test_entries_survive_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/exchange.db");

        let store = SqliteExchangeStore::open(&path).unwrap();
        store.insert(entry("AB12CD", now() + Duration::minutes(30))).unwrap();
        drop(store);

        let reopened = SqliteExchangeStore::open(&path).unwrap();
        assert!(reopened.fetch("AB12CD", now()).unwrap().is_some());
    }
}
