// In-process exchange store

use super::{ExchangeStore, ShareEntry};
use crate::error::{BoardError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Entries held in a map behind a mutex; expiry is applied lazily on read
#[derive(Debug, Default)]
pub struct MemoryExchangeStore {
    entries: Mutex<HashMap<String, ShareEntry>>,
}

impl MemoryExchangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, ShareEntry>>> {
        self.entries
            .lock()
            .map_err(|_| BoardError::unavailable("exchange store lock poisoned"))
    }
}

impl ExchangeStore for MemoryExchangeStore {
    fn insert(&self, entry: ShareEntry) -> Result<()> {
        self.lock()?.insert(entry.code.clone(), entry);
        Ok(())
    }

    fn fetch(&self, code: &str, now: DateTime<Utc>) -> Result<Option<ShareEntry>> {
        let mut entries = self.lock()?;
        match entries.get(code) {
            Some(entry) if entry.is_expired(now) => {
                debug!(code, "Dropping expired exchange entry");
                entries.remove(code);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.clone())),
            None => Ok(None),
        }
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - entries.len())
    }
}
