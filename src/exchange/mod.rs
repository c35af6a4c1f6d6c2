// Short-lived exchange codes bound to board snapshots

pub mod memory;
pub mod sqlite;

pub use memory::MemoryExchangeStore;
pub use sqlite::SqliteExchangeStore;

use crate::SharedClock;
use crate::config::{ExchangeBackend, ExchangeConfig};
use crate::error::{BoardError, Result};
use crate::import::PendingImport;
use crate::snapshot;
use chrono::{DateTime, Duration, Utc};
use mockable::DefaultClock;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Length of every exchange code
pub const CODE_LENGTH: usize = 6;

/// Characters codes are drawn from
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Lifetime of an exchange code unless configured otherwise (30 minutes)
pub const DEFAULT_TTL_SECONDS: u64 = 1800;

/// A snapshot parked under a code until `expires_at`
#[derive(Debug, Clone, PartialEq)]
pub struct ShareEntry {
    pub code: String,
    pub snapshot: Value,
    pub expires_at: DateTime<Utc>,
}

impl ShareEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Backing storage for share entries
///
/// Shared across sessions, so implementations take `&self` and must be safe
/// to call from several threads. The code is the only partition key.
pub trait ExchangeStore: Send + Sync {
    /// Store an entry, silently replacing any entry with the same code
    fn insert(&self, entry: ShareEntry) -> Result<()>;

    /// Return the entry if it exists and has not expired at `now`.
    /// Expired entries found on the way are deleted.
    fn fetch(&self, code: &str, now: DateTime<Utc>) -> Result<Option<ShareEntry>>;

    /// Drop every entry expired at `now`, returning how many went
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// Fresh random code. Not guaranteed unique; collisions overwrite.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Canonical form of user-typed input: trimmed and uppercased.
/// `None` when the result is not exactly [`CODE_LENGTH`] characters.
pub fn normalize_code(input: &str) -> Option<String> {
    let code = input.trim().to_uppercase();
    (code.chars().count() == CODE_LENGTH).then_some(code)
}

/// Export/import entry point over a pluggable [`ExchangeStore`]
#[derive(Clone)]
pub struct Exchange {
    store: Arc<dyn ExchangeStore>,
    clock: SharedClock,
}

impl Exchange {
    pub fn new(store: Arc<dyn ExchangeStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Build the backend named in configuration
    pub fn from_config(config: &ExchangeConfig, store_path: &Path) -> eyre::Result<Self> {
        let store: Arc<dyn ExchangeStore> = match config.backend {
            ExchangeBackend::Memory => {
                warn!("Using in-memory exchange store; codes will not outlive this process");
                Arc::new(MemoryExchangeStore::new())
            }
            ExchangeBackend::Sqlite => {
                let path = config.db_path(store_path);
                debug!(path = ?path, "Opening SQLite exchange store");
                Arc::new(SqliteExchangeStore::open(&path)?)
            }
        };
        Ok(Self::new(store, Arc::new(DefaultClock)))
    }

    /// Park a snapshot and return the code that retrieves it
    ///
    /// Entries already expired are swept first so a long-lived backend
    /// does not grow without bound.
    pub fn put(&self, snapshot: &Value, ttl_seconds: u64) -> Result<String> {
        if ttl_seconds == 0 {
            return Err(BoardError::validation("Expiry must be at least one second."));
        }
        let ttl = i64::try_from(ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| BoardError::validation("Expiry is too far in the future."))?;

        let now = self.clock.utc();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| BoardError::validation("Expiry is too far in the future."))?;

        match self.store.purge_expired(now) {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "Swept expired exchange codes"),
            Err(e) => warn!(error = %e, "Failed to sweep expired exchange codes"),
        }

        let code = generate_code();
        self.store.insert(ShareEntry {
            code: code.clone(),
            snapshot: snapshot.clone(),
            expires_at,
        })?;

        info!(code = %code, %expires_at, "Created exchange code");
        Ok(code)
    }

    /// Fetch the snapshot behind a code
    ///
    /// Unknown and expired codes both yield `NotFound`. Input that does not
    /// normalize to a six character code is rejected without touching the
    /// store.
    pub fn get(&self, code: &str) -> Result<Value> {
        let code = normalize_code(code).ok_or_else(|| BoardError::validation("Code must be 6 characters long."))?;
        let entry = self.store.fetch(&code, self.clock.utc())?.ok_or(BoardError::NotFound)?;
        debug!(code = %code, "Resolved exchange code");
        Ok(entry.snapshot)
    }

    /// Fetch and decode, producing an import that still awaits confirmation.
    /// Has no side effects on any board.
    pub fn lookup(&self, code: &str) -> Result<PendingImport> {
        let document = self.get(code)?;
        let board = snapshot::decode(&document)?;
        let code = normalize_code(code).unwrap_or_default();
        Ok(PendingImport::new(code, board))
    }

    pub fn purge_expired(&self) -> Result<usize> {
        self.store.purge_expired(self.clock.utc())
    }
}

/// Wire envelope of export and import results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExchangeResponse {
    /// Envelope for the result of [`Exchange::put`]
    pub fn shared(result: Result<String>) -> Self {
        match result {
            Ok(code) => Self {
                success: true,
                code: Some(code),
                data: None,
                message: None,
            },
            Err(BoardError::StoreUnavailable(_)) => Self::failure("Failed to generate share code."),
            Err(e) => Self::failure(e.user_message()),
        }
    }

    /// Envelope for the result of [`Exchange::get`]
    pub fn fetched(result: Result<Value>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                code: None,
                data: Some(data),
                message: None,
            },
            Err(BoardError::StoreUnavailable(_)) => Self::failure("Failed to retrieve data."),
            Err(e) => Self::failure(e.user_message()),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: None,
            data: None,
            message: Some(message.into()),
        }
    }
}
