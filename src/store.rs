// Durable record store: JSONL files are the source of truth, SQLite is the query cache

use crate::filter::Filter;
use crate::jsonl;
use crate::record::Record;
use eyre::{Context, Result, eyre};
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CURRENT_VERSION: u32 = 1;

/// Name of the store directory created under the store path
pub const STORE_DIR: &str = ".taskboard";

/// Generic persistent store with SQLite cache and JSONL source of truth
pub struct Store {
    base_path: PathBuf,
    db: Connection,
    resynced: bool,
}

impl Store {
    /// Open or create a store at the given path
    ///
    /// The store lives in a `.taskboard` subdirectory of the given path. If any
    /// JSONL file changed since the last sync the SQLite cache is rebuilt;
    /// callers then need `rebuild_indexes::<T>()` for their record types.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref().join(STORE_DIR);

        fs::create_dir_all(&base_path).context("Failed to create store directory")?;

        let db_path = base_path.join("taskboard.db");
        let db = Connection::open(&db_path).context("Failed to open SQLite database")?;

        let mut store = Self {
            base_path,
            db,
            resynced: false,
        };

        store.create_schema()?;
        store.create_gitignore()?;
        store.write_version()?;

        if store.is_stale()? {
            info!("Database is stale, syncing from JSONL files");
            store.sync()?;
            store.resynced = true;
        }

        Ok(store)
    }

    /// Get the base path of this store
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get a reference to the SQLite database connection
    pub fn db(&self) -> &Connection {
        &self.db
    }

    /// Whether `open` had to rebuild the cache from JSONL
    pub fn was_resynced(&self) -> bool {
        self.resynced
    }

    fn create_schema(&self) -> Result<()> {
        debug!("Creating database schema");

        self.db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection);
            CREATE INDEX IF NOT EXISTS idx_records_updated_at ON records(collection, updated_at);

            CREATE TABLE IF NOT EXISTS record_indexes (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                field_name TEXT NOT NULL,
                field_value TEXT NOT NULL,
                PRIMARY KEY (collection, id, field_name)
            );

            CREATE INDEX IF NOT EXISTS idx_record_indexes_lookup ON record_indexes(collection, field_name, field_value);

            -- Sync metadata for staleness detection
            CREATE TABLE IF NOT EXISTS sync_metadata (
                collection TEXT PRIMARY KEY,
                last_sync_time INTEGER NOT NULL,
                file_mtime INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    fn create_gitignore(&self) -> Result<()> {
        let gitignore_path = self.base_path.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(
                gitignore_path,
                "taskboard.db\ntaskboard.db-shm\ntaskboard.db-wal\nexchange.db\n",
            )?;
        }
        Ok(())
    }

    fn write_version(&self) -> Result<()> {
        let version_path = self.base_path.join(".version");
        if !version_path.exists() {
            fs::write(version_path, CURRENT_VERSION.to_string())?;
        }
        Ok(())
    }

    /// Check if database needs syncing from JSONL
    ///
    /// Returns true if any JSONL file has been modified since the last sync,
    /// or if there are JSONL files that have never been synced.
    pub fn is_stale(&self) -> Result<bool> {
        for (collection, path) in self.jsonl_files()? {
            let file_mtime = file_mtime_secs(&path)?;

            let stored_mtime: Option<i64> = self
                .db
                .query_row(
                    "SELECT file_mtime FROM sync_metadata WHERE collection = ?1",
                    [&collection],
                    |row| row.get(0),
                )
                .optional()?;

            match stored_mtime {
                None => return Ok(true),
                Some(mtime) if file_mtime > mtime => return Ok(true),
                _ => continue,
            }
        }

        Ok(false)
    }

    // ========================================================================
    // CRUD API
    // ========================================================================

    /// Create or replace a record
    pub fn create<T: Record>(&mut self, record: T) -> Result<String> {
        let id = record.id().to_string();
        self.create_many(std::slice::from_ref(&record))?;
        Ok(id)
    }

    /// Create or replace several records of one collection
    ///
    /// All lines are appended to JSONL in one locked write, then the cache
    /// is updated in a single transaction.
    pub fn create_many<T: Record>(&mut self, records: &[T]) -> Result<usize> {
        let collection = T::collection_name();
        Self::validate_collection_name(collection)?;
        for record in records {
            Self::validate_id(record.id())?;
        }
        if records.is_empty() {
            return Ok(0);
        }

        jsonl::append_jsonl(&self.jsonl_path(collection), records)?;

        let tx = self.db.transaction()?;
        for record in records {
            let data_json = serde_json::to_string(record).context("Failed to serialize record")?;
            tx.execute(
                "INSERT OR REPLACE INTO records (collection, id, data_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![collection, record.id(), data_json, record.updated_at()],
            )?;
            Self::update_indexes_tx(&tx, collection, record.id(), &record.indexed_fields())?;
        }
        tx.commit()?;

        debug!(collection, count = records.len(), "create_many: committed");
        Ok(records.len())
    }

    /// Get a record by ID
    pub fn get<T: Record>(&self, id: &str) -> Result<Option<T>> {
        let collection = T::collection_name();

        let json: Option<String> = self
            .db
            .query_row(
                "SELECT data_json FROM records WHERE collection = ?1 AND id = ?2",
                rusqlite::params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => {
                let record: T = serde_json::from_str(&json).context("Failed to deserialize record from database")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Update a record (same as create)
    pub fn update<T: Record>(&mut self, record: T) -> Result<()> {
        self.create(record)?;
        Ok(())
    }

    /// Delete a record
    pub fn delete<T: Record>(&mut self, id: &str) -> Result<()> {
        self.delete_many::<T>(&[id.to_string()])?;
        Ok(())
    }

    /// Delete several records of one collection, writing one tombstone each
    pub fn delete_many<T: Record>(&mut self, ids: &[String]) -> Result<usize> {
        let collection = T::collection_name();
        if ids.is_empty() {
            return Ok(0);
        }

        let deleted_at = now_ms();
        let tombstones: Vec<Value> = ids
            .iter()
            .map(|id| serde_json::json!({ "id": id, "deleted": true, "updated_at": deleted_at }))
            .collect();
        jsonl::append_jsonl(&self.jsonl_path(collection), &tombstones)?;

        let tx = self.db.transaction()?;
        let mut removed = 0;
        for id in ids {
            tx.execute(
                "DELETE FROM record_indexes WHERE collection = ?1 AND id = ?2",
                rusqlite::params![collection, id],
            )?;
            removed += tx.execute(
                "DELETE FROM records WHERE collection = ?1 AND id = ?2",
                rusqlite::params![collection, id],
            )?;
        }
        tx.commit()?;

        debug!(collection, requested = ids.len(), removed, "delete_many: committed");
        Ok(removed)
    }

    /// List records of a collection, optionally restricted to those whose
    /// indexed fields match every filter
    pub fn list<T: Record>(&self, filters: &[Filter]) -> Result<Vec<T>> {
        let collection = T::collection_name();

        let mut query = String::from(
            "SELECT r.data_json
             FROM records r
             WHERE r.collection = ?1",
        );

        for (i, filter) in filters.iter().enumerate() {
            Self::validate_field_name(&filter.field)?;

            query.push_str(&format!(
                " AND EXISTS (
                    SELECT 1 FROM record_indexes idx{i}
                    WHERE idx{i}.collection = r.collection
                      AND idx{i}.id = r.id
                      AND idx{i}.field_name = ?{name_param}
                      AND idx{i}.field_value = ?{value_param})",
                name_param = 2 * i + 2,
                value_param = 2 * i + 3,
            ));
        }

        query.push_str(" ORDER BY r.updated_at DESC");

        let mut params: Vec<&dyn rusqlite::ToSql> = vec![&collection];
        for filter in filters {
            params.push(&filter.field);
            params.push(&filter.value);
        }

        let mut stmt = self.db.prepare(&query)?;
        let rows = stmt.query_map(params.as_slice(), |row| row.get::<_, String>(0))?;
        let mut results = Vec::new();
        for row_result in rows {
            let data_json = row_result?;
            let record: T = serde_json::from_str(&data_json).context("Failed to deserialize record")?;
            results.push(record);
        }

        Ok(results)
    }

    // ========================================================================
    // Helper methods
    // ========================================================================

    fn jsonl_path(&self, collection: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", collection))
    }

    fn jsonl_files(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("jsonl") {
                continue;
            }
            let collection = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| eyre!("Invalid JSONL filename: {:?}", path))?
                .to_string();
            files.push((collection, path));
        }
        Ok(files)
    }

    fn update_indexes_tx(
        tx: &rusqlite::Transaction,
        collection: &str,
        id: &str,
        fields: &HashMap<String, String>,
    ) -> Result<()> {
        tx.execute(
            "DELETE FROM record_indexes WHERE collection = ?1 AND id = ?2",
            rusqlite::params![collection, id],
        )?;

        for (field_name, value) in fields {
            Self::validate_field_name(field_name)?;

            tx.execute(
                "INSERT INTO record_indexes (collection, id, field_name, field_value) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![collection, id, field_name, value],
            )?;
        }

        Ok(())
    }

    fn validate_collection_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(eyre!("Collection name cannot be empty"));
        }
        if name.len() > 64 {
            return Err(eyre!("Collection name too long: {} (max 64 chars)", name));
        }
        if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            return Err(eyre!(
                "Invalid collection name: {} (must be alphanumeric with _/-)",
                name
            ));
        }
        Ok(())
    }

    fn validate_field_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(eyre!("Field name cannot be empty"));
        }
        if name.len() > 64 {
            return Err(eyre!("Field name too long: {} (max 64 chars)", name));
        }
        if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(eyre!("Invalid field name: {} (must be alphanumeric with _)", name));
        }
        Ok(())
    }

    fn validate_id(id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(eyre!("Record ID cannot be empty or whitespace-only"));
        }
        if id.len() > 256 {
            return Err(eyre!("Record ID too long: {} chars (max 256)", id.len()));
        }
        Ok(())
    }

    // ========================================================================
    // Sync operations
    // ========================================================================

    /// Rebuild the SQLite cache from JSONL files
    ///
    /// After sync, call `rebuild_indexes::<T>()` for each record type to restore indexes.
    pub fn sync(&mut self) -> Result<()> {
        info!("Syncing database from JSONL files");

        let files = self.jsonl_files()?;

        let tx = self.db.transaction()?;
        tx.execute("DELETE FROM record_indexes", [])?;
        tx.execute("DELETE FROM records", [])?;
        tx.execute("DELETE FROM sync_metadata", [])?;

        for (collection, path) in files {
            debug!("Syncing collection: {}", collection);

            let file_mtime = file_mtime_secs(&path)?;
            let records: HashMap<String, Value> = jsonl::read_jsonl_latest(&path)?;

            for (id, record) in records {
                if jsonl::is_tombstone(&record) {
                    continue;
                }

                let data_json = serde_json::to_string(&record)?;
                let updated_at = record.get("updated_at").and_then(|v| v.as_i64()).unwrap_or(0);

                tx.execute(
                    "INSERT OR REPLACE INTO records (collection, id, data_json, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![&collection, &id, data_json, updated_at],
                )?;
            }

            tx.execute(
                "INSERT OR REPLACE INTO sync_metadata (collection, last_sync_time, file_mtime)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![&collection, now_ms(), file_mtime],
            )?;
        }

        tx.commit()?;
        info!("Sync complete");
        Ok(())
    }

    /// Rebuild indexes for a specific record type after sync
    ///
    /// Records in the collection that don't deserialize to `T` are skipped
    /// with a warning. Returns the number of records indexed.
    pub fn rebuild_indexes<T: Record>(&mut self) -> Result<usize> {
        let collection = T::collection_name();

        let records_data: Vec<(String, String)> = {
            let mut stmt = self
                .db
                .prepare("SELECT id, data_json FROM records WHERE collection = ?1")?;

            let rows = stmt.query_map([collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let tx = self.db.transaction()?;
        let mut count = 0;

        for (id, data_json) in records_data {
            let record: T = match serde_json::from_str(&data_json) {
                Ok(r) => r,
                Err(e) => {
                    warn!(collection, id = &id, error = ?e, "Skipping record that doesn't match type");
                    continue;
                }
            };

            Self::update_indexes_tx(&tx, collection, &id, &record.indexed_fields())?;
            count += 1;
        }

        tx.commit()?;
        debug!(collection, count, "Rebuilt indexes for collection");
        Ok(count)
    }
}

fn file_mtime_secs(path: &Path) -> Result<i64> {
    Ok(fs::metadata(path)?
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0))
}

/// Current timestamp in milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Card {
        id: String,
        lane: String,
        rank: i64,
        owner: String,
        updated_at: i64,
    }

    impl Record for Card {
        fn id(&self) -> &str {
            &self.id
        }

        fn updated_at(&self) -> i64 {
            self.updated_at
        }

        fn collection_name() -> &'static str {
            "cards"
        }

        fn indexed_fields(&self) -> HashMap<String, String> {
            let mut fields = HashMap::new();
            fields.insert("lane".to_string(), self.lane.clone());
            fields.insert("owner".to_string(), self.owner.clone());
            fields
        }
    }

    fn card(id: &str, lane: &str, rank: i64) -> Card {
        Card {
            id: id.to_string(),
            lane: lane.to_string(),
            rank,
            owner: "ana".to_string(),
            updated_at: now_ms(),
        }
    }

    #[test]
    fn test_store_open_creates_directory() {
        let temp = TempDir::new().unwrap();

        let store = Store::open(temp.path()).unwrap();
        let store_path = temp.path().join(STORE_DIR);
        assert_eq!(store.base_path(), store_path.as_path());
        assert!(store_path.join("taskboard.db").exists());
        assert!(store_path.join(".gitignore").exists());
        assert!(store_path.join(".version").exists());
        assert!(!store.was_resynced());
    }

    #[test]
    fn test_create_and_get() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();

        let id = store.create(card("c1", "todo", 0)).unwrap();
        assert_eq!(id, "c1");
        assert!(temp.path().join(".taskboard/cards.jsonl").exists());

        let got: Card = store.get("c1").unwrap().unwrap();
        assert_eq!(got.lane, "todo");

        let missing: Option<Card> = store.get("nope").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_update_replaces_indexes() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();

        store.create(card("c1", "todo", 0)).unwrap();
        store.update(card("c1", "done", 4)).unwrap();

        let todo: Vec<Card> = store.list(&[Filter::eq("lane", "todo")]).unwrap();
        assert!(todo.is_empty());
        let done: Vec<Card> = store.list(&[Filter::eq("lane", "done")]).unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].rank, 4);
    }

    #[test]
    fn test_delete_writes_tombstone() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();

        store.create(card("c1", "todo", 0)).unwrap();
        store.delete::<Card>("c1").unwrap();

        let got: Option<Card> = store.get("c1").unwrap();
        assert!(got.is_none());

        let content = fs::read_to_string(temp.path().join(".taskboard/cards.jsonl")).unwrap();
        assert!(content.contains("\"deleted\":true"));
    }

    #[test]
    fn test_bulk_create_and_delete() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();

        let cards: Vec<Card> = (0..5).map(|i| card(&format!("c{i}"), "todo", i)).collect();
        assert_eq!(store.create_many(&cards).unwrap(), 5);

        let ids = vec!["c0".to_string(), "c3".to_string(), "missing".to_string()];
        assert_eq!(store.delete_many::<Card>(&ids).unwrap(), 2);

        let left: Vec<Card> = store.list(&[]).unwrap();
        assert_eq!(left.len(), 3);
        assert_eq!(store.create_many::<Card>(&[]).unwrap(), 0);
    }

    #[test]
    fn test_list_with_filters() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();

        let mut theirs = card("c1", "todo", 0);
        theirs.owner = "bo".to_string();
        store.create(theirs).unwrap();
        store.create(card("c2", "todo", 1)).unwrap();
        store.create(card("c3", "doing", 0)).unwrap();

        let todo: Vec<Card> = store.list(&[Filter::eq("lane", "todo")]).unwrap();
        assert_eq!(todo.len(), 2);

        let filters = vec![Filter::eq("lane", "todo"), Filter::eq("owner", "ana")];
        let mine: Vec<Card> = store.list(&filters).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, "c2");

        // values match exactly, never as substrings
        let partial: Vec<Card> = store.list(&[Filter::eq("lane", "do")]).unwrap();
        assert!(partial.is_empty());

        assert!(store.list::<Card>(&[Filter::eq("bad field", "x")]).is_err());
    }

    #[test]
    fn test_sync_and_rebuild_from_jsonl() {
        let temp = TempDir::new().unwrap();
        {
            let mut store = Store::open(temp.path()).unwrap();
            store.create(card("c1", "todo", 0)).unwrap();
            store.create(card("c2", "todo", 1)).unwrap();
            store.delete::<Card>("c2").unwrap();
        }

        // Drop the cache; JSONL alone must restore state
        fs::remove_file(temp.path().join(".taskboard/taskboard.db")).unwrap();

        let mut store = Store::open(temp.path()).unwrap();
        assert!(store.was_resynced());
        assert_eq!(store.rebuild_indexes::<Card>().unwrap(), 1);

        let todo: Vec<Card> = store.list(&[Filter::eq("lane", "todo")]).unwrap();
        assert_eq!(todo.len(), 1);
        assert_eq!(todo[0].id, "c1");
        assert!(!store.is_stale().unwrap());
    }

    #[test]
    fn test_validation_collection_name() {
        assert!(Store::validate_collection_name("tasks").is_ok());
        assert!(Store::validate_collection_name("share-entries").is_ok());

        assert!(Store::validate_collection_name("bad/name").is_err());
        assert!(Store::validate_collection_name("").is_err());
        assert!(Store::validate_collection_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validation_field_name_and_id() {
        assert!(Store::validate_field_name("column_id").is_ok());
        assert!(Store::validate_field_name("column-id").is_err());
        assert!(Store::validate_field_name("").is_err());

        assert!(Store::validate_id("  ").is_err());
        assert!(Store::validate_id(&"x".repeat(257)).is_err());
        assert!(Store::validate_id("task-1").is_ok());
    }
}
