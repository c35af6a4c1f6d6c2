// JSONL file operations

use eyre::{Context, Result};
use fs2::FileExt;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Append records to a JSONL file under an exclusive lock, one per line
pub fn append_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context("Failed to open JSONL file for appending")?;

    // Lock is released when file is dropped
    file.lock_exclusive().context("Failed to acquire file lock")?;

    let mut buf = String::new();
    for record in records {
        buf.push_str(&serde_json::to_string(record)?);
        buf.push('\n');
    }
    file.write_all(buf.as_bytes())?;
    file.sync_all()?;

    Ok(())
}

/// Read all records from a JSONL file, returning latest version per ID
///
/// For records with duplicate IDs the one with the highest `updated_at` wins;
/// on equal timestamps the line written last wins. Unreadable or unparsable
/// lines are skipped with a warning.
pub fn read_jsonl_latest<T>(path: &Path) -> Result<HashMap<String, T>>
where
    T: DeserializeOwned + HasId + HasUpdatedAt,
{
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let file = File::open(path).context("Failed to open JSONL file")?;
    let reader = BufReader::new(file);
    let mut records: HashMap<String, T> = HashMap::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(file = ?path, line = line_num + 1, error = ?e, "Failed to read line, skipping");
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let record: T = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!(file = ?path, line = line_num + 1, error = ?e, "Failed to parse JSON, skipping");
                continue;
            }
        };

        let Some(id) = record.id() else {
            warn!(file = ?path, line = line_num + 1, "Record without id, skipping");
            continue;
        };

        let newer = records
            .get(&id)
            .is_none_or(|existing| record.updated_at() >= existing.updated_at());
        if newer {
            records.insert(id, record);
        }
    }

    debug!(file = ?path, count = records.len(), "Loaded latest records from JSONL");

    Ok(records)
}

/// Trait for types that have an ID field
pub trait HasId {
    fn id(&self) -> Option<String>;
}

/// Trait for types that have an updated_at timestamp
pub trait HasUpdatedAt {
    fn updated_at(&self) -> i64;
}

impl HasId for Value {
    fn id(&self) -> Option<String> {
        self.get("id").and_then(|v| v.as_str()).map(str::to_string)
    }
}

impl HasUpdatedAt for Value {
    fn updated_at(&self) -> i64 {
        self.get("updated_at").and_then(|v| v.as_i64()).unwrap_or(0)
    }
}

/// True for the tombstone lines written on delete
pub fn is_tombstone(value: &Value) -> bool {
    value.get("deleted").and_then(|v| v.as_bool()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_append_jsonl() {
        let temp = TempDir::new().unwrap();
        let jsonl_path = temp.path().join("tasks.jsonl");

        let rows = vec![
            json!({"id": "t1", "title": "Write docs", "updated_at": 1}),
            json!({"id": "t2", "title": "Ship", "updated_at": 1}),
        ];
        append_jsonl(&jsonl_path, &rows).unwrap();

        let content = fs::read_to_string(&jsonl_path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("\"id\":\"t1\""));
        assert!(content.contains("\"title\":\"Ship\""));
    }

    #[test]
    fn test_read_jsonl_latest() {
        let temp = TempDir::new().unwrap();
        let jsonl_path = temp.path().join("tasks.jsonl");

        append_jsonl(&jsonl_path, &[json!({"id": "t1", "position": 0, "updated_at": 2000})]).unwrap();
        // Older version written later must not win
        append_jsonl(&jsonl_path, &[json!({"id": "t1", "position": 5, "updated_at": 1000})]).unwrap();

        let records: HashMap<String, Value> = read_jsonl_latest(&jsonl_path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records["t1"]["position"], 0);
    }

    #[test]
    fn test_read_jsonl_equal_timestamps_last_line_wins() {
        let temp = TempDir::new().unwrap();
        let jsonl_path = temp.path().join("tasks.jsonl");

        append_jsonl(
            &jsonl_path,
            &[
                json!({"id": "t1", "column_id": "todo", "updated_at": 1000}),
                json!({"id": "t1", "column_id": "done", "updated_at": 1000}),
            ],
        )
        .unwrap();

        let records: HashMap<String, Value> = read_jsonl_latest(&jsonl_path).unwrap();
        assert_eq!(records["t1"]["column_id"], "done");
    }

    #[test]
    fn test_read_jsonl_nonexistent_file() {
        let temp = TempDir::new().unwrap();
        let records: HashMap<String, Value> = read_jsonl_latest(&temp.path().join("nope.jsonl")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_read_jsonl_skips_malformed_and_idless_lines() {
        let temp = TempDir::new().unwrap();
        let jsonl_path = temp.path().join("tasks.jsonl");

        fs::write(
            &jsonl_path,
            "{\"id\":\"t1\",\"updated_at\":1}\n{malformed json}\n{\"title\":\"no id\"}\n\n{\"id\":\"t2\",\"updated_at\":1}\n",
        )
        .unwrap();

        let records: HashMap<String, Value> = read_jsonl_latest(&jsonl_path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.contains_key("t1"));
        assert!(records.contains_key("t2"));
    }

    #[test]
    fn test_is_tombstone() {
        assert!(is_tombstone(&json!({"id": "t1", "deleted": true})));
        assert!(!is_tombstone(&json!({"id": "t1"})));
    }
}
