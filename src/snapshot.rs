// Snapshot codec: a self-contained JSON document holding a whole board

use crate::error::{BoardError, Result};
use crate::models::{Board, Column, Priority, Task};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Document format version written by `encode`
pub const SNAPSHOT_VERSION: u32 = 1;

fn current_version() -> u32 {
    SNAPSHOT_VERSION
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotDocument {
    #[serde(default = "current_version")]
    version: u32,
    columns: Vec<ColumnEntry>,
    tasks: Vec<TaskEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColumnEntry {
    id: String,
    title: String,
    #[serde(default)]
    position: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskEntry {
    id: String,
    column_id: String,
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    due_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    position: Option<usize>,
}

/// Capture a board as a transferable document
///
/// Column references are carried by value (`columnId`), so the document
/// stands alone.
pub fn encode(board: &Board) -> Value {
    let document = SnapshotDocument {
        version: SNAPSHOT_VERSION,
        columns: board
            .columns
            .iter()
            .map(|c| ColumnEntry {
                id: c.id.clone(),
                title: c.title.clone(),
                position: Some(c.position),
            })
            .collect(),
        tasks: board
            .tasks
            .iter()
            .map(|t| TaskEntry {
                id: t.id.clone(),
                column_id: t.column_id.clone(),
                title: t.title.clone(),
                description: t.description.clone(),
                priority: t.priority,
                due_date: t.due_date,
                created_at: t.created_at,
                position: Some(t.position),
            })
            .collect(),
    };
    // Plain structs of strings, numbers and timestamps always serialize
    serde_json::to_value(document).unwrap_or(Value::Null)
}

pub fn encode_to_string(board: &Board) -> String {
    encode(board).to_string()
}

/// Parse a document back into a board shape
///
/// Either the whole document is accepted or `Malformed` is returned. Tasks
/// whose `columnId` has no matching column are kept here; the import
/// reconciler drops them.
pub fn decode(document: &Value) -> Result<Board> {
    let document = SnapshotDocument::deserialize(document).map_err(|e| BoardError::malformed(e.to_string()))?;

    if document.version != SNAPSHOT_VERSION {
        return Err(BoardError::malformed(format!(
            "unsupported snapshot version {}",
            document.version
        )));
    }

    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(document.columns.len());
    for (index, entry) in document.columns.into_iter().enumerate() {
        require_text("column id", &entry.id)?;
        require_text("column title", &entry.title)?;
        if !seen.insert(entry.id.clone()) {
            return Err(BoardError::malformed(format!("duplicate column id {}", entry.id)));
        }
        columns.push(Column {
            id: entry.id,
            title: entry.title,
            position: entry.position.unwrap_or(index),
        });
    }

    let mut tasks = Vec::with_capacity(document.tasks.len());
    for (index, entry) in document.tasks.into_iter().enumerate() {
        require_text("task id", &entry.id)?;
        require_text("task title", &entry.title)?;
        tasks.push(Task {
            id: entry.id,
            column_id: entry.column_id,
            title: entry.title,
            description: entry.description,
            priority: entry.priority,
            due_date: entry.due_date,
            created_at: entry.created_at,
            position: entry.position.unwrap_or(index),
        });
    }

    Ok(Board::new(columns, tasks))
}

pub fn decode_str(text: &str) -> Result<Board> {
    let value: Value = serde_json::from_str(text).map_err(|e| BoardError::malformed(e.to_string()))?;
    decode(&value)
}

fn require_text(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BoardError::malformed(format!("{what} is empty")));
    }
    Ok(())
}
