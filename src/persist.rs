// Record store collaborator: durable persistence of a board

use crate::board::normalize;
use crate::error::{BoardError, Result};
use crate::filter::Filter;
use crate::models::{Board, Column, Task, TaskPatch};
use crate::record::Record;
use crate::store::{Store, now_ms};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Durable side of a board
///
/// Implementations never panic or throw across this boundary; every failure
/// comes back as [`BoardError::StoreUnavailable`] (or `NotFound` for an
/// unknown task id) and the caller decides whether it is fatal.
pub trait RecordStore {
    /// Load the persisted board, `None` when nothing was ever saved
    fn load_board(&mut self) -> Result<Option<Board>>;

    fn save_columns(&mut self, columns: &[Column]) -> Result<()>;

    fn create_task(&mut self, task: &Task) -> Result<()>;

    fn update_task(&mut self, id: &str, patch: &TaskPatch) -> Result<()>;

    fn delete_task(&mut self, id: &str) -> Result<()>;

    /// Durable result of one drag gesture
    fn persist_position(&mut self, id: &str, column_id: &str, position: usize) -> Result<()> {
        self.update_task(id, &TaskPatch::placement(column_id, position))
    }

    /// Persist the full order of a column
    fn persist_column_order(&mut self, column_id: &str, task_ids: &[String]) -> Result<()> {
        for (position, id) in task_ids.iter().enumerate() {
            self.update_task(id, &TaskPatch::placement(column_id, position))?;
        }
        Ok(())
    }

    /// Bulk delete everything in `old`, then bulk insert everything in `new`
    fn replace_board(&mut self, old: &Board, new: &Board) -> Result<()>;
}

/// Persisted form of a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(flatten)]
    pub task: Task,
    pub updated_at: i64,
}

impl TaskRecord {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            updated_at: now_ms(),
        }
    }
}

impl Record for TaskRecord {
    fn id(&self) -> &str {
        &self.task.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "tasks"
    }

    fn indexed_fields(&self) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        fields.insert("column_id".to_string(), self.task.column_id.clone());
        fields.insert("priority".to_string(), self.task.priority.as_str().to_string());
        fields
    }
}

/// Persisted form of a column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnRecord {
    #[serde(flatten)]
    pub column: Column,
    pub updated_at: i64,
}

impl ColumnRecord {
    pub fn new(column: Column) -> Self {
        Self {
            column,
            updated_at: now_ms(),
        }
    }
}

impl Record for ColumnRecord {
    fn id(&self) -> &str {
        &self.column.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "columns"
    }
}

/// Open the store under `path` with indexes ready for board queries
pub fn open_board_store<P: AsRef<Path>>(path: P) -> eyre::Result<Store> {
    let mut store = Store::open(path)?;
    if store.was_resynced() {
        let tasks = store.rebuild_indexes::<TaskRecord>()?;
        let columns = store.rebuild_indexes::<ColumnRecord>()?;
        info!(tasks, columns, "Rebuilt board indexes after sync");
    }
    Ok(store)
}

impl Store {
    /// Stored tasks of one column in their persisted order
    fn column_records(&self, column_id: &str) -> Result<Vec<TaskRecord>> {
        let mut records: Vec<TaskRecord> = self.list(&[Filter::eq("column_id", column_id)])?;
        records.sort_by(|a, b| {
            (a.task.position, a.task.created_at).cmp(&(b.task.position, b.task.created_at))
        });
        Ok(records)
    }
}

/// Give each record its index as position, keeping only those that changed
fn renumber(records: Vec<TaskRecord>, column_id: &str, changed: &mut Vec<TaskRecord>) {
    let now = now_ms();
    for (position, mut record) in records.into_iter().enumerate() {
        if record.task.position == position && record.task.column_id == column_id {
            continue;
        }
        TaskPatch::placement(column_id, position).apply(&mut record.task);
        record.updated_at = now;
        changed.push(record);
    }
}

impl RecordStore for Store {
    fn load_board(&mut self) -> Result<Option<Board>> {
        let columns: Vec<ColumnRecord> = self.list(&[])?;
        if columns.is_empty() {
            return Ok(None);
        }
        let tasks: Vec<TaskRecord> = self.list(&[])?;

        let known: HashSet<&str> = columns.iter().map(|c| c.column.id.as_str()).collect();
        let (tasks, orphans): (Vec<Task>, Vec<Task>) = tasks
            .into_iter()
            .map(|r| r.task)
            .partition(|t| known.contains(t.column_id.as_str()));
        if !orphans.is_empty() {
            warn!(count = orphans.len(), "Ignoring persisted tasks whose column no longer exists");
        }

        let mut board = Board::new(columns.into_iter().map(|r| r.column).collect(), tasks);
        normalize(&mut board);
        debug!(columns = board.columns.len(), tasks = board.tasks.len(), "Loaded board");
        Ok(Some(board))
    }

    fn save_columns(&mut self, columns: &[Column]) -> Result<()> {
        let records: Vec<ColumnRecord> = columns.iter().cloned().map(ColumnRecord::new).collect();
        self.create_many(&records)?;
        Ok(())
    }

    fn create_task(&mut self, task: &Task) -> Result<()> {
        self.create(TaskRecord::new(task.clone()))?;
        Ok(())
    }

    fn update_task(&mut self, id: &str, patch: &TaskPatch) -> Result<()> {
        let mut record: TaskRecord = self.get(id)?.ok_or(BoardError::NotFound)?;
        patch.apply(&mut record.task);
        record.updated_at = now_ms();
        self.update(record)?;
        Ok(())
    }

    fn delete_task(&mut self, id: &str) -> Result<()> {
        let record: Option<TaskRecord> = self.get(id)?;
        self.delete::<TaskRecord>(id)?;

        // Close the gap so stored positions keep matching the live board
        if let Some(record) = record {
            let column_id = record.task.column_id;
            let mut changed = Vec::new();
            renumber(self.column_records(&column_id)?, &column_id, &mut changed);
            self.create_many(&changed)?;
        }
        Ok(())
    }

    /// Splice the task into its new slot and renumber the affected columns,
    /// so the stored order survives a reload without relying on tie-breaks
    fn persist_position(&mut self, id: &str, column_id: &str, position: usize) -> Result<()> {
        let moved: TaskRecord = self.get(id)?.ok_or(BoardError::NotFound)?;
        let source = moved.task.column_id.clone();

        let mut destination: Vec<TaskRecord> = self
            .column_records(column_id)?
            .into_iter()
            .filter(|r| r.task.id != id)
            .collect();
        let slot = position.min(destination.len());
        destination.insert(slot, moved);

        let mut changed = Vec::new();
        renumber(destination, column_id, &mut changed);
        if source != column_id {
            let remaining: Vec<TaskRecord> = self
                .column_records(&source)?
                .into_iter()
                .filter(|r| r.task.id != id)
                .collect();
            renumber(remaining, &source, &mut changed);
        }

        let written = self.create_many(&changed)?;
        debug!(task_id = id, column_id, position = slot, written, "Persisted drag placement");
        Ok(())
    }

    fn persist_column_order(&mut self, column_id: &str, task_ids: &[String]) -> Result<()> {
        let mut records = Vec::with_capacity(task_ids.len());
        for (position, id) in task_ids.iter().enumerate() {
            let mut record: TaskRecord = self.get(id)?.ok_or(BoardError::NotFound)?;
            TaskPatch::placement(column_id, position).apply(&mut record.task);
            record.updated_at = now_ms();
            records.push(record);
        }
        self.create_many(&records)?;
        Ok(())
    }

    fn replace_board(&mut self, old: &Board, new: &Board) -> Result<()> {
        let old_tasks: Vec<String> = old.tasks.iter().map(|t| t.id.clone()).collect();
        let old_columns: Vec<String> = old.columns.iter().map(|c| c.id.clone()).collect();
        self.delete_many::<TaskRecord>(&old_tasks)?;
        self.delete_many::<ColumnRecord>(&old_columns)?;

        let columns: Vec<ColumnRecord> = new.columns.iter().cloned().map(ColumnRecord::new).collect();
        let tasks: Vec<TaskRecord> = new.tasks.iter().cloned().map(TaskRecord::new).collect();
        self.create_many(&columns)?;
        self.create_many(&tasks)?;

        info!(
            removed_tasks = old_tasks.len(),
            removed_columns = old_columns.len(),
            columns = columns.len(),
            tasks = tasks.len(),
            "Replaced persisted board"
        );
        Ok(())
    }
}
