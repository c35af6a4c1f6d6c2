// One owner's board: in-memory state, drag gestures and durable writes

use crate::SharedClock;
use crate::board::BoardState;
use crate::error::{BoardError, Result};
use crate::exchange::Exchange;
use crate::import::{self, PendingImport};
use crate::models::{Board, Column, Priority, Task, TaskEdit, TaskPatch, new_id};
use crate::persist::RecordStore;
use crate::reorder::{DragTarget, Placement, ReorderEngine};
use crate::snapshot;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Fields of a task being created
#[derive(Debug, Clone)]
pub struct NewTask {
    pub column_id: String,
    pub title: String,
    pub priority: Priority,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn new(column_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            column_id: column_id.into(),
            title: title.into(),
            priority: Priority::Medium,
            description: None,
            due_date: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn due(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

/// The board of one owner, with its persistence collaborator
///
/// The in-memory board is authoritative for the session. Durable writes are
/// best effort: a failing [`RecordStore`] is logged and the local change
/// stands.
pub struct BoardSession<R: RecordStore> {
    state: BoardState,
    engine: ReorderEngine,
    records: R,
    clock: SharedClock,
}

impl<R: RecordStore> BoardSession<R> {
    /// Load the owner's board, seeding the starter board on first use
    pub fn open(mut records: R, clock: SharedClock) -> Result<Self> {
        let board = match records.load_board()? {
            Some(board) => board,
            None => {
                let board = Board::starter();
                records.save_columns(&board.columns)?;
                info!(columns = board.columns.len(), "Seeded starter board");
                board
            }
        };

        Ok(Self {
            state: BoardState::new(board),
            engine: ReorderEngine::new(),
            records,
            clock,
        })
    }

    /// Persist full column order at the end of every drag
    pub fn with_full_order(mut self, enabled: bool) -> Self {
        self.engine = ReorderEngine::new().with_full_order(enabled);
        self
    }

    pub fn board(&self) -> &Board {
        self.state.board()
    }

    pub fn columns(&self) -> Vec<&Column> {
        self.state.columns()
    }

    pub fn tasks_in(&self, column_id: &str) -> Vec<&Task> {
        self.state.tasks_in(column_id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.state.task(id)
    }

    pub fn records(&self) -> &R {
        &self.records
    }

    pub fn is_dragging(&self) -> bool {
        self.engine.is_dragging()
    }

    /// Append a new task to the end of a column
    pub fn add_task(&mut self, new: NewTask) -> Result<&Task> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(BoardError::validation("Task title cannot be empty."));
        }
        if self.state.column(&new.column_id).is_none() {
            return Err(BoardError::validation(format!("Unknown column: {}", new.column_id)));
        }

        let task = Task {
            id: new_id(),
            column_id: new.column_id,
            title: title.to_string(),
            description: new.description.filter(|d| !d.trim().is_empty()),
            priority: new.priority,
            due_date: new.due_date,
            created_at: self.clock.utc(),
            position: 0,
        };
        let task = self.state.push_task(task);

        if let Err(e) = self.records.create_task(task) {
            warn!(task_id = %task.id, error = %e, "Failed to persist new task");
        }
        debug!(task_id = %task.id, column_id = %task.column_id, position = task.position, "Added task");
        Ok(task)
    }

    /// Edit a task's content; placement is untouched
    pub fn update_task(&mut self, id: &str, edit: TaskEdit) -> Result<&Task> {
        let mut edit = edit;
        if let Some(title) = edit.title.take() {
            let title = title.trim();
            if title.is_empty() {
                return Err(BoardError::validation("Task title cannot be empty."));
            }
            edit.title = Some(title.to_string());
        }

        let patch = TaskPatch::from(edit);
        if self.state.edit_task(id, &patch).is_none() {
            return Err(BoardError::NotFound);
        }
        if let Err(e) = self.records.update_task(id, &patch) {
            warn!(task_id = id, error = %e, "Failed to persist task edit");
        }
        self.state.task(id).ok_or(BoardError::NotFound)
    }

    /// Remove a task; false when it did not exist
    pub fn delete_task(&mut self, id: &str) -> bool {
        let Some(task) = self.state.remove_task(id) else {
            return false;
        };
        if let Err(e) = self.records.delete_task(id) {
            warn!(task_id = id, error = %e, "Failed to persist task deletion");
        }
        debug!(task_id = id, column_id = %task.column_id, "Deleted task");
        true
    }

    pub fn begin_drag(&mut self, task_id: &str) -> bool {
        self.engine.begin_drag(&self.state, task_id)
    }

    pub fn update_drag_target(&mut self, target: &DragTarget) -> bool {
        self.engine.update_drag_target(&mut self.state, target)
    }

    pub fn end_drag(&mut self) -> Option<Placement> {
        self.engine.end_drag(&self.state, &mut self.records)
    }

    /// A whole gesture in one call: pick up `task_id`, hover `target`, drop
    pub fn drag(&mut self, task_id: &str, target: &DragTarget) -> Result<Placement> {
        if self.engine.is_dragging() {
            return Err(BoardError::validation("Another drag is in progress."));
        }
        if !self.begin_drag(task_id) {
            return Err(BoardError::NotFound);
        }
        self.update_drag_target(target);
        self.end_drag().ok_or(BoardError::NotFound)
    }

    /// Move a task to the end of another column
    pub fn move_task(&mut self, task_id: &str, column_id: &str) -> Result<Placement> {
        if self.state.column(column_id).is_none() {
            return Err(BoardError::validation(format!("Unknown column: {column_id}")));
        }
        self.drag(task_id, &DragTarget::Column(column_id.to_string()))
    }

    /// Publish the current board and return its exchange code
    pub fn export(&self, exchange: &Exchange, ttl_seconds: u64) -> Result<String> {
        let document = snapshot::encode(self.state.board());
        exchange.put(&document, ttl_seconds)
    }

    /// Replace the whole board with an imported snapshot
    ///
    /// Requires the exact confirmation token and no live drag gesture.
    /// Returns the board that was replaced.
    pub fn apply_import(&mut self, pending: PendingImport, confirmation: &str) -> Result<Board> {
        if !import::is_confirmed(confirmation) {
            return Err(BoardError::validation(format!(
                "Type {} to replace your board.",
                import::CONFIRMATION_TOKEN
            )));
        }
        if self.engine.is_dragging() {
            return Err(BoardError::validation("Finish the current drag before importing."));
        }

        let code = pending.code().to_string();
        let incoming = import::reconcile(self.state.board(), pending.snapshot());
        let old = self.state.replace(incoming);

        if let Err(e) = self.records.replace_board(&old, self.state.board()) {
            warn!(code = %code, error = %e, "Failed to persist imported board");
        }
        info!(
            code = %code,
            columns = self.state.board().columns.len(),
            tasks = self.state.board().tasks.len(),
            "Imported board"
        );
        Ok(old)
    }
}
