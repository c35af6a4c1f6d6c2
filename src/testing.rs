// Test doubles shared by unit tests

use crate::error::{BoardError, Result};
use crate::models::{Board, Column, Task, TaskPatch};
use crate::persist::RecordStore;
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use mockable::Clock;
use std::sync::Mutex;

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::at(Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// One durable call seen by [`RecordingStore`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SaveColumns(usize),
    CreateTask(String),
    UpdateTask(String, TaskPatch),
    DeleteTask(String),
    PersistPosition { id: String, column_id: String, position: usize },
    PersistColumnOrder { column_id: String, task_ids: Vec<String> },
    ReplaceBoard { old_tasks: usize, new_tasks: usize },
}

/// Record store that keeps calls in memory and can be switched to failing
#[derive(Default)]
pub struct RecordingStore {
    pub stored: Option<Board>,
    pub calls: Vec<Call>,
    pub fail: bool,
}

impl RecordingStore {
    pub fn with_board(board: Board) -> Self {
        Self {
            stored: Some(board),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn positions_persisted(&self) -> Vec<&Call> {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::PersistPosition { .. }))
            .collect()
    }

    fn record(&mut self, call: Call) -> Result<()> {
        self.calls.push(call);
        if self.fail {
            return Err(BoardError::unavailable("record store offline"));
        }
        Ok(())
    }
}

impl RecordStore for RecordingStore {
    fn load_board(&mut self) -> Result<Option<Board>> {
        if self.fail {
            return Err(BoardError::unavailable("record store offline"));
        }
        Ok(self.stored.clone())
    }

    fn save_columns(&mut self, columns: &[Column]) -> Result<()> {
        self.record(Call::SaveColumns(columns.len()))
    }

    fn create_task(&mut self, task: &Task) -> Result<()> {
        self.record(Call::CreateTask(task.id.clone()))
    }

    fn update_task(&mut self, id: &str, patch: &TaskPatch) -> Result<()> {
        self.record(Call::UpdateTask(id.to_string(), patch.clone()))
    }

    fn delete_task(&mut self, id: &str) -> Result<()> {
        self.record(Call::DeleteTask(id.to_string()))
    }

    fn persist_position(&mut self, id: &str, column_id: &str, position: usize) -> Result<()> {
        self.record(Call::PersistPosition {
            id: id.to_string(),
            column_id: column_id.to_string(),
            position,
        })
    }

    fn persist_column_order(&mut self, column_id: &str, task_ids: &[String]) -> Result<()> {
        self.record(Call::PersistColumnOrder {
            column_id: column_id.to_string(),
            task_ids: task_ids.to_vec(),
        })
    }

    fn replace_board(&mut self, old: &Board, new: &Board) -> Result<()> {
        self.record(Call::ReplaceBoard {
            old_tasks: old.tasks.len(),
            new_tasks: new.tasks.len(),
        })
    }
}
