// Data models for the task board

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    /// Lenient parse for command-line input. Snapshot documents go through
    /// serde and only accept the exact capitalised names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "h" => Ok(Priority::High),
            "medium" | "med" | "m" => Ok(Priority::Medium),
            "low" | "l" => Ok(Priority::Low),
            other => Err(format!("unknown priority: {other} (expected high, medium or low)")),
        }
    }
}

/// A card on the board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub column_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Dense zero-based rank within the column
    pub position: usize,
}

/// An ordered list of tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub title: String,
    /// Dense zero-based rank among columns, left to right
    pub position: usize,
}

impl Column {
    pub fn new(id: impl Into<String>, title: impl Into<String>, position: usize) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            position,
        }
    }
}

/// Partial update of a task. `None` leaves the field untouched; the nested
/// options on `description` and `due_date` allow clearing them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    /// Patch carrying only placement
    pub fn placement(column_id: impl Into<String>, position: usize) -> Self {
        Self {
            column_id: Some(column_id.into()),
            position: Some(position),
            ..Default::default()
        }
    }

    /// True when the patch touches placement (column or position)
    pub fn moves(&self) -> bool {
        self.column_id.is_some() || self.position.is_some()
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(column_id) = &self.column_id {
            task.column_id = column_id.clone();
        }
        if let Some(position) = self.position {
            task.position = position;
        }
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
    }
}

/// Content edit of a task, as made from an edit form. Placement only
/// changes through dragging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<DateTime<Utc>>>,
}

impl TaskEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.priority.is_none() && self.due_date.is_none()
    }
}

impl From<TaskEdit> for TaskPatch {
    fn from(edit: TaskEdit) -> Self {
        Self {
            column_id: None,
            position: None,
            title: edit.title,
            description: edit.description,
            priority: edit.priority,
            due_date: edit.due_date,
        }
    }
}

/// All columns and tasks owned by one user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub columns: Vec<Column>,
    pub tasks: Vec<Task>,
}

impl Board {
    pub fn new(columns: Vec<Column>, tasks: Vec<Task>) -> Self {
        Self { columns, tasks }
    }

    /// The board a new owner starts with
    pub fn starter() -> Self {
        Self::new(
            vec![
                Column::new("todo", "To Do", 0),
                Column::new("in-progress", "In Progress", 1),
                Column::new("done", "Done", 2),
            ],
            Vec::new(),
        )
    }

    pub fn column(&self, id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Columns in left-to-right order
    pub fn ordered_columns(&self) -> Vec<&Column> {
        let mut columns: Vec<&Column> = self.columns.iter().collect();
        columns.sort_by_key(|c| c.position);
        columns
    }

    /// Tasks of one column in render order
    pub fn tasks_in(&self, column_id: &str) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.iter().filter(|t| t.column_id == column_id).collect();
        tasks.sort_by_key(|t| t.position);
        tasks
    }

    /// Check that every column's task positions are exactly `0..n`
    pub fn positions_are_dense(&self) -> bool {
        self.columns.iter().all(|column| {
            self.tasks_in(&column.id)
                .iter()
                .enumerate()
                .all(|(rank, task)| task.position == rank)
        })
    }
}

/// Fresh opaque identifier for a task or column
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
