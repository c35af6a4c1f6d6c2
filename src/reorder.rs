// Drag-gesture reordering over the in-memory board

use crate::board::BoardState;
use crate::persist::RecordStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// What the pointer is currently over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum DragTarget {
    Task(String),
    Column(String),
}

impl DragTarget {
    pub fn id(&self) -> &str {
        match self {
            DragTarget::Task(id) | DragTarget::Column(id) => id,
        }
    }
}

/// Final resting place of a dragged task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub task_id: String,
    pub column_id: String,
    pub position: usize,
}

/// Tracks the single live gesture and turns pointer updates into moves
///
/// Every `update_drag_target` mutates the board optimistically; only
/// `end_drag` touches the record store, once per gesture.
#[derive(Debug, Default)]
pub struct ReorderEngine {
    active: Option<String>,
    last_target: Option<DragTarget>,
    touched: BTreeSet<String>,
    persist_full_order: bool,
}

impl ReorderEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also persist the complete order of every column the gesture touched
    pub fn with_full_order(mut self, enabled: bool) -> Self {
        self.persist_full_order = enabled;
        self
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn is_dragging(&self) -> bool {
        self.active.is_some()
    }

    /// Pick up a task. Returns false, changing nothing, if a gesture is
    /// already live or the task does not exist.
    pub fn begin_drag(&mut self, state: &BoardState, task_id: &str) -> bool {
        if let Some(active) = &self.active {
            debug!(active = %active, requested = task_id, "Ignoring drag start while another gesture is live");
            return false;
        }
        let Some(task) = state.task(task_id) else {
            debug!(task_id, "Ignoring drag start for unknown task");
            return false;
        };

        self.active = Some(task_id.to_string());
        self.last_target = None;
        self.touched.clear();
        self.touched.insert(task.column_id.clone());
        true
    }

    /// Move the active task according to what it is hovering over
    ///
    /// Returns true when the board changed. Repeating the last target is a
    /// no-op, so high-frequency pointer ticks cost nothing.
    pub fn update_drag_target(&mut self, state: &mut BoardState, target: &DragTarget) -> bool {
        let Some(active) = self.active.clone() else {
            return false;
        };
        if self.last_target.as_ref() == Some(target) {
            return false;
        }
        if target.id() == active {
            return false;
        }
        if state.task(&active).is_none() {
            debug!(task_id = %active, "Active task vanished mid-gesture");
            return false;
        }

        let moved = match target {
            DragTarget::Task(over) => move_over_task(state, &active, over),
            DragTarget::Column(column) => move_to_column(state, &active, column),
        };

        self.last_target = Some(target.clone());
        if let Some((column_id, _)) = state.locate(&active) {
            self.touched.insert(column_id);
        }
        debug!(task_id = %active, ?target, moved, "Drag target updated");
        moved
    }

    /// Release the task where it is and persist the result
    ///
    /// Issues exactly one `persist_position` per gesture; store failures are
    /// logged and the local board stays authoritative. Returns `None` when no
    /// gesture was live or the task was deleted mid-gesture.
    pub fn end_drag<R: RecordStore + ?Sized>(&mut self, state: &BoardState, records: &mut R) -> Option<Placement> {
        let active = self.active.take()?;
        self.last_target = None;
        let touched = std::mem::take(&mut self.touched);

        let Some((column_id, position)) = state.locate(&active) else {
            debug!(task_id = %active, "Dragged task was deleted before release");
            return None;
        };

        if let Err(e) = records.persist_position(&active, &column_id, position) {
            warn!(task_id = %active, error = %e, "Failed to persist task position");
        }

        if self.persist_full_order {
            for column in touched.iter().filter(|c| state.column(c).is_some()) {
                let order = state.column_order(column);
                if let Err(e) = records.persist_column_order(column, &order) {
                    warn!(column_id = %column, error = %e, "Failed to persist column order");
                }
            }
        }

        Some(Placement {
            task_id: active,
            column_id,
            position,
        })
    }
}

/// Task over task: splice the active task to the target's index, re-homing
/// it first when the target sits in another column.
fn move_over_task(state: &mut BoardState, active: &str, over: &str) -> bool {
    let (Some((from_column, from)), Some((to_column, to))) = (state.locate(active), state.locate(over)) else {
        return false;
    };

    if from_column == to_column {
        if from == to {
            return false;
        }
        let mut order = state.column_order(&from_column);
        let id = order.remove(from);
        order.insert(to, id);
        state.place(&from_column, &order);
    } else {
        let mut source = state.column_order(&from_column);
        source.remove(from);
        let mut dest = state.column_order(&to_column);
        dest.insert(to, active.to_string());
        state.place(&to_column, &dest);
        state.place(&from_column, &source);
    }
    true
}

/// Task over a column container: re-home to the end of that column
fn move_to_column(state: &mut BoardState, active: &str, column: &str) -> bool {
    if state.column(column).is_none() {
        return false;
    }
    let Some((from_column, from)) = state.locate(active) else {
        return false;
    };
    if from_column == column {
        return false;
    }

    let mut source = state.column_order(&from_column);
    source.remove(from);
    let mut dest = state.column_order(column);
    dest.push(active.to_string());
    state.place(column, &dest);
    state.place(&from_column, &source);
    true
}
