// In-memory authoritative board: columns plus tasks with dense per-column positions

use crate::models::{Board, Column, Task, TaskPatch};
use std::collections::HashMap;

/// Ordered item store for one board
///
/// Positions are kept dense (`0..n` per column) after every public mutation.
/// Reordering goes through [`BoardState::place`], which rewrites a column's
/// positions from an explicit id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardState {
    board: Board,
}

impl BoardState {
    /// Take ownership of a board, normalizing its positions
    pub fn new(mut board: Board) -> Self {
        normalize(&mut board);
        Self { board }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn into_board(self) -> Board {
        self.board
    }

    /// Swap in a whole new board, returning the old one
    pub fn replace(&mut self, board: Board) -> Board {
        std::mem::replace(&mut self.board, Self::new(board).board)
    }

    pub fn columns(&self) -> Vec<&Column> {
        self.board.ordered_columns()
    }

    pub fn column(&self, id: &str) -> Option<&Column> {
        self.board.column(id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.board.task(id)
    }

    pub fn tasks_in(&self, column_id: &str) -> Vec<&Task> {
        self.board.tasks_in(column_id)
    }

    /// Task ids of a column in render order
    pub fn column_order(&self, column_id: &str) -> Vec<String> {
        self.tasks_in(column_id).into_iter().map(|t| t.id.clone()).collect()
    }

    /// Column and index of a task
    pub fn locate(&self, task_id: &str) -> Option<(String, usize)> {
        let task = self.task(task_id)?;
        Some((task.column_id.clone(), task.position))
    }

    /// Append a task to the end of its column
    ///
    /// The caller guarantees the column exists and the id is new.
    pub fn push_task(&mut self, mut task: Task) -> &Task {
        task.position = self.tasks_in(&task.column_id).len();
        self.board.tasks.push(task);
        let last = self.board.tasks.len() - 1;
        &self.board.tasks[last]
    }

    /// Remove a task and close the gap it leaves
    pub fn remove_task(&mut self, task_id: &str) -> Option<Task> {
        let index = self.board.tasks.iter().position(|t| t.id == task_id)?;
        let task = self.board.tasks.remove(index);
        let order = self.column_order(&task.column_id);
        self.place(&task.column_id, &order);
        Some(task)
    }

    /// Apply content edits; placement fields in the patch are ignored
    pub fn edit_task(&mut self, task_id: &str, patch: &TaskPatch) -> Option<&Task> {
        let content = TaskPatch {
            column_id: None,
            position: None,
            ..patch.clone()
        };
        let task = self.board.tasks.iter_mut().find(|t| t.id == task_id)?;
        content.apply(task);
        Some(&*task)
    }

    /// Put the given tasks into `column_id` in exactly this order
    ///
    /// Every id is re-homed to the column and given its index as position.
    /// Callers pass the complete order of the column. For a cross-column
    /// move, place the destination column before the source column, as
    /// `move_over_task` does.
    pub(crate) fn place(&mut self, column_id: &str, order: &[String]) {
        let ranks: HashMap<&str, usize> = order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        for task in &mut self.board.tasks {
            if let Some(&rank) = ranks.get(task.id.as_str()) {
                task.column_id = column_id.to_string();
                task.position = rank;
            }
        }
        debug_assert!(
            self.tasks_in(column_id).len() == order.len(),
            "place() was given a partial order for column {column_id}"
        );
    }
}

/// Restore dense positions
///
/// Columns are ranked by declared position (stable); tasks within a column by
/// declared position, then creation time (stable). Tasks come out grouped by
/// column in left-to-right order. Tasks pointing at an unknown column are left
/// untouched at the end.
pub fn normalize(board: &mut Board) {
    board.columns.sort_by_key(|c| c.position);
    for (rank, column) in board.columns.iter_mut().enumerate() {
        column.position = rank;
    }

    let column_rank: HashMap<String, usize> = board.columns.iter().map(|c| (c.id.clone(), c.position)).collect();
    board.tasks.sort_by(|a, b| {
        let ca = column_rank.get(&a.column_id).copied().unwrap_or(usize::MAX);
        let cb = column_rank.get(&b.column_id).copied().unwrap_or(usize::MAX);
        ca.cmp(&cb)
            .then(a.position.cmp(&b.position))
            .then(a.created_at.cmp(&b.created_at))
    });

    let mut next: HashMap<String, usize> = HashMap::new();
    for task in &mut board.tasks {
        if !column_rank.contains_key(&task.column_id) {
            continue;
        }
        let slot = next.entry(task.column_id.clone()).or_insert(0);
        task.position = *slot;
        *slot += 1;
    }
}
