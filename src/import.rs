// Import reconciliation: turning a decoded snapshot into a fresh board

use crate::models::{Board, Column, Task, new_id};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Text the user must type to confirm a destructive import
pub const CONFIRMATION_TOKEN: &str = "CONFIRM";

/// Exact, case-sensitive match against [`CONFIRMATION_TOKEN`]
pub fn is_confirmed(input: &str) -> bool {
    input == CONFIRMATION_TOKEN
}

/// A decoded snapshot waiting for the user to confirm replacement
#[derive(Debug, Clone, PartialEq)]
pub struct PendingImport {
    code: String,
    snapshot: Board,
}

impl PendingImport {
    pub fn new(code: impl Into<String>, snapshot: Board) -> Self {
        Self {
            code: code.into(),
            snapshot,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn snapshot(&self) -> &Board {
        &self.snapshot
    }

    pub fn column_count(&self) -> usize {
        self.snapshot.columns.len()
    }

    pub fn task_count(&self) -> usize {
        self.snapshot.tasks.len()
    }

    pub fn into_snapshot(self) -> Board {
        self.snapshot
    }
}

/// Build the board that replaces `current` when `incoming` is imported
///
/// Every column and task gets a fresh id that collides with nothing on the
/// current board. Column order follows the snapshot's declared positions.
/// Tasks whose column reference cannot be resolved are dropped. Positions
/// are renumbered `0..n` per column, keeping the snapshot's relative order.
pub fn reconcile(current: &Board, incoming: &Board) -> Board {
    let mut taken: HashSet<String> = current
        .columns
        .iter()
        .map(|c| c.id.clone())
        .chain(current.tasks.iter().map(|t| t.id.clone()))
        .collect();
    let mut fresh_id = || loop {
        let id = new_id();
        if taken.insert(id.clone()) {
            break id;
        }
    };

    let mut declared: Vec<&Column> = incoming.columns.iter().collect();
    declared.sort_by_key(|c| c.position);

    // old id -> new id, in final column order; first occurrence wins
    let mut remap: Vec<(&str, String)> = Vec::with_capacity(declared.len());
    let mut columns = Vec::with_capacity(declared.len());
    for column in declared {
        if remap.iter().any(|(old, _)| *old == column.id) {
            continue;
        }
        let id = fresh_id();
        columns.push(Column::new(id.clone(), column.title.clone(), columns.len()));
        remap.push((column.id.as_str(), id));
    }

    let mut grouped: HashMap<&str, Vec<&Task>> = HashMap::new();
    let mut dropped = 0usize;
    for task in &incoming.tasks {
        if remap.iter().any(|(old, _)| *old == task.column_id) {
            grouped.entry(task.column_id.as_str()).or_default().push(task);
        } else {
            debug!(task_id = %task.id, column_id = %task.column_id, "Dropping task with unknown column");
            dropped += 1;
        }
    }

    let mut tasks = Vec::with_capacity(incoming.tasks.len() - dropped);
    for (old_column, new_column) in &remap {
        let Some(mut members) = grouped.remove(old_column) else {
            continue;
        };
        members.sort_by_key(|t| t.position);
        for (position, task) in members.into_iter().enumerate() {
            tasks.push(Task {
                id: fresh_id(),
                column_id: new_column.clone(),
                position,
                ..task.clone()
            });
        }
    }

    info!(
        columns = columns.len(),
        tasks = tasks.len(),
        dropped,
        "Reconciled imported board"
    );
    Board::new(columns, tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;
    use chrono::{TimeZone, Utc};

    fn task(id: &str, column_id: &str, position: usize) -> Task {
        Task {
            id: id.to_string(),
            column_id: column_id.to_string(),
            title: format!("Task {id}"),
            description: None,
            priority: Priority::Medium,
            due_date: None,
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
            position,
        }
    }

    fn titles(board: &Board, column_id: &str) -> Vec<String> {
        board.tasks_in(column_id).iter().map(|t| t.title.clone()).collect()
    }

    #[test]
    fn test_confirmation_is_exact() {
        assert!(is_confirmed("CONFIRM"));
        assert!(!is_confirmed("confirm"));
        assert!(!is_confirmed(" CONFIRM"));
        assert!(!is_confirmed("CONFIRMED"));
        assert!(!is_confirmed(""));
    }

    #[test]
    fn test_reconcile_remaps_every_id() {
        let current = Board::starter();
        // Same ids as the current board, as a snapshot of it would have
        let incoming = Board::new(
            Board::starter().columns,
            vec![task("t1", "todo", 0), task("t2", "done", 0)],
        );

        let result = reconcile(&current, &incoming);
        assert_eq!(result.columns.len(), 3);
        assert_eq!(result.tasks.len(), 2);
        for column in &result.columns {
            assert!(current.column(&column.id).is_none());
        }
        for t in &result.tasks {
            assert!(t.id != "t1" && t.id != "t2");
            assert!(result.column(&t.column_id).is_some());
        }

        let titles: Vec<String> = result.ordered_columns().iter().map(|c| c.title.clone()).collect();
        assert_eq!(titles, vec!["To Do", "In Progress", "Done"]);
        assert_eq!(titles_of_column(&result, "Done"), vec!["Task t2"]);
    }

    fn titles_of_column(board: &Board, title: &str) -> Vec<String> {
        let column = board.columns.iter().find(|c| c.title == title).unwrap();
        titles(board, &column.id)
    }

    #[test]
    fn test_reconcile_drops_dangling_tasks() {
        let incoming = Board::new(
            vec![Column::new("c1", "Only", 0)],
            vec![task("keep", "c1", 0), task("orphan", "c9", 0)],
        );

        let result = reconcile(&Board::default(), &incoming);
        assert_eq!(result.tasks.len(), 1);
        assert_eq!(result.tasks[0].title, "Task keep");
    }

    #[test]
    fn test_reconcile_orders_and_renumbers() {
        let incoming = Board::new(
            vec![Column::new("right", "Right", 7), Column::new("left", "Left", 2)],
            vec![
                task("late", "left", 40),
                task("early", "left", 3),
                task("mid", "left", 10),
                task("solo", "right", 5),
            ],
        );

        let result = reconcile(&Board::default(), &incoming);
        let ordered: Vec<(String, usize)> = result
            .ordered_columns()
            .iter()
            .map(|c| (c.title.clone(), c.position))
            .collect();
        assert_eq!(ordered, vec![("Left".to_string(), 0), ("Right".to_string(), 1)]);
        assert_eq!(titles_of_column(&result, "Left"), vec!["Task early", "Task mid", "Task late"]);
        assert!(result.positions_are_dense());
    }

    #[test]
    fn test_reconcile_keeps_content() {
        let mut original = task("t", "c", 0);
        original.description = Some("Notes".to_string());
        original.priority = Priority::High;
        original.due_date = Some(Utc.with_ymd_and_hms(2024, 12, 24, 0, 0, 0).unwrap());
        let incoming = Board::new(vec![Column::new("c", "Col", 0)], vec![original.clone()]);

        let result = reconcile(&Board::default(), &incoming);
        let imported = &result.tasks[0];
        assert_eq!(imported.title, original.title);
        assert_eq!(imported.description, original.description);
        assert_eq!(imported.priority, original.priority);
        assert_eq!(imported.due_date, original.due_date);
        assert_eq!(imported.created_at, original.created_at);
    }

    #[test]
    fn test_pending_import_counts() {
        let pending = PendingImport::new("AB12CD", Board::new(Board::starter().columns, vec![task("t", "todo", 0)]));
        assert_eq!(pending.code(), "AB12CD");
        assert_eq!(pending.column_count(), 3);
        assert_eq!(pending.task_count(), 1);
    }
}
