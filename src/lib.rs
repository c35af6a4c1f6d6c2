// Taskboard - Kanban board core with drag reordering and code-based board sharing

pub mod board;
pub mod config;
pub mod error;
pub mod exchange;
pub mod filter;
pub mod import;
pub mod jsonl;
pub mod models;
pub mod persist;
pub mod record;
pub mod reorder;
pub mod session;
pub mod snapshot;
pub mod store;

#[cfg(test)]
mod testing;

use std::sync::Arc;

/// Time source shared by sessions and the exchange
pub type SharedClock = Arc<dyn mockable::Clock + Send + Sync>;

// Re-export main types for convenience
pub use board::BoardState;
pub use config::Config;
pub use error::{BoardError, Result};
pub use exchange::{Exchange, ExchangeResponse, ExchangeStore, MemoryExchangeStore, SqliteExchangeStore};
pub use filter::Filter;
pub use import::{PendingImport, reconcile};
pub use models::{Board, Column, Priority, Task, TaskEdit, TaskPatch};
pub use persist::{RecordStore, open_board_store};
pub use record::Record;
pub use reorder::{DragTarget, Placement, ReorderEngine};
pub use session::{BoardSession, NewTask};
pub use store::{Store, now_ms};
