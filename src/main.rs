use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::Result;
use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use taskboard::persist::{ColumnRecord, TaskRecord};
use taskboard::{
    BoardError, BoardSession, Config, DragTarget, Exchange, ExchangeResponse, Filter, NewTask, Priority, Store,
    TaskEdit, open_board_store,
};

#[derive(Parser)]
#[command(name = "taskboard")]
#[command(about = "Kanban board with drag reordering and code-based sharing")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Config file (default: $TASKBOARD_CONFIG or the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Board store directory, overriding the config file
    #[arg(short, long, global = true)]
    store_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the board
    Show {
        /// Only list tasks of this priority
        #[arg(short, long)]
        priority: Option<Priority>,
    },

    /// Add a task to the end of a column
    Add {
        column: String,
        title: String,
        #[arg(short, long, default_value = "medium")]
        priority: Priority,
        #[arg(short, long)]
        description: Option<String>,
        /// Due date, YYYY-MM-DD or RFC 3339
        #[arg(long, value_parser = parse_due)]
        due: Option<DateTime<Utc>>,
    },

    /// Edit a task's content
    Edit {
        id: String,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        priority: Option<Priority>,
        /// New description; an empty string clears it
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long, value_parser = parse_due, conflicts_with = "clear_due")]
        due: Option<DateTime<Utc>>,
        #[arg(long)]
        clear_due: bool,
    },

    /// Delete a task
    Delete { id: String },

    /// Drag a task over another task, or over a column with --column
    Move {
        task: String,
        over: String,
        #[arg(long)]
        column: bool,
    },

    /// Publish the board and print its exchange code
    Export {
        /// Code lifetime in seconds (default from config)
        #[arg(long)]
        ttl: Option<u64>,
        /// Print the JSON response envelope instead of plain text
        #[arg(long)]
        json: bool,
    },

    /// Replace the board with the one behind an exchange code
    Import {
        code: String,
        /// Confirmation token; prompted for when omitted
        #[arg(long)]
        confirm: Option<String>,
    },

    /// Rebuild the SQLite cache from the JSONL files
    Sync,
}

fn parse_due(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| format!("invalid date: {value}"));
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid date {value}: {e}"))
}

fn main() {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        match err.downcast_ref::<BoardError>() {
            Some(board_err) => eprintln!("{}", board_err.user_message().red()),
            None => eprintln!("{} {:#}", "error:".red().bold(), err),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(store_path) = cli.store_path {
        config.store_path = store_path;
    }

    if let Commands::Sync = cli.command {
        return sync(&config);
    }

    let clock: taskboard::SharedClock = Arc::new(mockable::DefaultClock);
    let store = open_board_store(&config.store_path)?;
    let mut session = BoardSession::open(store, clock)?.with_full_order(config.reorder.persist_full_order);

    match cli.command {
        Commands::Show { priority } => show(&session, priority)?,
        Commands::Add {
            column,
            title,
            priority,
            description,
            due,
        } => {
            let mut new = NewTask::new(column, title).priority(priority);
            new.description = description;
            new.due_date = due;
            let task = session.add_task(new)?;
            println!("{} {} {}", "Added".green(), task.id.dimmed(), task.title);
        }
        Commands::Edit {
            id,
            title,
            priority,
            description,
            due,
            clear_due,
        } => {
            let edit = TaskEdit {
                title,
                description: description.map(|d| Some(d).filter(|d| !d.trim().is_empty())),
                priority,
                due_date: if clear_due { Some(None) } else { due.map(Some) },
            };
            if edit.is_empty() {
                println!("Nothing to change");
                return Ok(());
            }
            let task = session.update_task(&id, edit)?;
            println!("{} {}", "Updated".green(), task.title);
        }
        Commands::Delete { id } => {
            if session.delete_task(&id) {
                println!("{} {}", "Deleted".green(), id);
            } else {
                println!("{} {}", "No such task:".yellow(), id);
            }
        }
        Commands::Move { task, over, column } => {
            let target = if column {
                DragTarget::Column(over)
            } else {
                DragTarget::Task(over)
            };
            let placement = session.drag(&task, &target)?;
            println!(
                "{} {} to {} at position {}",
                "Moved".green(),
                placement.task_id.dimmed(),
                placement.column_id,
                placement.position
            );
        }
        Commands::Export { ttl, json } => {
            let exchange = Exchange::from_config(&config.exchange, &config.store_path)?;
            let ttl = ttl.unwrap_or(config.exchange.ttl_seconds);
            let result = session.export(&exchange, ttl);
            if json {
                println!("{}", serde_json::to_string_pretty(&ExchangeResponse::shared(result))?);
            } else {
                let code = result?;
                println!("Share code: {}", code.bold());
                println!("Expires in {} minutes", ttl.div_ceil(60));
            }
        }
        Commands::Import { code, confirm } => {
            let exchange = Exchange::from_config(&config.exchange, &config.store_path)?;
            let pending = exchange.lookup(&code)?;
            println!(
                "Code {} holds {} columns and {} tasks.",
                pending.code().bold(),
                pending.column_count(),
                pending.task_count()
            );
            println!(
                "{}",
                "Importing replaces every column and task on your board.".yellow()
            );

            let token = match confirm {
                Some(token) => token,
                None => prompt(&format!(
                    "Type {} to continue: ",
                    taskboard::import::CONFIRMATION_TOKEN
                ))?,
            };
            let old = session.apply_import(pending, &token)?;
            println!(
                "{} Replaced {} tasks with {}",
                "Imported.".green(),
                old.tasks.len(),
                session.board().tasks.len()
            );
        }
        // handled before the session is opened
        Commands::Sync => {}
    }

    Ok(())
}

fn show(session: &BoardSession<Store>, priority: Option<Priority>) -> Result<()> {
    let only: Option<HashSet<String>> = match priority {
        Some(priority) => {
            let records: Vec<TaskRecord> = session
                .records()
                .list(&[Filter::eq("priority", priority.as_str())])?;
            Some(records.into_iter().map(|r| r.task.id).collect())
        }
        None => None,
    };

    for column in session.columns() {
        let tasks: Vec<_> = session
            .tasks_in(&column.id)
            .into_iter()
            .filter(|t| only.as_ref().is_none_or(|ids| ids.contains(&t.id)))
            .collect();
        println!("{} ({})", column.title.bold().underline(), tasks.len());
        for task in tasks {
            let priority = match task.priority {
                Priority::High => task.priority.as_str().red(),
                Priority::Medium => task.priority.as_str().yellow(),
                Priority::Low => task.priority.as_str().blue(),
            };
            print!("  {}. {} [{}]", task.position + 1, task.title, priority);
            if let Some(due) = task.due_date {
                print!(" due {}", due.format("%Y-%m-%d"));
            }
            println!("  {}", task.id.dimmed());
            if let Some(description) = &task.description {
                println!("     {}", description.dimmed());
            }
        }
        println!();
    }
    Ok(())
}

fn sync(config: &Config) -> Result<()> {
    println!("Syncing database from JSONL files...");
    let mut store = open_board_store(&config.store_path)?;
    store.sync()?;
    let tasks = store.rebuild_indexes::<TaskRecord>()?;
    let columns = store.rebuild_indexes::<ColumnRecord>()?;
    println!("Sync complete ({columns} columns, {tasks} tasks)");
    Ok(())
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
