//! Tidemark CLI - Offline-first task lists from the terminal
//!
//! Every mutation lands in the local store and the pending-operation queue,
//! so the CLI works with or without connectivity. A sync-capable frontend
//! drains the queue later.

use std::env;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;
use tidemark_core::models::{
    ListId, PendingOperation, Priority, Task, TaskId, TaskList, TaskPatch, UserId,
};
use tidemark_core::sync::watermark_key;
use tidemark_core::LocalStore;

#[derive(Parser)]
#[command(name = "tidemark")]
#[command(about = "Offline-first task lists from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// User the records belong to (defaults to the local profile)
    #[arg(long, global = true, value_name = "ID", default_value = "local")]
    user: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new list
    AddList {
        /// List name
        name: String,
        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Show lists
    Lists {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a new task in a list
    #[command(alias = "new")]
    Add {
        /// List ID or unique ID prefix
        #[arg(short, long, value_name = "LIST")]
        list: String,
        /// Task title
        title: Vec<String>,
        /// Priority: low, medium or high
        #[arg(short, long)]
        priority: Option<String>,
    },
    /// Show tasks, optionally scoped to one list
    Tasks {
        /// List ID or unique ID prefix
        #[arg(short, long, value_name = "LIST")]
        list: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a task as completed
    Done {
        /// Task ID or unique ID prefix
        id: String,
    },
    /// Delete a task
    Delete {
        /// Task ID or unique ID prefix
        id: String,
    },
    /// Delete a list and all of its tasks
    DeleteList {
        /// List ID or unique ID prefix
        id: String,
    },
    /// Show the pending-operation queue
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show sync status for the current user
    Status,
    /// Wipe the local store
    Reset {
        /// Skip the confirmation guard
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] tidemark_core::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No task title provided")]
    EmptyTitle,
    #[error("List name cannot be empty")]
    EmptyListName,
    #[error("ID cannot be empty")]
    EmptyId,
    #[error("Unknown priority '{0}'; expected low, medium or high")]
    UnknownPriority(String),
    #[error("List not found for id/prefix: {0}")]
    ListNotFound(String),
    #[error("Task not found for id/prefix: {0}")]
    TaskNotFound(String),
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Refusing to wipe the local store without --yes")]
    ResetNotConfirmed,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tidemark=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let user = UserId::from(cli.user.as_str());
    tracing::debug!(db = %db_path.display(), user = %user, "Using local store");

    match cli.command {
        Commands::AddList { name, description } => {
            run_add_list(&name, description, &user, &db_path).await?;
        }
        Commands::Lists { json } => run_lists(json, &user, &db_path).await?,
        Commands::Add {
            list,
            title,
            priority,
        } => run_add(&list, &title, priority.as_deref(), &user, &db_path).await?,
        Commands::Tasks { list, json } => {
            run_tasks(list.as_deref(), json, &user, &db_path).await?;
        }
        Commands::Done { id } => run_done(&id, &user, &db_path).await?,
        Commands::Delete { id } => run_delete(&id, &user, &db_path).await?,
        Commands::DeleteList { id } => run_delete_list(&id, &user, &db_path).await?,
        Commands::Queue { json } => run_queue(json, &user, &db_path).await?,
        Commands::Status => run_status(&user, &db_path).await?,
        Commands::Reset { yes } => run_reset(yes, &db_path).await?,
    }

    Ok(())
}

async fn run_add_list(
    name: &str,
    description: Option<String>,
    user: &UserId,
    db_path: &Path,
) -> Result<(), CliError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::EmptyListName);
    }

    let store = LocalStore::open(db_path)?;
    let mut list = TaskList::new(user.clone(), name);
    list.description = description.and_then(|text| normalize_text(&text));

    store.save_list(&list).await?;
    store
        .enqueue_operation(&PendingOperation::create_list(list.clone()))
        .await?;

    println!("{}", list.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct ListItem {
    id: String,
    name: String,
    description: Option<String>,
    open_tasks: usize,
    updated_at: i64,
    relative_time: String,
}

async fn run_lists(as_json: bool, user: &UserId, db_path: &Path) -> Result<(), CliError> {
    let store = LocalStore::open(db_path)?;
    let lists = store.lists(user).await?;
    let now_ms = Utc::now().timestamp_millis();

    let mut items = Vec::with_capacity(lists.len());
    for list in &lists {
        let open_tasks = store
            .tasks_in_list(&list.id)
            .await?
            .iter()
            .filter(|task| !task.completed)
            .count();
        items.push(ListItem {
            id: list.id.as_str(),
            name: list.name.clone(),
            description: list.description.clone(),
            open_tasks,
            updated_at: list.updated_at,
            relative_time: format_relative_time(list.updated_at, now_ms),
        });
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for item in &items {
            println!(
                "{:<8}  {:<30}  {:>3} open  {}",
                short_id(&item.id),
                item.name,
                item.open_tasks,
                item.relative_time
            );
        }
    }

    Ok(())
}

async fn run_add(
    list_query: &str,
    title_parts: &[String],
    priority: Option<&str>,
    user: &UserId,
    db_path: &Path,
) -> Result<(), CliError> {
    let title = normalize_text(&title_parts.join(" ")).ok_or(CliError::EmptyTitle)?;
    let priority = priority.map(parse_priority).transpose()?;

    let store = LocalStore::open(db_path)?;
    let list = resolve_list(&store, user, list_query).await?;

    let mut task = Task::new(list.id, user.clone(), title);
    if let Some(priority) = priority {
        task.priority = priority;
    }

    store.save_task(&task).await?;
    store
        .enqueue_operation(&PendingOperation::create_task(task.clone()))
        .await?;

    println!("{}", task.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct TaskItem {
    id: String,
    list_id: String,
    title: String,
    completed: bool,
    priority: String,
    due_date: Option<i64>,
    updated_at: i64,
    relative_time: String,
}

async fn run_tasks(
    list_query: Option<&str>,
    as_json: bool,
    user: &UserId,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = LocalStore::open(db_path)?;
    let tasks = if let Some(query) = list_query {
        let list = resolve_list(&store, user, query).await?;
        store.tasks_in_list(&list.id).await?
    } else {
        store.tasks(user).await?
    };

    let now_ms = Utc::now().timestamp_millis();
    let items = tasks
        .iter()
        .map(|task| TaskItem {
            id: task.id.as_str(),
            list_id: task.list_id.as_str(),
            title: task.title.clone(),
            completed: task.completed,
            priority: task.priority.to_string(),
            due_date: task.due_date,
            updated_at: task.updated_at,
            relative_time: format_relative_time(task.updated_at, now_ms),
        })
        .collect::<Vec<TaskItem>>();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for item in &items {
            let check = if item.completed { "[x]" } else { "[ ]" };
            println!(
                "{:<8}  {check} {:<40}  {:<6}  {}",
                short_id(&item.id),
                item.title,
                item.priority,
                item.relative_time
            );
        }
    }

    Ok(())
}

async fn run_done(id: &str, user: &UserId, db_path: &Path) -> Result<(), CliError> {
    let store = LocalStore::open(db_path)?;
    let mut task = resolve_task(&store, user, id).await?;

    let patch = TaskPatch {
        completed: Some(true),
        ..TaskPatch::default()
    };
    task.apply(&patch);

    store.save_task(&task).await?;
    store
        .enqueue_operation(&PendingOperation::update_task(user.clone(), task.id, patch))
        .await?;

    println!("{}", task.id);
    Ok(())
}

async fn run_delete(id: &str, user: &UserId, db_path: &Path) -> Result<(), CliError> {
    let store = LocalStore::open(db_path)?;
    let task = resolve_task(&store, user, id).await?;

    store.delete_task(&task.id).await?;
    store
        .enqueue_operation(&PendingOperation::delete_task(user.clone(), task.id))
        .await?;

    println!("{}", task.id);
    Ok(())
}

async fn run_delete_list(id: &str, user: &UserId, db_path: &Path) -> Result<(), CliError> {
    let store = LocalStore::open(db_path)?;
    let list = resolve_list(&store, user, id).await?;

    store.delete_list(&list.id).await?;
    store
        .enqueue_operation(&PendingOperation::delete_list(user.clone(), list.id))
        .await?;

    println!("{}", list.id);
    Ok(())
}

async fn run_queue(as_json: bool, user: &UserId, db_path: &Path) -> Result<(), CliError> {
    let store = LocalStore::open(db_path)?;
    let operations = store.queued_operations(user).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&operations)?);
        return Ok(());
    }

    if operations.is_empty() {
        println!("Queue is empty");
        return Ok(());
    }

    for op in &operations {
        let target = op.entity_id.as_deref().unwrap_or("-");
        let mut line = format!(
            "{:<8}  {:<6} {:<5}  {}",
            short_id(&op.id.as_str()),
            op.kind.as_str(),
            op.collection.as_str(),
            short_id(target)
        );
        if op.retry_count > 0 {
            line.push_str(&format!("  retries: {}", op.retry_count));
        }
        if let Some(error) = &op.last_error {
            line.push_str(&format!("  last error: {error}"));
        }
        println!("{line}");
    }

    Ok(())
}

async fn run_status(user: &UserId, db_path: &Path) -> Result<(), CliError> {
    let store = LocalStore::open(db_path)?;
    let pending = store.queued_operation_count(user).await?;
    let last_sync = store
        .get_metadata(&watermark_key(user))
        .await?
        .and_then(|value| value.parse::<i64>().ok());

    match last_sync {
        Some(timestamp) => {
            let now_ms = Utc::now().timestamp_millis();
            println!(
                "Last sync: {} ({timestamp})",
                format_relative_time(timestamp, now_ms)
            );
        }
        None => println!("Last sync: never"),
    }
    println!("Pending operations: {pending}");

    Ok(())
}

async fn run_reset(confirmed: bool, db_path: &Path) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::ResetNotConfirmed);
    }

    let store = LocalStore::open(db_path)?;
    store.clear_all().await?;
    println!("Local store wiped");
    Ok(())
}

/// Resolve a list by exact ID or unique ID prefix, scoped to the user.
async fn resolve_list(
    store: &LocalStore,
    user: &UserId,
    query: &str,
) -> Result<TaskList, CliError> {
    let query = normalize_text(query).ok_or(CliError::EmptyId)?;

    if let Ok(list_id) = query.parse::<ListId>() {
        // Exact hits are still scoped to the current user
        if let Some(list) = store.get_list(&list_id).await? {
            if list.owner_id == *user {
                return Ok(list);
            }
        }
    }

    let lists = store.lists(user).await?;
    let matches = lists
        .into_iter()
        .filter(|list| list.id.as_str().starts_with(&query))
        .collect::<Vec<TaskList>>();

    match matches.len() {
        0 => Err(CliError::ListNotFound(query)),
        1 => matches.into_iter().next().ok_or(CliError::ListNotFound(query)),
        _ => Err(CliError::AmbiguousId(ambiguous_message(
            &query,
            matches.iter().map(|list| list.id.as_str()),
        ))),
    }
}

/// Resolve a task by exact ID or unique ID prefix, scoped to the user.
async fn resolve_task(store: &LocalStore, user: &UserId, query: &str) -> Result<Task, CliError> {
    let query = normalize_text(query).ok_or(CliError::EmptyId)?;

    if let Ok(task_id) = query.parse::<TaskId>() {
        // Exact hits are still scoped to the current user
        if let Some(task) = store.get_task(&task_id).await? {
            if task.owner_id == *user {
                return Ok(task);
            }
        }
    }

    let tasks = store.tasks(user).await?;
    let matches = tasks
        .into_iter()
        .filter(|task| task.id.as_str().starts_with(&query))
        .collect::<Vec<Task>>();

    match matches.len() {
        0 => Err(CliError::TaskNotFound(query)),
        1 => matches.into_iter().next().ok_or(CliError::TaskNotFound(query)),
        _ => Err(CliError::AmbiguousId(ambiguous_message(
            &query,
            matches.iter().map(|task| task.id.as_str()),
        ))),
    }
}

fn ambiguous_message(query: &str, ids: impl Iterator<Item = String>) -> String {
    let options = ids
        .take(3)
        .map(|id| short_id(&id))
        .collect::<Vec<String>>()
        .join(", ");
    format!("ID prefix '{query}' is ambiguous; matches: {options}")
}

fn parse_priority(value: &str) -> Result<Priority, CliError> {
    match value.trim().to_lowercase().as_str() {
        "low" => Ok(Priority::Low),
        "medium" => Ok(Priority::Medium),
        "high" => Ok(Priority::High),
        other => Err(CliError::UnknownPriority(other.to_string())),
    }
}

fn normalize_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("TIDEMARK_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tidemark")
        .join("tidemark.db")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tidemark_core::models::{Collection, OperationKind};

    use super::{
        format_relative_time, normalize_text, parse_priority, resolve_list, resolve_task,
        short_id, CliError, LocalStore, PendingOperation, Priority, Task, TaskList, UserId,
    };

    fn user() -> UserId {
        UserId::from("cli-test")
    }

    #[test]
    fn normalize_text_trims_and_rejects_empty() {
        assert_eq!(normalize_text("  hello  "), Some("hello".to_string()));
        assert_eq!(normalize_text(" \n\t "), None);
    }

    #[test]
    fn parse_priority_accepts_known_levels() {
        assert_eq!(parse_priority("low").unwrap(), Priority::Low);
        assert_eq!(parse_priority(" HIGH ").unwrap(), Priority::High);
        assert!(matches!(
            parse_priority("urgent"),
            Err(CliError::UnknownPriority(_))
        ));
    }

    #[test]
    fn format_relative_time_units() {
        let now = 10_000_000;
        assert_eq!(format_relative_time(now - 30_000, now), "just now");
        assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
        assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    }

    #[test]
    fn short_id_truncates() {
        assert_eq!(short_id("0198c4a1-0000-7000-8000-000000000000"), "0198c4a1");
        assert_eq!(short_id("abc"), "abc");
    }

    // Freshly minted UUID v7 ids share their timestamp prefix, so the
    // resolution tests pin ids with known distinct prefixes.
    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_list_supports_exact_and_prefix_id() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut list_a = TaskList::new(user(), "Groceries");
        list_a.id = "11111111-1111-7111-8111-111111111111".parse().unwrap();
        let mut list_b = TaskList::new(user(), "Errands");
        list_b.id = "22222222-2222-7222-8222-222222222222".parse().unwrap();
        store.save_list(&list_a).await.unwrap();
        store.save_list(&list_b).await.unwrap();

        let by_exact = resolve_list(&store, &user(), "11111111-1111-7111-8111-111111111111")
            .await
            .unwrap();
        assert_eq!(by_exact.name, "Groceries");

        let by_prefix = resolve_list(&store, &user(), "2222").await.unwrap();
        assert_eq!(by_prefix.name, "Errands");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_list_rejects_missing_and_ambiguous() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut list_a = TaskList::new(user(), "One");
        list_a.id = "aaaaaaaa-aaaa-7aaa-8aaa-111111111111".parse().unwrap();
        let mut list_b = TaskList::new(user(), "Two");
        list_b.id = "aaaaaaaa-aaaa-7aaa-8aaa-222222222222".parse().unwrap();
        store.save_list(&list_a).await.unwrap();
        store.save_list(&list_b).await.unwrap();

        let missing = resolve_list(&store, &user(), "ffffffff").await.unwrap_err();
        assert!(matches!(missing, CliError::ListNotFound(_)));

        let ambiguous = resolve_list(&store, &user(), "aaaaaaaa-aaaa-7aaa-8aaa")
            .await
            .unwrap_err();
        assert!(matches!(ambiguous, CliError::AmbiguousId(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_task_scopes_to_user() {
        let store = LocalStore::open_in_memory().unwrap();
        let list = TaskList::new(user(), "Groceries");
        store.save_list(&list).await.unwrap();

        let mut mine = Task::new(list.id, user(), "Buy milk");
        mine.id = "bbbbbbbb-bbbb-7bbb-8bbb-111111111111".parse().unwrap();
        let mut theirs = Task::new(list.id, UserId::from("someone-else"), "Buy bread");
        theirs.id = "cccccccc-cccc-7ccc-8ccc-222222222222".parse().unwrap();
        store.save_task(&mine).await.unwrap();
        store.save_task(&theirs).await.unwrap();

        let found = resolve_task(&store, &user(), "bbbb").await.unwrap();
        assert_eq!(found.title, "Buy milk");

        // Another user's task stays invisible, by prefix and by exact id
        let hidden = resolve_task(&store, &user(), "cccc").await.unwrap_err();
        assert!(matches!(hidden, CliError::TaskNotFound(_)));

        let hidden_exact = resolve_task(&store, &user(), "cccccccc-cccc-7ccc-8ccc-222222222222")
            .await
            .unwrap_err();
        assert!(matches!(hidden_exact, CliError::TaskNotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn captured_mutations_enqueue_operations() {
        let store = LocalStore::open_in_memory().unwrap();

        let list = TaskList::new(user(), "Groceries");
        store.save_list(&list).await.unwrap();
        store
            .enqueue_operation(&PendingOperation::create_list(list.clone()))
            .await
            .unwrap();

        let task = Task::new(list.id, user(), "Buy milk");
        store.save_task(&task).await.unwrap();
        store
            .enqueue_operation(&PendingOperation::create_task(task.clone()))
            .await
            .unwrap();

        let queue = store.queued_operations(&user()).await.unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].kind, OperationKind::Create);
        assert_eq!(queue[0].collection, Collection::Lists);
        assert_eq!(queue[1].collection, Collection::Tasks);
    }
}
