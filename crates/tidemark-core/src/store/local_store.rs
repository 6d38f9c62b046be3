//! Durable local store for entities, the pending-operation queue, and
//! sync metadata.
//!
//! Pure data access; the store knows nothing about the network. Mutating
//! operations each run as a single `SQLite` transaction so concurrent
//! readers never observe a half-written record, and a list delete cascades
//! to its tasks inside the same transaction.

use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, types::Type, OptionalExtension};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{
    ListId, OperationId, PendingOperation, Priority, Task, TaskId, TaskList, UserId,
};

use super::connection::Database;

fn write_err(error: rusqlite::Error) -> Error {
    Error::StorageWriteFailed(error.to_string())
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, message.into())
}

/// Thread-safe handle to the local store.
///
/// Clones share one underlying connection; locking keeps every operation
/// atomic with respect to concurrent readers.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
}

impl LocalStore {
    /// Open the store at the given filesystem path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            db: Arc::new(Mutex::new(Database::open(path)?)),
        })
    }

    /// Open an in-memory store (primarily for tests)
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: Arc::new(Mutex::new(Database::open_in_memory()?)),
        })
    }

    // --- Lists ---

    /// All lists owned by the given user; no ordering guarantee
    pub async fn lists(&self, owner_id: &UserId) -> Result<Vec<TaskList>> {
        let db = self.db.lock().await;
        let mut stmt = db.connection().prepare(
            "SELECT id, owner_id, name, description, created_at, updated_at, local_modified_at
             FROM lists WHERE owner_id = ?",
        )?;
        let lists = stmt
            .query_map(params![owner_id.as_str()], Self::parse_list)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(lists)
    }

    /// Fetch a list by id
    pub async fn get_list(&self, id: &ListId) -> Result<Option<TaskList>> {
        let db = self.db.lock().await;
        let list = db
            .connection()
            .query_row(
                "SELECT id, owner_id, name, description, created_at, updated_at, local_modified_at
                 FROM lists WHERE id = ?",
                params![id.as_str()],
                Self::parse_list,
            )
            .optional()?;
        Ok(list)
    }

    /// Upsert a list as a local edit, stamping the local-modification
    /// marker used later to detect "changed since last sync".
    pub async fn save_list(&self, list: &TaskList) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.upsert_list(list, Some(now)).await
    }

    /// Persist a list exactly as the remote returned it; clears the
    /// local-modification marker.
    pub async fn apply_remote_list(&self, list: &TaskList) -> Result<()> {
        self.upsert_list(list, None).await
    }

    async fn upsert_list(&self, list: &TaskList, marker: Option<i64>) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO lists (id, owner_id, name, description, created_at, updated_at, local_modified_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    owner_id = excluded.owner_id,
                    name = excluded.name,
                    description = excluded.description,
                    updated_at = excluded.updated_at,
                    local_modified_at = excluded.local_modified_at",
                params![
                    list.id.as_str(),
                    list.owner_id.as_str(),
                    list.name,
                    list.description,
                    list.created_at,
                    list.updated_at,
                    marker,
                ],
            )
            .map_err(write_err)?;
        Ok(())
    }

    /// Delete a list and every task referencing it, as one atomic unit
    pub async fn delete_list(&self, id: &ListId) -> Result<()> {
        let mut db = self.db.lock().await;
        let tx = db.connection_mut().transaction().map_err(write_err)?;

        tx.execute("DELETE FROM tasks WHERE list_id = ?", params![id.as_str()])
            .map_err(write_err)?;
        let rows = tx
            .execute("DELETE FROM lists WHERE id = ?", params![id.as_str()])
            .map_err(write_err)?;

        // Roll back the cascade when the list row never existed; dropping
        // the uncommitted transaction undoes the task deletes.
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        tx.commit().map_err(write_err)?;
        Ok(())
    }

    // --- Tasks ---

    /// All tasks owned by the given user; no ordering guarantee
    pub async fn tasks(&self, owner_id: &UserId) -> Result<Vec<Task>> {
        let db = self.db.lock().await;
        let mut stmt = db.connection().prepare(
            "SELECT id, list_id, owner_id, title, description, completed, priority, due_date,
                    created_at, updated_at, local_modified_at
             FROM tasks WHERE owner_id = ?",
        )?;
        let tasks = stmt
            .query_map(params![owner_id.as_str()], Self::parse_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    /// All tasks referencing the given list as parent
    pub async fn tasks_in_list(&self, list_id: &ListId) -> Result<Vec<Task>> {
        let db = self.db.lock().await;
        let mut stmt = db.connection().prepare(
            "SELECT id, list_id, owner_id, title, description, completed, priority, due_date,
                    created_at, updated_at, local_modified_at
             FROM tasks WHERE list_id = ?",
        )?;
        let tasks = stmt
            .query_map(params![list_id.as_str()], Self::parse_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    /// Fetch a task by id
    pub async fn get_task(&self, id: &TaskId) -> Result<Option<Task>> {
        let db = self.db.lock().await;
        let task = db
            .connection()
            .query_row(
                "SELECT id, list_id, owner_id, title, description, completed, priority, due_date,
                        created_at, updated_at, local_modified_at
                 FROM tasks WHERE id = ?",
                params![id.as_str()],
                Self::parse_task,
            )
            .optional()?;
        Ok(task)
    }

    /// Upsert a task as a local edit, stamping the local-modification marker
    pub async fn save_task(&self, task: &Task) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.upsert_task(task, Some(now)).await
    }

    /// Persist a task exactly as the remote returned it; clears the marker
    pub async fn apply_remote_task(&self, task: &Task) -> Result<()> {
        self.upsert_task(task, None).await
    }

    async fn upsert_task(&self, task: &Task, marker: Option<i64>) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO tasks (id, list_id, owner_id, title, description, completed,
                                    priority, due_date, created_at, updated_at, local_modified_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    list_id = excluded.list_id,
                    owner_id = excluded.owner_id,
                    title = excluded.title,
                    description = excluded.description,
                    completed = excluded.completed,
                    priority = excluded.priority,
                    due_date = excluded.due_date,
                    updated_at = excluded.updated_at,
                    local_modified_at = excluded.local_modified_at",
                params![
                    task.id.as_str(),
                    task.list_id.as_str(),
                    task.owner_id.as_str(),
                    task.title,
                    task.description,
                    i32::from(task.completed),
                    task.priority.as_i64(),
                    task.due_date,
                    task.created_at,
                    task.updated_at,
                    marker,
                ],
            )
            .map_err(write_err)?;
        Ok(())
    }

    /// Delete a task
    pub async fn delete_task(&self, id: &TaskId) -> Result<()> {
        let db = self.db.lock().await;
        let rows = db
            .connection()
            .execute("DELETE FROM tasks WHERE id = ?", params![id.as_str()])
            .map_err(write_err)?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    // --- Pending operation queue ---

    /// Persist a pending operation; returns its id
    pub async fn enqueue_operation(&self, op: &PendingOperation) -> Result<OperationId> {
        let payload = serde_json::to_string(&op.payload)?;
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO operations
                    (id, owner_id, kind, collection, entity_id, payload,
                     enqueued_at, retry_count, last_error)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    op.id.as_str(),
                    op.owner_id.as_str(),
                    op.kind.as_str(),
                    op.collection.as_str(),
                    op.entity_id,
                    payload,
                    op.enqueued_at,
                    op.retry_count,
                    op.last_error,
                ],
            )
            .map_err(write_err)?;
        Ok(op.id)
    }

    /// The given user's queued operations, oldest enqueue first
    pub async fn queued_operations(&self, owner_id: &UserId) -> Result<Vec<PendingOperation>> {
        let db = self.db.lock().await;
        let mut stmt = db.connection().prepare(
            "SELECT id, owner_id, kind, collection, entity_id, payload,
                    enqueued_at, retry_count, last_error
             FROM operations
             WHERE owner_id = ?
             ORDER BY enqueued_at ASC, id ASC",
        )?;
        let ops = stmt
            .query_map(params![owner_id.as_str()], Self::parse_operation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ops)
    }

    /// Number of operations queued for the given user
    pub async fn queued_operation_count(&self, owner_id: &UserId) -> Result<usize> {
        let db = self.db.lock().await;
        let count: i64 = db.connection().query_row(
            "SELECT COUNT(*) FROM operations WHERE owner_id = ?",
            params![owner_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Remove an operation after the remote confirmed it
    pub async fn remove_operation(&self, id: OperationId) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute("DELETE FROM operations WHERE id = ?", params![id.as_str()])
            .map_err(write_err)?;
        Ok(())
    }

    /// Record a failed push attempt: bump the retry count, keep the error
    pub async fn mark_operation_failed(&self, id: OperationId, error: &str) -> Result<()> {
        let db = self.db.lock().await;
        let rows = db
            .connection()
            .execute(
                "UPDATE operations SET retry_count = retry_count + 1, last_error = ? WHERE id = ?",
                params![error, id.as_str()],
            )
            .map_err(write_err)?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    // --- Metadata ---

    /// Read a scalar metadata value; absent keys return `None`
    pub async fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock().await;
        let value = db
            .connection()
            .query_row(
                "SELECT value FROM metadata WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Write a scalar metadata value
    pub async fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)",
                params![key, value],
            )
            .map_err(write_err)?;
        Ok(())
    }

    /// Wipe all four logical stores; used for sign-out or explicit reset
    pub async fn clear_all(&self) -> Result<()> {
        let mut db = self.db.lock().await;
        let tx = db.connection_mut().transaction().map_err(write_err)?;
        tx.execute_batch(
            "DELETE FROM tasks;
             DELETE FROM lists;
             DELETE FROM operations;
             DELETE FROM metadata;",
        )
        .map_err(write_err)?;
        tx.commit().map_err(write_err)?;
        tracing::debug!("Local store cleared");
        Ok(())
    }

    // --- Row mapping ---

    fn parse_list(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskList> {
        let id: String = row.get(0)?;
        let owner: String = row.get(1)?;
        Ok(TaskList {
            id: id.parse().unwrap_or_default(),
            owner_id: UserId::new(owner),
            name: row.get(2)?,
            description: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
            local_modified_at: row.get(6)?,
        })
    }

    fn parse_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
        let id: String = row.get(0)?;
        let list_id: String = row.get(1)?;
        let owner: String = row.get(2)?;
        Ok(Task {
            id: id.parse().unwrap_or_default(),
            list_id: list_id.parse().unwrap_or_default(),
            owner_id: UserId::new(owner),
            title: row.get(3)?,
            description: row.get(4)?,
            completed: row.get::<_, i32>(5)? != 0,
            priority: Priority::from_i64(row.get(6)?),
            due_date: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            local_modified_at: row.get(10)?,
        })
    }

    fn parse_operation(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingOperation> {
        let id: String = row.get(0)?;
        let owner: String = row.get(1)?;
        let kind: String = row.get(2)?;
        let collection: String = row.get(3)?;
        let payload: String = row.get(5)?;
        Ok(PendingOperation {
            id: id.parse().unwrap_or_default(),
            owner_id: UserId::new(owner),
            kind: kind
                .parse()
                .map_err(|message: String| conversion_error(2, message))?,
            collection: collection
                .parse()
                .map_err(|message: String| conversion_error(3, message))?,
            entity_id: row.get(4)?,
            payload: serde_json::from_str(&payload)
                .map_err(|error| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(error)))?,
            enqueued_at: row.get(6)?,
            retry_count: row.get(7)?,
            last_error: row.get(8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListPatch, TaskPatch};
    use pretty_assertions::assert_eq;

    fn owner() -> UserId {
        UserId::from("user-1")
    }

    fn setup() -> LocalStore {
        LocalStore::open_in_memory().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_and_get_list() {
        let store = setup();
        let list = TaskList::new(owner(), "Groceries");

        store.save_list(&list).await.unwrap();
        let fetched = store.get_list(&list.id).await.unwrap().unwrap();

        assert_eq!(fetched.name, "Groceries");
        // A local save stamps the modification marker
        assert!(fetched.local_modified_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_apply_remote_clears_marker() {
        let store = setup();
        let list = TaskList::new(owner(), "Groceries");

        store.save_list(&list).await.unwrap();
        store.apply_remote_list(&list).await.unwrap();

        let fetched = store.get_list(&list.id).await.unwrap().unwrap();
        assert!(fetched.local_modified_at.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lists_scoped_by_owner() {
        let store = setup();
        store.save_list(&TaskList::new(owner(), "Mine")).await.unwrap();
        store
            .save_list(&TaskList::new(UserId::from("user-2"), "Theirs"))
            .await
            .unwrap();

        let lists = store.lists(&owner()).await.unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].name, "Mine");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_task_roundtrip() {
        let store = setup();
        let list = TaskList::new(owner(), "Groceries");
        store.save_list(&list).await.unwrap();

        let mut task = Task::new(list.id, owner(), "Buy milk");
        task.apply(&TaskPatch {
            priority: Some(Priority::High),
            due_date: Some(1_700_000_000_000),
            ..TaskPatch::default()
        });
        store.save_task(&task).await.unwrap();

        let fetched = store.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Buy milk");
        assert_eq!(fetched.priority, Priority::High);
        assert_eq!(fetched.due_date, Some(1_700_000_000_000));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_list_cascades_to_tasks() {
        let store = setup();
        let list = TaskList::new(owner(), "Groceries");
        store.save_list(&list).await.unwrap();
        for title in ["Milk", "Eggs", "Bread"] {
            store
                .save_task(&Task::new(list.id, owner(), title))
                .await
                .unwrap();
        }

        store.delete_list(&list.id).await.unwrap();

        assert!(store.get_list(&list.id).await.unwrap().is_none());
        assert!(store.tasks_in_list(&list.id).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_missing_list_is_not_found() {
        let store = setup();
        let result = store.delete_list(&ListId::new()).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_missing_list_rolls_back_cascade() {
        let store = setup();

        // An orphaned task referencing a list row that was never written
        let ghost_list = ListId::new();
        let task = Task::new(ghost_list, owner(), "Stray");
        store.save_task(&task).await.unwrap();

        let result = store.delete_list(&ghost_list).await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        // The failed delete must not have taken the task with it
        assert!(store.get_task(&task.id).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_queue_preserves_enqueue_order() {
        let store = setup();
        let list = TaskList::new(owner(), "Groceries");

        let mut first = PendingOperation::create_list(list.clone());
        first.enqueued_at = 1_000;
        let mut second = PendingOperation::update_list(owner(), list.id, ListPatch::default());
        second.enqueued_at = 2_000;
        let mut third = PendingOperation::delete_list(owner(), list.id);
        third.enqueued_at = 3_000;

        // Insert out of order on purpose
        store.enqueue_operation(&third).await.unwrap();
        store.enqueue_operation(&first).await.unwrap();
        store.enqueue_operation(&second).await.unwrap();

        let queued = store.queued_operations(&owner()).await.unwrap();
        let ids: Vec<_> = queued.iter().map(|op| op.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_queue_scoped_by_owner() {
        let store = setup();
        let other = UserId::from("user-2");

        let mine = PendingOperation::delete_list(owner(), ListId::new());
        let theirs = PendingOperation::delete_list(other.clone(), ListId::new());
        store.enqueue_operation(&mine).await.unwrap();
        store.enqueue_operation(&theirs).await.unwrap();

        let queued = store.queued_operations(&owner()).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id, mine.id);
        assert_eq!(queued[0].owner_id, owner());

        assert_eq!(store.queued_operation_count(&owner()).await.unwrap(), 1);
        assert_eq!(store.queued_operation_count(&other).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_operation_failed_increments_retry() {
        let store = setup();
        let op = PendingOperation::delete_list(owner(), ListId::new());
        store.enqueue_operation(&op).await.unwrap();

        store
            .mark_operation_failed(op.id, "remote unreachable")
            .await
            .unwrap();
        store
            .mark_operation_failed(op.id, "still unreachable")
            .await
            .unwrap();

        let queued = store.queued_operations(&owner()).await.unwrap();
        assert_eq!(queued[0].retry_count, 2);
        assert_eq!(queued[0].last_error.as_deref(), Some("still unreachable"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove_operation() {
        let store = setup();
        let op = PendingOperation::delete_list(owner(), ListId::new());
        store.enqueue_operation(&op).await.unwrap();

        store.remove_operation(op.id).await.unwrap();
        assert_eq!(store.queued_operation_count(&owner()).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_operation_payload_roundtrip() {
        let store = setup();
        let task = Task::new(ListId::new(), owner(), "Buy milk");
        let op = PendingOperation::create_task(task.clone());
        store.enqueue_operation(&op).await.unwrap();

        let queued = store.queued_operations(&owner()).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].payload, op.payload);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_metadata_roundtrip_and_missing_key() {
        let store = setup();
        assert!(store.get_metadata("last_sync:user-1").await.unwrap().is_none());

        store.set_metadata("last_sync:user-1", "12345").await.unwrap();
        assert_eq!(
            store.get_metadata("last_sync:user-1").await.unwrap().as_deref(),
            Some("12345")
        );

        store.set_metadata("last_sync:user-1", "67890").await.unwrap();
        assert_eq!(
            store.get_metadata("last_sync:user-1").await.unwrap().as_deref(),
            Some("67890")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_clear_all_wipes_every_store() {
        let store = setup();
        let list = TaskList::new(owner(), "Groceries");
        store.save_list(&list).await.unwrap();
        store
            .save_task(&Task::new(list.id, owner(), "Buy milk"))
            .await
            .unwrap();
        store
            .enqueue_operation(&PendingOperation::create_list(list.clone()))
            .await
            .unwrap();
        store.set_metadata("last_sync:user-1", "1").await.unwrap();

        store.clear_all().await.unwrap();

        assert!(store.lists(&owner()).await.unwrap().is_empty());
        assert!(store.tasks(&owner()).await.unwrap().is_empty());
        assert_eq!(store.queued_operation_count(&owner()).await.unwrap(), 0);
        assert!(store.get_metadata("last_sync:user-1").await.unwrap().is_none());
    }
}
