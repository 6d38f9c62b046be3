//! Remote data source contract
//!
//! The authoritative backend, seen as typed CRUD calls scoped to the
//! authenticated user. The transport behind it is the caller's concern;
//! each call is expected to carry its own timeout and surface failures as
//! [`Error::RemoteUnreachable`] or [`Error::RemoteRejected`].
//!
//! [`Error::RemoteUnreachable`]: crate::Error::RemoteUnreachable
//! [`Error::RemoteRejected`]: crate::Error::RemoteRejected

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ListId, ListPatch, Task, TaskId, TaskList, TaskPatch, UserId};

/// Typed CRUD surface of the remote service, per collection.
#[async_trait]
pub trait RemoteDataSource: Send + Sync {
    /// Lists owned by `owner_id` with update timestamp at or after `since`
    async fn lists_since(&self, owner_id: &UserId, since: i64) -> Result<Vec<TaskList>>;

    /// Tasks owned by `owner_id` with update timestamp at or after `since`
    async fn tasks_since(&self, owner_id: &UserId, since: i64) -> Result<Vec<Task>>;

    /// Create a list; returns the record with server-assigned timestamps
    async fn create_list(&self, list: &TaskList) -> Result<TaskList>;

    /// Partially update a list by server-known id
    async fn update_list(&self, id: &ListId, patch: &ListPatch) -> Result<TaskList>;

    /// Delete a list; deleting an already-dead id is a no-op, not an error
    async fn delete_list(&self, id: &ListId) -> Result<()>;

    /// Create a task; returns the record with server-assigned timestamps
    async fn create_task(&self, task: &Task) -> Result<Task>;

    /// Partially update a task by server-known id
    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task>;

    /// Delete a task; deleting an already-dead id is a no-op, not an error
    async fn delete_task(&self, id: &TaskId) -> Result<()>;
}
