//! Pending operation model: a local mutation not yet confirmed by the remote

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{ListId, ListPatch, Task, TaskId, TaskList, TaskPatch, UserId};

/// A unique identifier for a pending operation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new unique operation ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of queued mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    /// Stable string form stored in SQLite
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown operation kind: {other}")),
        }
    }
}

/// Target entity collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Lists,
    Tasks,
}

impl Collection {
    /// Stable string form stored in SQLite
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lists => "lists",
            Self::Tasks => "tasks",
        }
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lists" => Ok(Self::Lists),
            "tasks" => Ok(Self::Tasks),
            other => Err(format!("unknown collection: {other}")),
        }
    }
}

/// Typed payload carried by a pending operation.
///
/// Updates carry explicit patch types rather than loose JSON so a replayed
/// operation can never apply fields it was not recorded with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationPayload {
    CreateList { list: TaskList },
    UpdateList { patch: ListPatch },
    CreateTask { task: Task },
    UpdateTask { patch: TaskPatch },
    Delete,
}

/// A locally queued mutation awaiting confirmation by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Unique identifier
    pub id: OperationId,
    /// User whose queue this operation belongs to
    pub owner_id: UserId,
    /// Kind of mutation
    pub kind: OperationKind,
    /// Target collection
    pub collection: Collection,
    /// Server-known entity id targeted by UPDATE/DELETE; creates carry the
    /// new entity inside the payload instead
    pub entity_id: Option<String>,
    /// Typed payload
    pub payload: OperationPayload,
    /// Enqueue timestamp (Unix ms)
    pub enqueued_at: i64,
    /// Failed push attempts so far
    pub retry_count: u32,
    /// Error recorded by the most recent failed push, if any
    pub last_error: Option<String>,
}

impl PendingOperation {
    fn build(
        owner_id: UserId,
        kind: OperationKind,
        collection: Collection,
        entity_id: Option<String>,
        payload: OperationPayload,
    ) -> Self {
        Self {
            id: OperationId::new(),
            owner_id,
            kind,
            collection,
            entity_id,
            payload,
            enqueued_at: chrono::Utc::now().timestamp_millis(),
            retry_count: 0,
            last_error: None,
        }
    }

    /// Queue creation of a list, owned by the list's owner
    #[must_use]
    pub fn create_list(list: TaskList) -> Self {
        Self::build(
            list.owner_id.clone(),
            OperationKind::Create,
            Collection::Lists,
            None,
            OperationPayload::CreateList { list },
        )
    }

    /// Queue a partial update of a list
    #[must_use]
    pub fn update_list(owner_id: UserId, id: ListId, patch: ListPatch) -> Self {
        Self::build(
            owner_id,
            OperationKind::Update,
            Collection::Lists,
            Some(id.as_str()),
            OperationPayload::UpdateList { patch },
        )
    }

    /// Queue deletion of a list
    #[must_use]
    pub fn delete_list(owner_id: UserId, id: ListId) -> Self {
        Self::build(
            owner_id,
            OperationKind::Delete,
            Collection::Lists,
            Some(id.as_str()),
            OperationPayload::Delete,
        )
    }

    /// Queue creation of a task, owned by the task's owner
    #[must_use]
    pub fn create_task(task: Task) -> Self {
        Self::build(
            task.owner_id.clone(),
            OperationKind::Create,
            Collection::Tasks,
            None,
            OperationPayload::CreateTask { task },
        )
    }

    /// Queue a partial update of a task
    #[must_use]
    pub fn update_task(owner_id: UserId, id: TaskId, patch: TaskPatch) -> Self {
        Self::build(
            owner_id,
            OperationKind::Update,
            Collection::Tasks,
            Some(id.as_str()),
            OperationPayload::UpdateTask { patch },
        )
    }

    /// Queue deletion of a task
    #[must_use]
    pub fn delete_task(owner_id: UserId, id: TaskId) -> Self {
        Self::build(
            owner_id,
            OperationKind::Delete,
            Collection::Tasks,
            Some(id.as_str()),
            OperationPayload::Delete,
        )
    }
}
