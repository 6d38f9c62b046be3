//! Sync conflict model

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{Task, TaskList};

/// Kind of entity involved in a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    List,
    Task,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List => write!(f, "list"),
            Self::Task => write!(f, "task"),
        }
    }
}

/// A full snapshot of either entity type, as captured on one side of a
/// conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntitySnapshot {
    List(TaskList),
    Task(Task),
}

impl EntitySnapshot {
    /// Kind of the wrapped entity
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::List(_) => EntityKind::List,
            Self::Task(_) => EntityKind::Task,
        }
    }

    /// String form of the wrapped entity's id
    #[must_use]
    pub fn entity_id(&self) -> String {
        match self {
            Self::List(list) => list.id.as_str(),
            Self::Task(task) => task.id.as_str(),
        }
    }

    /// Update timestamp of the wrapped entity
    #[must_use]
    pub const fn updated_at(&self) -> i64 {
        match self {
            Self::List(list) => list.updated_at,
            Self::Task(task) => task.updated_at,
        }
    }

    /// Local-modification marker of the wrapped entity, if stamped
    #[must_use]
    pub const fn local_modified_at(&self) -> Option<i64> {
        match self {
            Self::List(list) => list.local_modified_at,
            Self::Task(task) => task.local_modified_at,
        }
    }

    /// Names of domain fields differing from `other`. Snapshots of
    /// different kinds never share fields.
    #[must_use]
    pub fn diff_fields(&self, other: &Self) -> Vec<String> {
        match (self, other) {
            (Self::List(a), Self::List(b)) => a.diff_fields(b),
            (Self::Task(a), Self::Task(b)) => a.diff_fields(b),
            _ => Vec::new(),
        }
    }
}

/// A unique identifier for a detected conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(Uuid);

impl ConflictId {
    /// Create a new unique conflict ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A detected divergence between the local and remote versions of one
/// entity since the last successful sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Conflict identifier
    pub id: ConflictId,
    /// Kind of the affected entity
    pub entity_kind: EntityKind,
    /// Full local snapshot
    pub local: EntitySnapshot,
    /// Full remote snapshot
    pub remote: EntitySnapshot,
    /// When this client last modified the record (Unix ms)
    pub local_modified_at: i64,
    /// When the remote side last modified the record (Unix ms)
    pub remote_updated_at: i64,
    /// Names of the domain fields whose values differ
    pub fields: Vec<String>,
}

impl Conflict {
    /// String form of the affected entity's id
    #[must_use]
    pub fn entity_id(&self) -> String {
        self.local.entity_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListId, UserId};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_snapshot_accessors() {
        let task = Task::new(ListId::new(), UserId::from("u1"), "Buy milk");
        let snapshot = EntitySnapshot::Task(task.clone());

        assert_eq!(snapshot.kind(), EntityKind::Task);
        assert_eq!(snapshot.entity_id(), task.id.as_str());
        assert_eq!(snapshot.updated_at(), task.updated_at);
    }

    #[test]
    fn test_mixed_kind_diff_is_empty() {
        let list = TaskList::new(UserId::from("u1"), "Groceries");
        let task = Task::new(list.id, UserId::from("u1"), "Buy milk");
        let a = EntitySnapshot::List(list);
        let b = EntitySnapshot::Task(task);
        assert!(a.diff_fields(&b).is_empty());
    }
}
