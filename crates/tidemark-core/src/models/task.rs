//! Task model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{ListId, UserId};

/// A unique identifier for a task, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new unique task ID using UUID v7
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

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Integer representation stored in SQLite
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }

    /// Parse the stored integer representation; unknown values fall back
    /// to `Medium` rather than failing the row.
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        match value {
            0 => Self::Low,
            2 => Self::High,
            _ => Self::Medium,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// A task belonging to a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,
    /// Parent list
    pub list_id: ListId,
    /// Owning user
    pub owner_id: UserId,
    /// Task title
    pub title: String,
    /// Optional free-form description
    pub description: Option<String>,
    /// Completion flag
    pub completed: bool,
    /// Priority
    pub priority: Priority,
    /// Optional due date (Unix ms)
    pub due_date: Option<i64>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms), set by whichever side last wrote
    pub updated_at: i64,
    /// When this client last wrote the record; `None` for rows written
    /// verbatim from the remote.
    pub local_modified_at: Option<i64>,
}

impl Task {
    /// Create a new task in the given list
    #[must_use]
    pub fn new(list_id: ListId, owner_id: UserId, title: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: TaskId::new(),
            list_id,
            owner_id,
            title: title.into(),
            description: None,
            completed: false,
            priority: Priority::default(),
            due_date: None,
            created_at: now,
            updated_at: now,
            local_modified_at: None,
        }
    }

    /// Names of domain fields whose values differ from `other`.
    #[must_use]
    pub fn diff_fields(&self, other: &Self) -> Vec<String> {
        let mut fields = Vec::new();
        if self.title != other.title {
            fields.push("title".to_string());
        }
        if self.description != other.description {
            fields.push("description".to_string());
        }
        if self.completed != other.completed {
            fields.push("completed".to_string());
        }
        if self.priority != other.priority {
            fields.push("priority".to_string());
        }
        if self.due_date != other.due_date {
            fields.push("due_date".to_string());
        }
        if self.list_id != other.list_id {
            fields.push("list_id".to_string());
        }
        fields
    }

    /// Apply a patch, overwriting only the fields it carries.
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title.clone_from(title);
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = Some(due_date);
        }
        if let Some(list_id) = patch.list_id {
            self.list_id = list_id;
        }
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

/// Partial update for a task; only the fields listed here may be patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New title, if changed
    pub title: Option<String>,
    /// New description, if changed
    pub description: Option<String>,
    /// New completion flag, if changed
    pub completed: Option<bool>,
    /// New priority, if changed
    pub priority: Option<Priority>,
    /// New due date, if changed
    pub due_date: Option<i64>,
    /// New parent list, if the task moved
    pub list_id: Option<ListId>,
}

impl TaskPatch {
    /// Build a patch carrying every domain field of `task`.
    #[must_use]
    pub fn from_task(task: &Task) -> Self {
        Self {
            title: Some(task.title.clone()),
            description: task.description.clone(),
            completed: Some(task.completed),
            priority: Some(task.priority),
            due_date: task.due_date,
            list_id: Some(task.list_id),
        }
    }

    /// Whether the patch carries no fields at all
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.completed.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.list_id.is_none()
    }
}
