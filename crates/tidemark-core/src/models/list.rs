//! Task list model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::UserId;

/// A unique identifier for a task list, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListId(Uuid);

impl ListId {
    /// Create a new unique list ID using UUID v7
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

impl Default for ListId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ListId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A task list owned by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskList {
    /// Unique identifier
    pub id: ListId,
    /// Owning user
    pub owner_id: UserId,
    /// List name
    pub name: String,
    /// Optional free-form description
    pub description: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms), set by whichever side last wrote
    pub updated_at: i64,
    /// When this client last wrote the record; `None` for rows written
    /// verbatim from the remote. Drives changed-since-last-sync detection.
    pub local_modified_at: Option<i64>,
}

impl TaskList {
    /// Create a new list with the given owner and name
    #[must_use]
    pub fn new(owner_id: UserId, name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: ListId::new(),
            owner_id,
            name: name.into(),
            description: None,
            created_at: now,
            updated_at: now,
            local_modified_at: None,
        }
    }

    /// Names of domain fields whose values differ from `other`.
    ///
    /// Bookkeeping fields (timestamps, owner, modification marker) are
    /// never compared.
    #[must_use]
    pub fn diff_fields(&self, other: &Self) -> Vec<String> {
        let mut fields = Vec::new();
        if self.name != other.name {
            fields.push("name".to_string());
        }
        if self.description != other.description {
            fields.push("description".to_string());
        }
        fields
    }

    /// Apply a patch, overwriting only the fields it carries.
    pub fn apply(&mut self, patch: &ListPatch) {
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

/// Partial update for a list; only the fields listed here may be patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPatch {
    /// New name, if changed
    pub name: Option<String>,
    /// New description, if changed
    pub description: Option<String>,
}

impl ListPatch {
    /// Build a patch carrying every domain field of `list`; used when a
    /// resolved conflict must propagate a full snapshot back to the remote.
    #[must_use]
    pub fn from_list(list: &TaskList) -> Self {
        Self {
            name: Some(list.name.clone()),
            description: list.description.clone(),
        }
    }

    /// Whether the patch carries no fields at all
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}
