//! Conflict resolution strategies

use std::sync::Arc;

use crate::models::{Conflict, EntityKind, EntitySnapshot};

/// Outcome of resolving a conflict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The local snapshot wins in its entirety
    Local,
    /// The remote snapshot wins in its entirety
    Remote,
    /// A caller-supplied merged snapshot wins
    Merge(EntitySnapshot),
}

/// Strategy deciding which side of a conflict survives.
///
/// Returning `None` defers the decision (e.g., a UI-driven resolver that
/// has not yet heard back from the human); the conflict is then surfaced
/// unresolved and re-detected on the next cycle.
pub trait ConflictResolver: Send + Sync {
    /// Decide the conflict, or defer it
    fn resolve(&self, conflict: &Conflict) -> Option<Resolution>;

    /// Name of this strategy, for logging
    fn name(&self) -> &'static str;
}

/// Default strategy: the later modification timestamp wins whole-record.
///
/// Compares the local modification marker against the remote update
/// timestamp; a tie prefers local, deterministically.
pub struct LastWriteWins;

impl ConflictResolver for LastWriteWins {
    fn resolve(&self, conflict: &Conflict) -> Option<Resolution> {
        if conflict.remote_updated_at > conflict.local_modified_at {
            Some(Resolution::Remote)
        } else {
            Some(Resolution::Local)
        }
    }

    fn name(&self) -> &'static str {
        "last_write_wins"
    }
}

/// Strategy that always defers, leaving every conflict to be surfaced to
/// the caller (a human-in-the-loop placeholder).
pub struct Deferred;

impl ConflictResolver for Deferred {
    fn resolve(&self, _conflict: &Conflict) -> Option<Resolution> {
        None
    }

    fn name(&self) -> &'static str {
        "deferred"
    }
}

/// Per-entity-kind resolver mapping. Both kinds default to
/// [`LastWriteWins`]; callers may swap either slot.
#[derive(Clone)]
pub struct ResolverRegistry {
    list: Arc<dyn ConflictResolver>,
    task: Arc<dyn ConflictResolver>,
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self {
            list: Arc::new(LastWriteWins),
            task: Arc::new(LastWriteWins),
        }
    }
}

impl ResolverRegistry {
    /// The resolver registered for the given entity kind
    #[must_use]
    pub fn get(&self, kind: EntityKind) -> Arc<dyn ConflictResolver> {
        match kind {
            EntityKind::List => Arc::clone(&self.list),
            EntityKind::Task => Arc::clone(&self.task),
        }
    }

    /// Replace the resolver for the given entity kind
    pub fn set(&mut self, kind: EntityKind, resolver: Arc<dyn ConflictResolver>) {
        match kind {
            EntityKind::List => self.list = resolver,
            EntityKind::Task => self.task = resolver,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConflictId, ListId, Task, UserId};

    fn conflict_with(local_modified_at: i64, remote_updated_at: i64) -> Conflict {
        let local = Task::new(ListId::new(), UserId::from("u1"), "Buy milk");
        let mut remote = local.clone();
        remote.title = "Buy milk and eggs".to_string();
        Conflict {
            id: ConflictId::new(),
            entity_kind: EntityKind::Task,
            local: EntitySnapshot::Task(local),
            remote: EntitySnapshot::Task(remote),
            local_modified_at,
            remote_updated_at,
            fields: vec!["title".to_string()],
        }
    }

    #[test]
    fn test_lww_prefers_later_local() {
        let resolution = LastWriteWins.resolve(&conflict_with(150, 140));
        assert_eq!(resolution, Some(Resolution::Local));
    }

    #[test]
    fn test_lww_prefers_later_remote() {
        let resolution = LastWriteWins.resolve(&conflict_with(140, 150));
        assert_eq!(resolution, Some(Resolution::Remote));
    }

    #[test]
    fn test_lww_tie_breaks_to_local() {
        let resolution = LastWriteWins.resolve(&conflict_with(150, 150));
        assert_eq!(resolution, Some(Resolution::Local));
    }

    #[test]
    fn test_deferred_never_decides() {
        assert!(Deferred.resolve(&conflict_with(150, 140)).is_none());
    }

    #[test]
    fn test_registry_swaps_per_kind() {
        let mut registry = ResolverRegistry::default();
        registry.set(EntityKind::Task, Arc::new(Deferred));

        assert_eq!(registry.get(EntityKind::Task).name(), "deferred");
        assert_eq!(registry.get(EntityKind::List).name(), "last_write_wins");
    }
}
