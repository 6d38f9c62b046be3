//! Conflict detection
//!
//! A record is in conflict only when both sides changed it after the last
//! successful sync *and* the changes actually diverge. Two edits that agree
//! in value are not a conflict.

use crate::models::{Conflict, ConflictId, EntitySnapshot};

/// Compare a local and a remote version of the same entity against the
/// sync watermark. Returns `None` when one side is authoritative or both
/// sides made the identical change.
#[must_use]
pub fn detect(
    local: &EntitySnapshot,
    remote: &EntitySnapshot,
    last_sync: i64,
) -> Option<Conflict> {
    // A row never written by this client carries no marker and cannot be
    // locally modified.
    let local_modified_at = local.local_modified_at()?;

    let local_modified = local_modified_at > last_sync;
    let remote_modified = remote.updated_at() > last_sync;
    if !(local_modified && remote_modified) {
        return None;
    }

    let fields = local.diff_fields(remote);
    if fields.is_empty() {
        return None;
    }

    Some(Conflict {
        id: ConflictId::new(),
        entity_kind: local.kind(),
        local: local.clone(),
        remote: remote.clone(),
        local_modified_at,
        remote_updated_at: remote.updated_at(),
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListId, Task, UserId};
    use pretty_assertions::assert_eq;

    fn task_pair() -> (Task, Task) {
        let local = Task::new(ListId::new(), UserId::from("u1"), "Buy milk");
        let remote = local.clone();
        (local, remote)
    }

    fn snap(task: Task) -> EntitySnapshot {
        EntitySnapshot::Task(task)
    }

    #[test]
    fn test_no_conflict_when_only_remote_changed() {
        let (mut local, mut remote) = task_pair();
        local.local_modified_at = Some(100);
        remote.title = "Buy milk and eggs".to_string();
        remote.updated_at = 140;

        // Local edit predates the watermark, remote is authoritative
        assert!(detect(&snap(local), &snap(remote), 120).is_none());
    }

    #[test]
    fn test_no_conflict_when_only_local_changed() {
        let (mut local, mut remote) = task_pair();
        local.title = "Buy oat milk".to_string();
        local.local_modified_at = Some(150);
        remote.updated_at = 100;

        assert!(detect(&snap(local), &snap(remote), 120).is_none());
    }

    #[test]
    fn test_no_conflict_without_local_marker() {
        let (local, mut remote) = task_pair();
        remote.title = "Buy milk and eggs".to_string();
        remote.updated_at = i64::MAX;

        assert!(detect(&snap(local), &snap(remote), 0).is_none());
    }

    #[test]
    fn test_agreeing_edits_are_not_a_conflict() {
        let (mut local, mut remote) = task_pair();
        local.title = "Buy milk and eggs".to_string();
        local.local_modified_at = Some(150);
        remote.title = "Buy milk and eggs".to_string();
        remote.updated_at = 140;

        assert!(detect(&snap(local), &snap(remote), 120).is_none());
    }

    #[test]
    fn test_divergent_edits_report_exact_fields() {
        let (mut local, mut remote) = task_pair();
        local.title = "Buy oat milk".to_string();
        local.completed = true;
        local.local_modified_at = Some(150);
        remote.title = "Buy milk and eggs".to_string();
        remote.due_date = Some(1_700_000_000_000);
        remote.updated_at = 140;

        let conflict = detect(&snap(local), &snap(remote), 120).unwrap();
        assert_eq!(conflict.fields, vec!["title", "completed", "due_date"]);
        assert_eq!(conflict.local_modified_at, 150);
        assert_eq!(conflict.remote_updated_at, 140);
    }

    #[test]
    fn test_title_edited_on_both_sides_conflicts() {
        // Local T1: title "Buy milk", updated 100, locally modified at 150.
        // Remote T1: title "Buy milk and eggs", updated 140. Watermark 120.
        let (mut local, mut remote) = task_pair();
        local.title = "Buy milk".to_string();
        local.updated_at = 100;
        local.local_modified_at = Some(150);
        remote.title = "Buy milk and eggs".to_string();
        remote.updated_at = 140;

        let conflict = detect(&snap(local), &snap(remote), 120).unwrap();
        assert_eq!(conflict.fields, vec!["title"]);
    }
}
