//! Sync orchestration
//!
//! One cycle: pull remote changes since the watermark, detect conflicts,
//! apply non-conflicting remote updates, push the queued local operations
//! in enqueue order, resolve collected conflicts, then advance the
//! watermark. Per-item failures never abort the cycle; a fatal error (pull
//! failure, local store failure) aborts it and leaves the watermark and
//! queue untouched so the next invocation retries from the same point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::models::{
    Conflict, EntityKind, EntitySnapshot, ListPatch, OperationKind, OperationPayload,
    PendingOperation, TaskPatch, UserId,
};
use crate::store::LocalStore;

use super::detect::detect;
use super::remote::RemoteDataSource;
use super::resolve::{ConflictResolver, Resolution, ResolverRegistry};

/// Aggregate outcome of one sync cycle.
///
/// A cycle is successful when no fatal error occurred, even if individual
/// items failed: success is not the same as zero failures.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SyncReport {
    /// Total records reconciled (pulled + pushed + resolved)
    pub synced: usize,
    /// Per-item failures (failed pushes, failed resolutions)
    pub failed: usize,
    /// Remote records applied locally during the pull phase
    pub pulled: usize,
    /// Queued operations confirmed by the remote during the push phase
    pub pushed: usize,
    /// Conflicts decided and applied during this cycle
    pub resolved: usize,
    /// Conflicts left undecided; re-detected next cycle
    pub conflicts: Vec<Conflict>,
    /// Non-fatal error messages accumulated across the cycle
    pub errors: Vec<String>,
}

/// Point-in-time sync state for a user, consumed by UI layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    /// Watermark of the last successful sync (Unix ms), if any
    pub last_sync: Option<i64>,
    /// Depth of the pending-operation queue
    pub pending_operations: usize,
    /// Whether the previous cycle left conflicts undecided
    pub has_unresolved_conflicts: bool,
}

/// Orchestrates synchronization between the local store and the remote
/// data source. Explicitly constructed; callers hold and pass the
/// instance rather than relying on global state.
pub struct SyncManager {
    store: LocalStore,
    remote: Arc<dyn RemoteDataSource>,
    resolvers: RwLock<ResolverRegistry>,
    in_flight: AtomicBool,
    unresolved: Mutex<Vec<Conflict>>,
}

/// Resets the single-flight flag when a cycle ends, normally or early
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncManager {
    /// Create a manager owning the injected store and remote collaborator
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteDataSource>) -> Self {
        Self {
            store,
            remote,
            resolvers: RwLock::new(ResolverRegistry::default()),
            in_flight: AtomicBool::new(false),
            unresolved: Mutex::new(Vec::new()),
        }
    }

    /// Whether a cycle is currently running on this instance
    pub fn is_sync_in_progress(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Replace the conflict resolver for an entity kind
    pub async fn register_resolver(&self, kind: EntityKind, resolver: Arc<dyn ConflictResolver>) {
        self.resolvers.write().await.set(kind, resolver);
    }

    /// Conflicts the previous cycle left undecided
    pub async fn unresolved_conflicts(&self) -> Vec<Conflict> {
        self.unresolved.lock().await.clone()
    }

    /// Current sync state for the given user
    pub async fn sync_status(&self, user_id: &UserId) -> Result<SyncStatus> {
        Ok(SyncStatus {
            last_sync: self.stored_watermark(user_id).await?,
            pending_operations: self.store.queued_operation_count(user_id).await?,
            has_unresolved_conflicts: !self.unresolved.lock().await.is_empty(),
        })
    }

    /// Run one full synchronization cycle for the given user.
    ///
    /// Fails immediately with [`Error::SyncInProgress`] while another cycle
    /// is in flight on this instance; overlapping requests are rejected,
    /// never queued.
    pub async fn perform_sync(&self, user_id: &UserId) -> Result<SyncReport> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| Error::SyncInProgress)?;
        let _guard = InFlightGuard(&self.in_flight);

        let cycle_start = chrono::Utc::now().timestamp_millis();
        let last_sync = self.stored_watermark(user_id).await?.unwrap_or(0);
        tracing::debug!(user = %user_id, last_sync, "Starting sync cycle");

        let mut report = SyncReport::default();
        let mut conflicts = Vec::new();

        // Pull. The two collection fetches are independent reads and run
        // concurrently; any pull failure is fatal to the cycle.
        let (lists, tasks) = tokio::join!(
            self.remote.lists_since(user_id, last_sync),
            self.remote.tasks_since(user_id, last_sync),
        );
        let remote_lists = lists?;
        let remote_tasks = tasks?;

        for list in remote_lists {
            match self.store.get_list(&list.id).await? {
                None => {
                    self.store.apply_remote_list(&list).await?;
                    report.pulled += 1;
                }
                Some(local) => {
                    let detected = detect(
                        &EntitySnapshot::List(local.clone()),
                        &EntitySnapshot::List(list.clone()),
                        last_sync,
                    );
                    if let Some(conflict) = detected {
                        conflicts.push(conflict);
                    } else if list.updated_at > local.updated_at {
                        self.store.apply_remote_list(&list).await?;
                        report.pulled += 1;
                    }
                }
            }
        }

        for task in remote_tasks {
            match self.store.get_task(&task.id).await? {
                None => {
                    self.store.apply_remote_task(&task).await?;
                    report.pulled += 1;
                }
                Some(local) => {
                    let detected = detect(
                        &EntitySnapshot::Task(local.clone()),
                        &EntitySnapshot::Task(task.clone()),
                        last_sync,
                    );
                    if let Some(conflict) = detected {
                        conflicts.push(conflict);
                    } else if task.updated_at > local.updated_at {
                        self.store.apply_remote_task(&task).await?;
                        report.pulled += 1;
                    }
                }
            }
        }

        // Push, strictly in enqueue order: a later UPDATE must never reach
        // the remote before an earlier CREATE for the same entity. A failed
        // item is recorded and skipped, not retried within the cycle. Only
        // this user's queue is drained; other accounts sync on their own.
        for op in self.store.queued_operations(user_id).await? {
            match self.push_operation(&op).await {
                Ok(()) => {
                    self.store.remove_operation(op.id).await?;
                    report.pushed += 1;
                }
                Err(error) => {
                    tracing::warn!(operation = %op.id, %error, "Push failed");
                    self.store
                        .mark_operation_failed(op.id, &error.to_string())
                        .await?;
                    report.failed += 1;
                    report.errors.push(format!("push {}: {error}", op.id));
                }
            }
        }

        // Resolve collected conflicts; an undecided conflict is surfaced
        // and keeps the watermark from advancing.
        for conflict in conflicts {
            let resolver = self.resolvers.read().await.get(conflict.entity_kind);
            match resolver.resolve(&conflict) {
                Some(resolution) => {
                    tracing::debug!(
                        entity = %conflict.entity_id(),
                        strategy = resolver.name(),
                        "Conflict resolved"
                    );
                    match self.apply_resolution(&conflict, resolution).await {
                        Ok(()) => report.resolved += 1,
                        Err(error) => {
                            report.failed += 1;
                            report
                                .errors
                                .push(format!("resolve {}: {error}", conflict.entity_id()));
                        }
                    }
                }
                None => report.conflicts.push(conflict),
            }
        }

        *self.unresolved.lock().await = report.conflicts.clone();

        if report.conflicts.is_empty() {
            self.store
                .set_metadata(&watermark_key(user_id), &cycle_start.to_string())
                .await?;
        }

        report.synced = report.pulled + report.pushed + report.resolved;
        tracing::debug!(
            synced = report.synced,
            failed = report.failed,
            unresolved = report.conflicts.len(),
            "Sync cycle complete"
        );
        Ok(report)
    }

    /// Send one queued operation to the remote. A payload that does not
    /// match its recorded kind is a per-item failure like any other.
    async fn push_operation(&self, op: &PendingOperation) -> Result<()> {
        match (&op.payload, op.kind) {
            (OperationPayload::CreateList { list }, OperationKind::Create) => {
                self.remote.create_list(list).await?;
            }
            (OperationPayload::UpdateList { patch }, OperationKind::Update) => {
                let id = target_id(op)?;
                self.remote.update_list(&id, patch).await?;
            }
            (OperationPayload::CreateTask { task }, OperationKind::Create) => {
                self.remote.create_task(task).await?;
            }
            (OperationPayload::UpdateTask { patch }, OperationKind::Update) => {
                let id = target_id(op)?;
                self.remote.update_task(&id, patch).await?;
            }
            (OperationPayload::Delete, OperationKind::Delete) => match op.collection {
                crate::models::Collection::Lists => {
                    self.remote.delete_list(&target_id(op)?).await?;
                }
                crate::models::Collection::Tasks => {
                    self.remote.delete_task(&target_id(op)?).await?;
                }
            },
            _ => {
                return Err(Error::InvalidInput(format!(
                    "operation {} payload does not match kind {}",
                    op.id,
                    op.kind.as_str()
                )));
            }
        }
        Ok(())
    }

    /// Persist the winning snapshot; local and merged winners also enqueue
    /// an UPDATE so the decision propagates back on the next push phase.
    async fn apply_resolution(&self, conflict: &Conflict, resolution: Resolution) -> Result<()> {
        match resolution {
            Resolution::Remote => self.persist_remote(&conflict.remote).await,
            Resolution::Local => {
                self.persist_local(&conflict.local).await?;
                self.enqueue_propagation(&conflict.local).await
            }
            Resolution::Merge(snapshot) => {
                self.persist_local(&snapshot).await?;
                self.enqueue_propagation(&snapshot).await
            }
        }
    }

    async fn persist_remote(&self, snapshot: &EntitySnapshot) -> Result<()> {
        match snapshot {
            EntitySnapshot::List(list) => self.store.apply_remote_list(list).await,
            EntitySnapshot::Task(task) => self.store.apply_remote_task(task).await,
        }
    }

    async fn persist_local(&self, snapshot: &EntitySnapshot) -> Result<()> {
        match snapshot {
            EntitySnapshot::List(list) => self.store.save_list(list).await,
            EntitySnapshot::Task(task) => self.store.save_task(task).await,
        }
    }

    async fn enqueue_propagation(&self, snapshot: &EntitySnapshot) -> Result<()> {
        let op = match snapshot {
            EntitySnapshot::List(list) => PendingOperation::update_list(
                list.owner_id.clone(),
                list.id,
                ListPatch::from_list(list),
            ),
            EntitySnapshot::Task(task) => PendingOperation::update_task(
                task.owner_id.clone(),
                task.id,
                TaskPatch::from_task(task),
            ),
        };
        self.store.enqueue_operation(&op).await?;
        Ok(())
    }

    async fn stored_watermark(&self, user_id: &UserId) -> Result<Option<i64>> {
        let value = self.store.get_metadata(&watermark_key(user_id)).await?;
        Ok(value.and_then(|raw| raw.parse().ok()))
    }
}

/// Per-user metadata key holding the sync watermark
#[must_use]
pub fn watermark_key(user_id: &UserId) -> String {
    format!("last_sync:{user_id}")
}

/// Parse the entity id an UPDATE/DELETE operation targets
fn target_id<T: std::str::FromStr>(op: &PendingOperation) -> Result<T> {
    op.entity_id
        .as_deref()
        .ok_or_else(|| Error::InvalidInput(format!("operation {} has no target id", op.id)))?
        .parse()
        .map_err(|_| Error::InvalidInput(format!("operation {} has a malformed target id", op.id)))
}
