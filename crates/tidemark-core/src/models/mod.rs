//! Data models for Tidemark

mod conflict;
mod list;
mod operation;
mod task;
mod user;

pub use conflict::{Conflict, ConflictId, EntityKind, EntitySnapshot};
pub use list::{ListId, ListPatch, TaskList};
pub use operation::{
    Collection, OperationId, OperationKind, OperationPayload, PendingOperation,
};
pub use task::{Priority, Task, TaskId, TaskPatch};
pub use user::UserId;
