//! tidemark-core - Core library for Tidemark
//!
//! This crate contains the shared models, the durable local store, and the
//! offline synchronization engine used by all Tidemark interfaces.

pub mod error;
pub mod models;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
pub use models::{Task, TaskId, TaskList, UserId};
pub use store::LocalStore;
pub use sync::{RemoteDataSource, SyncManager};
