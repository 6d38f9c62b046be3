//! Offline synchronization engine

mod detect;
mod manager;
mod remote;
mod resolve;

pub use detect::detect;
pub use manager::{watermark_key, SyncManager, SyncReport, SyncStatus};
pub use remote::RemoteDataSource;
pub use resolve::{ConflictResolver, Deferred, LastWriteWins, Resolution, ResolverRegistry};
