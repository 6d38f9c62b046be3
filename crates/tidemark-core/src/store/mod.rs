//! Local persistence layer for Tidemark

mod connection;
mod local_store;
mod migrations;

pub use connection::Database;
pub use local_store::LocalStore;
