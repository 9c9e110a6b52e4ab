//! Persistence layer — SQLite-backed storage behind an async trait.

pub mod libsql_backend;
pub mod migrations;
pub mod seed;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, InboundStatus, StoredInbound};
