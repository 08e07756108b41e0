//! Persistence layer — the session/task ledger behind an async trait.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{ChatSession, Database, NewMessage, StoredMessage};
