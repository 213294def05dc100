//! Database layer for Jotter

mod connection;
mod migrations;
mod repository;
mod sync_meta_repository;

pub use connection::Database;
pub use repository::{LibSqlNoteRepository, NoteRepository};
pub use sync_meta_repository::{LibSqlSyncMetaRepository, SyncMetaRepository};
