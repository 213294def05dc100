//! jotter-core - Core library for Jotter
//!
//! Local-first note storage with live queries, a best-effort remote mirror
//! and a debounced search feed. The local store is the source of truth;
//! the remote copy is eventually consistent and may lag or fail.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod query;
pub mod remote;
pub mod state;
pub mod store;
pub mod sync;
pub mod util;

pub use auth::{AuthOutcome, AuthProvider, AuthUser, StaticAuthProvider};
pub use config::JotterConfig;
pub use error::{Error, ParseFault, RemoteError, Result};
pub use models::{Note, NoteId, RemoteNote};
pub use query::{FeedObserver, QueryBus, QueryOptions};
pub use remote::{HttpRemoteConfig, HttpRemoteStore, MemoryRemoteStore, RemoteStore};
pub use state::SyncState;
pub use store::{LiveNote, LiveQuery, LocalStore, NoteQuery};
pub use sync::{ReconcileReport, SyncCoordinator, SyncOptions, SyncStatus};
