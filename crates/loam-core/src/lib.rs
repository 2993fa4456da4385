//! loam-core - Core library for Loam
//!
//! An offline-first sync engine: a durable local store with a mutation outbox,
//! a version-checked remote client, a merge that never drops local data, and
//! the orchestrator that reconciles profile categories with the remote.

pub mod config;
pub mod db;
pub mod error;
pub mod merge;
pub mod models;
pub mod outbox;
pub mod remote;
pub mod store;
pub mod sync;
pub mod util;

pub use config::{EngineConfig, RemoteConfig};
pub use error::{Error, Result};
pub use merge::merge_without_overwrite;
pub use models::{
    CategoryEnvelope, EntryId, MutationKind, OutboxEntry, OutboxReport, Resolution,
    SyncConflict, SyncPreferences, SyncResult, SyncStatus, Value, VersionToken,
    VersionedRecord,
};
pub use outbox::OutboxProcessor;
pub use remote::{
    HttpRemoteClient, MemoryRemote, RemoteClient, RemoteError, SessionProvider, StaticSession,
};
pub use store::{LibSqlStore, LocalStore, MemoryStore};
pub use sync::{BackgroundHandle, SyncEngine};
