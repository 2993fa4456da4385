//! Data models for Loam

mod outbox;
mod record;
mod sync;
mod value;

pub use outbox::{EntryId, MutationKind, OutboxEntry, OutboxFailure, OutboxReport};
pub use record::{RecordKey, VersionToken, VersionedRecord};
pub use sync::{
    CategoryEnvelope, Resolution, SyncConflict, SyncPreferences, SyncResult, SyncStatus,
};
pub use value::{Scalar, Value};
