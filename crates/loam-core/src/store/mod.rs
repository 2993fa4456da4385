//! Durable local store: key-value documents plus an ordered mutation outbox.
//!
//! Every operation is atomic per key or entry. A failing backend reports
//! [`Error::StorageUnavailable`](crate::Error::StorageUnavailable) and callers
//! must not assume a partial write landed.

mod libsql_store;
mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{EntryId, OutboxEntry, Value, VersionToken};

pub use libsql_store::LibSqlStore;
pub use memory::MemoryStore;

/// Storage for documents, queued mutations and remote version tokens.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: &Value) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;

    /// Append to the outbox.
    async fn enqueue(&self, entry: OutboxEntry) -> Result<EntryId>;

    /// Every queued entry in enqueue order, failed ones included.
    async fn list_queue(&self) -> Result<Vec<OutboxEntry>>;

    /// Drop an acknowledged entry. Unknown ids are ignored.
    async fn remove_queued(&self, id: EntryId) -> Result<()>;

    /// Count a transient failure against an entry.
    async fn note_attempt(&self, id: EntryId, error: &str) -> Result<()>;

    /// Park an entry after a permanent rejection; it stays queued.
    async fn mark_failed(&self, id: EntryId, error: &str) -> Result<()>;

    /// Clear the failed flag so the next pass retries the entry.
    ///
    /// Fails with `NotFound` for an unknown id.
    async fn requeue(&self, id: EntryId) -> Result<()>;

    /// Last version token confirmed by the remote for `path`.
    async fn version(&self, path: &str) -> Result<Option<VersionToken>>;
    async fn set_version(&self, path: &str, version: &VersionToken) -> Result<()>;
}

/// Store key of a profile's sync preferences.
#[must_use]
pub fn preferences_key(profile: &str) -> String {
    format!("preferences/{profile}")
}

/// Store key of a category envelope.
#[must_use]
pub fn category_key(profile: &str, category: &str) -> String {
    format!("profiles/{profile}/{category}")
}

/// Remote resource path of a profile document, scoped to the signed-in user.
#[must_use]
pub fn profile_document_path(user_id: &str, profile: &str) -> String {
    format!("users/{user_id}/profiles/{profile}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(preferences_key("home"), "preferences/home");
        assert_eq!(category_key("home", "expenses"), "profiles/home/expenses");
        assert_eq!(
            profile_document_path("user-1", "home"),
            "users/user-1/profiles/home"
        );
    }
}
