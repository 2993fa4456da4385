//! In-memory local store

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::LocalStore;
use crate::error::{Error, Result};
use crate::models::{EntryId, OutboxEntry, Value, VersionToken};

#[derive(Debug, Default)]
struct Inner {
    documents: HashMap<String, Value>,
    queue: Vec<OutboxEntry>,
    versions: HashMap<String, VersionToken>,
}

/// Volatile store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `StorageUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    async fn lock(&self) -> Result<tokio::sync::MutexGuard<'_, Inner>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::StorageUnavailable("store is offline".to_string()));
        }
        Ok(self.inner.lock().await)
    }
}

fn find_entry<'a>(queue: &'a mut [OutboxEntry], id: EntryId) -> Option<&'a mut OutboxEntry> {
    queue.iter_mut().find(|entry| entry.id == id)
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.lock().await?.documents.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.lock()
            .await?
            .documents
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lock().await?.documents.remove(key);
        Ok(())
    }

    async fn enqueue(&self, entry: OutboxEntry) -> Result<EntryId> {
        let id = entry.id;
        self.lock().await?.queue.push(entry);
        Ok(id)
    }

    async fn list_queue(&self) -> Result<Vec<OutboxEntry>> {
        Ok(self.lock().await?.queue.clone())
    }

    async fn remove_queued(&self, id: EntryId) -> Result<()> {
        self.lock().await?.queue.retain(|entry| entry.id != id);
        Ok(())
    }

    async fn note_attempt(&self, id: EntryId, error: &str) -> Result<()> {
        let mut inner = self.lock().await?;
        if let Some(entry) = find_entry(&mut inner.queue, id) {
            entry.attempts = entry.attempts.saturating_add(1);
            entry.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn mark_failed(&self, id: EntryId, error: &str) -> Result<()> {
        let mut inner = self.lock().await?;
        if let Some(entry) = find_entry(&mut inner.queue, id) {
            entry.attempts = entry.attempts.saturating_add(1);
            entry.last_error = Some(error.to_string());
            entry.failed = true;
        }
        Ok(())
    }

    async fn requeue(&self, id: EntryId) -> Result<()> {
        let mut inner = self.lock().await?;
        let entry = find_entry(&mut inner.queue, id)
            .ok_or_else(|| Error::NotFound(format!("outbox entry {id}")))?;
        entry.failed = false;
        Ok(())
    }

    async fn version(&self, path: &str) -> Result<Option<VersionToken>> {
        Ok(self.lock().await?.versions.get(path).cloned())
    }

    async fn set_version(&self, path: &str, version: &VersionToken) -> Result<()> {
        self.lock()
            .await?
            .versions
            .insert(path.to_string(), version.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MutationKind;

    #[tokio::test]
    async fn documents_roundtrip_and_delete() {
        let store = MemoryStore::new();
        store.set("a", &Value::from("x")).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(Value::from("x")));
        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn queue_keeps_order_and_tracks_failures() {
        let store = MemoryStore::new();
        let first = store
            .enqueue(OutboxEntry::new(MutationKind::Create, "c/1", Value::from(1)))
            .await
            .unwrap();
        let second = store
            .enqueue(OutboxEntry::new(MutationKind::Patch, "c/1", Value::from(2)))
            .await
            .unwrap();

        store.note_attempt(first, "timeout").await.unwrap();
        store.mark_failed(second, "rejected").await.unwrap();

        let queue = store.list_queue().await.unwrap();
        assert_eq!(
            queue.iter().map(|entry| entry.id).collect::<Vec<_>>(),
            vec![first, second]
        );
        assert_eq!(queue[0].attempts, 1);
        assert_eq!(queue[0].last_error.as_deref(), Some("timeout"));
        assert!(queue[1].failed);

        store.requeue(second).await.unwrap();
        assert!(!store.list_queue().await.unwrap()[1].failed);

        store.remove_queued(first).await.unwrap();
        store.remove_queued(first).await.unwrap();
        assert_eq!(store.list_queue().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn requeue_unknown_entry_is_not_found() {
        let store = MemoryStore::new();
        let error = store.requeue(EntryId::new()).await.unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_operation() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.get("a").await.unwrap_err(),
            Error::StorageUnavailable(_)
        ));
        assert!(store.list_queue().await.is_err());
        store.set_unavailable(false);
        assert!(store.list_queue().await.unwrap().is_empty());
    }
}
