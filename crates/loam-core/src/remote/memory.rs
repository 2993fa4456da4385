//! In-memory remote used by tests and offline demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{RemoteClient, RemoteError, RemoteResult};
use crate::models::{Value, VersionToken, VersionedRecord};

/// Remote document service held in process memory.
///
/// Versions are monotonically increasing integers rendered as quoted `ETag`s.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    documents: Mutex<HashMap<String, VersionedRecord>>,
    next_version: AtomicU64,
    calls: AtomicUsize,
    offline: AtomicBool,
}

impl MemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of remote calls served so far, failed calls included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Simulate a network outage; every call fails as transient while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Write a document directly, as another client would.
    pub async fn put(&self, path: &str, value: Value) -> VersionedRecord {
        let record = VersionedRecord::new(value, self.bump());
        self.documents
            .lock()
            .await
            .insert(path.to_string(), record.clone());
        record
    }

    /// Current revision of a document, if any.
    pub async fn get(&self, path: &str) -> Option<VersionedRecord> {
        self.documents.lock().await.get(path).cloned()
    }

    fn bump(&self) -> VersionToken {
        let next = self.next_version.fetch_add(1, Ordering::SeqCst) + 1;
        VersionToken::new(format!("\"{next}\""))
    }

    fn begin_call(&self) -> RemoteResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Transient("remote is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteClient for MemoryRemote {
    async fn read(&self, path: &str) -> RemoteResult<VersionedRecord> {
        self.begin_call()?;
        self.documents
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or(RemoteError::NotFound)
    }

    async fn create(&self, path: &str, value: &Value) -> RemoteResult<VersionedRecord> {
        self.begin_call()?;
        let mut documents = self.documents.lock().await;
        if let Some(current) = documents.get(path) {
            return Err(RemoteError::conflict(current.clone()));
        }
        let record = VersionedRecord::new(value.clone(), self.bump());
        documents.insert(path.to_string(), record.clone());
        Ok(record)
    }

    async fn conditional_update(
        &self,
        path: &str,
        value: &Value,
        version: Option<&VersionToken>,
    ) -> RemoteResult<VersionedRecord> {
        self.begin_call()?;
        let mut documents = self.documents.lock().await;
        let current = documents.get(path).ok_or(RemoteError::NotFound)?;
        if let Some(expected) = version {
            if &current.version != expected {
                return Err(RemoteError::conflict(current.clone()));
            }
        }
        let record = VersionedRecord::new(value.clone(), self.bump());
        documents.insert(path.to_string(), record.clone());
        Ok(record)
    }
}
