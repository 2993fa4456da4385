//! Outbox processor: drains queued mutations through the remote client.
//!
//! Entries are attempted in enqueue order and removed only after the remote
//! acknowledged them. A version conflict gets one merge-and-retry against the
//! revision the remote reported; anything still failing stays queued.

use std::collections::HashSet;

use crate::error::Result;
use crate::merge::merge_without_overwrite;
use crate::models::{
    MutationKind, OutboxEntry, OutboxFailure, OutboxReport, VersionToken, VersionedRecord,
};
use crate::remote::{RemoteClient, RemoteError, RemoteResult, RetryClass};
use crate::store::LocalStore;

/// One pass over the outbox.
pub struct OutboxProcessor<'a, S: ?Sized, R: ?Sized> {
    store: &'a S,
    remote: &'a R,
}

impl<'a, S, R> OutboxProcessor<'a, S, R>
where
    S: LocalStore + ?Sized,
    R: RemoteClient + ?Sized,
{
    pub const fn new(store: &'a S, remote: &'a R) -> Self {
        Self { store, remote }
    }

    /// Attempt every dispatchable entry once.
    ///
    /// Per-entry remote failures are recorded in the report. The pass aborts
    /// only on an authentication failure or when the store is unavailable.
    pub async fn process(&self) -> Result<OutboxReport> {
        let entries = self.store.list_queue().await?;
        let mut report = OutboxReport::default();
        let mut pending_targets: HashSet<String> = HashSet::new();

        for entry in entries {
            if entry.failed {
                pending_targets.insert(entry.target.clone());
                continue;
            }
            if pending_targets.contains(&entry.target) {
                tracing::debug!(id = %entry.id, target = %entry.target, "blocked behind earlier entry");
                report.blocked += 1;
                continue;
            }

            let base_version = match &entry.base_version {
                Some(version) => Some(version.clone()),
                None => self.store.version(&entry.target).await?,
            };

            tracing::debug!(id = %entry.id, kind = %entry.kind, target = %entry.target, "dispatching");
            match self.dispatch(&entry, base_version.as_ref()).await {
                Ok(record) => {
                    self.acknowledge(&entry, &record).await?;
                    report.applied += 1;
                }
                Err(error) => match error.retry_class() {
                    RetryClass::ReauthRequired => return Err(error.into()),
                    RetryClass::Permanent => {
                        let message = error.to_string();
                        tracing::warn!(id = %entry.id, target = %entry.target, %message, "outbox entry failed");
                        self.store.mark_failed(entry.id, &message).await?;
                        report.failures.push(OutboxFailure {
                            entry_id: entry.id,
                            target: entry.target.clone(),
                            message,
                        });
                        pending_targets.insert(entry.target);
                    }
                    RetryClass::Retryable => {
                        self.store.note_attempt(entry.id, &error.to_string()).await?;
                        if matches!(error, RemoteError::VersionConflict { .. }) {
                            tracing::warn!(id = %entry.id, target = %entry.target, %error, "conflict persisted after retry");
                            report.conflicted += 1;
                        } else {
                            tracing::warn!(id = %entry.id, target = %entry.target, %error, "outbox entry retained");
                            report.transient += 1;
                        }
                        pending_targets.insert(entry.target);
                    }
                },
            }
        }

        report.remaining = self.store.list_queue().await?.len();
        Ok(report)
    }

    async fn dispatch(
        &self,
        entry: &OutboxEntry,
        base_version: Option<&VersionToken>,
    ) -> RemoteResult<VersionedRecord> {
        let attempt = match entry.kind {
            MutationKind::Create => self.remote.create(&entry.target, &entry.payload).await,
            MutationKind::Patch => {
                match self
                    .remote
                    .conditional_update(&entry.target, &entry.payload, base_version)
                    .await
                {
                    Err(RemoteError::NotFound) => {
                        tracing::debug!(target = %entry.target, "patch target missing, creating");
                        self.remote.create(&entry.target, &entry.payload).await
                    }
                    other => other,
                }
            }
        };

        match attempt {
            Err(RemoteError::VersionConflict { current }) => {
                self.merge_and_retry(entry, *current).await
            }
            other => other,
        }
    }

    async fn merge_and_retry(
        &self,
        entry: &OutboxEntry,
        current: VersionedRecord,
    ) -> RemoteResult<VersionedRecord> {
        let merged = merge_without_overwrite(&entry.payload, Some(&current.value));
        tracing::debug!(target = %entry.target, version = %current.version, "retrying merged payload");
        self.remote
            .conditional_update(&entry.target, &merged, Some(&current.version))
            .await
    }

    async fn acknowledge(&self, entry: &OutboxEntry, record: &VersionedRecord) -> Result<()> {
        self.store
            .set_version(&entry.target, &record.version)
            .await?;
        // A newer local edit of the same record wins over the acknowledged state.
        if self.store.get(&entry.target).await?.as_ref() == Some(&entry.payload) {
            self.store.set(&entry.target, &record.value).await?;
        }
        self.store.remove_queued(entry.id).await
    }
}
