//! Sync orchestrator.
//!
//! A [`SyncEngine`] owns the injected store, remote client and session, runs
//! per-profile sync cycles on demand or from the background loop, and settles
//! conflicts the user resolved.

mod background;
mod reconcile;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::merge::merge_without_overwrite;
use crate::models::{
    CategoryEnvelope, EntryId, MutationKind, OutboxEntry, OutboxReport, RecordKey, Resolution,
    SyncConflict, SyncPreferences, SyncResult, SyncStatus, Value,
};
use crate::outbox::OutboxProcessor;
use crate::remote::{RemoteClient, RemoteError, SessionProvider};
use crate::store::{category_key, preferences_key, profile_document_path, LocalStore};
use crate::util::unix_millis_now;

pub use background::BackgroundHandle;
pub use reconcile::LAST_MODIFIED_FIELD;

use reconcile::{decide, Decision, RemoteProfile};

/// Error reported when a cycle for the profile is already running.
pub const SYNC_IN_PROGRESS: &str = "sync already in progress";

/// Error reported when a cycle exceeds the configured timeout.
pub const SYNC_TIMED_OUT: &str = "sync cycle timed out";

struct EngineInner<S, R, P> {
    store: S,
    remote: R,
    session: P,
    config: EngineConfig,
    in_flight: Mutex<HashSet<String>>,
    profiles: Mutex<BTreeSet<String>>,
    preferences_lock: tokio::sync::Mutex<()>,
    network: watch::Sender<bool>,
}

/// Offline-first sync engine for profile documents and queued record mutations.
pub struct SyncEngine<S, R, P> {
    inner: Arc<EngineInner<S, R, P>>,
}

impl<S, R, P> Clone for SyncEngine<S, R, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Releases a profile's in-flight marker when the cycle ends, however it ends.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    profile: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.profile);
    }
}

impl<S, R, P> SyncEngine<S, R, P>
where
    S: LocalStore,
    R: RemoteClient,
    P: SessionProvider,
{
    /// Build an engine around injected dependencies. The network starts online.
    pub fn new(store: S, remote: R, session: P, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let (network, _) = watch::channel(true);
        Ok(Self {
            inner: Arc::new(EngineInner {
                store,
                remote,
                session,
                config,
                in_flight: Mutex::new(HashSet::new()),
                profiles: Mutex::new(BTreeSet::new()),
                preferences_lock: tokio::sync::Mutex::new(()),
                network,
            }),
        })
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn remote(&self) -> &R {
        &self.inner.remote
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Profiles the background loop cycles through.
    pub fn profiles(&self) -> Vec<String> {
        self.inner
            .profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Register a profile for background sync, persisting default preferences
    /// on first use.
    pub async fn register_profile(&self, profile: &str) -> Result<SyncPreferences> {
        let profile = validate_name("profile", profile)?;
        let preferences = {
            let _lock = self.inner.preferences_lock.lock().await;
            let key = preferences_key(&profile);
            match load_json::<SyncPreferences>(&self.inner.store, &key).await? {
                Some(preferences) => preferences,
                None => {
                    let preferences = SyncPreferences::default();
                    save_json(&self.inner.store, &key, &preferences).await?;
                    preferences
                }
            }
        };
        self.inner
            .profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.clone());
        tracing::info!(%profile, "registered profile");
        Ok(preferences)
    }

    /// Current preferences; defaults when none were saved.
    pub async fn preferences(&self, profile: &str) -> Result<SyncPreferences> {
        let profile = validate_name("profile", profile)?;
        Ok(
            load_json(&self.inner.store, &preferences_key(&profile))
                .await?
                .unwrap_or_default(),
        )
    }

    /// Read-modify-write the preferences of a profile.
    pub async fn update_preferences<F>(&self, profile: &str, update: F) -> Result<SyncPreferences>
    where
        F: FnOnce(&mut SyncPreferences) + Send,
    {
        let profile = validate_name("profile", profile)?;
        let _lock = self.inner.preferences_lock.lock().await;
        let key = preferences_key(&profile);
        let mut preferences: SyncPreferences = load_json(&self.inner.store, &key)
            .await?
            .unwrap_or_default();
        update(&mut preferences);
        save_json(&self.inner.store, &key, &preferences).await?;
        Ok(preferences)
    }

    /// Write a category locally and count it as a pending change.
    pub async fn save_category(
        &self,
        profile: &str,
        category: &str,
        value: Value,
    ) -> Result<CategoryEnvelope> {
        let profile = validate_name("profile", profile)?;
        let category = validate_category(category)?;
        let key = category_key(&profile, &category);

        let now = unix_millis_now();
        let synced_at = load_json::<CategoryEnvelope>(&self.inner.store, &key)
            .await?
            .and_then(|existing| existing.synced_at);
        // Keep the edit strictly after the last reconciliation.
        let modified_at = synced_at.map_or(now, |synced_at| now.max(synced_at + 1));
        let envelope = CategoryEnvelope {
            value,
            modified_at,
            synced_at,
        };
        save_json(&self.inner.store, &key, &envelope).await?;
        self.bump_pending(&profile).await?;
        tracing::debug!(%profile, %category, "saved category");
        Ok(envelope)
    }

    pub async fn category(
        &self,
        profile: &str,
        category: &str,
    ) -> Result<Option<CategoryEnvelope>> {
        let profile = validate_name("profile", profile)?;
        let category = validate_category(category)?;
        load_json(&self.inner.store, &category_key(&profile, &category)).await
    }

    /// Optimistically write a record locally and queue it for the remote.
    pub async fn enqueue_mutation(
        &self,
        profile: &str,
        kind: MutationKind,
        collection: &str,
        id: &str,
        value: Value,
    ) -> Result<EntryId> {
        let profile = validate_name("profile", profile)?;
        let key = RecordKey::new(collection, id)?;
        let target = key.resource_path();

        // Later entries for a queued target pick up the version at dispatch.
        let target_queued = self
            .inner
            .store
            .list_queue()
            .await?
            .iter()
            .any(|entry| entry.target == target);
        let base_version = if target_queued {
            None
        } else {
            self.inner.store.version(&target).await?
        };

        self.inner.store.set(&target, &value).await?;
        let entry = OutboxEntry::new(kind, target.clone(), value).with_base_version(base_version);
        let id = self.inner.store.enqueue(entry).await?;
        self.bump_pending(&profile).await?;
        tracing::debug!(%profile, %id, %kind, %target, "queued mutation");
        Ok(id)
    }

    /// Queued mutations in dispatch order.
    pub async fn outbox(&self) -> Result<Vec<OutboxEntry>> {
        self.inner.store.list_queue().await
    }

    /// Clear the failed flag on a parked outbox entry.
    pub async fn retry_entry(&self, id: EntryId) -> Result<()> {
        self.inner.store.requeue(id).await
    }

    /// Report network reachability; an offline to online transition triggers
    /// automatic cycles in the background loop.
    pub fn set_network_status(&self, online: bool) {
        let previous = self.inner.network.send_replace(online);
        if previous != online {
            tracing::info!(online, "network status changed");
        }
    }

    pub fn is_online(&self) -> bool {
        *self.inner.network.borrow()
    }

    /// Run a cycle now, regardless of the automatic sync policy.
    pub async fn manual_sync(&self, profile: &str) -> SyncResult {
        match validate_name("profile", profile) {
            Ok(profile) => self.run_cycle(&profile).await,
            Err(error) => SyncResult::failed(error.to_string()),
        }
    }

    fn try_begin(&self, profile: &str) -> Option<InFlightGuard<'_>> {
        let inserted = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.to_string());
        inserted.then(|| InFlightGuard {
            in_flight: &self.inner.in_flight,
            profile: profile.to_string(),
        })
    }

    async fn run_cycle(&self, profile: &str) -> SyncResult {
        let Some(_guard) = self.try_begin(profile) else {
            tracing::debug!(%profile, "sync skipped, cycle already running");
            return SyncResult::failed(SYNC_IN_PROGRESS);
        };

        match tokio::time::timeout(self.inner.config.cycle_timeout, self.cycle(profile)).await {
            Ok(Ok(result)) => {
                if result.success {
                    tracing::info!(
                        %profile,
                        categories = result.synced_categories.len(),
                        applied = result.outbox.applied,
                        "sync cycle succeeded"
                    );
                } else {
                    tracing::warn!(
                        %profile,
                        conflicts = result.conflicts.len(),
                        remaining = result.outbox.remaining,
                        "sync cycle finished with unresolved work"
                    );
                }
                result
            }
            Ok(Err(error)) => {
                tracing::warn!(%profile, %error, "sync cycle failed");
                self.record_failure(profile).await;
                SyncResult::failed(error.to_string())
            }
            Err(_) => {
                tracing::warn!(%profile, "sync cycle timed out");
                self.record_failure(profile).await;
                SyncResult::failed(SYNC_TIMED_OUT)
            }
        }
    }

    async fn cycle(&self, profile: &str) -> Result<SyncResult> {
        let user_id = self.require_session()?;

        let preferences = self
            .update_preferences(profile, |preferences| {
                preferences.set_status(SyncStatus::Syncing, unix_millis_now());
            })
            .await?;

        let outbox = OutboxProcessor::new(&self.inner.store, &self.inner.remote)
            .process()
            .await?;

        let categories = &preferences.selected_categories;
        let mut local = BTreeMap::new();
        for category in categories {
            let envelope =
                load_json::<CategoryEnvelope>(&self.inner.store, &category_key(profile, category))
                    .await?;
            local.insert(category.clone(), envelope);
        }

        let path = profile_document_path(&user_id, profile);
        let (synced_categories, conflicts) = match self.inner.remote.read(&path).await {
            Err(RemoteError::NotFound) => (self.bootstrap(profile, &path, &local).await?, Vec::new()),
            Err(error) => return Err(error.into()),
            Ok(current) => {
                let document = RemoteProfile::from_value(&current.value);
                let now = unix_millis_now();
                let mut outgoing = document.clone();
                let mut local_writes = Vec::new();
                let mut synced = Vec::new();
                let mut conflicts = Vec::new();

                for (category, envelope) in &local {
                    let remote_value = document.value(category);
                    match decide(envelope.as_ref(), remote_value, document.modified_at(category)) {
                        Decision::InSync => {
                            if let Some(envelope) = envelope.as_ref().filter(|e| e.changed_since_sync()) {
                                local_writes.push((category.clone(), mark_synced(envelope, now)));
                            }
                            synced.push(category.clone());
                        }
                        Decision::Conflict => {
                            tracing::warn!(%profile, %category, "category conflict");
                            conflicts.push(SyncConflict::unresolved(
                                category.clone(),
                                envelope.as_ref().map(|e| e.value.clone()),
                                remote_value.cloned(),
                            ));
                        }
                        Decision::PushLocal => {
                            if let Some(envelope) = envelope {
                                outgoing.set(category, envelope.value.clone(), envelope.modified_at);
                                local_writes.push((category.clone(), mark_synced(envelope, now)));
                            }
                            synced.push(category.clone());
                        }
                        Decision::AdoptRemote { value, modified_at } => {
                            local_writes.push((
                                category.clone(),
                                CategoryEnvelope {
                                    value,
                                    modified_at,
                                    synced_at: Some(now.max(modified_at)),
                                },
                            ));
                            synced.push(category.clone());
                        }
                    }
                }

                if outgoing != document {
                    self.inner
                        .remote
                        .conditional_update(&path, &outgoing.to_value(), Some(&current.version))
                        .await?;
                }
                for (category, envelope) in local_writes {
                    save_json(&self.inner.store, &category_key(profile, &category), &envelope)
                        .await?;
                }
                (synced, conflicts)
            }
        };

        let success = conflicts.is_empty() && outbox.is_clean();
        let error = if success {
            None
        } else {
            Some(describe_unfinished(conflicts.len(), &outbox))
        };
        let unresolved = u32::try_from(outbox.remaining + conflicts.len()).unwrap_or(u32::MAX);
        self.update_preferences(profile, |preferences| {
            let now = unix_millis_now();
            preferences.last_sync = Some(now);
            if success {
                preferences.pending_changes = 0;
                preferences.set_status(SyncStatus::Success, now);
            } else {
                preferences.pending_changes = unresolved;
                preferences.set_status(SyncStatus::Error, now);
            }
        })
        .await?;

        Ok(SyncResult {
            success,
            conflicts,
            synced_categories,
            error,
            outbox,
        })
    }

    /// Create the remote profile document from local data.
    async fn bootstrap(
        &self,
        profile: &str,
        path: &str,
        local: &BTreeMap<String, Option<CategoryEnvelope>>,
    ) -> Result<Vec<String>> {
        let mut document = RemoteProfile::default();
        for (category, envelope) in local {
            if let Some(envelope) = envelope {
                document.set(category, envelope.value.clone(), envelope.modified_at);
            }
        }
        self.inner
            .remote
            .create(path, &document.to_value())
            .await?;
        tracing::info!(%profile, "created remote profile document");

        let now = unix_millis_now();
        let mut synced = Vec::new();
        for (category, envelope) in local {
            if let Some(envelope) = envelope {
                save_json(
                    &self.inner.store,
                    &category_key(profile, category),
                    &mark_synced(envelope, now),
                )
                .await?;
            }
            synced.push(category.clone());
        }
        Ok(synced)
    }

    /// Apply user decisions to conflicting categories.
    ///
    /// The remote document is written first; local envelopes follow only
    /// once the remote accepted the resolution.
    pub async fn resolve_conflicts(
        &self,
        profile: &str,
        resolutions: &BTreeMap<String, Resolution>,
    ) -> Result<SyncResult> {
        let profile = validate_name("profile", profile)?;
        for category in resolutions.keys() {
            validate_category(category)?;
        }
        if resolutions.is_empty() {
            return Ok(SyncResult {
                success: true,
                ..SyncResult::default()
            });
        }
        let Some(_guard) = self.try_begin(&profile) else {
            return Ok(SyncResult::failed(SYNC_IN_PROGRESS));
        };
        let user_id = self.require_session()?;

        let path = profile_document_path(&user_id, &profile);
        let current = match self.inner.remote.read(&path).await {
            Ok(current) => Some(current),
            Err(RemoteError::NotFound) => None,
            Err(error) => return Err(error.into()),
        };
        let mut document = current
            .as_ref()
            .map(|current| RemoteProfile::from_value(&current.value))
            .unwrap_or_default();

        let now = unix_millis_now();
        let mut conflicts = Vec::new();
        let mut resolved_values = Vec::new();
        for (category, resolution) in resolutions {
            let local = load_json::<CategoryEnvelope>(
                &self.inner.store,
                &category_key(&profile, category),
            )
            .await?
            .map(|envelope| envelope.value);
            let remote = document.value(category).cloned();
            if local.is_none() && remote.is_none() {
                return Err(Error::InvalidInput(format!(
                    "category '{category}' has no local or remote value"
                )));
            }

            let value = match resolution {
                Resolution::Local => local.clone().unwrap_or_default(),
                Resolution::Remote => remote.clone().unwrap_or_default(),
                Resolution::Merge => {
                    merge_without_overwrite(&local.clone().unwrap_or_default(), remote.as_ref())
                }
            };
            document.set(category, value.clone(), now);
            resolved_values.push((category.clone(), value));
            conflicts.push(SyncConflict {
                field: category.clone(),
                local_value: local,
                remote_value: remote,
                resolved: true,
                resolution: Some(*resolution),
            });
        }

        let written = match &current {
            Some(current) => {
                self.inner
                    .remote
                    .conditional_update(&path, &document.to_value(), Some(&current.version))
                    .await?
            }
            None => {
                self.inner
                    .remote
                    .create(&path, &document.to_value())
                    .await?
            }
        };
        self.inner.store.set_version(&path, &written.version).await?;

        let mut synced_categories = Vec::new();
        for (category, value) in resolved_values {
            save_json(
                &self.inner.store,
                &category_key(&profile, &category),
                &CategoryEnvelope::synced(value, now),
            )
            .await?;
            synced_categories.push(category);
        }

        let resolved = u32::try_from(synced_categories.len()).unwrap_or(u32::MAX);
        self.update_preferences(&profile, |preferences| {
            preferences.pending_changes = preferences.pending_changes.saturating_sub(resolved);
        })
        .await?;
        tracing::info!(%profile, resolved, "resolved conflicts");

        Ok(SyncResult {
            success: true,
            conflicts,
            synced_categories,
            error: None,
            outbox: OutboxReport::default(),
        })
    }

    /// Id of the signed-in user; profile documents are stored under it.
    fn require_session(&self) -> Result<String> {
        let Some(user_id) = self.inner.session.current_user_id() else {
            return Err(Error::Unauthenticated("no signed-in user".to_string()));
        };
        if self.inner.session.bearer_token().is_none() {
            return Err(Error::Unauthenticated("no bearer token available".to_string()));
        }
        validate_name("user id", &user_id)
    }

    async fn bump_pending(&self, profile: &str) -> Result<()> {
        self.update_preferences(profile, |preferences| {
            preferences.pending_changes = preferences.pending_changes.saturating_add(1);
        })
        .await
        .map(|_| ())
    }

    async fn record_failure(&self, profile: &str) {
        let outcome = self
            .update_preferences(profile, |preferences| {
                preferences.set_status(SyncStatus::Error, unix_millis_now());
            })
            .await;
        if let Err(error) = outcome {
            tracing::warn!(%profile, %error, "failed to record sync failure");
        }
    }
}

fn mark_synced(envelope: &CategoryEnvelope, now: i64) -> CategoryEnvelope {
    CategoryEnvelope {
        value: envelope.value.clone(),
        modified_at: envelope.modified_at,
        synced_at: Some(now.max(envelope.modified_at)),
    }
}

fn describe_unfinished(conflicts: usize, outbox: &OutboxReport) -> String {
    let mut parts = Vec::new();
    if conflicts > 0 {
        parts.push(format!("{conflicts} conflicting categories need resolution"));
    }
    let retained = outbox.transient + outbox.conflicted;
    if retained > 0 {
        parts.push(format!("{retained} queued mutations were retained"));
    }
    if let Some(failure) = outbox.failures.first() {
        parts.push(format!("{} rejected: {}", failure.target, failure.message));
    }
    parts.join("; ")
}

fn validate_name(kind: &str, raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput(format!("{kind} must not be empty")));
    }
    if name.contains('/') {
        return Err(Error::InvalidInput(format!("{kind} must not contain '/'")));
    }
    Ok(name.to_string())
}

fn validate_category(raw: &str) -> Result<String> {
    let category = validate_name("category", raw)?;
    if category == LAST_MODIFIED_FIELD {
        return Err(Error::InvalidInput(format!(
            "'{LAST_MODIFIED_FIELD}' is reserved"
        )));
    }
    Ok(category)
}

async fn load_json<T: DeserializeOwned>(store: &impl LocalStore, key: &str) -> Result<Option<T>> {
    store
        .get(key)
        .await?
        .map(|value| serde_json::from_value(serde_json::Value::from(value)).map_err(Error::from))
        .transpose()
}

async fn save_json<T: Serialize + Sync>(store: &impl LocalStore, key: &str, value: &T) -> Result<()> {
    let encoded = Value::from(serde_json::to_value(value)?);
    store.set(key, &encoded).await
}
