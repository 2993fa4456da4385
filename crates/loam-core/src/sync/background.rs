//! Background sync loop.

use std::collections::HashMap;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::SyncEngine;
use crate::models::SyncStatus;
use crate::remote::{RemoteClient, SessionProvider};
use crate::store::LocalStore;
use crate::util::unix_millis_now;

/// Handle to a running background loop.
#[derive(Debug)]
pub struct BackgroundHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl BackgroundHandle {
    /// Stop the loop and wait for an in-flight cycle to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.task.await {
            tracing::warn!(%error, "background sync task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<S, R, P> SyncEngine<S, R, P>
where
    S: LocalStore + 'static,
    R: RemoteClient + 'static,
    P: SessionProvider + 'static,
{
    /// Spawn the background loop on the current tokio runtime.
    ///
    /// Every `sync_interval`, and on each offline to online transition, a cycle
    /// runs for every registered profile whose preferences allow automatic
    /// sync. Settled statuses return to idle after `status_cooldown`.
    pub fn start_background(&self) -> BackgroundHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let engine = self.clone();
        let task = tokio::spawn(async move { engine.run_background(shutdown_rx).await });
        BackgroundHandle { shutdown, task }
    }

    async fn run_background(self, mut shutdown: watch::Receiver<bool>) {
        let config = self.inner.config.clone();
        let mut network = self.inner.network.subscribe();
        let mut online = *network.borrow_and_update();

        let mut sync_tick = tokio::time::interval(config.sync_interval);
        sync_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        sync_tick.reset();
        let mut cooldown_tick = tokio::time::interval(config.status_cooldown);
        cooldown_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut settled_since = HashMap::new();

        tracing::info!(interval = ?config.sync_interval, "background sync started");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                changed = network.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now_online = *network.borrow_and_update();
                    if now_online && !online {
                        tracing::info!("network restored, syncing");
                        self.sync_automatic_profiles().await;
                    }
                    online = now_online;
                }
                _ = sync_tick.tick() => {
                    if online {
                        self.sync_automatic_profiles().await;
                    }
                }
                _ = cooldown_tick.tick() => {
                    self.settle_statuses(&mut settled_since).await;
                }
            }
        }
        tracing::info!("background sync stopped");
    }

    async fn sync_automatic_profiles(&self) {
        for profile in self.profiles() {
            match self.preferences(&profile).await {
                Ok(preferences) if preferences.allows_automatic_sync() => {
                    let result = self.run_cycle(&profile).await;
                    tracing::debug!(%profile, success = result.success, "automatic sync finished");
                }
                Ok(_) => {
                    tracing::debug!(%profile, "automatic sync disabled");
                }
                Err(error) => {
                    tracing::warn!(%profile, %error, "failed to load sync preferences");
                }
            }
        }
    }

    /// Return `success`/`error` statuses to idle once the cooldown elapsed.
    ///
    /// `settled_since` remembers when each settled status was first seen,
    /// keyed by the status change it belongs to.
    async fn settle_statuses(&self, settled_since: &mut HashMap<String, (Option<i64>, Instant)>) {
        let cooldown = self.inner.config.status_cooldown;
        for profile in self.profiles() {
            let preferences = match self.preferences(&profile).await {
                Ok(preferences) => preferences,
                Err(error) => {
                    tracing::warn!(%profile, %error, "failed to load sync preferences");
                    continue;
                }
            };
            if !preferences.sync_status.is_settled() {
                settled_since.remove(&profile);
                continue;
            }

            let changed_at = preferences.status_changed_at;
            let seen = settled_since
                .entry(profile.clone())
                .or_insert((changed_at, Instant::now()));
            if seen.0 != changed_at {
                *seen = (changed_at, Instant::now());
            }
            if seen.1.elapsed() < cooldown {
                continue;
            }

            let outcome = self
                .update_preferences(&profile, |preferences| {
                    if preferences.status_changed_at == changed_at {
                        preferences.set_status(SyncStatus::Idle, unix_millis_now());
                    }
                })
                .await;
            match outcome {
                Ok(_) => {
                    settled_since.remove(&profile);
                }
                Err(error) => tracing::warn!(%profile, %error, "failed to settle sync status"),
            }
        }
    }
}
