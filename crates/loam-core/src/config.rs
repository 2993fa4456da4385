//! Engine and remote endpoint configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const ENV_REMOTE_URL: &str = "LOAM_REMOTE_URL";
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
const DEFAULT_CYCLE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STATUS_COOLDOWN_SECS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Timing policy for sync cycles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Background sync interval (default: 60 seconds)
    pub sync_interval: Duration,
    /// Upper bound for one sync cycle
    pub cycle_timeout: Duration,
    /// How long `success`/`error` is shown before returning to `idle`
    pub status_cooldown: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            cycle_timeout: Duration::from_secs(DEFAULT_CYCLE_TIMEOUT_SECS),
            status_cooldown: Duration::from_secs(DEFAULT_STATUS_COOLDOWN_SECS),
        }
    }
}

impl EngineConfig {
    /// Set the background sync interval
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Set the per-cycle timeout
    #[must_use]
    pub const fn with_cycle_timeout(mut self, timeout: Duration) -> Self {
        self.cycle_timeout = timeout;
        self
    }

    /// Set the cooldown before a settled status returns to idle
    #[must_use]
    pub const fn with_status_cooldown(mut self, cooldown: Duration) -> Self {
        self.status_cooldown = cooldown;
        self
    }

    /// Reject zero durations.
    pub fn validate(&self) -> Result<()> {
        if self.sync_interval.is_zero() {
            return Err(Error::Config("sync interval must be positive".to_string()));
        }
        if self.cycle_timeout.is_zero() {
            return Err(Error::Config("cycle timeout must be positive".to_string()));
        }
        if self.status_cooldown.is_zero() {
            return Err(Error::Config("status cooldown must be positive".to_string()));
        }
        Ok(())
    }
}

/// Remote document service endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL without trailing slash (e.g., `https://sync.example.com`)
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl RemoteConfig {
    /// Validate and normalize a base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = normalize_text_option(Some(base_url.into()))
            .ok_or_else(|| Error::Config("remote URL must not be empty".to_string()))?;
        if !is_http_url(&base_url) {
            return Err(Error::Config(
                "remote URL must include http:// or https://".to_string(),
            ));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Load from `LOAM_REMOTE_URL`.
    ///
    /// Returns `Ok(None)` when the variable is unset or blank.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        normalize_text_option(lookup(ENV_REMOTE_URL))
            .map(Self::new)
            .transpose()
    }

    /// Absolute URL of a document resource.
    #[must_use]
    pub fn document_url(&self, path: &str) -> String {
        let encoded = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/v1/docs/{encoded}", self.base_url)
    }
}
