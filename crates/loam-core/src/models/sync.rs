//! Sync preferences, conflicts and cycle results

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{OutboxReport, Value};
use crate::error::Error;

/// Per-profile sync state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Success,
    Error,
}

impl SyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    /// Success or error, waiting for the cooldown back to idle.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync policy and status for one profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPreferences {
    /// Whether background cycles run
    pub auto_sync: bool,
    /// Suppresses automatic cycles even when `auto_sync` is on
    pub manual_only: bool,
    /// Categories that participate in sync
    pub selected_categories: BTreeSet<String>,
    /// Completion time of the last cycle that reached the remote (Unix ms)
    pub last_sync: Option<i64>,
    pub sync_status: SyncStatus,
    /// When `sync_status` last changed (Unix ms)
    #[serde(default)]
    pub status_changed_at: Option<i64>,
    /// Unflushed local mutations
    pub pending_changes: u32,
}

impl Default for SyncPreferences {
    fn default() -> Self {
        Self {
            auto_sync: true,
            manual_only: false,
            selected_categories: BTreeSet::new(),
            last_sync: None,
            sync_status: SyncStatus::Idle,
            status_changed_at: None,
            pending_changes: 0,
        }
    }
}

impl SyncPreferences {
    /// Background and network-triggered cycles are allowed.
    #[must_use]
    pub const fn allows_automatic_sync(&self) -> bool {
        self.auto_sync && !self.manual_only
    }

    pub fn set_status(&mut self, status: SyncStatus, now: i64) {
        self.sync_status = status;
        self.status_changed_at = Some(now);
    }
}

/// How to settle a conflicting category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Keep the local value
    Local,
    /// Adopt the remote value
    Remote,
    /// Merge without overwriting local data
    Merge,
}

impl Resolution {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Merge => "merge",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "merge" => Ok(Self::Merge),
            other => Err(Error::InvalidInput(format!(
                "unknown resolution '{other}' (expected local, remote or merge)"
            ))),
        }
    }
}

/// A category whose local and remote values diverged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    /// Category name
    pub field: String,
    pub local_value: Option<Value>,
    pub remote_value: Option<Value>,
    /// True only once the resolution reached both stores
    pub resolved: bool,
    pub resolution: Option<Resolution>,
}

impl SyncConflict {
    pub fn unresolved(
        field: impl Into<String>,
        local_value: Option<Value>,
        remote_value: Option<Value>,
    ) -> Self {
        Self {
            field: field.into(),
            local_value,
            remote_value,
            resolved: false,
            resolution: None,
        }
    }
}

/// Outcome of a sync cycle or a conflict resolution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub conflicts: Vec<SyncConflict>,
    pub synced_categories: Vec<String>,
    pub error: Option<String>,
    /// Outbox pass that ran as part of the cycle
    #[serde(default)]
    pub outbox: OutboxReport,
}

impl SyncResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Locally stored category value with its timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryEnvelope {
    pub value: Value,
    /// Last local (or adopted) modification (Unix ms)
    pub modified_at: i64,
    /// Last reconciliation with the remote (Unix ms)
    #[serde(default)]
    pub synced_at: Option<i64>,
}

impl CategoryEnvelope {
    #[must_use]
    pub const fn new(value: Value, modified_at: i64) -> Self {
        Self {
            value,
            modified_at,
            synced_at: None,
        }
    }

    #[must_use]
    pub const fn synced(value: Value, at: i64) -> Self {
        Self {
            value,
            modified_at: at,
            synced_at: Some(at),
        }
    }

    /// Modified locally since the last reconciliation.
    #[must_use]
    pub fn changed_since_sync(&self) -> bool {
        self.synced_at.is_none_or(|synced_at| self.modified_at > synced_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_preferences_allow_automatic_sync() {
        let prefs = SyncPreferences::default();
        assert!(prefs.allows_automatic_sync());
        assert_eq!(prefs.sync_status, SyncStatus::Idle);
        assert_eq!(prefs.pending_changes, 0);
    }

    #[test]
    fn manual_only_overrides_auto_sync() {
        let prefs = SyncPreferences {
            manual_only: true,
            ..SyncPreferences::default()
        };
        assert!(!prefs.allows_automatic_sync());
    }

    #[test]
    fn preferences_serialize_in_camel_case() {
        let prefs = SyncPreferences::default();
        let encoded = serde_json::to_value(&prefs).unwrap();
        assert_eq!(encoded["autoSync"], serde_json::json!(true));
        assert_eq!(encoded["syncStatus"], serde_json::json!("idle"));
        assert_eq!(encoded["pendingChanges"], serde_json::json!(0));
    }

    #[test]
    fn resolution_parses() {
        assert_eq!("LOCAL".parse::<Resolution>().unwrap(), Resolution::Local);
        assert_eq!("merge".parse::<Resolution>().unwrap(), Resolution::Merge);
        assert!("both".parse::<Resolution>().is_err());
    }

    #[test]
    fn envelope_change_tracking() {
        let fresh = CategoryEnvelope::new(Value::from("a"), 100);
        assert!(fresh.changed_since_sync());

        let mut synced = CategoryEnvelope::synced(Value::from("a"), 100);
        assert!(!synced.changed_since_sync());

        synced.modified_at = 150;
        assert!(synced.changed_since_sync());
    }
}
