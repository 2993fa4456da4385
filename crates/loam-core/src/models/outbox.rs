//! Outbox entry model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Value, VersionToken};
use crate::error::Error;

/// A unique identifier for an outbox entry, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Create a new unique entry ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// What a queued mutation asks the remote to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    /// Create the target resource
    Create,
    /// Conditionally replace the target resource
    Patch,
}

impl MutationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Patch => "patch",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "patch" => Ok(Self::Patch),
            other => Err(Error::InvalidInput(format!("unknown mutation kind: {other}"))),
        }
    }
}

/// A pending local mutation waiting for remote acknowledgment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Stable identity, used for exactly-once removal
    pub id: EntryId,
    /// Enqueue timestamp (Unix ms)
    pub enqueued_at: i64,
    pub kind: MutationKind,
    /// Remote resource path (`collection/id`)
    pub target: String,
    /// Full record state to send
    pub payload: Value,
    /// Version token the mutation was based on, when known
    pub base_version: Option<VersionToken>,
    /// Number of transient failures seen so far
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Set on a fatal remote rejection; the entry stays queued until requeued
    pub failed: bool,
}

impl OutboxEntry {
    /// Create a new pending entry
    #[must_use]
    pub fn new(kind: MutationKind, target: impl Into<String>, payload: Value) -> Self {
        Self {
            id: EntryId::new(),
            enqueued_at: chrono::Utc::now().timestamp_millis(),
            kind,
            target: target.into(),
            payload,
            base_version: None,
            attempts: 0,
            last_error: None,
            failed: false,
        }
    }

    #[must_use]
    pub fn with_base_version(mut self, version: Option<VersionToken>) -> Self {
        self.base_version = version;
        self
    }
}

/// A queued entry the remote rejected permanently
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxFailure {
    pub entry_id: EntryId,
    pub target: String,
    pub message: String,
}

/// Outcome of one outbox processing pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxReport {
    /// Entries acknowledged and removed
    pub applied: usize,
    /// Entries still conflicting after the single merge-and-retry
    pub conflicted: usize,
    /// Entries left queued after a transient failure
    pub transient: usize,
    /// Entries skipped because an earlier entry for the same target is still pending
    pub blocked: usize,
    /// Entries marked failed during this pass
    pub failures: Vec<OutboxFailure>,
    /// Queue length after the pass, failed entries included
    pub remaining: usize,
}

impl OutboxReport {
    /// True when every attempted entry was acknowledged.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.conflicted == 0 && self.transient == 0 && self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_ids_are_unique_and_parse() {
        let first = EntryId::new();
        let second = EntryId::new();
        assert_ne!(first, second);

        let parsed: EntryId = first.as_str().parse().unwrap();
        assert_eq!(parsed, first);
    }

    #[test]
    fn mutation_kind_parses_case_insensitively() {
        assert_eq!("Create".parse::<MutationKind>().unwrap(), MutationKind::Create);
        assert_eq!(" patch ".parse::<MutationKind>().unwrap(), MutationKind::Patch);
        assert!("delete".parse::<MutationKind>().is_err());
    }

    #[test]
    fn new_entry_is_pending() {
        let entry = OutboxEntry::new(MutationKind::Patch, "contacts/1", Value::object())
            .with_base_version(Some(VersionToken::new("v1")));
        assert_eq!(entry.attempts, 0);
        assert!(!entry.failed);
        assert!(entry.enqueued_at > 0);
        assert_eq!(entry.base_version, Some(VersionToken::new("v1")));
    }

    #[test]
    fn report_cleanliness() {
        let mut report = OutboxReport {
            applied: 3,
            ..OutboxReport::default()
        };
        assert!(report.is_clean());
        report.transient = 1;
        assert!(!report.is_clean());
    }
}
