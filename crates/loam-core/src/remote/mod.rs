//! Remote document service contract.
//!
//! Every conditional write presents the version token returned by the last
//! read or write. A stale token fails with [`RemoteError::VersionConflict`],
//! which carries the current remote revision so the caller can re-merge.

mod http;
mod memory;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Value, VersionToken, VersionedRecord};

pub use http::HttpRemoteClient;
pub use memory::MemoryRemote;

/// Retry policy class for remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Leave the work queued and try again on a later pass
    Retryable,
    /// Surface to the user; retrying will not help
    Permanent,
    /// The credential must be refreshed before any further call
    ReauthRequired,
}

/// Errors reported by a [`RemoteClient`].
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Resource absent; callers fall back to `create`
    #[error("remote resource not found")]
    NotFound,

    /// Precondition failed; `current` is the revision the remote holds now
    #[error("version conflict (remote is at {})", .current.version)]
    VersionConflict { current: Box<VersionedRecord> },

    /// Network failure or 5xx
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// Any other rejection
    #[error("remote rejected request ({status}): {message}")]
    Fatal { status: u16, message: String },

    /// Missing or rejected credential
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
}

impl RemoteError {
    pub fn conflict(current: VersionedRecord) -> Self {
        Self::VersionConflict {
            current: Box::new(current),
        }
    }

    pub fn fatal(status: u16, message: impl Into<String>) -> Self {
        Self::Fatal {
            status,
            message: message.into(),
        }
    }

    /// Classify error for retry policy.
    #[must_use]
    pub const fn retry_class(&self) -> RetryClass {
        match self {
            Self::NotFound | Self::VersionConflict { .. } | Self::Transient(_) => {
                RetryClass::Retryable
            }
            Self::Fatal { .. } => RetryClass::Permanent,
            Self::Unauthenticated(_) => RetryClass::ReauthRequired,
        }
    }
}

/// Result type for remote calls
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Read/create/conditional-update access to remote resources.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetch the current revision of `path`.
    async fn read(&self, path: &str) -> RemoteResult<VersionedRecord>;

    /// Create `path`; fails with a version conflict when it already exists.
    async fn create(&self, path: &str, value: &Value) -> RemoteResult<VersionedRecord>;

    /// Replace `path` if its revision still matches `version`.
    ///
    /// `None` only requires the resource to exist.
    async fn conditional_update(
        &self,
        path: &str,
        value: &Value,
        version: Option<&VersionToken>,
    ) -> RemoteResult<VersionedRecord>;
}

/// Supplies the authenticated identity attached to remote calls.
pub trait SessionProvider: Send + Sync {
    fn current_user_id(&self) -> Option<String>;
    fn bearer_token(&self) -> Option<String>;

    /// True when both an identity and a credential are available.
    fn is_authenticated(&self) -> bool {
        self.current_user_id().is_some() && self.bearer_token().is_some()
    }
}

/// Fixed session, typically built from configuration or environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StaticSession {
    user_id: Option<String>,
    token: Option<String>,
}

impl StaticSession {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: crate::util::normalize_text_option(Some(user_id.into())),
            token: crate::util::normalize_text_option(Some(token.into())),
        }
    }

    /// A session with no identity; every cycle fails as unauthenticated.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Build from `LOAM_USER_ID` and `LOAM_AUTH_TOKEN`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            user_id: crate::util::normalize_text_option(std::env::var("LOAM_USER_ID").ok()),
            token: crate::util::normalize_text_option(std::env::var("LOAM_AUTH_TOKEN").ok()),
        }
    }
}

impl fmt::Debug for StaticSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("StaticSession")
            .field("user_id", &self.user_id)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl SessionProvider for StaticSession {
    fn current_user_id(&self) -> Option<String> {
        self.user_id.clone()
    }

    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classes() {
        assert_eq!(
            RemoteError::Transient("timeout".into()).retry_class(),
            RetryClass::Retryable
        );
        assert_eq!(
            RemoteError::fatal(422, "bad payload").retry_class(),
            RetryClass::Permanent
        );
        assert_eq!(
            RemoteError::Unauthenticated("expired".into()).retry_class(),
            RetryClass::ReauthRequired
        );
    }

    #[test]
    fn static_session_requires_both_parts() {
        assert!(StaticSession::new("user-1", "token").is_authenticated());
        assert!(!StaticSession::new("user-1", "  ").is_authenticated());
        assert!(!StaticSession::anonymous().is_authenticated());
    }

    #[test]
    fn static_session_debug_redacts_token() {
        let session = StaticSession::new("user-1", "secret-token");
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
