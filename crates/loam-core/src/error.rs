//! Error types for loam-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using loam-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in loam-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local store failure. Callers must not assume a partial write landed.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// No authenticated session, or the remote rejected the credential
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    /// Remote service error other than an auth failure
    #[error("Remote error: {0}")]
    Remote(RemoteError),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<RemoteError> for Error {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Unauthenticated(message) => Self::Unauthenticated(message),
            other => Self::Remote(other),
        }
    }
}

impl From<libsql::Error> for Error {
    fn from(error: libsql::Error) -> Self {
        Self::StorageUnavailable(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_auth_failures_become_unauthenticated() {
        let error: Error = RemoteError::Unauthenticated("token expired".to_string()).into();
        assert!(matches!(error, Error::Unauthenticated(message) if message == "token expired"));
    }

    #[test]
    fn other_remote_failures_are_wrapped() {
        let error: Error = RemoteError::Transient("connection reset".to_string()).into();
        assert!(matches!(error, Error::Remote(RemoteError::Transient(_))));
        assert!(error.to_string().contains("connection reset"));
    }
}
