use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] loam_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid JSON value: {0}")]
    InvalidJson(String),
    #[error("Invalid outbox entry id: {0}")]
    InvalidEntryId(String),
    #[error("Invalid resolution `{0}`; expected <category>=<local|remote|merge>")]
    InvalidResolution(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Sync failed: {0}")]
    SyncFailed(String),
    #[error(
        "Remote is not configured. Pass --remote-url or set LOAM_REMOTE_URL, plus LOAM_USER_ID and LOAM_AUTH_TOKEN."
    )]
    RemoteNotConfigured,
}
