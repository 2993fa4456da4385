use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use loam_core::remote::RemoteResult;
use loam_core::{
    EngineConfig, HttpRemoteClient, LibSqlStore, OutboxEntry, RemoteClient, RemoteConfig,
    RemoteError, SessionProvider, StaticSession, SyncConflict, SyncEngine, Value, VersionToken,
    VersionedRecord,
};
use serde::Serialize;

use crate::error::CliError;

pub type Engine = SyncEngine<LibSqlStore, CliRemote, StaticSession>;

/// Global options shared by every command.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub db_path: PathBuf,
    pub profile: String,
    pub remote_url: Option<String>,
}

/// Remote used by the CLI: the document service, or nothing when only
/// local commands run.
pub enum CliRemote {
    Http(HttpRemoteClient),
    Unconfigured,
}

impl CliRemote {
    fn unconfigured<T>() -> RemoteResult<T> {
        Err(RemoteError::Transient("no remote configured".to_string()))
    }
}

#[async_trait]
impl RemoteClient for CliRemote {
    async fn read(&self, path: &str) -> RemoteResult<VersionedRecord> {
        match self {
            Self::Http(client) => client.read(path).await,
            Self::Unconfigured => Self::unconfigured(),
        }
    }

    async fn create(&self, path: &str, value: &Value) -> RemoteResult<VersionedRecord> {
        match self {
            Self::Http(client) => client.create(path, value).await,
            Self::Unconfigured => Self::unconfigured(),
        }
    }

    async fn conditional_update(
        &self,
        path: &str,
        value: &Value,
        version: Option<&VersionToken>,
    ) -> RemoteResult<VersionedRecord> {
        match self {
            Self::Http(client) => client.conditional_update(path, value, version).await,
            Self::Unconfigured => Self::unconfigured(),
        }
    }
}

#[derive(Clone, Copy)]
pub enum OpenEngineMode {
    Local,
    RequireRemote,
}

impl OpenEngineMode {
    const fn requires_remote(self) -> bool {
        matches!(self, Self::RequireRemote)
    }
}

pub async fn open_engine(ctx: &CliContext, mode: OpenEngineMode) -> Result<Engine, CliError> {
    open_engine_with_config(ctx, mode, EngineConfig::default()).await
}

pub async fn open_engine_with_config(
    ctx: &CliContext,
    mode: OpenEngineMode,
    config: EngineConfig,
) -> Result<Engine, CliError> {
    let session = StaticSession::from_env();
    let remote = remote_from_context(ctx, &session, mode)?;
    let store = open_store(&ctx.db_path).await?;

    let engine = SyncEngine::new(store, remote, session, config)?;
    engine.register_profile(&ctx.profile).await?;
    Ok(engine)
}

async fn open_store(path: &Path) -> Result<LibSqlStore, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(LibSqlStore::open(path).await?)
}

fn remote_from_context(
    ctx: &CliContext,
    session: &StaticSession,
    mode: OpenEngineMode,
) -> Result<CliRemote, CliError> {
    let config = match ctx.remote_url.as_deref().and_then(normalize_text) {
        Some(url) => Some(RemoteConfig::new(url)?),
        None => match RemoteConfig::from_env() {
            Ok(config) => config,
            Err(error) => {
                tracing::debug!(%error, "no remote from environment");
                None
            }
        },
    };

    let Some(config) = config else {
        if mode.requires_remote() {
            return Err(CliError::RemoteNotConfigured);
        }
        return Ok(CliRemote::Unconfigured);
    };
    if mode.requires_remote() && !session.is_authenticated() {
        return Err(CliError::RemoteNotConfigured);
    }

    let session: Arc<dyn SessionProvider> = Arc::new(session.clone());
    Ok(CliRemote::Http(HttpRemoteClient::new(config, session)?))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("LOAM_DB_PATH").map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("loam").join("loam.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

pub fn normalize_text(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Parse a command-line value as JSON; text that is not JSON becomes a string.
pub fn parse_value(raw: &str) -> Result<Value, CliError> {
    let Some(trimmed) = normalize_text(raw) else {
        return Err(CliError::InvalidJson("value cannot be empty".to_string()));
    };
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(json) => Ok(Value::from(json)),
        Err(error) if looks_like_json(trimmed) => Err(CliError::InvalidJson(error.to_string())),
        Err(_) => Ok(Value::from(trimmed)),
    }
}

/// Parse a record body, which must be a JSON object.
pub fn parse_record(raw: &str) -> Result<Value, CliError> {
    let value = parse_value(raw)?;
    if value.as_object().is_none() {
        return Err(CliError::InvalidJson(
            "record body must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}

fn looks_like_json(text: &str) -> bool {
    text.starts_with('{') || text.starts_with('[') || text.starts_with('"')
}

pub fn render_value(value: &Value) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

#[derive(Debug, Serialize)]
pub struct OutboxItem {
    pub id: String,
    pub kind: String,
    pub target: String,
    pub enqueued_at: i64,
    pub enqueued_at_iso: String,
    pub attempts: u32,
    pub failed: bool,
    pub last_error: Option<String>,
}

pub fn outbox_to_item(entry: &OutboxEntry) -> OutboxItem {
    OutboxItem {
        id: entry.id.to_string(),
        kind: entry.kind.to_string(),
        target: entry.target.clone(),
        enqueued_at: entry.enqueued_at,
        enqueued_at_iso: format_timestamp(entry.enqueued_at),
        attempts: entry.attempts,
        failed: entry.failed,
        last_error: entry.last_error.clone(),
    }
}

pub fn format_outbox_lines(entries: &[OutboxEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let state = if entry.failed {
                "failed"
            } else if entry.attempts > 0 {
                "retrying"
            } else {
                "queued"
            };
            let mut line = format!(
                "{}  {:<6}  {:<8}  {}  attempts={}",
                entry.id,
                entry.kind.as_str(),
                state,
                entry.target,
                entry.attempts
            );
            if let Some(error) = entry.last_error.as_deref() {
                line.push_str("  error=");
                line.push_str(error);
            }
            line
        })
        .collect()
}

pub fn format_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    let render = |value: Option<&Value>| {
        value.map_or_else(|| "(absent)".to_string(), Value::canonical_string)
    };
    conflicts
        .iter()
        .map(|conflict| {
            let state = match (conflict.resolved, conflict.resolution) {
                (true, Some(resolution)) => format!("resolved ({resolution})"),
                _ => "unresolved".to_string(),
            };
            format!(
                "{}  {state}  local={} remote={}",
                conflict.field,
                render(conflict.local_value.as_ref()),
                render(conflict.remote_value.as_ref()),
            )
        })
        .collect()
}
