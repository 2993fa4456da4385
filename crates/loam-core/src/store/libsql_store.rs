//! libSQL-backed durable store

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{params, Row};
use tokio::sync::Mutex;

use super::LocalStore;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{EntryId, OutboxEntry, Value, VersionToken};
use crate::util::unix_millis_now;

const OUTBOX_COLUMNS: &str =
    "id, enqueued_at, kind, target, payload, base_version, attempts, last_error, failed";

/// Durable store persisted in a local libSQL database.
#[derive(Debug, Clone)]
pub struct LibSqlStore {
    db: Arc<Mutex<Database>>,
}

impl LibSqlStore {
    /// Open (or create) a store file, running migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::open(path).await?;
        Ok(Self::from_database(db))
    }

    /// Open an in-memory store (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self::from_database(db))
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    fn parse_entry(row: &Row) -> Result<OutboxEntry> {
        let id: String = row.get(0)?;
        let kind: String = row.get(2)?;
        let payload: String = row.get(4)?;
        let attempts: i64 = row.get(6)?;
        let failed: i64 = row.get(8)?;

        Ok(OutboxEntry {
            id: id
                .parse()
                .map_err(|error| corrupt(format!("outbox id '{id}': {error}")))?,
            enqueued_at: row.get(1)?,
            kind: kind.parse()?,
            target: row.get(3)?,
            payload: serde_json::from_str(&payload)?,
            base_version: optional_text(row, 5)?.map(VersionToken::new),
            attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
            last_error: optional_text(row, 7)?,
            failed: failed != 0,
        })
    }
}

fn corrupt(message: String) -> Error {
    Error::StorageUnavailable(format!("corrupt row: {message}"))
}

fn optional_text(row: &Row, index: i32) -> Result<Option<String>> {
    match row.get_value(index)? {
        libsql::Value::Null => Ok(None),
        libsql::Value::Text(text) => Ok(Some(text)),
        other => Err(corrupt(format!("expected text in column {index}, got {other:?}"))),
    }
}

fn nullable_text(value: Option<&str>) -> libsql::Value {
    value.map_or(libsql::Value::Null, |text| libsql::Value::Text(text.to_string()))
}

#[async_trait]
impl LocalStore for LibSqlStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query("SELECT value FROM documents WHERE key = ?", [key])
            .await?;

        match rows.next().await? {
            Some(row) => {
                let raw: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let encoded = serde_json::to_string(value)?;
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO documents (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, encoded, unix_millis_now()],
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute("DELETE FROM documents WHERE key = ?", [key])
            .await?;
        Ok(())
    }

    async fn enqueue(&self, entry: OutboxEntry) -> Result<EntryId> {
        let payload = serde_json::to_string(&entry.payload)?;
        let db = self.db.lock().await;
        db.connection()
            .execute(
                &format!(
                    "INSERT INTO outbox ({OUTBOX_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    entry.id.as_str(),
                    entry.enqueued_at,
                    entry.kind.as_str(),
                    entry.target.as_str(),
                    payload,
                    nullable_text(entry.base_version.as_ref().map(VersionToken::as_str)),
                    i64::from(entry.attempts),
                    nullable_text(entry.last_error.as_deref()),
                    i64::from(entry.failed),
                ],
            )
            .await?;
        tracing::debug!(id = %entry.id, target = %entry.target, "queued mutation");
        Ok(entry.id)
    }

    async fn list_queue(&self) -> Result<Vec<OutboxEntry>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                &format!("SELECT {OUTBOX_COLUMNS} FROM outbox ORDER BY seq ASC"),
                (),
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    async fn remove_queued(&self, id: EntryId) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute("DELETE FROM outbox WHERE id = ?", [id.as_str()])
            .await?;
        Ok(())
    }

    async fn note_attempt(&self, id: EntryId, error: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "UPDATE outbox SET attempts = attempts + 1, last_error = ?1 WHERE id = ?2",
                params![error, id.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: EntryId, error: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "UPDATE outbox SET attempts = attempts + 1, last_error = ?1, failed = 1 WHERE id = ?2",
                params![error, id.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn requeue(&self, id: EntryId) -> Result<()> {
        let db = self.db.lock().await;
        let changed = db
            .connection()
            .execute("UPDATE outbox SET failed = 0 WHERE id = ?", [id.as_str()])
            .await?;
        if changed == 0 {
            return Err(Error::NotFound(format!("outbox entry {id}")));
        }
        Ok(())
    }

    async fn version(&self, path: &str) -> Result<Option<VersionToken>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query("SELECT version FROM record_versions WHERE path = ?", [path])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(VersionToken::new(row.get::<String>(0)?))),
            None => Ok(None),
        }
    }

    async fn set_version(&self, path: &str, version: &VersionToken) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO record_versions (path, version, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(path) DO UPDATE SET version = excluded.version, updated_at = excluded.updated_at",
                params![path, version.as_str(), unix_millis_now()],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MutationKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn documents_roundtrip() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        let value = Value::from(json!({"name": "Jane", "tags": ["vip"]}));

        store.set("contacts/c-1", &value).await.unwrap();
        assert_eq!(store.get("contacts/c-1").await.unwrap(), Some(value));

        store.set("contacts/c-1", &Value::from("replaced")).await.unwrap();
        assert_eq!(
            store.get("contacts/c-1").await.unwrap(),
            Some(Value::from("replaced"))
        );

        store.delete("contacts/c-1").await.unwrap();
        assert_eq!(store.get("contacts/c-1").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn outbox_state_transitions() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        let entry = OutboxEntry::new(MutationKind::Patch, "contacts/c-1", Value::from(1))
            .with_base_version(Some(VersionToken::new("\"2\"")));
        let id = store.enqueue(entry.clone()).await.unwrap();

        store.note_attempt(id, "timeout").await.unwrap();
        store.mark_failed(id, "rejected").await.unwrap();
        let queued = store.list_queue().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].attempts, 2);
        assert_eq!(queued[0].last_error.as_deref(), Some("rejected"));
        assert_eq!(queued[0].base_version, entry.base_version);
        assert!(queued[0].failed);

        store.requeue(id).await.unwrap();
        assert!(!store.list_queue().await.unwrap()[0].failed);
        assert!(matches!(
            store.requeue(EntryId::new()).await.unwrap_err(),
            Error::NotFound(_)
        ));

        store.remove_queued(id).await.unwrap();
        store.remove_queued(id).await.unwrap();
        assert!(store.list_queue().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn versions_upsert() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        assert_eq!(store.version("contacts/c-1").await.unwrap(), None);

        store
            .set_version("contacts/c-1", &VersionToken::new("\"1\""))
            .await
            .unwrap();
        store
            .set_version("contacts/c-1", &VersionToken::new("\"2\""))
            .await
            .unwrap();
        assert_eq!(
            store.version("contacts/c-1").await.unwrap(),
            Some(VersionToken::new("\"2\""))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queue_order_survives_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("loam.db");

        let mut expected = Vec::new();
        {
            let store = LibSqlStore::open(&path).await.unwrap();
            for index in 0..5 {
                let entry = OutboxEntry::new(
                    MutationKind::Create,
                    format!("contacts/c-{index}"),
                    Value::from(json!({"n": index})),
                );
                expected.push(store.enqueue(entry).await.unwrap());
            }
            store.set("preferences/default", &Value::from(true)).await.unwrap();
        }

        let reopened = LibSqlStore::open(&path).await.unwrap();
        let ids: Vec<EntryId> = reopened
            .list_queue()
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.id)
            .collect();
        assert_eq!(ids, expected);
        assert_eq!(
            reopened.get("preferences/default").await.unwrap(),
            Some(Value::from(true))
        );
    }
}
