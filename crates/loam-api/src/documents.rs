//! In-memory document table with optimistic concurrency.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::RwLock;

/// A stored document and the version it was last written at.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub value: Value,
    pub version: u64,
}

impl StoredDocument {
    /// Version rendered as a strong entity tag.
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.version)
    }
}

/// Condition a write must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// `If-None-Match: *`
    Absent,
    /// `If-Match: *`
    Exists,
    /// `If-Match: <etag>[, <etag>...]`
    MatchesAny(Vec<String>),
}

impl Precondition {
    fn admits(&self, current: &StoredDocument) -> bool {
        match self {
            Self::Absent => false,
            Self::Exists => true,
            Self::MatchesAny(tags) => {
                let etag = current.etag();
                tags.iter().any(|tag| normalize_tag(tag) == etag)
            }
        }
    }
}

/// Parse an `If-Match` header value.
pub fn parse_if_match(raw: &str) -> Precondition {
    if raw.trim() == "*" {
        return Precondition::Exists;
    }
    let tags = raw
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(ToString::to_string)
        .collect();
    Precondition::MatchesAny(tags)
}

// Weak validators compare equal to strong ones for whole-document writes.
fn normalize_tag(tag: &str) -> String {
    let tag = tag.strip_prefix("W/").unwrap_or(tag);
    if tag.starts_with('"') {
        tag.to_string()
    } else {
        format!("\"{tag}\"")
    }
}

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Created(StoredDocument),
    Updated(StoredDocument),
    /// The precondition failed; carries the current revision
    Conflict(StoredDocument),
    /// `If-Match` against a path that holds nothing
    Missing,
}

#[derive(Debug, Default)]
struct Inner {
    documents: HashMap<String, StoredDocument>,
    last_version: u64,
}

#[derive(Debug, Default)]
pub struct DocumentTable {
    inner: RwLock<Inner>,
}

impl DocumentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path: &str) -> Option<StoredDocument> {
        self.inner.read().await.documents.get(path).cloned()
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.documents.len()
    }

    /// Apply a write if `precondition` holds against the current revision.
    pub async fn put(&self, path: &str, value: Value, precondition: &Precondition) -> WriteOutcome {
        let mut inner = self.inner.write().await;
        let existing = inner.documents.get(path).cloned();

        let created = match (&existing, precondition) {
            (None, Precondition::Absent) => true,
            (None, _) => return WriteOutcome::Missing,
            (Some(current), precondition) if precondition.admits(current) => false,
            (Some(current), _) => return WriteOutcome::Conflict(current.clone()),
        };

        inner.last_version += 1;
        let document = StoredDocument {
            value,
            version: inner.last_version,
        };
        inner.documents.insert(path.to_string(), document.clone());

        if created {
            WriteOutcome::Created(document)
        } else {
            WriteOutcome::Updated(document)
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn create_then_conditional_update() {
        let table = DocumentTable::new();

        let WriteOutcome::Created(first) =
            table.put("profiles/a", json!({"n": 1}), &Precondition::Absent).await
        else {
            panic!("expected create");
        };
        assert_eq!(first.etag(), "\"1\"");

        let outcome = table
            .put(
                "profiles/a",
                json!({"n": 2}),
                &parse_if_match(&first.etag()),
            )
            .await;
        let WriteOutcome::Updated(second) = outcome else {
            panic!("expected update, got {outcome:?}");
        };
        assert_eq!(second.version, 2);
        assert_eq!(table.get("profiles/a").await, Some(second));
    }

    #[tokio::test]
    async fn stale_tag_reports_current_revision() {
        let table = DocumentTable::new();
        table.put("doc", json!("v1"), &Precondition::Absent).await;
        table.put("doc", json!("v2"), &Precondition::Exists).await;

        let outcome = table.put("doc", json!("v3"), &parse_if_match("\"1\"")).await;
        assert_eq!(
            outcome,
            WriteOutcome::Conflict(StoredDocument {
                value: json!("v2"),
                version: 2
            })
        );
    }

    #[tokio::test]
    async fn create_over_existing_conflicts() {
        let table = DocumentTable::new();
        table.put("doc", json!(1), &Precondition::Absent).await;

        let outcome = table.put("doc", json!(2), &Precondition::Absent).await;
        assert!(matches!(outcome, WriteOutcome::Conflict(current) if current.value == json!(1)));
    }

    #[tokio::test]
    async fn update_of_missing_document() {
        let table = DocumentTable::new();
        assert_eq!(
            table.put("doc", json!(1), &Precondition::Exists).await,
            WriteOutcome::Missing
        );
        assert_eq!(table.count().await, 0);
    }

    #[test]
    fn if_match_lists_and_weak_tags() {
        let current = StoredDocument {
            value: json!(null),
            version: 7,
        };
        assert!(parse_if_match("\"3\", W/\"7\"").admits(&current));
        assert!(parse_if_match("7").admits(&current));
        assert!(!parse_if_match("\"8\"").admits(&current));
        assert_eq!(parse_if_match(" * "), Precondition::Exists);
    }
}
