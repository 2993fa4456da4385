//! Record identity and remote version tokens

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Value;
use crate::error::{Error, Result};

/// Opaque revision identifier issued by the remote service (an `ETag`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record together with the version token the remote returned for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedRecord {
    pub value: Value,
    pub version: VersionToken,
}

impl VersionedRecord {
    pub fn new(value: Value, version: VersionToken) -> Self {
        Self { value, version }
    }
}

/// Root segment of every record's store key and remote path.
pub const RECORDS_ROOT: &str = "records";

/// Identity of a record: `(collection, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub collection: String,
    pub id: String,
}

impl RecordKey {
    /// Build a key, rejecting empty segments and embedded path separators.
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        let collection = validate_segment(collection.into(), "collection")?;
        let id = validate_segment(id.into(), "id")?;
        Ok(Self { collection, id })
    }

    /// Store key and remote resource path for this record.
    ///
    /// Records live under their own root so no collection can reach
    /// preferences, category envelopes or profile documents.
    #[must_use]
    pub fn resource_path(&self) -> String {
        format!("{RECORDS_ROOT}/{}/{}", self.collection, self.id)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

fn validate_segment(raw: String, field: &str) -> Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("record {field} must not be empty")));
    }
    if value.contains('/') {
        return Err(Error::InvalidInput(format!(
            "record {field} must not contain '/'"
        )));
    }
    Ok(value.to_string())
}
