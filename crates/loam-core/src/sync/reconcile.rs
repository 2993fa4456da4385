//! Per-category reconciliation between local envelopes and the remote profile document.

use std::collections::BTreeMap;

use crate::models::{CategoryEnvelope, Value};

/// Field of the remote profile document holding per-category timestamps.
pub const LAST_MODIFIED_FIELD: &str = "lastModified";

/// Decoded remote profile document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteProfile {
    fields: BTreeMap<String, Value>,
    last_modified: BTreeMap<String, i64>,
}

impl RemoteProfile {
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        let last_modified = object
            .get(LAST_MODIFIED_FIELD)
            .and_then(Value::as_object)
            .map(|stamps| {
                stamps
                    .iter()
                    .filter_map(|(category, stamp)| Some((category.clone(), stamp.as_i64()?)))
                    .collect()
            })
            .unwrap_or_default();

        let fields = object
            .iter()
            .filter(|(key, _)| key.as_str() != LAST_MODIFIED_FIELD)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            fields,
            last_modified,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut object = self.fields.clone();
        let stamps = self
            .last_modified
            .iter()
            .map(|(category, stamp)| (category.clone(), Value::from(*stamp)))
            .collect::<BTreeMap<_, _>>();
        object.insert(LAST_MODIFIED_FIELD.to_string(), Value::from(stamps));
        Value::from(object)
    }

    pub fn value(&self, category: &str) -> Option<&Value> {
        self.fields.get(category).filter(|value| !value.is_null())
    }

    pub fn modified_at(&self, category: &str) -> Option<i64> {
        self.last_modified.get(category).copied()
    }

    pub fn set(&mut self, category: &str, value: Value, modified_at: i64) {
        self.fields.insert(category.to_string(), value);
        self.last_modified.insert(category.to_string(), modified_at);
    }
}

/// What a cycle does with one category.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Both sides agree (or both are absent)
    InSync,
    /// Both sides changed independently; a human decides
    Conflict,
    /// Local wins; written into the outgoing remote document
    PushLocal,
    /// Remote wins; written locally once the remote write resolved
    AdoptRemote { value: Value, modified_at: i64 },
}

/// Decide how to reconcile a category.
///
/// A conflict needs both values non-trivial, differing, and changed since
/// the last reconciliation. Otherwise the strictly newer timestamp wins and
/// a tie goes to the remote.
pub fn decide(
    local: Option<&CategoryEnvelope>,
    remote_value: Option<&Value>,
    remote_modified_at: Option<i64>,
) -> Decision {
    let remote_stamp = remote_modified_at.unwrap_or(0);

    match (local, remote_value) {
        (None, None) => Decision::InSync,
        (Some(_), None) => Decision::PushLocal,
        (None, Some(remote)) => Decision::AdoptRemote {
            value: remote.clone(),
            modified_at: remote_stamp,
        },
        (Some(envelope), Some(remote)) => {
            let local = &envelope.value;
            if local.structurally_eq(remote) {
                return Decision::InSync;
            }

            let remote_changed = envelope
                .synced_at
                .is_none_or(|synced_at| remote_stamp > synced_at);
            if !local.is_trivial()
                && !remote.is_trivial()
                && envelope.changed_since_sync()
                && remote_changed
            {
                return Decision::Conflict;
            }

            if envelope.modified_at > remote_stamp {
                Decision::PushLocal
            } else {
                Decision::AdoptRemote {
                    value: remote.clone(),
                    modified_at: remote_stamp,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn envelope(value: serde_json::Value, modified_at: i64, synced_at: Option<i64>) -> CategoryEnvelope {
        CategoryEnvelope {
            value: Value::from(value),
            modified_at,
            synced_at,
        }
    }

    #[test]
    fn profile_document_roundtrip() {
        let raw = Value::from(json!({
            "expenses": {"rent": 1200},
            "contacts": ["jane"],
            "lastModified": {"expenses": 200, "contacts": 50}
        }));

        let profile = RemoteProfile::from_value(&raw);
        assert_eq!(profile.value("expenses"), Some(&Value::from(json!({"rent": 1200}))));
        assert_eq!(profile.modified_at("contacts"), Some(50));
        assert_eq!(profile.value("lastModified"), None);
        assert_eq!(profile.to_value(), raw);
    }

    #[test]
    fn non_object_document_is_empty() {
        let profile = RemoteProfile::from_value(&Value::from("garbage"));
        assert_eq!(profile, RemoteProfile::default());
        assert_eq!(
            profile.to_value(),
            Value::from(json!({"lastModified": {}}))
        );
    }

    #[test]
    fn independent_edits_conflict() {
        let local = envelope(json!({"rent": 1000}), 100, None);
        let remote = Value::from(json!({"rent": 1200}));
        assert_eq!(decide(Some(&local), Some(&remote), Some(200)), Decision::Conflict);
    }

    #[test]
    fn equal_values_are_in_sync() {
        let local = envelope(json!(["a", "b"]), 100, None);
        let remote = Value::from(json!(["a", "b"]));
        assert_eq!(decide(Some(&local), Some(&remote), Some(200)), Decision::InSync);
        assert_eq!(decide(None, None, None), Decision::InSync);
    }

    #[test]
    fn one_sided_values_propagate() {
        let local = envelope(json!("mine"), 100, None);
        assert_eq!(decide(Some(&local), None, None), Decision::PushLocal);
        assert_eq!(
            decide(None, Some(&Value::from("theirs")), Some(300)),
            Decision::AdoptRemote {
                value: Value::from("theirs"),
                modified_at: 300
            }
        );
    }

    #[test]
    fn only_local_changed_pushes_local() {
        let local = envelope(json!("edited"), 500, Some(300));
        let remote = Value::from("original");
        assert_eq!(decide(Some(&local), Some(&remote), Some(250)), Decision::PushLocal);
    }

    #[test]
    fn only_remote_changed_adopts_remote() {
        let local = envelope(json!("original"), 250, Some(300));
        let remote = Value::from("edited elsewhere");
        assert_eq!(
            decide(Some(&local), Some(&remote), Some(400)),
            Decision::AdoptRemote {
                value: remote.clone(),
                modified_at: 400
            }
        );
    }

    #[test]
    fn trivial_side_falls_back_to_last_write_wins() {
        let cleared = envelope(json!(""), 500, None);
        let remote = Value::from("value");
        assert_eq!(decide(Some(&cleared), Some(&remote), Some(200)), Decision::PushLocal);

        let stale_clear = envelope(json!([]), 100, None);
        assert!(matches!(
            decide(Some(&stale_clear), Some(&remote), Some(200)),
            Decision::AdoptRemote { .. }
        ));
    }

    #[test]
    fn timestamp_tie_favors_remote() {
        let local = envelope(json!(""), 200, None);
        let remote = Value::from("remote");
        assert!(matches!(
            decide(Some(&local), Some(&remote), Some(200)),
            Decision::AdoptRemote { .. }
        ));
    }
}
