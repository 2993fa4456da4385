//! Structural merge that fills gaps from the remote side without deleting local data.
//!
//! The merge is deterministic and idempotent: `merge(merge(a, b), b) == merge(a, b)`.
//! It is not commutative. On a direct scalar collision the local value always
//! wins; timestamp-aware resolution lives in the sync orchestrator.

use std::collections::{BTreeMap, HashSet};

use crate::models::Value;

/// Reconcile `local` with `remote` so that no non-empty local data is lost.
///
/// - An absent or null `remote` returns `local` unchanged.
/// - Trivial local values (null, `""`, `[]`, `{}`) adopt the remote value.
/// - Objects merge field by field, recursively.
/// - Arrays become the set union of both sides by canonical serialization:
///   local order first, then unseen remote elements, with duplicates dropped.
/// - Any other collision keeps the local value.
#[must_use]
pub fn merge_without_overwrite(local: &Value, remote: Option<&Value>) -> Value {
    match remote {
        None => local.clone(),
        Some(remote) if remote.is_null() => local.clone(),
        Some(remote) => merge_values(local, remote),
    }
}

fn merge_values(local: &Value, remote: &Value) -> Value {
    if local.is_trivial() {
        return remote.clone();
    }

    match (local, remote) {
        (Value::Object(local_fields), Value::Object(remote_fields)) => {
            Value::Object(merge_objects(local_fields, remote_fields))
        }
        (Value::Array(local_items), Value::Array(remote_items)) => {
            Value::Array(union_arrays(local_items, remote_items))
        }
        _ => local.clone(),
    }
}

fn merge_objects(
    local: &BTreeMap<String, Value>,
    remote: &BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    let mut merged = local.clone();
    for (key, remote_value) in remote {
        let next = match local.get(key) {
            None => remote_value.clone(),
            Some(local_value) => merge_values(local_value, remote_value),
        };
        merged.insert(key.clone(), next);
    }
    merged
}

fn union_arrays(local: &[Value], remote: &[Value]) -> Vec<Value> {
    let mut seen = HashSet::new();
    local
        .iter()
        .chain(remote)
        .filter(|item| seen.insert(item.canonical_string()))
        .cloned()
        .collect()
}
