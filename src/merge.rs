//! Deep merge of a generated patch into an existing crop profile.
//!
//! Existing data always wins: the patch may add keys, fill empty values and
//! append new records to record lists, but it never overwrites a non-empty
//! value already present in the base.

use crate::utils::{identity_key, is_falsy, is_truthy};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Merges `patch` into a copy of `original`. Neither input is modified.
pub fn deep_merge(original: &Map<String, Value>, patch: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = original.clone();
    merge_into(&mut merged, patch);
    merged
}

/// [`deep_merge`] over arbitrary values: two mappings are merged, anything
/// else keeps the base.
pub fn deep_merge_values(original: &Value, patch: &Value) -> Value {
    match (original, patch) {
        (Value::Object(base), Value::Object(extra)) => Value::Object(deep_merge(base, extra)),
        _ => original.clone(),
    }
}

/// Lays `expanded` over `base`: every top-level key of `expanded` replaces
/// the base value wholesale, new keys are appended.
pub fn overlay(base: &Map<String, Value>, expanded: Map<String, Value>) -> Map<String, Value> {
    let mut result = base.clone();
    for (key, value) in expanded {
        result.insert(key, value);
    }
    result
}

fn merge_into(base: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, incoming) in patch {
        let Some(existing) = base.get_mut(key) else {
            base.insert(key.clone(), incoming.clone());
            continue;
        };

        match (existing, incoming) {
            (Value::Object(current), Value::Object(extra)) => merge_into(current, extra),
            (Value::Array(current), Value::Array(extra)) => union_lists(current, extra),
            (current, extra) => {
                if is_falsy(current) && is_truthy(extra) {
                    *current = extra.clone();
                }
            }
        }
    }
}

/// Appends `extra` to `current`.
///
/// A list whose first element is a mapping is treated as a list of records and
/// de-duplicated by natural key, keeping the base's version. Any other list is
/// concatenated as-is, so scalar lists grow on every merge.
fn union_lists(current: &mut Vec<Value>, extra: &[Value]) {
    let is_record_list = current.first().is_some_and(Value::is_object);
    if !is_record_list {
        current.extend(extra.iter().cloned());
        return;
    }

    let mut seen: HashSet<String> = current
        .iter()
        .enumerate()
        .map(|(i, item)| identity_key(item, i))
        .collect();

    for (i, item) in extra.iter().enumerate() {
        if seen.insert(identity_key(item, i)) {
            current.push(item.clone());
        }
    }
}
