use serde_json::Value;

/// Fields tried, in order, when looking for a record's natural key.
pub const IDENTITY_FIELDS: &[&str] = &["nombre", "labor"];

/// Truthiness of a JSON node: null, false, zero, "", [] and {} are falsy.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

pub fn is_truthy(value: &Value) -> bool {
    !is_falsy(value)
}

/// Returns the value of the first identity field present on a mapping record.
///
/// String values are returned verbatim; any other non-null value is rendered
/// as compact JSON so keys always compare as opaque strings.
pub fn natural_key(record: &Value) -> Option<String> {
    let map = record.as_object()?;
    IDENTITY_FIELDS
        .iter()
        .filter_map(|field| map.get(*field))
        .find(|v| !v.is_null())
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}

/// Natural key of a record, falling back to its ordinal position.
pub fn identity_key(record: &Value, ordinal: usize) -> String {
    natural_key(record).unwrap_or_else(|| ordinal.to_string())
}

/// Short type label for reports and log lines.
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Length of a container node, `None` for scalars.
pub fn container_len(value: &Value) -> Option<usize> {
    match value {
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

/// Follows a chain of object keys, returning `None` as soon as a step is missing
/// or lands on a non-mapping.
pub fn value_at<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(root, |node, key| node.as_object().and_then(|m| m.get(*key)))
}

/// File-name friendly form of a crop name: lowercase, spaces replaced by `_`.
pub fn slugify(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}
