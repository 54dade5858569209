//! Dot-separated path access into JSON values
//!
//! A path such as `"disk.freePct"` walks object keys one segment at a time.
//! Arrays are addressed by decimal index (`"hosts.0.cpu"`). A path that runs
//! into a missing key or a scalar resolves to `None`; resolution never fails.

use serde_json::{Map, Value};

/// Split a dot-separated path into its segments, dropping empty ones
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

/// Walk `path` into `data`
pub fn resolve_path<'a>(data: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(data, |current, segment| match current {
        Value::Object(map) => map.get(*segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Resolve `path` and coerce the result to a number
///
/// Numbers resolve to themselves, booleans to 1/0 and numeric strings to
/// their parsed value. Null, arrays, objects and other strings are absent.
pub fn resolve_number(data: &Value, path: &str) -> Option<f64> {
    let segments = split_path(path);
    if segments.is_empty() {
        return None;
    }

    match resolve_path(data, &segments)? {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Insert `value` under a dotted key, creating intermediate objects
///
/// The inverse of flattening: `"db.errors"` lands at `{"db": {"errors": ..}}`.
/// If an intermediate segment already holds a non-object the value is dropped.
pub fn nest_dotted(target: &mut Map<String, Value>, key: &str, value: Value) {
    let segments = split_path(key);
    let Some((leaf, parents)) = segments.split_last() else {
        return;
    };

    let mut current = target;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match entry {
            Value::Object(next) => current = next,
            _ => {
                tracing::debug!(key, segment, "Dotted key collides with a scalar, skipping");
                return;
            }
        }
    }

    match current.get_mut(*leaf) {
        // Keep children already nested under this key
        Some(Value::Object(existing)) => {
            if let Value::Object(fields) = value {
                for (k, v) in fields {
                    existing.entry(k).or_insert(v);
                }
            }
        }
        _ => {
            current.insert(leaf.to_string(), value);
        }
    }
}
