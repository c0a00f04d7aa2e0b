// src/util.rs
// Small JSON helpers shared across the engine.

use serde_json::Value;

/// Walk `path` from `state`, yielding the nested slice. An empty path is the
/// root itself.
pub(crate) fn nested<'a>(state: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(state, |slice, key| slice.get(key))
}

/// Mutable counterpart of [`nested`]. Only object fields are traversable.
pub(crate) fn nested_mut<'a>(state: &'a mut Value, path: &[String]) -> Option<&'a mut Value> {
    let mut current = state;
    for key in path {
        current = match current {
            Value::Object(map) => map.get_mut(key)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Kind name used in type diagnostics. JSON `null` stands in for the host
/// framework's `undefined`, so it is reported as such.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "undefined",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
