//! Path-addressable operations over JSON state trees.
//!
//! Paths use dot notation with optional bracketed indices, e.g.
//! `"orders[0].items.count"`. Numeric segments address array elements;
//! when a missing container is created on the way to a numeric segment it
//! is created as an array, otherwise as an object.

use serde_json::{Map, Value};

/// Splits a path into its segments.
///
/// `"a.b[0].c"` yields `["a", "b", "0", "c"]`. Empty segments are dropped.
pub fn parse_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();

    for c in path.chars() {
        match c {
            '.' | '[' | ']' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn as_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

fn empty_container_for(next: &str) -> Value {
    if as_index(next).is_some() {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

/// Returns the value at `path`, or `None` if any segment is missing.
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in parse_path(path) {
        current = match current {
            Value::Object(map) => map.get(&segment)?,
            Value::Array(items) => items.get(as_index(&segment)?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Writes `value` at `path`, creating intermediate containers as needed.
///
/// Intermediate scalars are replaced by containers. Writing past the end
/// of an array pads it with `null`. An empty path replaces the root.
pub fn set(root: &mut Value, path: &str, value: Value) {
    let segments = parse_path(path);
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };

    let mut current = root;
    for (i, segment) in parents.iter().enumerate() {
        let next = segments[i + 1].as_str();
        current = child_mut(current, segment, next);
    }
    assign(current, last, value);
}

fn child_mut<'a>(parent: &'a mut Value, segment: &str, next: &str) -> &'a mut Value {
    ensure_container(parent, segment);

    let slot = match parent {
        Value::Array(items) => {
            let index = as_index(segment).unwrap_or(items.len());
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            &mut items[index]
        }
        Value::Object(map) => map.entry(segment.to_string()).or_insert(Value::Null),
        other => other,
    };

    if !slot.is_object() && !slot.is_array() {
        *slot = empty_container_for(next);
    }
    slot
}

fn ensure_container(value: &mut Value, segment: &str) {
    let fits = match value {
        Value::Object(_) => true,
        Value::Array(_) => as_index(segment).is_some(),
        _ => false,
    };
    if !fits {
        *value = Value::Object(Map::new());
    }
}

fn assign(parent: &mut Value, segment: &str, value: Value) {
    ensure_container(parent, segment);
    match parent {
        Value::Array(items) => {
            let index = as_index(segment).unwrap_or(items.len());
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            items[index] = value;
        }
        Value::Object(map) => {
            map.insert(segment.to_string(), value);
        }
        _ => {}
    }
}

/// Deep-merges `source` into `target`.
///
/// Objects merge key by key and arrays merge index by index; any other
/// source value overwrites the target value.
pub fn merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(dst), Value::Object(src)) => {
            for (key, value) in src {
                match dst.get_mut(&key) {
                    Some(existing) if is_container(existing) && is_container(&value) => {
                        merge(existing, value)
                    }
                    _ => {
                        dst.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(dst), Value::Array(src)) => {
            for (index, value) in src.into_iter().enumerate() {
                match dst.get_mut(index) {
                    Some(existing) if is_container(existing) && is_container(&value) => {
                        merge(existing, value)
                    }
                    Some(existing) => *existing = value,
                    None => dst.push(value),
                }
            }
        }
        (target, source) => *target = source,
    }
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

/// Partial deep comparison: true if `value` contains everything in `pattern`.
///
/// Object patterns match when every key matches; array patterns match when
/// every pattern element matches some element of the value; scalars compare
/// by equality.
pub fn is_match(value: &Value, pattern: &Value) -> bool {
    match (value, pattern) {
        (Value::Object(actual), Value::Object(expected)) => expected.iter().all(|(key, part)| {
            actual
                .get(key)
                .is_some_and(|candidate| is_match(candidate, part))
        }),
        (Value::Array(actual), Value::Array(expected)) => {
            actual.len() >= expected.len()
                && expected
                    .iter()
                    .all(|part| actual.iter().any(|candidate| is_match(candidate, part)))
        }
        (Value::Object(_), _) | (Value::Array(_), _) => false,
        (actual, expected) => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_path_handles_dots_and_brackets() {
        assert_eq!(parse_path("a.b[0].c"), vec!["a", "b", "0", "c"]);
        assert_eq!(parse_path("path1"), vec!["path1"]);
        assert!(parse_path("").is_empty());
    }

    #[test]
    fn test_get_reads_nested_values() {
        let state = json!({"a": {"b": [{"c": 1}]}});
        assert_eq!(get(&state, "a.b[0].c"), Some(&json!(1)));
        assert_eq!(get(&state, "a.b.0.c"), Some(&json!(1)));
        assert_eq!(get(&state, "a.x"), None);
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut state = json!({});
        set(&mut state, "path1.path2", json!({"hello": "world"}));
        assert_eq!(state, json!({"path1": {"path2": {"hello": "world"}}}));
    }

    #[test]
    fn test_set_creates_arrays_for_numeric_segments() {
        let mut state = json!({});
        set(&mut state, "list[1]", json!("b"));
        assert_eq!(state, json!({"list": [null, "b"]}));
    }

    #[test]
    fn test_set_replaces_intermediate_scalars() {
        let mut state = json!({"a": 1});
        set(&mut state, "a.b", json!(2));
        assert_eq!(state, json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_merge_is_deep() {
        let mut state = json!({"a": {"b": 1, "c": 2}, "list": [1, {"x": 1}]});
        merge(
            &mut state,
            json!({"a": {"c": 3, "d": 4}, "list": [9, {"y": 2}, 3], "e": null}),
        );
        assert_eq!(
            state,
            json!({"a": {"b": 1, "c": 3, "d": 4}, "list": [9, {"x": 1, "y": 2}, 3], "e": null})
        );
    }

    #[test]
    fn test_is_match_is_partial() {
        let value = json!({"id": 1, "tags": ["a", "b"], "nested": {"x": 1, "y": 2}});
        assert!(is_match(&value, &json!({"id": 1})));
        assert!(is_match(&value, &json!({"nested": {"y": 2}})));
        assert!(is_match(&value, &json!({"tags": ["b"]})));
        assert!(!is_match(&value, &json!({"id": 2})));
        assert!(!is_match(&value, &json!({"missing": true})));
        assert!(!is_match(&json!("scalar"), &json!({"id": 1})));
    }
}
