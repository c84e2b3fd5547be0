//! Dot-separated path access into snapshot state.
//!
//! Materialization writes action outputs at paths like `board.issues` or
//! `entities.customers`; intermediate objects are created on demand and a
//! non-object intermediate is replaced, since the path's shape is declared by
//! the spec, not discovered from data.

use serde_json::{Map as JsonMap, Value};

/// Write `value` at `path`, creating intermediate objects as needed.
pub fn write_at_path(root: &mut Value, path: &str, value: Value) {
    if !root.is_object() {
        *root = Value::Object(JsonMap::new());
    }
    let mut current = root;
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return;
    }
    for segment in &segments[..segments.len() - 1] {
        let object = current.as_object_mut().expect("current is always an object here");
        let entry = object.entry((*segment).to_string()).or_insert_with(|| Value::Object(JsonMap::new()));
        if !entry.is_object() {
            *entry = Value::Object(JsonMap::new());
        }
        current = entry;
    }
    let object = current.as_object_mut().expect("current is always an object here");
    object.insert(segments[segments.len() - 1].to_string(), value);
}

/// Read the value at `path`, if present.
pub fn read_at_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_create_intermediate_objects() {
        let mut root = Value::Object(JsonMap::new());
        write_at_path(&mut root, "board.issues", json!([1, 2]));
        assert_eq!(root, json!({"board": {"issues": [1, 2]}}));
    }

    #[test]
    fn sibling_paths_coexist() {
        let mut root = Value::Object(JsonMap::new());
        write_at_path(&mut root, "board.issues", json!([1]));
        write_at_path(&mut root, "board.labels", json!(["bug"]));
        assert_eq!(root, json!({"board": {"issues": [1], "labels": ["bug"]}}));
    }

    #[test]
    fn overwrite_replaces_only_the_leaf() {
        let mut root = json!({"board": {"issues": [1], "labels": ["bug"]}});
        write_at_path(&mut root, "board.issues", json!([2, 3]));
        assert_eq!(root, json!({"board": {"issues": [2, 3], "labels": ["bug"]}}));
    }

    #[test]
    fn non_object_intermediate_is_replaced() {
        let mut root = json!({"board": 42});
        write_at_path(&mut root, "board.issues", json!([1]));
        assert_eq!(root, json!({"board": {"issues": [1]}}));
    }

    #[test]
    fn read_resolves_nested_paths() {
        let root = json!({"board": {"issues": [1, 2]}});
        assert_eq!(read_at_path(&root, "board.issues"), Some(&json!([1, 2])));
        assert_eq!(read_at_path(&root, "board.missing"), None);
        assert_eq!(read_at_path(&root, "board.issues.deeper"), None);
    }
}
