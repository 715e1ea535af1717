//! Restricted dot-path access to session state trees.
//!
//! Paths are bare dot-notation: one or more identifier segments joined by
//! single dots (e.g. `application.quote.premium`). There is no `$` sentinel.
//! Segments are limited to `[A-Za-z_][A-Za-z0-9_]*`, which structurally
//! excludes array/wildcard syntax and parent traversal. The segments
//! `__proto__`, `constructor`, and `prototype` are rejected unconditionally,
//! regardless of surrounding segments.
//!
//! `set` and `delete` never mutate the caller's tree: they take `&Value` and
//! return a new tree, rebuilding only the nodes along the path.

use serde_json::{Map, Value};

use crate::error::CoreError;

/// Segments that are rejected in every position.
const RESERVED_SEGMENTS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Parse and validate a path into its segments.
///
/// Fails with [`CoreError::InvalidPath`] on an empty path, an empty segment
/// (leading/trailing/double dots), a segment containing characters outside
/// the identifier set, or a reserved segment.
pub fn parse(path: &str) -> Result<Vec<&str>, CoreError> {
    if path.is_empty() {
        return Err(CoreError::InvalidPath(path.to_string()));
    }

    let segments: Vec<&str> = path.split('.').collect();
    for segment in &segments {
        if !is_valid_segment(segment) {
            return Err(CoreError::InvalidPath(path.to_string()));
        }
    }
    Ok(segments)
}

fn is_valid_segment(segment: &str) -> bool {
    if segment.is_empty() || RESERVED_SEGMENTS.contains(&segment) {
        return false;
    }
    let mut chars = segment.chars();
    let first = chars.next().expect("segment is non-empty");
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Read the value at `path`, or `None` if any node along the way is absent.
pub fn get<'a>(root: &'a Value, path: &str) -> Result<Option<&'a Value>, CoreError> {
    let segments = parse(path)?;
    let mut node = root;
    for segment in segments {
        match node.get(segment) {
            Some(child) => node = child,
            None => return Ok(None),
        }
    }
    Ok(Some(node))
}

/// Whether a value exists at `path`.
pub fn has(root: &Value, path: &str) -> Result<bool, CoreError> {
    Ok(get(root, path)?.is_some())
}

/// Return a new tree with `value` written at `path`.
///
/// Intermediate nodes that are missing or not objects are replaced by empty
/// objects. The input tree is left untouched.
pub fn set(root: &Value, path: &str, value: Value) -> Result<Value, CoreError> {
    let segments = parse(path)?;
    Ok(set_at(root, &segments, value))
}

fn set_at(node: &Value, segments: &[&str], value: Value) -> Value {
    let Some((head, rest)) = segments.split_first() else {
        return value;
    };

    let mut map = match node {
        Value::Object(m) => m.clone(),
        _ => Map::new(),
    };
    let child = map.get(*head).cloned().unwrap_or(Value::Null);
    map.insert((*head).to_string(), set_at(&child, rest, value));
    Value::Object(map)
}

/// Return a new tree with the node at `path` removed.
///
/// Deleting a path that does not exist returns the tree unchanged.
pub fn delete(root: &Value, path: &str) -> Result<Value, CoreError> {
    let segments = parse(path)?;
    Ok(delete_at(root, &segments))
}

fn delete_at(node: &Value, segments: &[&str]) -> Value {
    let Value::Object(map) = node else {
        return node.clone();
    };
    let Some((head, rest)) = segments.split_first() else {
        return node.clone();
    };

    let mut map = map.clone();
    if rest.is_empty() {
        map.remove(*head);
    } else if let Some(child) = map.get(*head) {
        let updated = delete_at(child, rest);
        map.insert((*head).to_string(), updated);
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    // -- parse --

    #[test]
    fn parse_accepts_plain_paths() {
        assert_eq!(parse("application").unwrap(), vec!["application"]);
        assert_eq!(
            parse("application.quote.premium").unwrap(),
            vec!["application", "quote", "premium"]
        );
        assert_eq!(parse("_private.x9").unwrap(), vec!["_private", "x9"]);
    }

    #[test]
    fn parse_rejects_empty_and_dotted_edges() {
        for bad in ["", ".", ".a", "a.", "a..b", "..", "a...b"] {
            assert_matches!(parse(bad), Err(CoreError::InvalidPath(_)), "path '{bad}'");
        }
    }

    #[test]
    fn parse_rejects_wildcard_and_index_syntax() {
        for bad in ["a[0]", "a.*", "a.(b)", "items[*].x", "a.b]", "*"] {
            assert_matches!(parse(bad), Err(CoreError::InvalidPath(_)), "path '{bad}'");
        }
    }

    #[test]
    fn parse_rejects_reserved_segments_everywhere() {
        for reserved in ["__proto__", "constructor", "prototype"] {
            for pattern in [
                reserved.to_string(),
                format!("{reserved}.x"),
                format!("a.{reserved}"),
                format!("a.{reserved}.b"),
            ] {
                assert_matches!(
                    parse(&pattern),
                    Err(CoreError::InvalidPath(_)),
                    "path '{pattern}'"
                );
            }
        }
    }

    #[test]
    fn parse_rejects_non_identifier_characters() {
        for bad in ["a b", "a.b-c", "1a.b", "a.$x", "a.b/c"] {
            assert_matches!(parse(bad), Err(CoreError::InvalidPath(_)), "path '{bad}'");
        }
    }

    // -- get / has --

    #[test]
    fn get_reads_nested_values() {
        let tree = json!({"application": {"quote": {"premium": 99.5}}});
        assert_eq!(
            get(&tree, "application.quote.premium").unwrap(),
            Some(&json!(99.5))
        );
        assert_eq!(get(&tree, "application.quote").unwrap(), Some(&json!({"premium": 99.5})));
    }

    #[test]
    fn get_returns_none_for_missing() {
        let tree = json!({"application": {}});
        assert_eq!(get(&tree, "application.missing").unwrap(), None);
        assert_eq!(get(&tree, "context.user").unwrap(), None);
    }

    #[test]
    fn has_mirrors_get() {
        let tree = json!({"a": {"b": null}});
        assert!(has(&tree, "a.b").unwrap());
        assert!(!has(&tree, "a.c").unwrap());
    }

    // -- set --

    #[test]
    fn set_then_get_roundtrips() {
        let tree = json!({});
        let updated = set(&tree, "application.traveler.age", json!(34)).unwrap();
        assert_eq!(get(&updated, "application.traveler.age").unwrap(), Some(&json!(34)));
    }

    #[test]
    fn set_does_not_mutate_input() {
        let tree = json!({"application": {"kept": true}});
        let before = tree.clone();
        let updated = set(&tree, "application.added", json!(1)).unwrap();
        assert_eq!(tree, before);
        assert_eq!(get(&updated, "application.kept").unwrap(), Some(&json!(true)));
        assert_eq!(get(&updated, "application.added").unwrap(), Some(&json!(1)));
    }

    #[test]
    fn set_overwrites_non_object_intermediates() {
        let tree = json!({"a": "scalar"});
        let updated = set(&tree, "a.b.c", json!(7)).unwrap();
        assert_eq!(get(&updated, "a.b.c").unwrap(), Some(&json!(7)));
        // Original untouched.
        assert_eq!(tree, json!({"a": "scalar"}));
    }

    #[test]
    fn set_preserves_sibling_branches() {
        let tree = json!({"a": {"left": 1, "right": {"deep": 2}}});
        let updated = set(&tree, "a.right.deep", json!(3)).unwrap();
        assert_eq!(get(&updated, "a.left").unwrap(), Some(&json!(1)));
        assert_eq!(get(&updated, "a.right.deep").unwrap(), Some(&json!(3)));
    }

    #[test]
    fn set_rejects_invalid_paths() {
        let tree = json!({});
        assert_matches!(
            set(&tree, "a.__proto__.b", json!(1)),
            Err(CoreError::InvalidPath(_))
        );
    }

    // -- delete --

    #[test]
    fn delete_removes_leaf() {
        let tree = json!({"a": {"b": 1, "c": 2}});
        let updated = delete(&tree, "a.b").unwrap();
        assert_eq!(updated, json!({"a": {"c": 2}}));
        assert_eq!(tree, json!({"a": {"b": 1, "c": 2}}));
    }

    #[test]
    fn delete_missing_path_is_noop() {
        let tree = json!({"a": {"b": 1}});
        let updated = delete(&tree, "a.zzz").unwrap();
        assert_eq!(updated, tree);
        let updated = delete(&tree, "x.y").unwrap();
        assert_eq!(updated, tree);
    }
}
