//! Identifier harvesting over free-form JSON trees
//!
//! Two modes:
//! - **Set collection** ([`collect_field_values`]): every string found under the
//!   named fields, anywhere in the tree, deduplicated and ordered
//! - **Path discovery** ([`find_value_path`]): first path (depth-first, keys in
//!   insertion order, sequence items in index order) to the mapping that holds a
//!   sentinel value
//!
//! [`value_at_path`] and [`sibling_value`] walk a discovered path back through
//! the same tree.

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// One step of a tree path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{}", key),
            PathSegment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// Path from a tree root to a nested mapping
pub type TreePath = Vec<PathSegment>;

/// Collect every string stored under any of `fields`, at any depth
///
/// A field holding a string contributes that string; a field holding a
/// sequence contributes its string elements. Values rejected by `accept` are
/// skipped.
pub fn collect_field_values<F>(tree: &Value, fields: &[&str], accept: F) -> BTreeSet<String>
where
    F: Fn(&str) -> bool,
{
    let mut found = BTreeSet::new();
    collect_into(tree, fields, &accept, &mut found);
    found
}

/// Like [`collect_field_values`] but accumulates into an existing set
pub fn collect_into<F>(tree: &Value, fields: &[&str], accept: &F, found: &mut BTreeSet<String>)
where
    F: Fn(&str) -> bool,
{
    match tree {
        Value::Object(map) => collect_from_map(map, fields, accept, found),
        Value::Array(items) => {
            for item in items {
                collect_into(item, fields, accept, found);
            }
        }
        _ => {}
    }
}

/// [`collect_into`] starting from a mapping (e.g. a whole record)
pub fn collect_from_map<F>(
    map: &Map<String, Value>,
    fields: &[&str],
    accept: &F,
    found: &mut BTreeSet<String>,
) where
    F: Fn(&str) -> bool,
{
    for (key, value) in map {
        if fields.contains(&key.as_str()) {
            match value {
                Value::String(s) if accept(s.as_str()) => {
                    found.insert(s.clone());
                }
                Value::Array(items) => {
                    for s in items.iter().filter_map(Value::as_str) {
                        if accept(s) {
                            found.insert(s.to_string());
                        }
                    }
                }
                _ => {}
            }
        }
        collect_into(value, fields, accept, found);
    }
}

/// First path to a mapping holding a string value equal to `sentinel`
///
/// Returns `None` when the sentinel occurs nowhere. `Some(vec![])` means the
/// root mapping itself holds it.
pub fn find_value_path(tree: &Value, sentinel: &str) -> Option<TreePath> {
    let mut path = Vec::new();
    if search(tree, sentinel, &mut path) {
        Some(path)
    } else {
        None
    }
}

/// True when `sentinel` is held anywhere in the tree
pub fn contains_value(tree: &Value, sentinel: &str) -> bool {
    find_value_path(tree, sentinel).is_some()
}

/// [`find_value_path`] starting from a mapping (e.g. a whole record)
pub fn find_path_in_map(map: &Map<String, Value>, sentinel: &str) -> Option<TreePath> {
    let mut path = Vec::new();
    if search_map(map, sentinel, &mut path) {
        Some(path)
    } else {
        None
    }
}

fn search(node: &Value, sentinel: &str, path: &mut TreePath) -> bool {
    match node {
        Value::Object(map) => search_map(map, sentinel, path),
        Value::Array(items) => search_items(items, sentinel, path),
        _ => false,
    }
}

fn search_map(map: &Map<String, Value>, sentinel: &str, path: &mut TreePath) -> bool {
    for (key, value) in map {
        match value {
            Value::Object(_) => {
                path.push(PathSegment::Key(key.clone()));
                if search(value, sentinel, path) {
                    return true;
                }
                path.pop();
            }
            Value::Array(items) => {
                path.push(PathSegment::Key(key.clone()));
                if search_items(items, sentinel, path) {
                    return true;
                }
                path.pop();
            }
            Value::String(s) if s == sentinel => return true,
            _ => {}
        }
    }
    false
}

fn search_items(items: &[Value], sentinel: &str, path: &mut TreePath) -> bool {
    for (i, item) in items.iter().enumerate() {
        path.push(PathSegment::Index(i));
        if search(item, sentinel, path) {
            return true;
        }
        path.pop();
    }
    false
}

/// Node reached by walking `path` from `tree`
pub fn value_at_path<'a>(tree: &'a Value, path: &[PathSegment]) -> Option<&'a Value> {
    path.iter().try_fold(tree, |node, segment| match segment {
        PathSegment::Key(key) => node.get(key.as_str()),
        PathSegment::Index(i) => node.get(*i),
    })
}

/// Field below the mapping at `path`, e.g. `["simpleSettingValue", "value"]`
pub fn sibling_value<'a>(tree: &'a Value, path: &[PathSegment], field: &[&str]) -> Option<&'a Value> {
    let holder = value_at_path(tree, path)?;
    field.iter().try_fold(holder, |node, key| node.get(*key))
}

/// [`sibling_value`] starting from a mapping
pub fn sibling_in_map<'a>(
    map: &'a Map<String, Value>,
    path: &[PathSegment],
    field: &[&str],
) -> Option<&'a Value> {
    match path.split_first() {
        Some((PathSegment::Key(key), rest)) => sibling_value(map.get(key.as_str())?, rest, field),
        Some((PathSegment::Index(_), _)) => None,
        None => {
            let (first, rest) = field.split_first()?;
            rest.iter().try_fold(map.get(*first)?, |node, key| node.get(*key))
        }
    }
}
