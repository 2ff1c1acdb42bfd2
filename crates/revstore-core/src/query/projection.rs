//! Field projection (`pluck`): keep only the requested fields of a record.
//!
//! Requested fields that are missing from the record are left out of the
//! result rather than raising.

use serde_json::{Map, Value};

use super::filter::resolve_path;
use crate::types::Record;

/// Return a copy of `record` restricted to `paths`. An empty `paths` keeps
/// the record whole.
pub fn pluck(record: &Record, paths: &[String]) -> Record {
    if paths.is_empty() {
        return record.clone();
    }

    let mut out = Map::new();
    for path in paths {
        let val = resolve_path(record, path);
        if !val.is_null() || record.contains_key(path.as_str()) {
            set_path(&mut out, path, val.clone());
        }
    }
    out
}

/// Set a value at a dot-separated path, creating intermediate objects.
fn set_path(target: &mut Record, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else {
        return;
    };

    let mut current = target;
    for seg in segments {
        let entry = current
            .entry(seg)
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry {
            Value::Object(map) => map,
            _ => return,
        };
    }
    current.insert(last.to_string(), value);
}
