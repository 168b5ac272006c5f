//! JSON-like configuration trees and key-path helpers.
//!
//! Configuration is an ordered `serde_json` mapping. Key paths address nested
//! entries with either `.` or `/` as separator, so `tts.module`,
//! `tts/module` and `/tts/module` all name the same leaf.
//!
//! Merge semantics:
//! - Objects: deep-merge by key (recursive)
//! - Arrays: replace (overlay wins entirely)
//! - Scalars: override (overlay wins)
//! - Null: override (null shadows any value, including a nested mapping)

use serde_json::{Map, Value};

use crate::error::{ConfigError, ConfigResult};

/// A configuration mapping; insertion order is preserved.
pub type ConfigMap = Map<String, Value>;

/// Splits a key path on `.` and `/`, dropping empty segments.
pub fn split_key_path(key: &str) -> Vec<&str> {
    key.split(['.', '/']).filter(|s| !s.is_empty()).collect()
}

/// Deep merge two values, `overlay` taking precedence.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            merge_into(&mut base_map, overlay_map);
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Deep merge `overlay` into `base` in place.
pub fn merge_into(base: &mut ConfigMap, overlay: ConfigMap) {
    for (key, overlay_value) in overlay {
        let merged = match base.remove(&key) {
            Some(base_value) => deep_merge(base_value, overlay_value),
            None => overlay_value,
        };
        base.insert(key, merged);
    }
}

/// Looks up a key path.
///
/// `None` means the path is absent; `Some(Value::Null)` means it is present
/// and explicitly null.
pub fn get_path<'a>(map: &'a ConfigMap, key: &str) -> Option<&'a Value> {
    let segments = split_key_path(key);
    let (last, parents) = segments.split_last()?;

    let mut current = map;
    for segment in parents {
        current = current.get(*segment)?.as_object()?;
    }
    current.get(*last)
}

/// Writes `value` at a key path, creating intermediate mappings.
///
/// An intermediate entry that is not a mapping is replaced by one.
pub fn set_path(map: &mut ConfigMap, key: &str, value: Value) -> ConfigResult<()> {
    let segments = split_key_path(key);
    let Some((last, parents)) = segments.split_last() else {
        return Err(ConfigError::InvalidKeyPath(key.to_string()));
    };

    let mut current = map;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(ConfigMap::new()));
        if !entry.is_object() {
            *entry = Value::Object(ConfigMap::new());
        }
        current = entry
            .as_object_mut()
            .ok_or_else(|| ConfigError::InvalidKeyPath(key.to_string()))?;
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// Builds a single-path tree, e.g. `tts.module = "b"` becomes
/// `{"tts": {"module": "b"}}`.
pub fn path_to_tree(key: &str, value: Value) -> ConfigResult<ConfigMap> {
    let mut tree = ConfigMap::new();
    set_path(&mut tree, key, value)?;
    Ok(tree)
}

/// Removes the leaf at a key path, returning it if it existed.
///
/// Missing intermediates are not an error.
pub fn delete_path(map: &mut ConfigMap, key: &str) -> Option<Value> {
    let segments = split_key_path(key);
    let (last, parents) = segments.split_last()?;

    let mut current = map;
    for segment in parents {
        current = current.get_mut(*segment)?.as_object_mut()?;
    }
    current.remove(*last)
}

/// Nesting depth of a value; scalars and empty mappings count as 1.
pub fn depth(value: &Value) -> usize {
    match value {
        Value::Object(map) if !map.is_empty() => {
            1 + map.values().map(depth).max().unwrap_or(0)
        }
        _ => 1,
    }
}
