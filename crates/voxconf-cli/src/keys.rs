//! Key search and value coercion for `get` and `set`.
//!
//! Paths here are `/`-separated segment lists. Dots are kept inside
//! segments, since plugin and skill ids routinely contain them.

use anyhow::{Result, anyhow, bail};
use serde_json::{Map, Number, Value};
use voxconf_core::ConfigMap;

/// A key found by [`walk`].
#[derive(Debug, Clone, PartialEq)]
pub struct KeyMatch {
    pub path: Vec<String>,
    pub value: Value,
}

impl KeyMatch {
    /// The path without a leading slash, as shown in choice tables.
    pub fn joined(&self) -> String {
        self.path.join("/")
    }
}

/// Case-insensitive search of key names containing `query`.
///
/// Without `leaves_only`, every matching key is reported with its value,
/// sections included. With it, only leaves are reported: a matching leaf,
/// or every leaf below a matching section.
pub fn walk(map: &ConfigMap, query: &str, leaves_only: bool) -> Vec<KeyMatch> {
    let mut found = Vec::new();
    walk_into(map, &query.to_lowercase(), leaves_only, &mut Vec::new(), false, &mut found);
    found
}

fn walk_into(
    map: &ConfigMap,
    query: &str,
    leaves_only: bool,
    path: &mut Vec<String>,
    inside_match: bool,
    found: &mut Vec<KeyMatch>,
) {
    for (key, value) in map {
        let matched = key.to_lowercase().contains(query);
        path.push(key.clone());

        if matched && !leaves_only {
            found.push(KeyMatch {
                path: path.clone(),
                value: value.clone(),
            });
        }

        match value {
            Value::Object(child) => {
                let inside = leaves_only && (inside_match || matched);
                walk_into(child, query, leaves_only, path, inside, found);
            }
            _ if leaves_only && (inside_match || matched) => found.push(KeyMatch {
                path: path.clone(),
                value: value.clone(),
            }),
            _ => {}
        }

        path.pop();
    }
}

/// Splits a `/`-separated path into segments.
pub fn segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Looks up a `/`-rooted path.
pub fn strict_get<'a>(map: &'a ConfigMap, path: &str) -> Result<Option<&'a Value>> {
    let Some(rest) = path.strip_prefix('/') else {
        bail!("A strict key search has to start with `/` (root)");
    };

    let parts = segments(rest);
    let Some((last, parents)) = parts.split_last() else {
        return Ok(None);
    };
    let mut current = map;
    for part in parents {
        match current.get(part).and_then(Value::as_object) {
            Some(child) => current = child,
            None => return Ok(None),
        }
    }
    Ok(current.get(last))
}

/// A nested mapping holding `value` at `path`.
pub fn tree(path: &[String], value: Value) -> ConfigMap {
    let mut node = value;
    for part in path.iter().rev() {
        let mut parent = Map::new();
        parent.insert(part.clone(), node);
        node = Value::Object(parent);
    }
    match node {
        Value::Object(map) => map,
        _ => ConfigMap::new(),
    }
}

/// Name of the type a prompted value is coerced to.
///
/// Lists take single items, so they ask for a string.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::String(_) | Value::Array(_) | Value::Null => "str",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::Object(_) => "dict",
    }
}

/// Removes quoting characters typed at the prompt.
pub fn strip_quotes(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | '`'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Converts `input` to the type of `current`.
///
/// Lists append `input` to `user_list`, the list currently stored in the
/// user file, or start a new one.
pub fn coerce(current: &Value, input: &str, user_list: Option<&Value>) -> Result<Value> {
    let cast_error = || anyhow!("The value passed can't be cast into {}", type_name(current));

    match current {
        Value::String(_) | Value::Null => Ok(Value::String(input.to_string())),
        Value::Bool(_) => match input {
            "true" | "True" | "1" | "on" => Ok(Value::Bool(true)),
            "false" | "False" | "0" | "off" => Ok(Value::Bool(false)),
            _ => Err(cast_error()),
        },
        Value::Array(_) => {
            let mut items = match user_list {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            items.push(Value::String(input.to_string()));
            Ok(Value::Array(items))
        }
        Value::Number(n) if n.is_f64() => input
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(cast_error),
        Value::Number(_) => input
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| cast_error()),
        Value::Object(_) => bail!("A whole section can't be set, pick one of its keys"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> ConfigMap {
        match json!({
            "lang": "en-us",
            "tts": {"module": "a", "ovos-tts-plugin-server": {"host": "x"}},
            "skills": {"blacklisted_skills": ["one"], "installer": {"lang_check": true}},
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_walk_reports_sections_and_leaves() {
        let found = walk(&config(), "LANG", false);
        let paths: Vec<String> = found.iter().map(KeyMatch::joined).collect();
        assert_eq!(paths, ["lang", "skills/installer/lang_check"]);
    }

    #[test]
    fn test_walk_leaves_below_matching_section() {
        let found = walk(&config(), "tts", true);
        let paths: Vec<String> = found.iter().map(KeyMatch::joined).collect();
        assert_eq!(paths, ["tts/module", "tts/ovos-tts-plugin-server/host"]);
        assert_eq!(found[0].value, json!("a"));
    }

    #[test]
    fn test_walk_section_match_without_leaves_only() {
        let found = walk(&config(), "tts", false);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].joined(), "tts");
        assert_eq!(found[1].joined(), "tts/ovos-tts-plugin-server");
    }

    #[test]
    fn test_strict_get() {
        let map = config();
        assert_eq!(strict_get(&map, "/tts/module").unwrap(), Some(&json!("a")));
        assert_eq!(strict_get(&map, "/tts/missing").unwrap(), None);
        assert_eq!(strict_get(&map, "/lang/deeper").unwrap(), None);
        assert!(strict_get(&map, "tts/module").is_err());
    }

    #[test]
    fn test_tree_keeps_dots_in_segments() {
        let path = segments("skills/skill-date.openvoiceos/enabled");
        let built = tree(&path, json!(true));
        assert_eq!(
            Value::Object(built),
            json!({"skills": {"skill-date.openvoiceos": {"enabled": true}}})
        );
    }

    #[test]
    fn test_coerce_by_current_type() {
        assert_eq!(coerce(&json!("x"), "y", None).unwrap(), json!("y"));
        assert_eq!(coerce(&json!(false), "on", None).unwrap(), json!(true));
        assert_eq!(coerce(&json!(true), "0", None).unwrap(), json!(false));
        assert!(coerce(&json!(true), "maybe", None).is_err());
        assert_eq!(coerce(&json!(16000), "8000", None).unwrap(), json!(8000));
        assert!(coerce(&json!(16000), "8k", None).is_err());
        assert_eq!(coerce(&json!(0.5), "0.25", None).unwrap(), json!(0.25));
        assert!(coerce(&json!({"a": 1}), "x", None).is_err());
    }

    #[test]
    fn test_coerce_list_appends_to_user_list() {
        let current = json!(["one"]);
        assert_eq!(coerce(&current, "two", None).unwrap(), json!(["two"]));
        let user = json!(["mine"]);
        assert_eq!(
            coerce(&current, "two", Some(&user)).unwrap(),
            json!(["mine", "two"])
        );
    }

    #[test]
    fn test_prompt_helpers() {
        assert_eq!(strip_quotes(" \"my`skill'\" "), "myskill");
        assert_eq!(type_name(&json!(["a"])), "str");
        assert_eq!(type_name(&json!(1.5)), "float");
        assert_eq!(type_name(&json!(2)), "int");
    }
}
