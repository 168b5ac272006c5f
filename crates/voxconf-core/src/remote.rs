//! Remote backend port and settings translation.
//!
//! Fetching settings over the network is not part of this crate; a
//! [`RemoteBackend`] implementation supplies them. The Remote layer caches
//! the translated result on disk so it survives restarts and offline
//! periods.

use serde_json::{Value, json};
use thiserror::Error;

use crate::value::ConfigMap;

/// Backend keys that never reach the configuration.
const IGNORED_SETTINGS: &[&str] = &["uuid", "@type", "active", "user", "device"];

/// Errors reported by a [`RemoteBackend`].
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// The backend could not be reached.
    #[error("remote backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with an error.
    #[error("remote backend error: {0}")]
    Backend(String),
}

/// Source of device settings managed by a remote service.
pub trait RemoteBackend: Send + Sync {
    /// Whether this device is paired with the backend.
    fn is_paired(&self) -> bool;

    /// Whether the backend has been disabled for this device.
    fn is_disabled(&self) -> bool;

    /// Raw settings as returned by the backend.
    fn fetch_settings(&self) -> Result<ConfigMap, RemoteError>;

    /// Device location as returned by the backend.
    fn fetch_location(&self) -> Result<Value, RemoteError>;
}

/// Settings applied when the backend is disabled: every feature that needs
/// the backend is switched off.
pub fn disabled_backend_settings() -> ConfigMap {
    let value = json!({
        "server": {
            "metrics": false,
            "sync_skill_settings": false
        },
        "skills": {"upload_skill_manifest": false},
        "opt_in": false
    });
    match value {
        Value::Object(map) => map,
        _ => ConfigMap::new(),
    }
}

/// Translates backend settings into configuration naming.
///
/// `CamelCase` names become `snake_case` with any `Setting`/`Settings` text
/// removed, and lists of `@type` objects become module mappings.
pub fn translate_remote(settings: &ConfigMap) -> ConfigMap {
    let mut config = ConfigMap::new();
    translate_into(&mut config, settings);
    config
}

fn translate_into(config: &mut ConfigMap, settings: &ConfigMap) {
    for (key, value) in settings {
        if IGNORED_SETTINGS.contains(&key.as_str()) {
            continue;
        }
        let key = normalize_key(key);

        match value {
            Value::Object(inner) => translate_into(child_map(config, key), inner),
            Value::Array(items) if is_remote_list(items) => {
                translate_list(child_map(config, key), items)
            }
            other => {
                config.insert(key, other.clone());
            }
        }
    }
}

fn translate_list(config: &mut ConfigMap, items: &[Value]) {
    for item in items {
        let Some(entry) = item.as_object() else {
            continue;
        };
        let Some(module) = entry.get("@type").and_then(Value::as_str) else {
            continue;
        };
        if entry.get("active").is_some_and(is_truthy) {
            config.insert("module".to_string(), Value::String(module.to_string()));
        }
        translate_into(child_map(config, module.to_string()), entry);
    }
}

/// Returns the mapping stored under `key`, replacing a non-mapping value.
fn child_map(config: &mut ConfigMap, key: String) -> &mut ConfigMap {
    let entry = config
        .entry(key)
        .or_insert_with(|| Value::Object(ConfigMap::new()));
    if !entry.is_object() {
        *entry = Value::Object(ConfigMap::new());
    }
    match entry {
        Value::Object(map) => map,
        _ => unreachable!("entry is an object"),
    }
}

fn is_remote_list(items: &[Value]) -> bool {
    !items.is_empty()
        && items
            .iter()
            .all(|item| item.as_object().is_some_and(|m| m.contains_key("@type")))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// `ttsSettings` -> `tts`, `dateFormat` -> `date_format`,
/// `TTSModule` -> `tts_module`.
fn normalize_key(key: &str) -> String {
    let stripped = key.replace("Settings", "").replace("Setting", "");
    camel_case_split(&stripped)
        .join("_")
        .replace(' ', "_")
        .to_lowercase()
}

fn camel_case_split(identifier: &str) -> Vec<String> {
    let chars: Vec<char> = identifier.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let lower_to_upper = prev.is_lowercase() && c.is_uppercase();
            let acronym_end = prev.is_uppercase() && c.is_uppercase() && next_is_lower;
            if (lower_to_upper || acronym_end) && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(value: Value) -> ConfigMap {
        match value {
            Value::Object(m) => m,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("dateFormat"), "date_format");
        assert_eq!(normalize_key("ttsSettings"), "tts");
        assert_eq!(normalize_key("TTSModule"), "tts_module");
        assert_eq!(normalize_key("lang"), "lang");
        assert_eq!(normalize_key("optIn"), "opt_in");
    }

    #[test]
    fn test_ignored_settings_dropped() {
        let translated = translate_remote(&obj(json!({
            "uuid": "1234",
            "@type": "device",
            "systemUnit": "metric",
        })));
        assert_eq!(Value::Object(translated), json!({"system_unit": "metric"}));
    }

    #[test]
    fn test_nested_mapping_translated() {
        let translated = translate_remote(&obj(json!({
            "listenerSetting": {"wakeWord": "hey_mycroft", "uuid": "x"}
        })));
        assert_eq!(
            Value::Object(translated),
            json!({"listener": {"wake_word": "hey_mycroft"}})
        );
    }

    #[test]
    fn test_typed_list_becomes_module_mapping() {
        let translated = translate_remote(&obj(json!({
            "ttsSettings": [
                {"@type": "mimic", "active": false, "voice": "ap"},
                {"@type": "google", "active": true, "lang": "en"}
            ]
        })));
        assert_eq!(
            Value::Object(translated),
            json!({
                "tts": {
                    "mimic": {"voice": "ap"},
                    "module": "google",
                    "google": {"lang": "en"}
                }
            })
        );
    }

    #[test]
    fn test_plain_list_kept() {
        let translated = translate_remote(&obj(json!({"blacklistedSkills": ["a", "b"]})));
        assert_eq!(translated["blacklisted_skills"], json!(["a", "b"]));
    }

    #[test]
    fn test_disabled_backend_settings() {
        let settings = disabled_backend_settings();
        assert_eq!(settings["server"]["metrics"], false);
        assert_eq!(settings["opt_in"], false);
    }
}
