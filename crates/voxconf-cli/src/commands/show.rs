//! Show command implementation

use anyhow::Result;
use serde_json::Value;
use voxconf_core::ConfigMap;
use voxconf_runtime::ConfigurationContext;
use voxconf_runtime::settings::ResolverSettings;

use crate::table::Table;

/// Pseudo-section holding the top-level scalar values.
pub const BASE_SECTION: &str = "base";

/// Which configuration to display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Joined,
    User,
    System,
    Remote,
}

impl View {
    pub fn from_flags(user: bool, system: bool, remote: bool) -> Self {
        if system {
            Self::System
        } else if user {
            Self::User
        } else if remote {
            Self::Remote
        } else {
            Self::Joined
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Joined => "Joined",
            Self::User => "User",
            Self::System => "System",
            Self::Remote => "Remote",
        }
    }

    fn contents(self, context: &ConfigurationContext) -> ConfigMap {
        let layers = context.layers();
        match self {
            Self::Joined => context.snapshot(),
            Self::User => layers
                .user_layer()
                .map(|layer| layer.snapshot())
                .unwrap_or_default(),
            Self::System => layers.system().snapshot(),
            Self::Remote => layers.remote().snapshot(),
        }
    }
}

/// Mapping-valued keys, plus [`BASE_SECTION`] when scalars exist.
pub fn sections(map: &ConfigMap) -> Vec<String> {
    let mut sections: Vec<String> = map
        .iter()
        .filter(|(_, v)| v.is_object())
        .map(|(k, _)| k.clone())
        .collect();
    if map.values().any(|v| !v.is_object()) {
        sections.push(BASE_SECTION.to_string());
    }
    sections
}

/// Narrows `map` to one section.
pub fn section_contents(map: &ConfigMap, section: &str) -> Option<ConfigMap> {
    if section == BASE_SECTION {
        return Some(
            map.iter()
                .filter(|(_, v)| !v.is_object())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
    }
    map.get(section).and_then(Value::as_object).cloned()
}

pub fn execute(
    settings: &ResolverSettings,
    view: View,
    section: Option<&str>,
    list_sections: bool,
) -> Result<()> {
    let context = ConfigurationContext::from_settings(settings)?;
    let contents = view.contents(&context);
    let available = sections(&contents);

    if list_sections {
        println!(
            "Available sections ({} config): {}",
            view.name(),
            available.join(" ")
        );
        return Ok(());
    }

    let body = match section {
        None => contents,
        Some(section) => {
            let mut known = sections(&context.snapshot());
            if !known.iter().any(|s| s == BASE_SECTION) {
                known.push(BASE_SECTION.to_string());
            }

            if !known.iter().any(|s| s == section) {
                println!(
                    "The section `{section}` doesn't exist. Please choose from {}",
                    known.join(" ")
                );
                return Ok(());
            }
            match section_contents(&contents, section) {
                Some(body) if available.iter().any(|s| s == section) => body,
                _ => {
                    let found_in: Vec<String> = [View::Joined, View::System, View::User, View::Remote]
                        .into_iter()
                        .filter(|other| *other != view)
                        .filter(|other| other.contents(&context).contains_key(section))
                        .map(|other| format!("`{}`", other.name()))
                        .collect();
                    println!(
                        "The section `{section}` doesn't exist in the {} Configuration. \
                         It is part of the {} Configuration though",
                        view.name(),
                        found_in.join("/")
                    );
                    return Ok(());
                }
            }
        }
    };

    let section_info = section
        .map(|s| format!(", Section: {s}"))
        .unwrap_or_default();
    let mut table = Table::new(format!(
        "Configuration keys (Configuration: {}{section_info})",
        view.name()
    ));
    table.add_map(&body);
    print!("{}", table.render_colored());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> ConfigMap {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_sections_with_base() {
        let config = map(json!({"lang": "en-us", "tts": {"module": "a"}, "stt": {}}));
        assert_eq!(sections(&config), ["tts", "stt", "base"]);
        assert_eq!(sections(&map(json!({"tts": {}}))), ["tts"]);
    }

    #[test]
    fn test_section_contents() {
        let config = map(json!({"lang": "en-us", "tts": {"module": "a"}}));
        assert_eq!(
            Value::Object(section_contents(&config, BASE_SECTION).unwrap()),
            json!({"lang": "en-us"})
        );
        assert_eq!(
            Value::Object(section_contents(&config, "tts").unwrap()),
            json!({"module": "a"})
        );
        assert!(section_contents(&config, "lang").is_none());
    }

    #[test]
    fn test_view_flags() {
        assert_eq!(View::from_flags(false, false, false), View::Joined);
        assert_eq!(View::from_flags(true, false, false), View::User);
        assert_eq!(View::from_flags(false, false, true).name(), "Remote");
    }
}
