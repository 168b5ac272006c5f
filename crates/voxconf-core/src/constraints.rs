//! Administrator constraints on user and remote layers.
//!
//! Constraints live under a `system` key in the Distribution, System or
//! Default layer:
//!
//! ```yaml
//! system:
//!   disable_user_config: false
//!   disable_remote_config: true
//!   protected_keys:
//!     remote: ["server.url"]
//!     user: ["skills.blacklisted_skills"]
//! ```
//!
//! The first of those layers (in that order) with a non-empty `system`
//! section provides the whole constraints object; sections are never merged
//! across layers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::layer::{LayerKind, LayeredSource};

/// Key under which administrator layers declare constraints.
pub const SYSTEM_SECTION: &str = "system";

/// Key paths that lower-trust layers may not set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedKeys {
    /// Stripped from the Remote layer.
    pub remote: Vec<String>,
    /// Stripped from every user layer.
    pub user: Vec<String>,
}

/// Rules deciding which optional layers are active and what they may set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    /// Skip every user layer.
    pub disable_user_config: bool,
    /// Skip the Remote layer.
    pub disable_remote_config: bool,
    /// Key paths removed before merging.
    pub protected_keys: ProtectedKeys,
}

impl Constraints {
    /// Reads constraints from a `system` section.
    ///
    /// Values of the wrong type are treated as absent.
    pub fn from_section(section: &Value) -> Self {
        let protected = section.get("protected_keys");
        Self {
            disable_user_config: flag(section.get("disable_user_config")),
            disable_remote_config: flag(section.get("disable_remote_config")),
            protected_keys: ProtectedKeys {
                remote: key_list(protected.and_then(|p| p.get("remote"))),
                user: key_list(protected.and_then(|p| p.get("user"))),
            },
        }
    }

    /// Determines the constraints in effect for a set of layers.
    ///
    /// Side-effect free; called on every merge.
    pub fn resolve<'a>(layers: impl IntoIterator<Item = &'a LayeredSource>) -> Self {
        let layers: Vec<&LayeredSource> = layers.into_iter().collect();

        for kind in [LayerKind::Distribution, LayerKind::System, LayerKind::Default] {
            let section = layers
                .iter()
                .filter(|layer| layer.kind() == kind)
                .find_map(|layer| non_empty_section(layer));
            if let Some(section) = section {
                return Self::from_section(&section);
            }
        }

        Self::default()
    }

    /// Whether a layer of `kind` takes part in the merge.
    pub fn allows(&self, kind: LayerKind) -> bool {
        match kind {
            LayerKind::Remote => !self.disable_remote_config,
            LayerKind::UserXdg { .. } => !self.disable_user_config,
            _ => true,
        }
    }

    /// Protected key paths for a layer of `kind`.
    pub fn protected_for(&self, kind: LayerKind) -> &[String] {
        match kind {
            LayerKind::Remote => &self.protected_keys.remote,
            LayerKind::UserXdg { .. } => &self.protected_keys.user,
            _ => &[],
        }
    }
}

fn non_empty_section(layer: &LayeredSource) -> Option<Value> {
    layer
        .get(SYSTEM_SECTION)
        .filter(|section| section.as_object().is_some_and(|map| !map.is_empty()))
}

fn flag(value: Option<&Value>) -> bool {
    value.and_then(Value::as_bool).unwrap_or(false)
}

fn key_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layer(kind: LayerKind, contents: Value) -> LayeredSource {
        let map = match contents {
            Value::Object(m) => m,
            _ => panic!("fixture must be an object"),
        };
        LayeredSource::builder(kind).read_only(true).seed(map).build()
    }

    #[test]
    fn test_no_constraints() {
        let default = layer(LayerKind::Default, json!({"lang": "en-us"}));
        assert_eq!(Constraints::resolve([&default]), Constraints::default());
    }

    #[test]
    fn test_distribution_wins_whole_section() {
        let default = layer(
            LayerKind::Default,
            json!({"system": {"disable_user_config": true}}),
        );
        let system = layer(
            LayerKind::System,
            json!({"system": {"protected_keys": {"user": ["secret"]}}}),
        );
        let distribution = layer(
            LayerKind::Distribution,
            json!({"system": {"disable_remote_config": true}}),
        );

        let constraints = Constraints::resolve([&default, &system, &distribution]);
        assert!(constraints.disable_remote_config);
        assert!(!constraints.disable_user_config);
        assert!(constraints.protected_keys.user.is_empty());
    }

    #[test]
    fn test_empty_section_falls_through() {
        let distribution = layer(LayerKind::Distribution, json!({"system": {}}));
        let system = layer(
            LayerKind::System,
            json!({"system": {"protected_keys": {"remote": ["server.metrics"]}}}),
        );

        let constraints = Constraints::resolve([&distribution, &system]);
        assert_eq!(constraints.protected_keys.remote, vec!["server.metrics"]);
    }

    #[test]
    fn test_non_administrator_layers_ignored() {
        let user = layer(
            LayerKind::UserXdg { priority: 0 },
            json!({"system": {"disable_user_config": true}}),
        );
        assert!(!Constraints::resolve([&user]).disable_user_config);
    }

    #[test]
    fn test_lenient_section_parsing() {
        let constraints = Constraints::from_section(&json!({
            "disable_user_config": "yes",
            "protected_keys": {"user": ["a", 1, null, "b"], "remote": null},
        }));
        assert!(!constraints.disable_user_config);
        assert_eq!(constraints.protected_keys.user, vec!["a", "b"]);
        assert!(constraints.protected_keys.remote.is_empty());
    }

    #[test]
    fn test_allows_and_protected_for() {
        let constraints = Constraints {
            disable_user_config: true,
            disable_remote_config: false,
            protected_keys: ProtectedKeys {
                remote: vec!["r".into()],
                user: vec!["u".into()],
            },
        };
        assert!(!constraints.allows(LayerKind::UserXdg { priority: 3 }));
        assert!(constraints.allows(LayerKind::Remote));
        assert!(constraints.allows(LayerKind::RuntimePatch));
        assert_eq!(constraints.protected_for(LayerKind::Remote), ["r".to_string()]);
        assert!(constraints.protected_for(LayerKind::System).is_empty());
    }
}
