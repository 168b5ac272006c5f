//! Folding an ordered set of layers into one mapping.
//!
//! [`MergeEngine::compute`] is a pure function of the layer contents and the
//! constraints: it reads a snapshot of each layer, never mutates a layer, and
//! produces the same mapping for the same inputs.
//!
//! Steps:
//! 1. Order layers by precedence (Default, Distribution, System, Remote,
//!    user entries by priority, RuntimePatch last).
//! 2. Drop Remote and user layers disabled by the constraints.
//! 3. Strip protected key paths from working copies of Remote and user
//!    layers.
//! 4. Deep-merge the survivors left to right into an empty mapping.

use tracing::trace;

use crate::constraints::Constraints;
use crate::layer::LayeredSource;
use crate::value::{self, ConfigMap};

/// Computes merged views.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeEngine;

impl MergeEngine {
    /// Merges `layers` under `constraints`.
    ///
    /// Layers may be given in any order; equal precedence slots keep their
    /// relative order.
    pub fn compute(layers: &[&LayeredSource], constraints: &Constraints) -> ConfigMap {
        let mut ordered: Vec<&LayeredSource> = layers.to_vec();
        ordered.sort_by_key(|layer| layer.kind());

        let mut merged = ConfigMap::new();
        for layer in ordered {
            let kind = layer.kind();
            if !constraints.allows(kind) {
                trace!(layer = %kind, "Layer disabled by system constraints");
                continue;
            }

            let mut working = layer.snapshot();
            for protected in constraints.protected_for(kind) {
                if value::delete_path(&mut working, protected).is_some() {
                    trace!(layer = %kind, key = %protected, "Dropped protected key");
                }
            }

            value::merge_into(&mut merged, working);
        }
        merged
    }

    /// Merges `layers` under the constraints they declare themselves.
    pub fn compute_resolved(layers: &[&LayeredSource]) -> ConfigMap {
        let constraints = Constraints::resolve(layers.iter().copied());
        Self::compute(layers, &constraints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ProtectedKeys;
    use crate::layer::LayerKind;
    use serde_json::{Value, json};

    fn layer(kind: LayerKind, contents: Value) -> LayeredSource {
        let map = match contents {
            Value::Object(m) => m,
            _ => panic!("fixture must be an object"),
        };
        LayeredSource::builder(kind).seed(map).build()
    }

    fn user(priority: u32, contents: Value) -> LayeredSource {
        layer(LayerKind::UserXdg { priority }, contents)
    }

    #[test]
    fn test_precedence_law() {
        let default = layer(LayerKind::Default, json!({"a": 1}));
        let system = layer(LayerKind::System, json!({"a": 2}));
        let user = user(0, json!({"a": 3}));
        let none = Constraints::default();

        assert_eq!(MergeEngine::compute(&[&default, &system, &user], &none)["a"], 3);
        assert_eq!(MergeEngine::compute(&[&default, &system], &none)["a"], 2);
        assert_eq!(MergeEngine::compute(&[&default], &none)["a"], 1);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let default = layer(LayerKind::Default, json!({"a": 1}));
        let remote = layer(LayerKind::Remote, json!({"a": 4}));
        let patch = layer(LayerKind::RuntimePatch, json!({"a": 9}));
        let none = Constraints::default();

        assert_eq!(MergeEngine::compute(&[&patch, &remote, &default], &none)["a"], 9);
        assert_eq!(MergeEngine::compute(&[&remote, &default], &none)["a"], 4);
    }

    #[test]
    fn test_user_priority_order() {
        let low = user(0, json!({"lang": "en-us", "x": 1}));
        let high = user(1, json!({"lang": "es-mx"}));
        let merged = MergeEngine::compute(&[&high, &low], &Constraints::default());

        assert_eq!(merged["lang"], "es-mx");
        assert_eq!(merged["x"], 1);
    }

    #[test]
    fn test_protection_law() {
        let default = layer(LayerKind::Default, json!({"secret": "admin"}));
        let user = user(0, json!({"secret": "x", "other": "y"}));
        let constraints = Constraints {
            protected_keys: ProtectedKeys {
                user: vec!["secret".into()],
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = MergeEngine::compute(&[&default, &user], &constraints);
        assert_eq!(merged["secret"], "admin");
        assert_eq!(merged["other"], "y");
        // the stored layer is untouched
        assert_eq!(user.get("secret"), Some(json!("x")));
    }

    #[test]
    fn test_nested_protection_on_remote() {
        let remote = layer(
            LayerKind::Remote,
            json!({"server": {"metrics": true, "url": "https://r"}}),
        );
        let constraints = Constraints {
            protected_keys: ProtectedKeys {
                remote: vec!["server.metrics".into()],
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = MergeEngine::compute(&[&remote], &constraints);
        assert_eq!(merged["server"], json!({"url": "https://r"}));
    }

    #[test]
    fn test_disabled_layers_skipped() {
        let default = layer(LayerKind::Default, json!({"a": 1}));
        let remote = layer(LayerKind::Remote, json!({"a": 2}));
        let user = user(0, json!({"b": 3}));
        let patch = layer(LayerKind::RuntimePatch, json!({"c": 4}));
        let constraints = Constraints {
            disable_user_config: true,
            disable_remote_config: true,
            ..Default::default()
        };

        let merged = MergeEngine::compute(&[&default, &remote, &user, &patch], &constraints);
        assert_eq!(Value::Object(merged), json!({"a": 1, "c": 4}));
    }

    #[test]
    fn test_null_shadows_lower_mapping() {
        let default = layer(LayerKind::Default, json!({"tts": {"module": "a"}}));
        let user = user(0, json!({"tts": null}));

        let merged = MergeEngine::compute(&[&default, &user], &Constraints::default());
        assert!(merged["tts"].is_null());
    }

    #[test]
    fn test_merge_is_deterministic() {
        let default = layer(LayerKind::Default, json!({"b": {"y": 1, "x": 2}, "a": [1, 2]}));
        let user = user(0, json!({"b": {"z": 3}, "c": null}));
        let constraints = Constraints::default();

        let first = MergeEngine::compute(&[&default, &user], &constraints);
        let second = MergeEngine::compute(&[&default, &user], &constraints);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_compute_resolved_reads_system_section() {
        let system = layer(
            LayerKind::System,
            json!({"system": {"disable_user_config": true}, "lang": "en-us"}),
        );
        let user = user(0, json!({"lang": "de-de"}));

        let merged = MergeEngine::compute_resolved(&[&system, &user]);
        assert_eq!(merged["lang"], "en-us");
    }
}
