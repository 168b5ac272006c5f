//! On-disk encodings of configuration files.
//!
//! `.yml`/`.yaml` files are YAML; everything else (`.json`, `.conf`, no
//! extension) is JSON. `//` line comments are tolerated when reading JSON but
//! never written.

use std::path::Path;

use serde_json::Value;

use crate::error::{ConfigError, ConfigResult};
use crate::value::ConfigMap;

/// Serialization format of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// JSON, optionally with `//` comments on read.
    Json,
    /// YAML, written in block style with insertion-ordered keys.
    Yaml,
}

impl FileFormat {
    /// Picks the format from a file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml") => {
                Self::Yaml
            }
            _ => Self::Json,
        }
    }

    /// Decodes file text into a mapping.
    ///
    /// An empty document decodes to an empty mapping; any other non-mapping
    /// top level is a parse error.
    pub fn parse(self, text: &str, path: &Path) -> ConfigResult<ConfigMap> {
        let value = match self {
            Self::Json => {
                let stripped = strip_line_comments(text);
                if stripped.trim().is_empty() {
                    return Ok(ConfigMap::new());
                }
                serde_json::from_str::<Value>(&stripped).map_err(|e| ConfigError::Parse {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?
            }
            Self::Yaml => serde_yaml::from_str::<Value>(text).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?,
        };

        match value {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(ConfigMap::new()),
            other => Err(ConfigError::Parse {
                path: path.to_path_buf(),
                reason: format!("top-level value must be a mapping, found {}", kind_of(&other)),
            }),
        }
    }

    /// Encodes a mapping for storage.
    pub fn render(self, map: &ConfigMap) -> ConfigResult<String> {
        match self {
            Self::Json => serde_json::to_string_pretty(map)
                .map(|mut s| {
                    s.push('\n');
                    s
                })
                .map_err(|e| ConfigError::Serialize {
                    reason: e.to_string(),
                }),
            Self::Yaml => serde_yaml::to_string(map).map_err(|e| ConfigError::Serialize {
                reason: e.to_string(),
            }),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Removes `//` comments that appear outside of string literals.
fn strip_line_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for line in text.lines() {
        let mut in_string = false;
        let mut escaped = false;
        let mut cut = line.len();
        let bytes = line.as_bytes();

        for (i, &b) in bytes.iter().enumerate() {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
            } else if b == b'"' {
                in_string = true;
            } else if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
                cut = i;
                break;
            }
        }

        out.push_str(&line[..cut]);
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_from_path() {
        assert_eq!(FileFormat::from_path(Path::new("a.yml")), FileFormat::Yaml);
        assert_eq!(FileFormat::from_path(Path::new("a.YAML")), FileFormat::Yaml);
        assert_eq!(FileFormat::from_path(Path::new("mycroft.conf")), FileFormat::Json);
        assert_eq!(FileFormat::from_path(Path::new("noext")), FileFormat::Json);
    }

    #[test]
    fn test_commented_json() {
        let text = r#"
            // leading comment
            {
              "url": "http://example.com", // trailing
              "path": "a//b"
            }
        "#;
        let map = FileFormat::Json.parse(text, Path::new("x.conf")).unwrap();
        assert_eq!(map["url"], "http://example.com");
        assert_eq!(map["path"], "a//b");
    }

    #[test]
    fn test_escaped_quote_in_string() {
        let text = r#"{"a": "say \"hi\" // not a comment"}"#;
        let map = FileFormat::Json.parse(text, Path::new("x.json")).unwrap();
        assert_eq!(map["a"], "say \"hi\" // not a comment");
    }

    #[test]
    fn test_empty_documents() {
        assert!(FileFormat::Json.parse("  \n", Path::new("x.json")).unwrap().is_empty());
        assert!(FileFormat::Yaml.parse("", Path::new("x.yml")).unwrap().is_empty());
    }

    #[test]
    fn test_non_mapping_rejected() {
        let err = FileFormat::Json.parse("[1, 2]", Path::new("x.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_json_render_uses_two_space_indent() {
        let map = match json!({"a": {"b": 1}}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let text = FileFormat::Json.render(&map).unwrap();
        assert!(text.contains("\n  \"a\": {\n    \"b\": 1"));
    }

    #[test]
    fn test_yaml_render_keeps_insertion_order() {
        let map = match json!({"zeta": 1, "alpha": "ñ"}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let text = FileFormat::Yaml.render(&map).unwrap();
        let zeta = text.find("zeta").unwrap();
        let alpha = text.find("alpha").unwrap();
        assert!(zeta < alpha);
        assert!(text.contains('ñ'));
    }
}
