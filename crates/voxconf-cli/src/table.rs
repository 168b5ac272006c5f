//! Two-column key/value tables for `show`.

use colored::Colorize;
use serde_json::Value;
use voxconf_core::ConfigMap;
use voxconf_core::value::depth;

const KEY_MIN_WIDTH: usize = 60;
const INDENT: usize = 4;

struct Row {
    key: String,
    value: Option<String>,
    section_start: bool,
}

/// Key/value table with nested mappings indented below their key.
pub struct Table {
    title: String,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            rows: Vec::new(),
        }
    }

    /// Adds every entry of `map`, shallow entries first.
    pub fn add_map(&mut self, map: &ConfigMap) {
        let mut entries: Vec<(&String, &Value)> = map.iter().collect();
        entries.sort_by_key(|(_, value)| depth(value));
        for (key, value) in entries {
            self.add_entry(key, value, 0);
        }
    }

    fn add_entry(&mut self, key: &str, value: &Value, level: usize) {
        let key = format!("{:indent$}{key}", "", indent = INDENT * level);
        match value {
            Value::Object(child) => {
                self.rows.push(Row {
                    key,
                    value: None,
                    section_start: level == 0,
                });
                for (k, v) in child {
                    self.add_entry(k, v, level + 1);
                }
            }
            other => self.rows.push(Row {
                key,
                value: Some(display_value(other)),
                section_start: false,
            }),
        }
    }

    /// Renders without colors.
    pub fn render(&self) -> String {
        self.render_with(|s| s.to_string())
    }

    /// Renders with section keys highlighted.
    pub fn render_colored(&self) -> String {
        self.render_with(|s| s.red().to_string())
    }

    fn render_with(&self, highlight: impl Fn(&str) -> String) -> String {
        let width = self
            .rows
            .iter()
            .map(|row| row.key.len())
            .chain([self.title.len(), KEY_MIN_WIDTH])
            .max()
            .unwrap_or(KEY_MIN_WIDTH);

        let mut out = String::new();
        out.push_str(&format!("{:width$}  Value\n", self.title));
        out.push_str(&format!("{}  {}\n", "-".repeat(width), "-".repeat(20)));
        for (i, row) in self.rows.iter().enumerate() {
            if row.section_start && i > 0 {
                out.push('\n');
            }
            match &row.value {
                Some(value) => out.push_str(&format!("{:width$}  {value}\n", row.key)),
                None => {
                    out.push_str(&highlight(&row.key));
                    out.push('\n');
                }
            }
        }
        out
    }
}

/// Scalars print bare; lists print as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
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
    fn test_shallow_entries_first() {
        let mut table = Table::new("Configuration keys");
        table.add_map(&map(json!({
            "tts": {"module": "a"},
            "lang": "en-us",
        })));

        let out = table.render();
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("Configuration keys"));
        assert!(lines[2].starts_with("lang"));
        assert!(lines[2].trim_end().ends_with("en-us"));
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "tts");
        assert!(lines[5].starts_with("    module"));
    }

    #[test]
    fn test_sections_separated() {
        let mut table = Table::new("t");
        table.add_map(&map(json!({
            "a": {"x": 1},
            "b": {"y": [1, 2]},
        })));

        let out = table.render();
        assert!(out.contains("\n\nb\n"));
        assert!(out.contains("[1,2]"));
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("x")), "x");
        assert_eq!(display_value(&json!(true)), "true");
        assert_eq!(display_value(&Value::Null), "None");
    }
}
