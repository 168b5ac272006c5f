//! Settings schema definitions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResolverSettings {
    /// Where the configuration layers live.
    #[serde(default)]
    pub locations: LocationSettings,

    /// File watching options.
    #[serde(default)]
    pub watch: WatchSettings,

    /// Message bus topics.
    #[serde(default)]
    pub bus: BusSettings,

    /// Logging options.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Locations
// =============================================================================

/// Layer file locations.
///
/// Unset paths are derived from `base_folder` and `config_filename`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSettings {
    /// Folder name under every configuration directory.
    #[serde(default = "default_base_folder")]
    pub base_folder: String,

    /// File name of every configuration file.
    #[serde(default = "default_config_filename")]
    pub config_filename: String,

    /// Defaults file; the bundled defaults are used when unset.
    #[serde(default)]
    pub default_config: Option<PathBuf>,

    /// Defaults to `/usr/share/<base>/<file>`.
    #[serde(default)]
    pub distribution_config: Option<PathBuf>,

    /// Defaults to `/etc/<base>/<file>`.
    #[serde(default)]
    pub system_config: Option<PathBuf>,

    /// Defaults to `<config home>/<base>/web_cache.json`.
    #[serde(default)]
    pub remote_cache: Option<PathBuf>,

    /// Defaults to `<config home>/<base>/<file>`.
    #[serde(default)]
    pub user_config: Option<PathBuf>,

    /// Directory of recommended configuration fragments.
    #[serde(default)]
    pub recommends_dir: Option<PathBuf>,
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            base_folder: default_base_folder(),
            config_filename: default_config_filename(),
            default_config: None,
            distribution_config: None,
            system_config: None,
            remote_cache: None,
            user_config: None,
            recommends_dir: None,
        }
    }
}

fn default_base_folder() -> String {
    "mycroft".to_string()
}

fn default_config_filename() -> String {
    "mycroft.conf".to_string()
}

// =============================================================================
// Watch
// =============================================================================

/// File watching options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSettings {
    /// Start the change watcher together with the context.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Debounce window in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl WatchSettings {
    /// The debounce window.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    1000
}

// =============================================================================
// Bus
// =============================================================================

/// Topics announcing that the Remote layer should be refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusSettings {
    /// Emitted once the device is paired.
    #[serde(default = "default_paired_topic")]
    pub paired_topic: String,

    /// Emitted when internet connectivity is restored.
    #[serde(default = "default_connected_topic")]
    pub connected_topic: String,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            paired_topic: default_paired_topic(),
            connected_topic: default_connected_topic(),
        }
    }
}

fn default_paired_topic() -> String {
    "mycroft.paired".to_string()
}

fn default_connected_topic() -> String {
    "mycroft.internet.connected".to_string()
}

// =============================================================================
// Logging
// =============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Lowercase name, as used in filter directives.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    #[default]
    Stderr,
    File,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global level.
    #[serde(default)]
    pub level: LogLevel,

    /// Line format.
    #[serde(default)]
    pub format: LogFormat,

    /// Destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file, used with [`LogOutput::File`].
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Per-module levels, e.g. `voxconf_runtime::watcher: debug`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            file_path: None,
            thread_ids: false,
            file_location: false,
            filters: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ResolverSettings::default();
        assert_eq!(settings.locations.base_folder, "mycroft");
        assert_eq!(settings.locations.config_filename, "mycroft.conf");
        assert_eq!(settings.watch.debounce(), Duration::from_secs(1));
        assert_eq!(settings.bus.paired_topic, "mycroft.paired");
        assert_eq!(settings.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_partial_yaml_uses_field_defaults() {
        let settings: ResolverSettings = serde_yaml::from_str(
            "locations:\n  base_folder: neon\nwatch:\n  debounce_ms: 250\n",
        )
        .unwrap();
        assert_eq!(settings.locations.base_folder, "neon");
        assert_eq!(settings.locations.config_filename, "mycroft.conf");
        assert_eq!(settings.watch.debounce_ms, 250);
        assert!(settings.watch.enabled);
    }
}
