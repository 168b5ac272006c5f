//! Settings loader using figment.
//!
//! # Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Settings file (`voxconf.yaml` / `voxconf.yml`)
//! 3. Environment variables (`VOXCONF_*`)
//! 4. Programmatic overrides
//!
//! # Environment Variable Mapping
//!
//! Environment variables use the `VOXCONF_` prefix with `__` as separator:
//!
//! - `VOXCONF_LOCATIONS__BASE_FOLDER=neon` → `locations.base_folder = "neon"`
//! - `VOXCONF_WATCH__DEBOUNCE_MS=250` → `watch.debounce_ms = 250`
//! - `VOXCONF_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//!
//! # Example
//!
//! ```rust,ignore
//! use voxconf_runtime::settings::SettingsLoader;
//!
//! let settings = SettingsLoader::new()
//!     .file("/etc/voxconf.yaml")
//!     .with_env()
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use tracing::{debug, info, trace};

use super::error::{SettingsError, SettingsResult};
use super::schema::ResolverSettings;

const ENV_PREFIX: &str = "VOXCONF_";
const SETTINGS_FILES: &[&str] = &["voxconf.yaml", "voxconf.yml"];

/// Settings loader with figment-based multi-source support.
pub struct SettingsLoader {
    /// Programmatic overrides.
    figment: Figment,
    /// Search paths for settings files.
    search_paths: Vec<PathBuf>,
    /// Whether to load environment variables.
    load_env: bool,
    /// Specific settings file to load (overrides search).
    settings_file: Option<PathBuf>,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    /// Creates a new loader with defaults.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            search_paths: Vec::new(),
            load_env: true,
            settings_file: None,
        }
    }

    /// Adds a search path for settings files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Sets a specific settings file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.settings_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges settings programmatically, above every other source.
    pub fn merge(mut self, settings: ResolverSettings) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(settings));
        self
    }

    /// Loads and returns the settings.
    pub fn load(self) -> SettingsResult<ResolverSettings> {
        let figment = self.build_figment()?;

        let settings: ResolverSettings = figment
            .extract()
            .map_err(|e| SettingsError::Extract(e.to_string()))?;

        debug!(
            base_folder = %settings.locations.base_folder,
            config_filename = %settings.locations.config_filename,
            logging_level = %settings.logging.level,
            "Resolver settings loaded"
        );

        Ok(settings)
    }

    fn build_figment(mut self) -> SettingsResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(ResolverSettings::default()));

        if let Some(path) = self.settings_file.take() {
            if !path.exists() {
                return Err(SettingsError::FileNotFound(path));
            }
            info!(path = %path.display(), "Loading settings file");
            figment = Self::merge_settings_file(figment, &path)?;
        } else if let Some(path) = self.find_settings_file() {
            info!(path = %path.display(), "Loading settings file");
            figment = figment.merge(Yaml::file(path));
        } else {
            trace!("No settings file found, using defaults");
        }

        if self.load_env {
            trace!("Loading environment variables with {ENV_PREFIX} prefix");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        let overrides = std::mem::take(&mut self.figment);
        Ok(figment.merge(overrides))
    }

    fn merge_settings_file(figment: Figment, path: &Path) -> SettingsResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            other => Err(SettingsError::UnsupportedFormat(other.to_string())),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("voxconf"));
        }
        paths
    }

    fn find_settings_file(&self) -> Option<PathBuf> {
        self.resolve_search_paths().into_iter().find_map(|dir| {
            SETTINGS_FILES
                .iter()
                .map(|name| dir.join(name))
                .find(|path| path.is_file())
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let temp = TempDir::new().unwrap();
        let settings = SettingsLoader::new()
            .search_path(temp.path())
            .without_env()
            .load()
            .unwrap();

        assert_eq!(settings.locations.base_folder, "mycroft");
        assert_eq!(settings.watch.debounce_ms, 1000);
    }

    #[test]
    fn test_settings_file_found_in_search_path() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("voxconf.yml"),
            "locations:\n  config_filename: neon.yaml\nlogging:\n  level: debug\n",
        )
        .unwrap();

        let settings = SettingsLoader::new()
            .search_path(temp.path())
            .without_env()
            .load()
            .unwrap();

        assert_eq!(settings.locations.config_filename, "neon.yaml");
        assert_eq!(settings.locations.base_folder, "mycroft");
        assert_eq!(settings.logging.level.as_str(), "debug");
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let temp = TempDir::new().unwrap();
        let result = SettingsLoader::new()
            .file(temp.path().join("missing.yaml"))
            .without_env()
            .load();
        assert!(matches!(result, Err(SettingsError::FileNotFound(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("voxconf.ini");
        std::fs::write(&path, "").unwrap();

        let result = SettingsLoader::new().file(&path).without_env().load();
        assert!(matches!(result, Err(SettingsError::UnsupportedFormat(ext)) if ext == "ini"));
    }

    #[test]
    fn test_programmatic_override_wins() {
        let temp = TempDir::new().unwrap();
        let mut overrides = ResolverSettings::default();
        overrides.watch.debounce_ms = 50;

        let settings = SettingsLoader::new()
            .search_path(temp.path())
            .without_env()
            .merge(overrides)
            .load()
            .unwrap();
        assert_eq!(settings.watch.debounce_ms, 50);
    }

    #[test]
    fn test_env_override() {
        let temp = TempDir::new().unwrap();
        // SAFETY: the variable is unique to this test and removed right after
        unsafe {
            std::env::set_var("VOXCONF_BUS__PAIRED_TOPIC", "device.paired");
        }
        let settings = SettingsLoader::new().search_path(temp.path()).load();
        unsafe {
            std::env::remove_var("VOXCONF_BUS__PAIRED_TOPIC");
        }

        assert_eq!(settings.unwrap().bus.paired_topic, "device.paired");
    }
}
