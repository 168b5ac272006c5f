//! Resolution of layer file locations.
//!
//! ```text
//! Default        bundled defaults, or locations.default_config
//! Distribution   /usr/share/<base>/<file>
//! System         /etc/<base>/<file>
//! Remote         <config home>/<base>/web_cache.json
//! User[0..n]     <XDG_CONFIG_DIRS reversed>/<base>/<file>, then <config home>/<base>/<file>
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;
use voxconf_core::{ConfigMap, ConfigResult, FileFormat, LayerPaths};

use crate::settings::{ResolverSettings, SettingsError, SettingsResult};

const BUNDLED_DEFAULT: &str = include_str!("../assets/default.conf");
const REMOTE_CACHE_FILE: &str = "web_cache.json";

/// The bundled default configuration.
pub fn bundled_default() -> ConfigResult<ConfigMap> {
    FileFormat::Json.parse(BUNDLED_DEFAULT, Path::new("default.conf"))
}

/// The user configuration home: `$XDG_CONFIG_HOME` or `~/.config`.
pub fn xdg_config_home() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
}

/// System configuration directories from `$XDG_CONFIG_DIRS`, most important
/// first. Defaults to `/etc/xdg`.
pub fn xdg_system_config_dirs() -> Vec<PathBuf> {
    let dirs: Vec<PathBuf> = std::env::var("XDG_CONFIG_DIRS")
        .unwrap_or_default()
        .split(':')
        .filter(|entry| !entry.is_empty())
        .map(PathBuf::from)
        .collect();
    if dirs.is_empty() {
        vec![PathBuf::from("/etc/xdg")]
    } else {
        dirs
    }
}

/// Every XDG configuration directory joined with `folder`, most specific
/// first: the user config home, then `$XDG_CONFIG_DIRS`.
pub fn xdg_config_dirs(folder: &str) -> Vec<PathBuf> {
    config_dirs(
        xdg_config_home().as_deref(),
        &xdg_system_config_dirs(),
        folder,
    )
}

fn config_dirs(config_home: Option<&Path>, system_dirs: &[PathBuf], folder: &str) -> Vec<PathBuf> {
    config_home
        .map(Path::to_path_buf)
        .into_iter()
        .chain(system_dirs.iter().cloned())
        .map(|dir| dir.join(folder))
        .collect()
}

/// The user-layer search path, least specific first.
pub fn xdg_config_locations(settings: &ResolverSettings) -> Vec<PathBuf> {
    let locations = &settings.locations;
    xdg_config_dirs(&locations.base_folder)
        .into_iter()
        .rev()
        .map(|dir| dir.join(&locations.config_filename))
        .collect()
}

/// The user configuration file, target of persist and of CLI edits.
pub fn user_config_path(settings: &ResolverSettings) -> Option<PathBuf> {
    let locations = &settings.locations;
    locations.user_config.clone().or_else(|| {
        xdg_config_home().map(|home| {
            home.join(&locations.base_folder)
                .join(&locations.config_filename)
        })
    })
}

/// The Remote layer cache file.
pub fn remote_cache_path(settings: &ResolverSettings) -> Option<PathBuf> {
    let locations = &settings.locations;
    locations.remote_cache.clone().or_else(|| {
        xdg_config_home().map(|home| home.join(&locations.base_folder).join(REMOTE_CACHE_FILE))
    })
}

/// The Distribution layer file.
pub fn distribution_config_path(settings: &ResolverSettings) -> PathBuf {
    let locations = &settings.locations;
    locations.distribution_config.clone().unwrap_or_else(|| {
        Path::new("/usr/share")
            .join(&locations.base_folder)
            .join(&locations.config_filename)
    })
}

/// The System layer file.
pub fn system_config_path(settings: &ResolverSettings) -> PathBuf {
    let locations = &settings.locations;
    locations.system_config.clone().unwrap_or_else(|| {
        Path::new("/etc")
            .join(&locations.base_folder)
            .join(&locations.config_filename)
    })
}

/// Directory of recommended configuration fragments used by autoconfigure.
pub fn recommends_dir(settings: &ResolverSettings) -> Option<PathBuf> {
    settings.locations.recommends_dir.clone().or_else(|| {
        dirs::data_dir().map(|data| {
            data.join(&settings.locations.base_folder)
                .join("recommends")
        })
    })
}

/// Resolves the location of every fixed layer.
///
/// An explicit `user_config` replaces the config home entry of the user
/// search path.
pub fn layer_paths(settings: &ResolverSettings) -> SettingsResult<LayerPaths> {
    let (default, default_seed) = match &settings.locations.default_config {
        Some(path) => (Some(path.clone()), None),
        None => {
            let seed = bundled_default().map_err(|e| SettingsError::Unresolved(e.to_string()))?;
            (None, Some(seed))
        }
    };

    let mut user = xdg_config_locations(settings);
    // the config home entry is last; user_config_path may replace it
    if xdg_config_home().is_some() {
        user.pop();
    }
    match user_config_path(settings) {
        Some(path) => user.push(path),
        None => {
            return Err(SettingsError::Unresolved(
                "no user configuration directory".to_string(),
            ));
        }
    }

    let paths = LayerPaths {
        default,
        default_seed,
        distribution: Some(distribution_config_path(settings)),
        system: Some(system_config_path(settings)),
        remote: remote_cache_path(settings),
        user,
    };
    debug!(
        system = ?paths.system,
        user = ?paths.user,
        "Resolved layer locations"
    );
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_default_parses() {
        let defaults = bundled_default().unwrap();
        assert_eq!(defaults["lang"], "en-us");
        assert_eq!(defaults["windspeed_unit"], "m/s");
        assert!(defaults["system"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_config_dirs_most_specific_first() {
        let system = vec![PathBuf::from("/etc/xdg"), PathBuf::from("/opt/xdg")];
        assert_eq!(
            config_dirs(Some(Path::new("/home/u/.config")), &system, "mycroft"),
            vec![
                PathBuf::from("/home/u/.config/mycroft"),
                PathBuf::from("/etc/xdg/mycroft"),
                PathBuf::from("/opt/xdg/mycroft"),
            ]
        );
        assert_eq!(
            config_dirs(None, &system, "neon"),
            vec![PathBuf::from("/etc/xdg/neon"), PathBuf::from("/opt/xdg/neon")]
        );
    }

    #[test]
    fn test_search_path_reverses_config_dirs() {
        let settings = ResolverSettings::default();
        let mut expected: Vec<PathBuf> = xdg_config_dirs("mycroft")
            .into_iter()
            .map(|dir| dir.join("mycroft.conf"))
            .collect();
        expected.reverse();
        assert_eq!(xdg_config_locations(&settings), expected);
    }

    #[test]
    fn test_user_config_replaces_config_home_entry() {
        let mut settings = ResolverSettings::default();
        settings.locations.user_config = Some("/srv/user.conf".into());

        let paths = layer_paths(&settings).unwrap();
        assert_eq!(paths.user.len(), xdg_system_config_dirs().len() + 1);
        assert_eq!(paths.user.last(), Some(&PathBuf::from("/srv/user.conf")));
        assert_eq!(
            paths.user[0],
            xdg_system_config_dirs()
                .last()
                .unwrap()
                .join("mycroft")
                .join("mycroft.conf")
        );
    }

    #[test]
    fn test_admin_paths_follow_base_folder() {
        let mut settings = ResolverSettings::default();
        settings.locations.base_folder = "neon".into();
        settings.locations.config_filename = "neon.yaml".into();

        assert_eq!(
            distribution_config_path(&settings),
            PathBuf::from("/usr/share/neon/neon.yaml")
        );
        assert_eq!(system_config_path(&settings), PathBuf::from("/etc/neon/neon.yaml"));
    }

    #[test]
    fn test_explicit_paths_win() {
        let mut settings = ResolverSettings::default();
        settings.locations.system_config = Some("/srv/sys.conf".into());
        settings.locations.remote_cache = Some("/srv/web.json".into());
        settings.locations.user_config = Some("/srv/user.conf".into());
        settings.locations.default_config = Some("/srv/default.conf".into());

        let paths = layer_paths(&settings).unwrap();
        assert_eq!(paths.system, Some(PathBuf::from("/srv/sys.conf")));
        assert_eq!(paths.remote, Some(PathBuf::from("/srv/web.json")));
        assert_eq!(paths.user.last(), Some(&PathBuf::from("/srv/user.conf")));
        assert_eq!(paths.default, Some(PathBuf::from("/srv/default.conf")));
        assert!(paths.default_seed.is_none());
        assert_eq!(user_config_path(&settings), Some(PathBuf::from("/srv/user.conf")));
    }

    #[test]
    fn test_bundled_seed_without_default_path() {
        let paths = layer_paths(&ResolverSettings::default()).unwrap();
        assert!(paths.default.is_none());
        assert!(paths.default_seed.is_some());
    }
}
