//! Settings validation utilities.

use super::error::{SettingsError, SettingsResult};
use super::schema::{LocationSettings, LogOutput, ResolverSettings};

/// Validates the entire settings structure.
pub fn validate_settings(settings: &ResolverSettings) -> SettingsResult<()> {
    validate_locations(&settings.locations)?;

    if settings.watch.debounce_ms == 0 {
        return Err(SettingsError::validation(
            "Debounce window must be greater than 0",
        ));
    }

    for (name, topic) in [
        ("bus.paired_topic", &settings.bus.paired_topic),
        ("bus.connected_topic", &settings.bus.connected_topic),
    ] {
        if topic.trim().is_empty() {
            return Err(SettingsError::validation(format!("{name} cannot be empty")));
        }
    }

    if settings.logging.output == LogOutput::File && settings.logging.file_path.is_none() {
        return Err(SettingsError::validation(
            "File log output requires logging.file_path",
        ));
    }

    Ok(())
}

fn validate_locations(locations: &LocationSettings) -> SettingsResult<()> {
    if locations.base_folder.trim().is_empty() {
        return Err(SettingsError::validation("Base folder cannot be empty"));
    }
    if locations.base_folder.contains('/') {
        return Err(SettingsError::validation(format!(
            "Base folder must be a single directory name: {}",
            locations.base_folder
        )));
    }
    if locations.config_filename.trim().is_empty() {
        return Err(SettingsError::validation("Config file name cannot be empty"));
    }
    Ok(())
}
