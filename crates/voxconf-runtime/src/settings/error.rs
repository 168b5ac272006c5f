//! Settings error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading and validating resolver settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Settings file not found at the specified path.
    #[error("Settings file not found: {0}")]
    FileNotFound(PathBuf),

    /// The settings sources could not be combined or decoded.
    #[error("Failed to extract settings: {0}")]
    Extract(String),

    /// Unsupported settings file extension.
    #[error("Unsupported settings file format: .{0}")]
    UnsupportedFormat(String),

    /// Invalid settings value.
    #[error("Invalid settings: {message}")]
    Validation { message: String },

    /// A required location could not be resolved.
    #[error("Cannot resolve location: {0}")]
    Unresolved(String),
}

impl SettingsError {
    /// Creates a validation error with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Result type for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;
