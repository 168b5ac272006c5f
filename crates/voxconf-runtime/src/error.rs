//! Runtime error types.

use std::path::PathBuf;

use thiserror::Error;
use voxconf_core::ConfigError;

use crate::settings::SettingsError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A layer operation failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Resolver settings could not be loaded or validated.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// The filesystem watcher reported an error.
    #[error("File watch error on {path}: {reason}")]
    Watch { path: PathBuf, reason: String },

    /// The change watcher needs a tokio runtime.
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    /// Persisting needs a user layer but the stack has none.
    #[error("No user configuration layer to persist to")]
    NoUserLayer,
}

impl RuntimeError {
    /// Creates a watch error.
    pub fn watch(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Watch {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
