//! Unified error types for configuration layers.
//!
//! Load failures are deliberately absent: a layer that cannot be read keeps
//! its previous contents and reports a [`LoadStatus`](crate::LoadStatus)
//! instead of an error.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while mutating, storing or querying configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Write, merge or store attempted on an administrator layer.
    #[error("{origin} is read only! it can not be modified at runtime")]
    PermissionDenied {
        /// Display form of the layer origin.
        origin: String,
    },

    /// Store attempted on a source without a backing file.
    #[error("in memory configuration, no save location")]
    NoPath,

    /// I/O error on a backing file.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// File contents could not be decoded.
    #[error("failed to parse {path}: {reason}")]
    Parse {
        /// The file being decoded.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// Contents could not be encoded for storage.
    #[error("failed to serialize configuration: {reason}")]
    Serialize {
        /// Encoder message.
        reason: String,
    },

    /// Strict lookup of an absent key path.
    #[error("configuration key not found: {key}")]
    NotFound {
        /// The requested key path.
        key: String,
    },

    /// A key path with no usable segments.
    #[error("invalid key path: {0:?}")]
    InvalidKeyPath(String),
}

impl ConfigError {
    /// Creates a permission error for the given origin.
    pub fn permission_denied(origin: impl Into<String>) -> Self {
        Self::PermissionDenied {
            origin: origin.into(),
        }
    }

    /// Creates a not-found error for a key path.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Returns `true` for read-only violations.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Returns `true` when a strict lookup missed.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
